//! Domain handlers.
//!
//! Each handler turns one classified intent into a `FactSet` by reading its
//! data source. Handlers never fail: missing data becomes a flagged fact set.

pub mod faq;
pub mod fees;
pub mod portfolio;
pub mod trading;
pub mod wallet;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use ledgerchat_core::config::DispatchConfig;
use ledgerchat_core::types::{ClassifiedIntent, FactSet, Identity, Intent};
use ledgerchat_store::{AccountDataGateway, GatewayError, KnowledgeStore};

pub use faq::FaqHandler;
pub use fees::FeesHandler;
pub use portfolio::PortfolioHandler;
pub use trading::TradingHandler;
pub use wallet::WalletHandler;

/// Turns a classified intent into facts for the composer.
#[async_trait]
pub trait DomainHandler: Send + Sync {
    /// The intent this handler answers.
    fn intent(&self) -> Intent;

    /// Produce the fact set for `intent`, reading only `identity`'s records.
    async fn handle(&self, intent: &ClassifiedIntent, identity: &Identity) -> FactSet;
}

/// Registry mapping each intent to its handler.
pub struct HandlerRegistry {
    handlers: HashMap<Intent, Arc<dyn DomainHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any existing one for the same intent.
    pub fn register(&mut self, handler: Arc<dyn DomainHandler>) {
        let intent = handler.intent();
        if self.handlers.insert(intent, handler).is_some() {
            debug!(intent = %intent, "Replaced domain handler");
        }
    }

    /// All five domain handlers over the given data sources.
    pub fn with_defaults(
        gateway: Arc<dyn AccountDataGateway>,
        knowledge: Arc<KnowledgeStore>,
        dispatch: &DispatchConfig,
    ) -> Self {
        let retry = RetryPolicy::from(dispatch);
        let mut registry = Self::new();
        registry.register(Arc::new(WalletHandler::new(gateway.clone(), retry)));
        registry.register(Arc::new(TradingHandler::new(gateway.clone(), retry)));
        registry.register(Arc::new(PortfolioHandler::new(gateway, retry)));
        registry.register(Arc::new(FeesHandler::new(knowledge.clone())));
        registry.register(Arc::new(FaqHandler::new(knowledge)));
        registry
    }

    pub fn get(&self, intent: Intent) -> Option<Arc<dyn DomainHandler>> {
        self.handlers.get(&intent).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Gateway retry
// =============================================================================

/// Extra attempts and the pause between them for gateway reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            retries: config.gateway_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Run a gateway read, retrying transient failures per `policy`.
pub async fn fetch_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut fetch: F,
) -> Result<Vec<T>, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>, GatewayError>>,
{
    let mut attempt = 0;
    loop {
        match fetch().await {
            Ok(records) => return Ok(records),
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                warn!(what, attempt, "Gateway read failed, retrying: {e}");
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => {
                warn!(what, "Gateway read failed: {e}");
                return Err(e);
            }
        }
    }
}

/// Group records by asset or currency, in symbol order.
pub(crate) fn group_by_asset<'a, T>(
    records: &'a [T],
    asset: impl Fn(&T) -> &str,
) -> BTreeMap<String, Vec<&'a T>> {
    let mut groups: BTreeMap<String, Vec<&'a T>> = BTreeMap::new();
    for record in records {
        groups
            .entry(asset(record).to_uppercase())
            .or_default()
            .push(record);
    }
    groups
}

/// Group records by `(asset, quote currency)` market, in symbol order.
pub(crate) fn group_by_market<'a, T>(
    records: &'a [T],
    market: impl Fn(&T) -> (&str, &str),
) -> BTreeMap<(String, String), Vec<&'a T>> {
    let mut groups: BTreeMap<(String, String), Vec<&'a T>> = BTreeMap::new();
    for record in records {
        let (asset, quote) = market(record);
        groups
            .entry((asset.to_uppercase(), quote.to_uppercase()))
            .or_default()
            .push(record);
    }
    groups
}

/// "BTC trades" when an asset filter applies, else "trades".
pub(crate) fn scoped_subject(asset: Option<&str>, noun: &str) -> String {
    match asset {
        Some(asset) => format!("{asset} {noun}"),
        None => noun.to_string(),
    }
}

//! Account Data Gateway contract.
//!
//! Every read is keyed by the caller's `Identity`; implementations must never
//! return records belonging to any other user. Results are ordered oldest
//! first and are either complete or an error, never partial.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use ledgerchat_core::error::LedgerError;
use ledgerchat_core::types::{
    Balance, Holding, Identity, Order, PricePoint, TimeWindow, TradeFill, WalletTransaction,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway timed out after {0} ms")]
    Timeout(u64),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("gateway returned corrupt records: {0}")]
    Corrupt(String),
}

impl From<GatewayError> for LedgerError {
    fn from(err: GatewayError) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

/// Time range and asset filter applied to a gateway read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub window: TimeWindow,
    /// Asset symbol, compared case-insensitively.
    pub asset: Option<String>,
}

impl RecordFilter {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            asset: None,
        }
    }

    pub fn with_asset(mut self, asset: Option<String>) -> Self {
        self.asset = asset;
        self
    }

    pub fn matches(&self, asset: &str, ts: DateTime<Utc>) -> bool {
        self.matches_asset(asset) && self.window.contains(ts)
    }

    pub fn matches_asset(&self, asset: &str) -> bool {
        self.asset
            .as_deref()
            .is_none_or(|wanted| wanted.eq_ignore_ascii_case(asset))
    }
}

/// Read-only access to one user's wallet, trading and portfolio records.
#[async_trait]
pub trait AccountDataGateway: Send + Sync {
    async fn deposits(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> Result<Vec<WalletTransaction>, GatewayError>;

    async fn withdrawals(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> Result<Vec<WalletTransaction>, GatewayError>;

    /// Balances are point-in-time; only the filter's asset applies.
    async fn balances(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> Result<Vec<Balance>, GatewayError>;

    async fn orders(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> Result<Vec<Order>, GatewayError>;

    async fn fills(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> Result<Vec<TradeFill>, GatewayError>;

    /// Holdings with current market prices. Only the filter's asset applies.
    async fn holdings(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> Result<Vec<Holding>, GatewayError>;

    /// Closing prices inside the filter's window, oldest first. Market data
    /// is the same for every caller; the identity is still required.
    async fn price_history(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> Result<Vec<PricePoint>, GatewayError>;
}

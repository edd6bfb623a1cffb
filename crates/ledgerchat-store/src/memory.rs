//! In-memory Account Data Gateway backed by JSON fixtures.
//!
//! Records are kept per `UserId` behind a `RwLock`. Each read takes the
//! lock only long enough to clone the caller's own matching records.
//! Price history is shared market data held beside the accounts.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ledgerchat_core::error::{LedgerError, Result};
use ledgerchat_core::types::{
    Balance, Holding, Identity, Order, PricePoint, TradeFill, TxKind, UserId, WalletTransaction,
};

use crate::gateway::{AccountDataGateway, GatewayError, RecordFilter};

const DEMO_FIXTURE: &str = include_str!("../data/demo_accounts.json");

/// Everything stored for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountRecords {
    pub transactions: Vec<WalletTransaction>,
    pub balances: Vec<Balance>,
    pub orders: Vec<Order>,
    pub fills: Vec<TradeFill>,
    pub holdings: Vec<Holding>,
}

impl AccountRecords {
    /// Put time-stamped records in chronological order.
    fn sort(&mut self) {
        self.transactions.sort_by_key(|t| t.timestamp);
        self.orders.sort_by_key(|o| o.created_at);
        self.fills.sort_by_key(|f| f.executed_at);
    }
}

/// A session token to register at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeededSession {
    pub token: String,
    pub user_id: String,
}

/// On-disk account fixture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub accounts: HashMap<String, AccountRecords>,
    pub prices: Vec<PricePoint>,
    pub sessions: Vec<SeededSession>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture: Fixture = serde_json::from_str(&content)?;
        info!(
            accounts = fixture.accounts.len(),
            prices = fixture.prices.len(),
            sessions = fixture.sessions.len(),
            "Account fixture loaded from {}",
            path.display()
        );
        Ok(fixture)
    }

    /// The bundled demo accounts.
    pub fn demo() -> Result<Self> {
        serde_json::from_str(DEMO_FIXTURE).map_err(LedgerError::from)
    }
}

pub struct InMemoryGateway {
    accounts: RwLock<HashMap<UserId, AccountRecords>>,
    prices: RwLock<Vec<PricePoint>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            prices: RwLock::new(Vec::new()),
        }
    }

    pub fn from_fixture(fixture: &Fixture) -> Self {
        let gateway = Self::new();
        for (user, records) in &fixture.accounts {
            gateway.insert_account(UserId::new(user.clone()), records.clone());
        }
        gateway.insert_prices(fixture.prices.clone());
        gateway
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_fixture(&Fixture::load(path)?))
    }

    /// Replace all records held for `user`.
    pub fn insert_account(&self, user: UserId, mut records: AccountRecords) {
        records.sort();
        match self.accounts.write() {
            Ok(mut accounts) => {
                accounts.insert(user, records);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(user, records);
            }
        }
    }

    /// Add closing prices to the shared market history.
    pub fn insert_prices(&self, points: Vec<PricePoint>) {
        let mut prices = match self.prices.write() {
            Ok(prices) => prices,
            Err(poisoned) => poisoned.into_inner(),
        };
        prices.extend(points);
        prices.sort_by_key(|p| p.at);
    }

    pub fn account_count(&self) -> usize {
        self.accounts.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Run `f` against the caller's records. Unknown users read as empty.
    fn with_account<F, T>(&self, identity: &Identity, f: F) -> std::result::Result<T, GatewayError>
    where
        F: FnOnce(&AccountRecords) -> T,
    {
        let accounts = self
            .accounts
            .read()
            .map_err(|e| GatewayError::Unavailable(format!("account lock poisoned: {e}")))?;
        match accounts.get(&identity.user_id) {
            Some(records) => Ok(f(records)),
            None => {
                debug!("No records held for this identity");
                Ok(f(&AccountRecords::default()))
            }
        }
    }

    fn transactions(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
        kind: TxKind,
    ) -> std::result::Result<Vec<WalletTransaction>, GatewayError> {
        self.with_account(identity, |records| {
            records
                .transactions
                .iter()
                .filter(|t| t.kind == kind && filter.matches(&t.asset, t.timestamp))
                .cloned()
                .collect()
        })
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountDataGateway for InMemoryGateway {
    async fn deposits(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> std::result::Result<Vec<WalletTransaction>, GatewayError> {
        self.transactions(identity, filter, TxKind::Deposit)
    }

    async fn withdrawals(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> std::result::Result<Vec<WalletTransaction>, GatewayError> {
        self.transactions(identity, filter, TxKind::Withdrawal)
    }

    async fn balances(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> std::result::Result<Vec<Balance>, GatewayError> {
        self.with_account(identity, |records| {
            records
                .balances
                .iter()
                .filter(|b| filter.matches_asset(&b.asset))
                .cloned()
                .collect()
        })
    }

    async fn orders(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> std::result::Result<Vec<Order>, GatewayError> {
        self.with_account(identity, |records| {
            records
                .orders
                .iter()
                .filter(|o| filter.matches(&o.asset, o.created_at))
                .cloned()
                .collect()
        })
    }

    async fn fills(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> std::result::Result<Vec<TradeFill>, GatewayError> {
        self.with_account(identity, |records| {
            records
                .fills
                .iter()
                .filter(|f| filter.matches(&f.asset, f.executed_at))
                .cloned()
                .collect()
        })
    }

    async fn holdings(
        &self,
        identity: &Identity,
        filter: &RecordFilter,
    ) -> std::result::Result<Vec<Holding>, GatewayError> {
        self.with_account(identity, |records| {
            records
                .holdings
                .iter()
                .filter(|h| filter.matches_asset(&h.asset))
                .cloned()
                .collect()
        })
    }

    async fn price_history(
        &self,
        _identity: &Identity,
        filter: &RecordFilter,
    ) -> std::result::Result<Vec<PricePoint>, GatewayError> {
        let prices = self
            .prices
            .read()
            .map_err(|e| GatewayError::Unavailable(format!("price lock poisoned: {e}")))?;
        Ok(prices
            .iter()
            .filter(|p| filter.matches(&p.asset, p.at))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ledgerchat_core::types::{TimeWindow, TxStatus};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn tx(id: &str, kind: TxKind, amount: Decimal, day: u32) -> WalletTransaction {
        WalletTransaction {
            id: id.to_string(),
            kind,
            asset: "INR".to_string(),
            amount,
            status: TxStatus::Completed,
            timestamp: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
        }
    }

    fn identity(user: &str) -> Identity {
        Identity::new(UserId::new(user))
    }

    fn gateway_with_alice_and_bob() -> InMemoryGateway {
        let gateway = InMemoryGateway::new();
        gateway.insert_account(
            UserId::new("alice"),
            AccountRecords {
                transactions: vec![
                    tx("a-3", TxKind::Deposit, dec!(50), 20),
                    tx("a-1", TxKind::Deposit, dec!(100), 1),
                    tx("a-2", TxKind::Deposit, dec!(250), 10),
                    tx("a-4", TxKind::Withdrawal, dec!(30), 15),
                ],
                ..Default::default()
            },
        );
        gateway.insert_account(
            UserId::new("bob"),
            AccountRecords {
                transactions: vec![tx("b-1", TxKind::Deposit, dec!(9999), 5)],
                ..Default::default()
            },
        );
        gateway
    }

    #[tokio::test]
    async fn test_deposits_are_chronological_and_scoped() {
        let gateway = gateway_with_alice_and_bob();
        let deposits = gateway
            .deposits(&identity("alice"), &RecordFilter::default())
            .await
            .unwrap();

        let ids: Vec<&str> = deposits.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a-1", "a-2", "a-3"]);
        assert!(deposits.iter().all(|t| t.amount != dec!(9999)));
    }

    #[tokio::test]
    async fn test_withdrawals_only_return_withdrawals() {
        let gateway = gateway_with_alice_and_bob();
        let withdrawals = gateway
            .withdrawals(&identity("alice"), &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(withdrawals.len(), 1);
        assert_eq!(withdrawals[0].id, "a-4");
    }

    #[tokio::test]
    async fn test_window_filter_applies() {
        let gateway = gateway_with_alice_and_bob();
        let start = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        let filter = RecordFilter::new(TimeWindow::new("since 5 march", Some(start), None));
        let deposits = gateway.deposits(&identity("alice"), &filter).await.unwrap();
        assert_eq!(deposits.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_user_reads_empty() {
        let gateway = gateway_with_alice_and_bob();
        let who = identity("mallory");
        assert!(gateway
            .deposits(&who, &RecordFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert!(gateway
            .holdings(&who, &RecordFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_load_fixture_from_file() {
        let json = r#"{
            "accounts": {
                "carol": {
                    "balances": [{ "asset": "INR", "available": "1200.50", "locked": "0" }],
                    "holdings": [{
                        "asset": "ETH", "quantity": "2", "average_cost": "150000",
                        "market_price": "180000", "quote_currency": "INR"
                    }]
                }
            },
            "sessions": [{ "token": "carol-token", "user_id": "carol" }]
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let fixture = Fixture::load(file.path()).unwrap();
        assert_eq!(fixture.sessions.len(), 1);

        let gateway = InMemoryGateway::from_fixture(&fixture);
        assert_eq!(gateway.account_count(), 1);
        let filter = RecordFilter::default().with_asset(Some("eth".to_string()));
        let holdings = gateway.holdings(&identity("carol"), &filter).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].value(), dec!(360000));
    }

    #[tokio::test]
    async fn test_price_history_is_windowed_and_ordered() {
        let gateway = InMemoryGateway::new();
        let point = |asset: &str, day: u32, price: Decimal| PricePoint {
            asset: asset.to_string(),
            quote_currency: "INR".to_string(),
            price,
            at: Utc.with_ymd_and_hms(2026, 3, day, 23, 59, 59).unwrap(),
        };
        gateway.insert_prices(vec![
            point("BTC", 20, dec!(120)),
            point("BTC", 1, dec!(100)),
            point("ETH", 10, dec!(9)),
            point("BTC", 10, dec!(110)),
        ]);

        let start = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        let filter = RecordFilter::new(TimeWindow::new("since 5 march", Some(start), None))
            .with_asset(Some("BTC".to_string()));
        let history = gateway.price_history(&identity("alice"), &filter).await.unwrap();
        let prices: Vec<Decimal> = history.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![dec!(110), dec!(120)]);
    }

    #[test]
    fn test_load_missing_fixture_is_error() {
        let result = InMemoryGateway::load(Path::new("/nonexistent/accounts.json"));
        assert!(matches!(result, Err(LedgerError::Io(_))));
    }

    #[test]
    fn test_demo_fixture_parses() {
        let fixture = Fixture::demo().unwrap();
        assert!(fixture.accounts.contains_key("demo"));
        assert!(!fixture.sessions.is_empty());
        assert!(fixture.prices.iter().any(|p| p.asset == "BTC"));
    }
}

//! Wallet handler: deposits, withdrawals and balances.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use ledgerchat_core::types::{
    ClassifiedIntent, Direction, Fact, FactHint, FactSet, Identity, Intent, IntentParams, Metric,
    TxKind, TxStatus, WalletTransaction,
};
use ledgerchat_store::{AccountDataGateway, RecordFilter};

use super::{fetch_with_retry, group_by_asset, scoped_subject, DomainHandler, RetryPolicy};

pub struct WalletHandler {
    gateway: Arc<dyn AccountDataGateway>,
    retry: RetryPolicy,
}

impl WalletHandler {
    pub fn new(gateway: Arc<dyn AccountDataGateway>, retry: RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    async fn fetch(
        &self,
        kind: TxKind,
        identity: &Identity,
        params: &IntentParams,
    ) -> Option<Vec<WalletTransaction>> {
        let filter = RecordFilter::new(params.window.clone()).with_asset(params.asset.clone());
        let gateway = self.gateway.as_ref();
        let filter = &filter;
        let fetched = match kind {
            TxKind::Deposit => {
                fetch_with_retry(self.retry, "deposits", move || {
                    gateway.deposits(identity, filter)
                })
                .await
            }
            TxKind::Withdrawal => {
                fetch_with_retry(self.retry, "withdrawals", move || {
                    gateway.withdrawals(identity, filter)
                })
                .await
            }
        };

        // Failed transfers moved no funds; they only count when asked for.
        fetched.ok().map(|records| {
            records
                .into_iter()
                .filter(|t| match params.status {
                    Some(status) => t.status == status,
                    None => t.status != TxStatus::Failed,
                })
                .collect()
        })
    }

    async fn transactions(
        &self,
        kind: TxKind,
        identity: &Identity,
        params: &IntentParams,
    ) -> FactSet {
        let noun = match kind {
            TxKind::Deposit => "deposit",
            TxKind::Withdrawal => "withdrawal",
        };
        let plural = match params.status {
            Some(status) => format!("{} {noun}s", status.as_str()),
            None => format!("{noun}s"),
        };
        let subject = scoped_subject(params.asset.as_deref(), &plural);
        let window = params.window.clone();

        let Some(records) = self.fetch(kind, identity, params).await else {
            return FactSet::flagged(Intent::Wallet, subject, window, FactHint::Unavailable);
        };
        if records.is_empty() {
            return FactSet::flagged(Intent::Wallet, subject, window, FactHint::NoRecords);
        }

        let mut set = FactSet::new(Intent::Wallet, subject, window);
        let by_currency = group_by_asset(&records, |t| t.asset.as_str());
        let count = records.len() as u64;

        match params.metric {
            Metric::Count => set.push(Fact::count(format!("number of {plural}"), count)),
            Metric::Average => {
                for (currency, txs) in &by_currency {
                    let average = total(txs) / Decimal::from(txs.len());
                    set.push(Fact::amount(format!("average {noun}"), average, currency));
                }
            }
            Metric::Largest | Metric::Smallest => {
                let largest = params.metric == Metric::Largest;
                let label = if largest { "largest" } else { "smallest" };
                for (currency, txs) in &by_currency {
                    let pick = if largest {
                        txs.iter().max_by_key(|t| t.amount)
                    } else {
                        txs.iter().min_by_key(|t| t.amount)
                    };
                    if let Some(tx) = pick {
                        set.push(Fact::amount(format!("{label} {noun}"), tx.amount, currency));
                        set.push(Fact::date(format!("{label} {noun} date"), tx.timestamp));
                    }
                }
            }
            Metric::List => {
                let limit = params.limit.unwrap_or(usize::MAX);
                for tx in records.iter().rev().take(limit) {
                    let label = format!("{noun} on {}", tx.timestamp.format("%Y-%m-%d"));
                    set.push(Fact::amount(label, tx.amount, &tx.asset));
                }
                if records.len() > limit {
                    set.push(Fact::count(format!("number of {plural}"), count));
                }
            }
            metric => {
                for (currency, txs) in &by_currency {
                    set.push(Fact::amount(format!("total {plural}"), total(txs), currency));
                }
                set.push(Fact::count(format!("number of {plural}"), count));
                if metric == Metric::Summary {
                    if let Some(latest) = records.last() {
                        set.push(Fact::date(format!("latest {noun}"), latest.timestamp));
                    }
                }
            }
        }
        set
    }

    /// Deposits, withdrawals and net flow per currency.
    async fn overview(&self, identity: &Identity, params: &IntentParams) -> FactSet {
        let subject = scoped_subject(params.asset.as_deref(), "wallet activity");
        let window = params.window.clone();

        let deposits = self.fetch(TxKind::Deposit, identity, params).await;
        let withdrawals = self.fetch(TxKind::Withdrawal, identity, params).await;
        let (Some(deposits), Some(withdrawals)) = (deposits, withdrawals) else {
            return FactSet::flagged(Intent::Wallet, subject, window, FactHint::Unavailable);
        };
        if deposits.is_empty() && withdrawals.is_empty() {
            return FactSet::flagged(Intent::Wallet, subject, window, FactHint::NoRecords);
        }

        let mut set = FactSet::new(Intent::Wallet, subject, window);
        match params.metric {
            Metric::Count => {
                set.push(Fact::count("number of deposits", deposits.len() as u64));
                set.push(Fact::count("number of withdrawals", withdrawals.len() as u64));
                set.push(Fact::count(
                    "number of transactions",
                    (deposits.len() + withdrawals.len()) as u64,
                ));
            }
            Metric::List => {
                let mut merged: Vec<&WalletTransaction> =
                    deposits.iter().chain(withdrawals.iter()).collect();
                merged.sort_by_key(|t| std::cmp::Reverse(t.timestamp));
                let limit = params.limit.unwrap_or(usize::MAX);
                for tx in merged.iter().take(limit) {
                    let noun = match tx.kind {
                        TxKind::Deposit => "deposit",
                        TxKind::Withdrawal => "withdrawal",
                    };
                    let label = format!("{noun} on {}", tx.timestamp.format("%Y-%m-%d"));
                    set.push(Fact::amount(label, tx.amount, &tx.asset));
                }
                if merged.len() > limit {
                    set.push(Fact::count("number of transactions", merged.len() as u64));
                }
            }
            _ => {
                let deposits_by = group_by_asset(&deposits, |t| t.asset.as_str());
                let withdrawals_by = group_by_asset(&withdrawals, |t| t.asset.as_str());
                let currencies: BTreeSet<&String> =
                    deposits_by.keys().chain(withdrawals_by.keys()).collect();
                for currency in currencies {
                    let deposited = deposits_by.get(currency).map(|t| total(t)).unwrap_or_default();
                    let withdrawn =
                        withdrawals_by.get(currency).map(|t| total(t)).unwrap_or_default();
                    set.push(Fact::amount("total deposits", deposited, currency.as_str()));
                    set.push(Fact::amount("total withdrawals", withdrawn, currency.as_str()));
                    set.push(Fact::amount("net flow", deposited - withdrawn, currency.as_str()));
                }
                set.push(Fact::count("number of deposits", deposits.len() as u64));
                set.push(Fact::count("number of withdrawals", withdrawals.len() as u64));
            }
        }
        set
    }

    async fn balances(&self, identity: &Identity, params: &IntentParams) -> FactSet {
        let subject = scoped_subject(params.asset.as_deref(), "balances");
        let window = params.window.clone();
        let filter = RecordFilter::default().with_asset(params.asset.clone());
        let gateway = self.gateway.as_ref();
        let filter = &filter;

        let Ok(balances) = fetch_with_retry(self.retry, "balances", move || {
            gateway.balances(identity, filter)
        })
        .await
        else {
            return FactSet::flagged(Intent::Wallet, subject, window, FactHint::Unavailable);
        };
        if balances.is_empty() {
            return FactSet::flagged(Intent::Wallet, subject, window, FactHint::NoRecords);
        }

        let mut set = FactSet::new(Intent::Wallet, subject, window);
        for balance in &balances {
            set.push(Fact::quantity(
                format!("{} balance", balance.asset),
                balance.total(),
                &balance.asset,
            ));
            if !balance.locked.is_zero() {
                set.push(Fact::quantity(
                    format!("{} locked in orders", balance.asset),
                    balance.locked,
                    &balance.asset,
                ));
            }
        }
        set
    }
}

#[async_trait]
impl DomainHandler for WalletHandler {
    fn intent(&self) -> Intent {
        Intent::Wallet
    }

    async fn handle(&self, intent: &ClassifiedIntent, identity: &Identity) -> FactSet {
        let params = &intent.params;
        debug!(metric = %params.metric, direction = ?params.direction, "Wallet handler");

        let wants_balance = params.topic.as_deref() == Some("balance")
            || (params.metric == Metric::Balance && params.direction.is_none());
        if wants_balance {
            return self.balances(identity, params).await;
        }

        match params.direction {
            Some(Direction::Deposit) => self.transactions(TxKind::Deposit, identity, params).await,
            Some(Direction::Withdrawal) => {
                self.transactions(TxKind::Withdrawal, identity, params).await
            }
            _ => self.overview(identity, params).await,
        }
    }
}

fn total(txs: &[&WalletTransaction]) -> Decimal {
    txs.iter().map(|t| t.amount).sum()
}

//! Portfolio handler: holdings valuation, unrealised P&L, and value over a
//! time window replayed from executed orders against closing prices.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use ledgerchat_core::types::{
    ClassifiedIntent, Fact, FactHint, FactSet, Holding, Identity, Intent, IntentParams, Metric,
    Order, OrderSide, PricePoint, TimeWindow,
};
use ledgerchat_store::{AccountDataGateway, RecordFilter};

use super::{fetch_with_retry, group_by_market, DomainHandler, RetryPolicy};

pub struct PortfolioHandler {
    gateway: Arc<dyn AccountDataGateway>,
    retry: RetryPolicy,
}

impl PortfolioHandler {
    pub fn new(gateway: Arc<dyn AccountDataGateway>, retry: RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    /// Portfolio value across a time window.
    ///
    /// Executed orders from the start of history up to the window's end are
    /// replayed against each closing price inside the window.
    async fn valuation(&self, identity: &Identity, params: &IntentParams) -> FactSet {
        let subject = subject_for(params);
        let window = params.window.clone();
        let gateway = self.gateway.as_ref();

        let prices_filter = RecordFilter::new(window.clone()).with_asset(params.asset.clone());
        let orders_filter = RecordFilter::new(TimeWindow::new(window.label.clone(), None, window.end))
            .with_asset(params.asset.clone());
        let (prices_filter, orders_filter) = (&prices_filter, &orders_filter);

        let prices = fetch_with_retry(self.retry, "price history", move || {
            gateway.price_history(identity, prices_filter)
        })
        .await;
        let orders = fetch_with_retry(self.retry, "orders", move || {
            gateway.orders(identity, orders_filter)
        })
        .await;
        let (Ok(prices), Ok(orders)) = (prices, orders) else {
            return FactSet::flagged(Intent::Portfolio, subject, window, FactHint::Unavailable);
        };

        let executed: Vec<Order> = orders
            .into_iter()
            .filter(|o| !o.executed_quantity.is_zero())
            .collect();
        let orders_by = group_by_market(&executed, |o| (o.asset.as_str(), o.quote_currency.as_str()));
        let prices_by = group_by_market(&prices, |p| (p.asset.as_str(), p.quote_currency.as_str()));

        let mut set = FactSet::new(Intent::Portfolio, subject.clone(), window.clone());
        let mut totals: BTreeMap<&str, PeriodTotals> = BTreeMap::new();
        for (market, points) in &prices_by {
            let Some(orders) = orders_by.get(market) else {
                continue;
            };
            let series = valuation_series(orders, points);
            let (Some(first), Some(last)) = (series.first(), series.last()) else {
                continue;
            };
            let (asset, quote) = market;

            if params.metric == Metric::List {
                for point in series.iter().rev().take(params.limit.unwrap_or(usize::MAX)) {
                    set.push(point_value(asset, quote, point));
                }
            } else {
                set.push(point_value(asset, quote, first));
                if last.at != first.at {
                    set.push(point_value(asset, quote, last));
                }
                set.push(Fact::quantity(
                    format!("{asset} held on {}", last.at.format("%Y-%m-%d")),
                    last.quantity,
                    asset.as_str(),
                ));
            }

            let entry = totals.entry(quote.as_str()).or_default();
            entry.start += first.asset_value;
            entry.end += last.asset_value;
            entry.cash += last.cash;
        }
        if totals.is_empty() {
            return FactSet::flagged(Intent::Portfolio, subject, window, FactHint::NoRecords);
        }

        for (quote, t) in totals {
            let change = t.end - t.start;
            set.push(Fact::amount("value at start of period", t.start.round_dp(2), quote));
            set.push(Fact::amount("value at end of period", t.end.round_dp(2), quote));
            set.push(Fact::amount("change in value", change.round_dp(2), quote));
            if !t.start.is_zero() {
                let percent = (change / t.start * Decimal::ONE_HUNDRED).round_dp(2);
                set.push(Fact::percent("change in value percent", percent));
            }
            set.push(Fact::amount("net trading cash flow", t.cash.round_dp(2), quote));
            set.push(Fact::amount(
                "net position",
                (t.end + t.cash).round_dp(2),
                quote,
            ));
        }
        set
    }
}

/// Position and value of one market at one closing price.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationPoint {
    pub at: DateTime<Utc>,
    pub price: Decimal,
    /// Units held after every order up to `at`.
    pub quantity: Decimal,
    /// Quote currency paid out for buys and received for sells so far.
    pub cash: Decimal,
    pub asset_value: Decimal,
    /// `cash + asset_value`.
    pub total: Decimal,
}

/// Replay executed orders, oldest first, against closing prices, oldest
/// first. Orders placed at or before a price point count towards it.
pub fn valuation_series(orders: &[&Order], prices: &[&PricePoint]) -> Vec<ValuationPoint> {
    let mut quantity = Decimal::ZERO;
    let mut cash = Decimal::ZERO;
    let mut pending = orders.iter().peekable();
    let mut series = Vec::with_capacity(prices.len());

    for point in prices {
        while let Some(order) = pending.next_if(|o| o.created_at <= point.at) {
            match order.side {
                OrderSide::Buy => {
                    quantity += order.executed_quantity;
                    cash -= order.executed_value();
                }
                OrderSide::Sell => {
                    quantity -= order.executed_quantity;
                    cash += order.executed_value();
                }
            }
        }
        let asset_value = quantity * point.price;
        series.push(ValuationPoint {
            at: point.at,
            price: point.price,
            quantity,
            cash,
            asset_value,
            total: cash + asset_value,
        });
    }
    series
}

#[derive(Default)]
struct PeriodTotals {
    start: Decimal,
    end: Decimal,
    cash: Decimal,
}

fn point_value(asset: &str, quote: &str, point: &ValuationPoint) -> Fact {
    Fact::amount(
        format!("{asset} value on {}", point.at.format("%Y-%m-%d")),
        point.asset_value.round_dp(2),
        quote,
    )
}

fn subject_for(params: &IntentParams) -> String {
    match params.asset.as_deref() {
        Some(asset) => format!("{asset} holdings"),
        None => "portfolio".to_string(),
    }
}

#[async_trait]
impl DomainHandler for PortfolioHandler {
    fn intent(&self) -> Intent {
        Intent::Portfolio
    }

    async fn handle(&self, intent: &ClassifiedIntent, identity: &Identity) -> FactSet {
        let params = &intent.params;
        debug!(metric = %params.metric, "Portfolio handler");

        if !params.window.is_all_time() {
            return self.valuation(identity, params).await;
        }

        let subject = subject_for(params);
        let window = params.window.clone();
        let filter = RecordFilter::default().with_asset(params.asset.clone());
        let gateway = self.gateway.as_ref();
        let filter = &filter;

        let Ok(mut holdings) = fetch_with_retry(self.retry, "holdings", move || {
            gateway.holdings(identity, filter)
        })
        .await
        else {
            return FactSet::flagged(Intent::Portfolio, subject, window, FactHint::Unavailable);
        };
        holdings.retain(|h| !h.quantity.is_zero());
        if holdings.is_empty() {
            return FactSet::flagged(Intent::Portfolio, subject, window, FactHint::NoRecords);
        }
        // Largest position first.
        holdings.sort_by(|a, b| b.value().cmp(&a.value()).then_with(|| a.asset.cmp(&b.asset)));

        let mut set = FactSet::new(Intent::Portfolio, subject, window);
        match params.metric {
            Metric::ProfitLoss => {
                for h in &holdings {
                    set.push(Fact::amount(
                        format!("{} unrealized P&L", h.asset),
                        h.unrealized_pnl().round_dp(2),
                        &h.quote_currency,
                    ));
                }
                push_totals(&mut set, &holdings, false);
            }
            Metric::Largest | Metric::Smallest => {
                let (word, pick) = if params.metric == Metric::Largest {
                    ("largest", holdings.first())
                } else {
                    ("smallest", holdings.last())
                };
                if let Some(h) = pick {
                    set.push(Fact::text(format!("{word} holding"), h.asset.as_str()));
                    set.push(holding_value(h));
                }
            }
            Metric::Count => {
                set.push(Fact::count("number of holdings", holdings.len() as u64));
            }
            metric => {
                let limit = match metric {
                    Metric::List => params.limit.unwrap_or(usize::MAX),
                    _ => holdings.len(),
                };
                for h in holdings.iter().take(limit) {
                    set.push(Fact::quantity(format!("{} held", h.asset), h.quantity, &h.asset));
                    set.push(holding_value(h));
                }
                push_totals(&mut set, &holdings, true);
                if metric == Metric::Summary && holdings.len() > 1 {
                    set.push(Fact::text("largest holding", holdings[0].asset.as_str()));
                }
                set.push(Fact::count("number of holdings", holdings.len() as u64));
            }
        }
        set
    }
}

fn holding_value(h: &Holding) -> Fact {
    Fact::amount(
        format!("{} value", h.asset),
        h.value().round_dp(2),
        &h.quote_currency,
    )
}

/// Total value, unrealised P&L and its percentage, per quote currency.
fn push_totals(set: &mut FactSet, holdings: &[Holding], with_value: bool) {
    let mut by_quote: BTreeMap<&str, (Decimal, Decimal)> = BTreeMap::new();
    for h in holdings {
        let entry = by_quote.entry(h.quote_currency.as_str()).or_default();
        entry.0 += h.value();
        entry.1 += h.cost_basis();
    }

    for (quote, (value, cost)) in by_quote {
        if with_value {
            set.push(Fact::amount("total portfolio value", value.round_dp(2), quote));
        }
        let pnl = value - cost;
        set.push(Fact::amount("total unrealized P&L", pnl.round_dp(2), quote));
        if !cost.is_zero() {
            let percent = (pnl / cost * Decimal::ONE_HUNDRED).round_dp(2);
            set.push(Fact::percent("unrealized P&L percent", percent));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use ledgerchat_core::types::{
        Balance, FactValue, OrderStatus, TradeFill, UserId, WalletTransaction,
    };
    use ledgerchat_store::{AccountRecords, GatewayError, InMemoryGateway};

    use crate::handlers::testing::{classified, day, identity};

    fn holding(asset: &str, quantity: Decimal, cost: Decimal, price: Decimal) -> Holding {
        Holding {
            asset: asset.to_string(),
            quantity,
            average_cost: cost,
            market_price: price,
            quote_currency: "INR".to_string(),
        }
    }

    fn handler() -> PortfolioHandler {
        let gateway = InMemoryGateway::new();
        gateway.insert_account(
            UserId::new("investor"),
            AccountRecords {
                holdings: vec![
                    holding("ETH", dec!(2), dec!(10), dec!(8)),
                    holding("BTC", dec!(0.5), dec!(100), dec!(120)),
                    holding("DOGE", dec!(0), dec!(1), dec!(1)),
                ],
                ..AccountRecords::default()
            },
        );
        PortfolioHandler::new(Arc::new(gateway), RetryPolicy::none())
    }

    async fn run(params: IntentParams) -> FactSet {
        handler()
            .handle(&classified(Intent::Portfolio, params), &identity("investor"))
            .await
    }

    #[tokio::test]
    async fn test_summary_values_holdings() {
        let set = run(IntentParams::default()).await;
        assert_eq!(set.subject, "portfolio");
        assert_eq!(
            set.fact("total portfolio value"),
            Some(&Fact::amount("total portfolio value", dec!(76), "INR"))
        );
        assert_eq!(
            set.fact("BTC held"),
            Some(&Fact::quantity("BTC held", dec!(0.5), "BTC"))
        );
        assert_eq!(
            set.fact("largest holding").unwrap().value,
            FactValue::Text("BTC".to_string())
        );
        // Zero-quantity positions are not holdings.
        assert_eq!(set.fact("number of holdings").unwrap().value, FactValue::Count(2));
    }

    #[tokio::test]
    async fn test_unrealized_pnl() {
        let set = run(IntentParams {
            metric: Metric::ProfitLoss,
            ..IntentParams::default()
        })
        .await;
        assert_eq!(
            set.fact("BTC unrealized P&L"),
            Some(&Fact::amount("BTC unrealized P&L", dec!(10), "INR"))
        );
        assert_eq!(
            set.fact("ETH unrealized P&L"),
            Some(&Fact::amount("ETH unrealized P&L", dec!(-4), "INR"))
        );
        assert_eq!(
            set.fact("total unrealized P&L"),
            Some(&Fact::amount("total unrealized P&L", dec!(6), "INR"))
        );
        assert_eq!(
            set.fact("unrealized P&L percent").unwrap().value,
            FactValue::Percent(dec!(8.57))
        );
        assert!(set.fact("total portfolio value").is_none());
    }

    #[tokio::test]
    async fn test_smallest_holding() {
        let set = run(IntentParams {
            metric: Metric::Smallest,
            ..IntentParams::default()
        })
        .await;
        assert_eq!(
            set.fact("smallest holding").unwrap().value,
            FactValue::Text("ETH".to_string())
        );
        assert_eq!(
            set.fact("ETH value"),
            Some(&Fact::amount("ETH value", dec!(16), "INR"))
        );
    }

    #[tokio::test]
    async fn test_single_asset() {
        let set = run(IntentParams {
            metric: Metric::Total,
            asset: Some("btc".to_string()),
            ..IntentParams::default()
        })
        .await;
        assert_eq!(set.subject, "btc holdings");
        assert_eq!(
            set.fact("total portfolio value"),
            Some(&Fact::amount("total portfolio value", dec!(60), "INR"))
        );
    }

    #[tokio::test]
    async fn test_empty_portfolio() {
        let set = handler()
            .handle(
                &classified(Intent::Portfolio, IntentParams::default()),
                &identity("nobody"),
            )
            .await;
        assert_eq!(set.hint, Some(FactHint::NoRecords));
    }

    fn order(
        side: OrderSide,
        status: OrderStatus,
        executed: Decimal,
        average_price: Decimal,
        quote_amount: Decimal,
        at: DateTime<Utc>,
    ) -> Order {
        Order {
            id: format!("o-{}", at.timestamp()),
            asset: "BTC".to_string(),
            quote_currency: "INR".to_string(),
            side,
            status,
            quantity: executed.max(dec!(0.5)),
            executed_quantity: executed,
            average_price: Some(average_price),
            quote_amount,
            created_at: at,
        }
    }

    fn price(value: Decimal, at: DateTime<Utc>) -> PricePoint {
        PricePoint {
            asset: "BTC".to_string(),
            quote_currency: "INR".to_string(),
            price: value,
            at,
        }
    }

    fn trader_handler() -> PortfolioHandler {
        use OrderSide::{Buy, Sell};
        use OrderStatus::{Cancelled, Executed};

        let gateway = InMemoryGateway::new();
        gateway.insert_account(
            UserId::new("trader"),
            AccountRecords {
                orders: vec![
                    order(Buy, Executed, dec!(1), dec!(100), dec!(100), day(1, 10)),
                    order(Buy, Cancelled, dec!(0), dec!(90), dec!(0), day(2, 1)),
                    // No quote amount reported; valued at executed quantity times average price.
                    order(Buy, Executed, dec!(1), dec!(150), dec!(0), day(3, 10)),
                    order(Sell, Executed, dec!(0.5), dec!(200), dec!(100), day(4, 10)),
                ],
                ..AccountRecords::default()
            },
        );
        gateway.insert_prices(vec![
            price(dec!(110), day(1, 31)),
            price(dec!(120), day(2, 28)),
            price(dec!(160), day(3, 31)),
            price(dec!(200), day(4, 30)),
        ]);
        PortfolioHandler::new(Arc::new(gateway), RetryPolicy::none())
    }

    fn since_mid_february(metric: Metric) -> IntentParams {
        IntentParams {
            metric,
            window: TimeWindow::new("since mid february", Some(day(2, 15)), None),
            ..IntentParams::default()
        }
    }

    #[tokio::test]
    async fn test_windowed_value_replays_orders_from_history() {
        let set = trader_handler()
            .handle(
                &classified(Intent::Portfolio, since_mid_february(Metric::Summary)),
                &identity("trader"),
            )
            .await;
        assert_eq!(set.window.label, "since mid february");
        assert_eq!(
            set.fact("BTC value on 2026-02-28"),
            Some(&Fact::amount("BTC value on 2026-02-28", dec!(120), "INR"))
        );
        assert_eq!(
            set.fact("BTC value on 2026-04-30"),
            Some(&Fact::amount("BTC value on 2026-04-30", dec!(300), "INR"))
        );
        assert_eq!(
            set.fact("BTC held on 2026-04-30"),
            Some(&Fact::quantity("BTC held on 2026-04-30", dec!(1.5), "BTC"))
        );
        assert_eq!(
            set.fact("change in value"),
            Some(&Fact::amount("change in value", dec!(180), "INR"))
        );
        assert_eq!(
            set.fact("change in value percent").unwrap().value,
            FactValue::Percent(dec!(150))
        );
        assert_eq!(
            set.fact("net trading cash flow"),
            Some(&Fact::amount("net trading cash flow", dec!(-150), "INR"))
        );
        assert_eq!(
            set.fact("net position"),
            Some(&Fact::amount("net position", dec!(150), "INR"))
        );
        // Current holdings are not reported for a past window.
        assert!(set.fact("total portfolio value").is_none());
    }

    #[tokio::test]
    async fn test_windowed_list_is_newest_first() {
        let params = IntentParams {
            limit: Some(2),
            ..since_mid_february(Metric::List)
        };
        let set = trader_handler()
            .handle(&classified(Intent::Portfolio, params), &identity("trader"))
            .await;
        assert_eq!(set.facts[0].label, "BTC value on 2026-04-30");
        assert_eq!(set.facts[1].label, "BTC value on 2026-03-31");
        assert!(set.fact("BTC value on 2026-02-28").is_none());
    }

    #[tokio::test]
    async fn test_window_without_prices_flags_no_records() {
        let params = IntentParams {
            window: TimeWindow::new("in june", Some(day(6, 1)), Some(day(7, 1))),
            ..IntentParams::default()
        };
        let set = trader_handler()
            .handle(&classified(Intent::Portfolio, params), &identity("trader"))
            .await;
        assert_eq!(set.hint, Some(FactHint::NoRecords));

        let set = trader_handler()
            .handle(
                &classified(Intent::Portfolio, since_mid_february(Metric::Summary)),
                &identity("nobody"),
            )
            .await;
        assert_eq!(set.hint, Some(FactHint::NoRecords));
    }

    #[test]
    fn test_valuation_series_counts_orders_at_the_price_time() {
        let buy = order(OrderSide::Buy, OrderStatus::Executed, dec!(2), dec!(10), dec!(20), day(5, 1));
        let points = [price(dec!(9), day(4, 30)), price(dec!(12), day(5, 1))];
        let series = valuation_series(&[&buy], &points.iter().collect::<Vec<_>>());

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].quantity, Decimal::ZERO);
        assert_eq!(series[0].total, Decimal::ZERO);
        assert_eq!(series[1].quantity, dec!(2));
        assert_eq!(series[1].cash, dec!(-20));
        assert_eq!(series[1].asset_value, dec!(24));
        assert_eq!(series[1].total, dec!(4));
    }

    struct DownGateway;

    #[async_trait]
    impl AccountDataGateway for DownGateway {
        async fn deposits(
            &self,
            _: &Identity,
            _: &RecordFilter,
        ) -> Result<Vec<WalletTransaction>, GatewayError> {
            Err(GatewayError::Unavailable("down".into()))
        }
        async fn withdrawals(
            &self,
            _: &Identity,
            _: &RecordFilter,
        ) -> Result<Vec<WalletTransaction>, GatewayError> {
            Err(GatewayError::Unavailable("down".into()))
        }
        async fn balances(
            &self,
            _: &Identity,
            _: &RecordFilter,
        ) -> Result<Vec<Balance>, GatewayError> {
            Err(GatewayError::Unavailable("down".into()))
        }
        async fn orders(
            &self,
            _: &Identity,
            _: &RecordFilter,
        ) -> Result<Vec<Order>, GatewayError> {
            Err(GatewayError::Unavailable("down".into()))
        }
        async fn fills(
            &self,
            _: &Identity,
            _: &RecordFilter,
        ) -> Result<Vec<TradeFill>, GatewayError> {
            Err(GatewayError::Unavailable("down".into()))
        }
        async fn holdings(
            &self,
            _: &Identity,
            _: &RecordFilter,
        ) -> Result<Vec<Holding>, GatewayError> {
            Err(GatewayError::Unavailable("down".into()))
        }
        async fn price_history(
            &self,
            _: &Identity,
            _: &RecordFilter,
        ) -> Result<Vec<PricePoint>, GatewayError> {
            Err(GatewayError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_gateway_failure_flags_unavailable() {
        let handler = PortfolioHandler::new(Arc::new(DownGateway), RetryPolicy::none());
        for params in [IntentParams::default(), since_mid_february(Metric::Total)] {
            let set = handler
                .handle(&classified(Intent::Portfolio, params), &identity("investor"))
                .await;
            assert_eq!(set.hint, Some(FactHint::Unavailable));
            assert!(set.facts.is_empty());
        }
    }
}

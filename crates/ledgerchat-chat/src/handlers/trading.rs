//! Trading handler: orders, fills, volume, fees paid and realised P&L.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use ledgerchat_core::types::{
    ClassifiedIntent, Direction, Fact, FactHint, FactSet, Identity, Intent, IntentParams, Metric,
    Order, OrderSide, OrderStatus, TimeWindow, TradeFill,
};
use ledgerchat_store::{AccountDataGateway, RecordFilter};

use super::{
    fetch_with_retry, group_by_asset, group_by_market, scoped_subject, DomainHandler, RetryPolicy,
};

pub struct TradingHandler {
    gateway: Arc<dyn AccountDataGateway>,
    retry: RetryPolicy,
}

impl TradingHandler {
    pub fn new(gateway: Arc<dyn AccountDataGateway>, retry: RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    fn filter(params: &IntentParams) -> RecordFilter {
        RecordFilter::new(params.window.clone()).with_asset(params.asset.clone())
    }

    async fn fills(&self, identity: &Identity, params: &IntentParams) -> Option<Vec<TradeFill>> {
        let filter = Self::filter(params);
        let gateway = self.gateway.as_ref();
        let filter = &filter;
        let fills = fetch_with_retry(self.retry, "fills", move || gateway.fills(identity, filter))
            .await
            .ok()?;
        let side = side_of(params.direction);
        Some(
            fills
                .into_iter()
                .filter(|f| side.is_none_or(|s| f.side == s))
                .collect(),
        )
    }

    async fn orders(&self, identity: &Identity, params: &IntentParams) -> Option<Vec<Order>> {
        let filter = Self::filter(params);
        let gateway = self.gateway.as_ref();
        let filter = &filter;
        let orders = fetch_with_retry(self.retry, "orders", move || gateway.orders(identity, filter))
            .await
            .ok()?;
        let side = side_of(params.direction);
        Some(
            orders
                .into_iter()
                .filter(|o| side.is_none_or(|s| o.side == s))
                .collect(),
        )
    }

    /// Total fees across fills, per fee currency.
    async fn fees_paid(&self, identity: &Identity, params: &IntentParams) -> FactSet {
        let subject = scoped_subject(params.asset.as_deref(), "trading fees paid");
        let window = params.window.clone();
        let Some(fills) = self.fills(identity, params).await else {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::Unavailable);
        };
        if fills.is_empty() {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::NoRecords);
        }

        let mut set = FactSet::new(Intent::Trading, subject, window);
        for (currency, group) in group_by_asset(&fills, |f| f.fee_currency.as_str()) {
            let paid: Decimal = group.iter().map(|f| f.fee).sum();
            set.push(Fact::amount("total fees paid", paid, currency));
        }
        set.push(Fact::count("number of trades", fills.len() as u64));
        set
    }

    /// Realised P&L by average cost, walking fills in execution order.
    ///
    /// Cost basis is built from every fill up to the window's end; only sells
    /// inside the window realise profit.
    async fn realized_pnl(&self, identity: &Identity, params: &IntentParams) -> FactSet {
        let subject = scoped_subject(params.asset.as_deref(), "realized P&L");
        let window = params.window.clone();
        let history = IntentParams {
            direction: None,
            window: TimeWindow::new(window.label.clone(), None, window.end),
            ..params.clone()
        };
        let Some(fills) = self.fills(identity, &history).await else {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::Unavailable);
        };
        if !fills.iter().any(|f| window.contains(f.executed_at)) {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::NoRecords);
        }

        let markets = group_by_market(&fills, |f| (f.asset.as_str(), f.quote_currency.as_str()));
        let mixed = mixed_assets(markets.keys());
        let mut set = FactSet::new(Intent::Trading, subject, window.clone());
        let mut totals: BTreeMap<&str, Decimal> = BTreeMap::new();
        for ((asset, quote), group) in &markets {
            let in_window = |side: Option<OrderSide>| {
                group
                    .iter()
                    .any(|f| window.contains(f.executed_at) && side.is_none_or(|s| f.side == s))
            };
            if !in_window(None) {
                continue;
            }
            let pnl = average_cost_pnl(group, &window).round_dp(2);
            *totals.entry(quote.as_str()).or_default() += pnl;
            if in_window(Some(OrderSide::Sell)) {
                set.push(Fact::amount(
                    format!("{} realized P&L", market_label(asset, quote, &mixed)),
                    pnl,
                    quote.as_str(),
                ));
            }
        }
        for (quote, total) in totals {
            set.push(Fact::amount("total realized P&L", total, quote));
        }
        set
    }

    async fn orders_by_status(
        &self,
        identity: &Identity,
        params: &IntentParams,
        open: bool,
    ) -> FactSet {
        let label = if open { "open orders" } else { "closed orders" };
        let subject = scoped_subject(params.asset.as_deref(), label);
        let window = params.window.clone();
        let unsided = IntentParams {
            direction: None,
            ..params.clone()
        };
        let Some(orders) = self.orders(identity, &unsided).await else {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::Unavailable);
        };
        let matching: Vec<&Order> = orders
            .iter()
            .filter(|o| (o.status == OrderStatus::Open) == open)
            .collect();
        if matching.is_empty() {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::NoRecords);
        }

        let mut set = FactSet::new(Intent::Trading, subject, window);
        set.push(Fact::count(format!("number of {label}"), matching.len() as u64));
        for order in matching.iter().rev().take(params.limit.unwrap_or(usize::MAX)) {
            let label = format!(
                "{} {} order on {}",
                order.side.as_str(),
                order.pair(),
                order.created_at.format("%Y-%m-%d")
            );
            set.push(Fact::quantity(label, order.quantity, &order.asset));
        }
        set
    }

    async fn order_counts(&self, identity: &Identity, params: &IntentParams) -> FactSet {
        let subject = scoped_subject(params.asset.as_deref(), "orders");
        let window = params.window.clone();
        let Some(orders) = self.orders(identity, params).await else {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::Unavailable);
        };
        if orders.is_empty() {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::NoRecords);
        }

        let count = |status: OrderStatus| orders.iter().filter(|o| o.status == status).count() as u64;
        FactSet::new(Intent::Trading, subject, window)
            .with_fact(Fact::count("number of orders", orders.len() as u64))
            .with_fact(Fact::count("executed orders", count(OrderStatus::Executed)))
            .with_fact(Fact::count("cancelled orders", count(OrderStatus::Cancelled)))
            .with_fact(Fact::count("open orders", count(OrderStatus::Open)))
    }

    /// Everything that works directly off fills.
    async fn fill_metric(&self, identity: &Identity, params: &IntentParams) -> FactSet {
        let subject = scoped_subject(params.asset.as_deref(), "trades");
        let window = params.window.clone();
        let Some(fills) = self.fills(identity, params).await else {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::Unavailable);
        };
        if fills.is_empty() {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::NoRecords);
        }

        let mut set = FactSet::new(Intent::Trading, subject, window);
        let side_word = match side_of(params.direction) {
            Some(OrderSide::Buy) => "buy",
            Some(OrderSide::Sell) => "sell",
            None => "execution",
        };

        match params.metric {
            Metric::List => {
                let limit = params.limit.unwrap_or(usize::MAX);
                for fill in fills.iter().rev().take(limit) {
                    set.push(fill_fact(fill));
                }
                if fills.len() > limit {
                    set.push(Fact::count("number of trades", fills.len() as u64));
                }
            }
            Metric::Average => {
                let markets =
                    group_by_market(&fills, |f| (f.asset.as_str(), f.quote_currency.as_str()));
                let mixed = mixed_assets(markets.keys());
                for ((asset, quote), group) in &markets {
                    set.push(Fact::amount(
                        format!(
                            "average {side_word} price for {}",
                            market_label(asset, quote, &mixed)
                        ),
                        weighted_price(group),
                        quote.as_str(),
                    ));
                }
            }
            Metric::Largest | Metric::Smallest => {
                let largest = params.metric == Metric::Largest;
                let word = if largest { "largest" } else { "smallest" };
                // Notionals are only comparable within one quote currency.
                for (quote, group) in group_by_asset(&fills, |f| f.quote_currency.as_str()) {
                    let pick = if largest {
                        group.iter().max_by_key(|f| f.notional())
                    } else {
                        group.iter().min_by_key(|f| f.notional())
                    };
                    if let Some(fill) = pick {
                        set.push(Fact::amount(format!("{word} trade"), fill.notional(), quote));
                        set.push(fill_fact(fill));
                    }
                }
            }
            _ => {
                let label = match side_of(params.direction) {
                    Some(OrderSide::Buy) => "total bought",
                    Some(OrderSide::Sell) => "total sold",
                    None => "total trading volume",
                };
                for (quote, group) in group_by_asset(&fills, |f| f.quote_currency.as_str()) {
                    let volume: Decimal = group.iter().map(|f| f.notional()).sum();
                    set.push(Fact::amount(label, volume, quote));
                }
                if let Some(asset) = params.asset.as_deref() {
                    let quantity: Decimal = fills.iter().map(|f| f.quantity).sum();
                    set.push(Fact::quantity(format!("{asset} quantity"), quantity, asset));
                }
                set.push(Fact::count("number of trades", fills.len() as u64));
            }
        }
        set
    }

    /// Per-asset breakdown of orders and fills.
    async fn analysis(&self, identity: &Identity, params: &IntentParams) -> FactSet {
        let subject = scoped_subject(params.asset.as_deref(), "trading activity");
        let window = params.window.clone();
        let (Some(orders), Some(fills)) = (
            self.orders(identity, params).await,
            self.fills(identity, params).await,
        ) else {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::Unavailable);
        };
        if orders.is_empty() && fills.is_empty() {
            return FactSet::flagged(Intent::Trading, subject, window, FactHint::NoRecords);
        }

        let orders_by = group_by_asset(&orders, |o| o.asset.as_str());
        let fills_by = group_by_market(&fills, |f| (f.asset.as_str(), f.quote_currency.as_str()));
        let mixed = mixed_assets(fills_by.keys());
        let assets: BTreeSet<&str> = orders_by
            .keys()
            .map(String::as_str)
            .chain(fills_by.keys().map(|(asset, _)| asset.as_str()))
            .collect();

        let mut set = FactSet::new(Intent::Trading, subject, window);
        for asset in assets {
            if let Some(group) = orders_by.get(asset) {
                let count =
                    |status: OrderStatus| group.iter().filter(|o| o.status == status).count() as u64;
                set.push(Fact::count(
                    format!("{asset} executed orders"),
                    count(OrderStatus::Executed),
                ));
                set.push(Fact::count(
                    format!("{asset} cancelled orders"),
                    count(OrderStatus::Cancelled),
                ));
            }

            for ((_, quote), group) in fills_by.iter().filter(|((a, _), _)| a == asset) {
                let label = market_label(asset, quote, &mixed);
                let volume: Decimal = group.iter().map(|f| f.notional()).sum();
                set.push(Fact::amount(format!("{label} trading volume"), volume, quote.as_str()));

                for (side, verb) in [(OrderSide::Buy, "bought"), (OrderSide::Sell, "sold")] {
                    let sided: Vec<&TradeFill> =
                        group.iter().copied().filter(|f| f.side == side).collect();
                    if sided.is_empty() {
                        continue;
                    }
                    let quantity: Decimal = sided.iter().map(|f| f.quantity).sum();
                    set.push(Fact::count(
                        format!("{label} {} trades", side.as_str()),
                        sided.len() as u64,
                    ));
                    set.push(Fact::quantity(format!("{label} {verb}"), quantity, asset));
                }

                set.push(Fact::amount(
                    format!("{label} average price"),
                    weighted_price(group),
                    quote.as_str(),
                ));
                if let Some(last) = group.last() {
                    set.push(Fact::date(format!("{label} last trade"), last.executed_at));
                }
            }
        }
        set
    }
}

#[async_trait]
impl DomainHandler for TradingHandler {
    fn intent(&self) -> Intent {
        Intent::Trading
    }

    async fn handle(&self, intent: &ClassifiedIntent, identity: &Identity) -> FactSet {
        let params = &intent.params;
        debug!(metric = %params.metric, direction = ?params.direction, "Trading handler");

        if params.topic.as_deref() == Some("fees") {
            return self.fees_paid(identity, params).await;
        }

        match (params.direction, params.metric) {
            (Some(Direction::Open), _) => self.orders_by_status(identity, params, true).await,
            (Some(Direction::Closed), _) => self.orders_by_status(identity, params, false).await,
            (_, Metric::ProfitLoss) => self.realized_pnl(identity, params).await,
            (_, Metric::Count) => self.order_counts(identity, params).await,
            (_, Metric::Summary) => self.analysis(identity, params).await,
            _ => self.fill_metric(identity, params).await,
        }
    }
}

fn side_of(direction: Option<Direction>) -> Option<OrderSide> {
    match direction {
        Some(Direction::Buy) => Some(OrderSide::Buy),
        Some(Direction::Sell) => Some(OrderSide::Sell),
        _ => None,
    }
}

/// Quantity-weighted average price.
fn weighted_price(fills: &[&TradeFill]) -> Decimal {
    let quantity: Decimal = fills.iter().map(|f| f.quantity).sum();
    if quantity.is_zero() {
        return Decimal::ZERO;
    }
    let notional: Decimal = fills.iter().map(|f| f.notional()).sum();
    (notional / quantity).round_dp(2)
}

/// Assets traded against more than one quote currency.
fn mixed_assets<'a>(markets: impl Iterator<Item = &'a (String, String)>) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    let mut mixed = BTreeSet::new();
    for (asset, _) in markets {
        if !seen.insert(asset.as_str()) {
            mixed.insert(asset.as_str());
        }
    }
    mixed
}

/// "BTC", or "BTC-USDT" when BTC trades against several quotes.
fn market_label(asset: &str, quote: &str, mixed: &BTreeSet<&str>) -> String {
    if mixed.contains(asset) {
        format!("{asset}-{quote}")
    } else {
        asset.to_string()
    }
}

/// Realised profit of one market's fills, oldest first. Every fill moves the
/// position; only sells inside `window` count. Sell-side fees are deducted,
/// and a sell with no prior position realises only its fee.
fn average_cost_pnl(fills: &[&TradeFill], window: &TimeWindow) -> Decimal {
    let mut position = Decimal::ZERO;
    let mut cost = Decimal::ZERO;
    let mut realized = Decimal::ZERO;

    for fill in fills {
        match fill.side {
            OrderSide::Buy => {
                position += fill.quantity;
                cost += fill.notional();
            }
            OrderSide::Sell => {
                let average = if position.is_zero() {
                    fill.price
                } else {
                    cost / position
                };
                let closed = fill.quantity.min(position);
                if window.contains(fill.executed_at) {
                    realized += (fill.price - average) * closed - fill.fee;
                }
                cost -= average * closed;
                position -= closed;
            }
        }
    }
    realized
}

fn fill_fact(fill: &TradeFill) -> Fact {
    let verb = match fill.side {
        OrderSide::Buy => "bought",
        OrderSide::Sell => "sold",
    };
    Fact::text(
        format!("{verb} {} on {}", fill.asset, fill.executed_at.format("%Y-%m-%d")),
        format!(
            "{} {} at {} {}",
            fill.quantity.normalize(),
            fill.asset,
            fill.price.normalize(),
            fill.quote_currency
        ),
    )
}

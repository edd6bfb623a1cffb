use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// A domain a user query can be routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Deposits, withdrawals and balances.
    Wallet,
    /// Orders, fills and realised P&L.
    Trading,
    /// Current holdings and their valuation.
    Portfolio,
    /// Fee schedules from the knowledge store.
    Fees,
    /// General help articles from the knowledge store.
    Faq,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Wallet,
        Intent::Trading,
        Intent::Portfolio,
        Intent::Fees,
        Intent::Faq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Wallet => "wallet",
            Intent::Trading => "trading",
            Intent::Portfolio => "portfolio",
            Intent::Fees => "fees",
            Intent::Faq => "faq",
        }
    }

    /// Whether the handler for this intent reads account data.
    pub fn is_account_scoped(&self) -> bool {
        matches!(self, Intent::Wallet | Intent::Trading | Intent::Portfolio)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wallet" => Ok(Intent::Wallet),
            "trading" | "trade" | "trades" => Ok(Intent::Trading),
            "portfolio" => Ok(Intent::Portfolio),
            "fees" | "fee" => Ok(Intent::Fees),
            "faq" | "help" => Ok(Intent::Faq),
            _ => Err(ParseEnumError::new("intent", s)),
        }
    }
}

/// The aggregate a handler should compute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Headline figures for the domain.
    #[default]
    Summary,
    Total,
    Average,
    Largest,
    Smallest,
    Count,
    /// Individual records, most recent first.
    List,
    ProfitLoss,
    Balance,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Summary => "summary",
            Metric::Total => "total",
            Metric::Average => "average",
            Metric::Largest => "largest",
            Metric::Smallest => "smallest",
            Metric::Count => "count",
            Metric::List => "list",
            Metric::ProfitLoss => "p&l",
            Metric::Balance => "balance",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "summary" => Ok(Metric::Summary),
            "total" | "sum" => Ok(Metric::Total),
            "average" | "avg" | "mean" => Ok(Metric::Average),
            "largest" | "max" | "biggest" => Ok(Metric::Largest),
            "smallest" | "min" => Ok(Metric::Smallest),
            "count" => Ok(Metric::Count),
            "list" => Ok(Metric::List),
            "p&l" | "pnl" | "profit_loss" => Ok(Metric::ProfitLoss),
            "balance" => Ok(Metric::Balance),
            _ => Err(ParseEnumError::new("metric", s)),
        }
    }
}

/// Direction filter applied to records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Deposit,
    Withdrawal,
    Buy,
    Sell,
    /// Orders still working on the book.
    Open,
    /// Orders that executed or were cancelled.
    Closed,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Deposit => "deposit",
            Direction::Withdrawal => "withdrawal",
            Direction::Buy => "buy",
            Direction::Sell => "sell",
            Direction::Open => "open",
            Direction::Closed => "closed",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deposit" | "deposits" => Ok(Direction::Deposit),
            "withdrawal" | "withdrawals" | "withdraw" => Ok(Direction::Withdrawal),
            "buy" | "bought" => Ok(Direction::Buy),
            "sell" | "sold" => Ok(Direction::Sell),
            "open" => Ok(Direction::Open),
            "closed" => Ok(Direction::Closed),
            _ => Err(ParseEnumError::new("direction", s)),
        }
    }
}

/// Settlement state of a wallet transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    #[default]
    Completed,
    Pending,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Completed => "completed",
            TxStatus::Pending => "pending",
            TxStatus::Failed => "failed",
        }
    }
}

/// Whether a wallet transaction moved funds in or out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdrawal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    Executed,
    Cancelled,
}

/// Returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// =============================================================================
// Identity and queries
// =============================================================================

/// Account owner identifier. Every gateway read is keyed by one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated caller context, produced only by resolving a session token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub session_id: Uuid,
}

impl Identity {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            session_id: Uuid::new_v4(),
        }
    }
}

/// A user question as received. Never mutated after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub text: String,
    pub identity: Identity,
    pub received_at: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>, identity: Identity) -> Self {
        Self::at(text, identity, Utc::now())
    }

    pub fn at(
        text: impl Into<String>,
        identity: Identity,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            identity,
            received_at,
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Half-open time range `[start, end)`. A missing bound is unbounded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Human phrasing, e.g. "last 7 days".
    pub label: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn all_time() -> Self {
        Self {
            label: "all time".to_string(),
            start: None,
            end: None,
        }
    }

    pub fn new(
        label: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }

    pub fn is_all_time(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| ts >= start) && self.end.is_none_or(|end| ts < end)
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::all_time()
    }
}

/// Parameters extracted for one classified intent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentParams {
    /// Normalised asset symbol such as "BTC".
    pub asset: Option<String>,
    pub metric: Metric,
    pub window: TimeWindow,
    pub direction: Option<Direction>,
    pub status: Option<TxStatus>,
    /// Record count for list queries.
    pub limit: Option<usize>,
    /// Knowledge topic key for fee and FAQ lookups.
    pub topic: Option<String>,
    /// Content words used for knowledge search.
    pub keywords: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub intent: Intent,
    /// Strongest pattern weight that matched, 0.0 to 1.0.
    pub confidence: f32,
    /// Byte offset of the first keyword hit in the query text.
    pub position: usize,
    pub params: IntentParams,
}

/// Result of classifying a query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Non-empty, ordered by detection position.
    Intents(Vec<ClassifiedIntent>),
    /// Nothing matched strongly enough to route.
    Unclassified,
}

impl Classification {
    pub fn intents(&self) -> &[ClassifiedIntent] {
        match self {
            Classification::Intents(intents) => intents,
            Classification::Unclassified => &[],
        }
    }

    pub fn is_unclassified(&self) -> bool {
        matches!(self, Classification::Unclassified)
    }

    pub fn contains(&self, intent: Intent) -> bool {
        self.intents().iter().any(|c| c.intent == intent)
    }
}

// =============================================================================
// Facts and answers
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FactValue {
    /// Money amount, unit is the currency.
    Amount(Decimal),
    /// Asset quantity, unit is the asset symbol.
    Quantity(Decimal),
    Count(u64),
    Percent(Decimal),
    Text(String),
    Date(DateTime<Utc>),
}

/// One labelled figure inside a fact set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub label: String,
    pub value: FactValue,
    pub unit: Option<String>,
}

impl Fact {
    pub fn amount(label: impl Into<String>, value: Decimal, currency: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: FactValue::Amount(value),
            unit: Some(currency.into()),
        }
    }

    pub fn quantity(label: impl Into<String>, value: Decimal, asset: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: FactValue::Quantity(value),
            unit: Some(asset.into()),
        }
    }

    pub fn count(label: impl Into<String>, value: u64) -> Self {
        Self {
            label: label.into(),
            value: FactValue::Count(value),
            unit: None,
        }
    }

    pub fn percent(label: impl Into<String>, value: Decimal) -> Self {
        Self {
            label: label.into(),
            value: FactValue::Percent(value),
            unit: Some("%".to_string()),
        }
    }

    pub fn text(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: FactValue::Text(value.into()),
            unit: None,
        }
    }

    pub fn date(label: impl Into<String>, value: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            value: FactValue::Date(value),
            unit: None,
        }
    }
}

/// Why a fact set carries no figures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactHint {
    NoRecords,
    TopicNotFound,
    Unavailable,
}

impl FactHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactHint::NoRecords => "no matching records",
            FactHint::TopicNotFound => "topic not found",
            FactHint::Unavailable => "unavailable",
        }
    }
}

/// Structured output of one domain handler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactSet {
    pub intent: Intent,
    /// What the figures describe, e.g. "deposits" or "BTC trades".
    pub subject: String,
    pub window: TimeWindow,
    pub facts: Vec<Fact>,
    pub hint: Option<FactHint>,
}

impl FactSet {
    pub fn new(intent: Intent, subject: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            intent,
            subject: subject.into(),
            window,
            facts: Vec::new(),
            hint: None,
        }
    }

    pub fn flagged(
        intent: Intent,
        subject: impl Into<String>,
        window: TimeWindow,
        hint: FactHint,
    ) -> Self {
        Self {
            hint: Some(hint),
            ..Self::new(intent, subject, window)
        }
    }

    pub fn push(&mut self, fact: Fact) {
        self.facts.push(fact);
    }

    pub fn with_fact(mut self, fact: Fact) -> Self {
        self.facts.push(fact);
        self
    }

    pub fn fact(&self, label: &str) -> Option<&Fact> {
        self.facts.iter().find(|f| f.label == label)
    }

    /// Flagged unavailable or topic-not-found.
    pub fn is_missing(&self) -> bool {
        matches!(
            self.hint,
            Some(FactHint::Unavailable) | Some(FactHint::TopicNotFound)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Success,
    Error,
}

/// The single reply to a query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub status: AnswerStatus,
}

impl Answer {
    pub fn success(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            status: AnswerStatus::Success,
        }
    }

    pub fn error(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            status: AnswerStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AnswerStatus::Success
    }
}

// =============================================================================
// Account records
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: String,
    pub kind: TxKind,
    /// Currency or asset symbol, e.g. "INR" or "USDT".
    pub asset: String,
    pub amount: Decimal,
    #[serde(default)]
    pub status: TxStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub available: Decimal,
    #[serde(default)]
    pub locked: Decimal,
}

impl Balance {
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub asset: String,
    pub quote_currency: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub quantity: Decimal,
    #[serde(default)]
    pub executed_quantity: Decimal,
    #[serde(default)]
    pub average_price: Option<Decimal>,
    /// Executed value in the quote currency.
    #[serde(default)]
    pub quote_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Symbol in `BASE-QUOTE` form.
    pub fn pair(&self) -> String {
        format!("{}-{}", self.asset, self.quote_currency)
    }

    /// Quote-currency value actually exchanged. Falls back to executed
    /// quantity times average price when the venue reports no quote amount.
    pub fn executed_value(&self) -> Decimal {
        if !self.quote_amount.is_zero() {
            return self.quote_amount;
        }
        self.average_price
            .map(|price| price * self.executed_quantity)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    pub order_id: String,
    pub asset: String,
    pub quote_currency: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub fee: Decimal,
    pub fee_currency: String,
    pub executed_at: DateTime<Utc>,
}

impl TradeFill {
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub asset: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub market_price: Decimal,
    pub quote_currency: String,
}

impl Holding {
    pub fn value(&self) -> Decimal {
        self.quantity * self.market_price
    }

    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.average_cost
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.value() - self.cost_basis()
    }
}

/// Closing market price of one asset at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub asset: String,
    pub quote_currency: String,
    pub price: Decimal,
    pub at: DateTime<Utc>,
}

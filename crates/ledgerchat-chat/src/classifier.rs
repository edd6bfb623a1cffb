//! Rule-based intent classifier.
//!
//! Scores every domain against weighted regex patterns, keeps the domains
//! that clear the configured thresholds, and extracts parameters (asset,
//! metric, time window, direction, limit, topic) from the clause each domain
//! was detected in. Classification is a pure function of the text and the
//! reference time used to resolve relative dates.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

use ledgerchat_core::config::ClassifierConfig;
use ledgerchat_core::types::{
    Classification, ClassifiedIntent, Direction, Intent, IntentParams, Metric, TimeWindow,
    TxStatus,
};

/// Slack applied when comparing scores against the tie margin.
const SCORE_EPSILON: f32 = 1e-4;

// =============================================================================
// Domain patterns (compiled once, reused across calls)
// =============================================================================

struct DomainPattern {
    regex: Regex,
    intent: Intent,
    weight: f32,
}

static DOMAIN_PATTERNS: LazyLock<Vec<DomainPattern>> = LazyLock::new(|| {
    let mut patterns = Vec::new();
    let mut add = |intent: Intent, pats: &[(&str, f32)]| {
        for (pat, weight) in pats {
            patterns.push(DomainPattern {
                regex: Regex::new(pat).expect("Invalid domain regex"),
                intent,
                weight: *weight,
            });
        }
    };

    add(
        Intent::Wallet,
        &[
            (r"(?i)\bmy\s+(?:\w+\s+)?(?:deposits?|withdrawals?|wallet|balances?|transactions)\b", 0.9),
            (
                r"(?i)\b(?:total|sum\s+of|all|recent|last|latest|largest|biggest|smallest|average|pending|failed)\s+(?:\d+\s+)?(?:deposits?|withdrawals?|transactions)\b",
                0.9,
            ),
            (
                r"(?i)\b(?:how\s+many|number\s+of|count\s+of)\s+(?:\w+\s+)?(?:deposits|withdrawals|transactions)\b",
                0.9,
            ),
            (r"(?i)\b(?:deposit|withdrawal)\s+(?:amount|history|total)s?\b", 0.9),
            (
                r"(?i)\bhow\s+much\s+(?:money\s+)?(?:have\s+|did\s+)?i\s+(?:deposit(?:ed)?|withdr[ae]wn?|withdraw)\b",
                0.9,
            ),
            (r"(?i)\b(?:deposited|withdrew|withdrawn)\b", 0.85),
            (r"(?i)\bwallet\b", 0.85),
            (r"(?i)\b(?:account\s+)?balances?\b", 0.85),
            (r"(?i)\btransaction\s+history\b", 0.85),
            (r"(?i)\bdeposits?\b", 0.75),
            (r"(?i)\b(?:withdrawals?|withdraw)\b", 0.75),
        ],
    );

    add(
        Intent::Trading,
        &[
            (
                r"(?i)\bmy\s+(?:\w+\s+)?(?:trades|orders|fills|trading\s+(?:history|activity|volume|summary|performance))\b",
                0.9,
            ),
            (r"(?i)\b(?:last|latest|recent)\s+(?:\d+\s+)?(?:trades|orders|fills)\b", 0.9),
            (r"(?i)\b(?:how\s+many|number\s+of)\s+(?:\w+\s+)?(?:trades|orders)\b", 0.9),
            (r"(?i)\b(?:open|closed|cancell?ed|executed|pending)\s+orders?\b", 0.9),
            (r"(?i)\btrad(?:e|ing)\s+(?:history|activity|volume|summary|performance|analysis)\b", 0.9),
            (r"(?i)\breali[sz]ed\s+(?:p\s*&\s*l|pnl|profits?|gains?|loss(?:es)?)\b", 0.9),
            (r"(?i)\b(?:paid|spent)\s+(?:in|on|for)\s+(?:\w+\s+)?fees?\b", 0.9),
            (r"(?i)\baverage\s+(?:buy|sell|buying|selling|purchase|execution)\s+price\b", 0.9),
            (r"(?i)\bhow\s+much\s+(?:have\s+|did\s+)?i\s+(?:paid|pay|spent|spend)\b", 0.85),
            (r"(?i)\b(?:bought|sold)\b", 0.85),
            (r"(?i)\b(?:purchase|buying|selling|buy|sell)\s+price\b", 0.85),
            (r"(?i)\btrades\b", 0.75),
            (r"(?i)\bfills\b", 0.75),
            (r"(?i)\b(?:p\s*&\s*l|pnl|profits?|loss(?:es)?)\b", 0.7),
            (r"(?i)\borders?\b", 0.6),
        ],
    );

    add(
        Intent::Portfolio,
        &[
            (r"(?i)\bportfolio\b", 0.9),
            (r"(?i)\bholdings?\b", 0.9),
            (r"(?i)\bunreali[sz]ed\b", 0.9),
            (r"(?i)\bhow\s+much\s+(?:\w+\s+)?do\s+i\s+(?:hold|own|have)\b", 0.9),
            (r"(?i)\bwhat\s+do\s+i\s+(?:hold|own)\b", 0.9),
            (r"(?i)\bmy\s+(?:\w+\s+)?(?:assets|investments?|coins|positions?)\b", 0.85),
            (r"(?i)\b(?:net\s+)?worth\b", 0.85),
            (r"(?i)\bvalue\s+of\s+my\b", 0.85),
            (r"(?i)\b(?:allocation|diversifi\w*)\b", 0.8),
        ],
    );

    add(
        Intent::Fees,
        &[
            (r"(?i)\b(?:trading|futures|spot|withdrawal|deposit|maker|taker|options)\s+fees?\b", 0.95),
            (r"(?i)\bfee\s+(?:schedule|structure|rates?|tiers?)\b", 0.95),
            (r"(?i)\b(?:what|which)\s+(?:are|is)\s+(?:the\s+)?(?:\w+\s+)?fees?\b", 0.9),
            (r"(?i)\b(?:maker|taker)\b", 0.85),
            (r"(?i)\b(?:commissions?|charges)\b", 0.8),
            (r"(?i)\bfees?\b", 0.65),
        ],
    );

    add(
        Intent::Faq,
        &[
            (
                r"(?i)\bhow\s+(?:do|can|should)\s+i\s+(?:\w+\s+)?(?:deposit|withdraw|add\s+funds|verify|complete|upload|buy|sell|trade|start)\b",
                1.0,
            ),
            (
                r"(?i)\bhow\s+long\s+(?:do|does|will|to)\s+(?:\w+\s+)?(?:withdrawals?|deposits?|verification|kyc)\b",
                1.0,
            ),
            (r"(?i)\bkyc\b", 0.9),
            (r"(?i)\bsmart\s+invest\b", 0.9),
            (r"(?i)\b(?:types?|kinds?)\s+of\s+(?:orders?|trading|accounts?)\b", 0.9),
            (r"(?i)\b(?:withdrawal|deposit)\s+limits?\b", 0.85),
            (r"(?i)\bhow\s+(?:do|can|should)\s+i\b", 0.85),
            (r"(?i)\bhow\s+(?:does|do)\s+\w+(?:\s+\w+)?\s+work\b", 0.85),
            (r"(?i)\bhow\s+long\b", 0.85),
            (r"(?i)\bwhat\s+happens\s+if\b", 0.85),
            (r"(?i)\b(?:verification|verify|documents?)\b", 0.8),
            (r"(?i)\b(?:is\s+it\s+(?:safe|secure)|security)\b", 0.8),
            (r"(?i)\bbank\s+(?:details|account|transfer)\b", 0.8),
            (r"(?i)\b(?:support|help)\b", 0.5),
            (r"(?i)\b(?:explain|what\s+is)\b", 0.45),
        ],
    );

    patterns
});

// =============================================================================
// Parameter patterns
// =============================================================================

static CLAUSE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:and|also|then|plus)\s+|[,;?]\s*|\.\s+").unwrap()
});

static QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:what|what's|how|why|when|where|who|which|can|could|is|are|do|does|should|will)\b",
    )
    .unwrap()
});

/// Known assets: canonical symbol and accepted names.
static KNOWN_ASSETS: &[(&str, &[&str])] = &[
    ("BTC", &["btc", "bitcoin", "bitcoins"]),
    ("ETH", &["eth", "ethereum", "ether"]),
    ("USDT", &["usdt", "tether"]),
    ("USDC", &["usdc"]),
    ("SOL", &["sol", "solana"]),
    ("XRP", &["xrp", "ripple"]),
    ("DOGE", &["doge", "dogecoin"]),
    ("ADA", &["ada", "cardano"]),
    ("MATIC", &["matic", "polygon"]),
    ("BNB", &["bnb"]),
    ("INR", &["inr", "rupee", "rupees"]),
    ("USD", &["usd", "dollars"]),
];

static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(btc|eth|usdt|usdc|sol|xrp|doge|ada|matic|bnb)\s*[-/_]?\s*(inr|usdt|usdc|usd)\b",
    )
    .unwrap()
});

static ASSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    let names: Vec<String> = KNOWN_ASSETS
        .iter()
        .flat_map(|(_, names)| names.iter().map(|n| regex::escape(n)))
        .collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", names.join("|"))).unwrap()
});

struct TimePatterns {
    today: Regex,
    yesterday: Regex,
    this_week: Regex,
    last_week: Regex,
    this_month: Regex,
    last_month: Regex,
    this_year: Regex,
    last_n: Regex,
    since_date: Regex,
    in_year: Regex,
}

static TIME_PATTERNS: LazyLock<TimePatterns> = LazyLock::new(|| TimePatterns {
    today: Regex::new(r"(?i)\btoday\b").unwrap(),
    yesterday: Regex::new(r"(?i)\byesterday\b").unwrap(),
    this_week: Regex::new(r"(?i)\bthis\s+week\b").unwrap(),
    last_week: Regex::new(r"(?i)\b(?:last|past)\s+week\b").unwrap(),
    this_month: Regex::new(r"(?i)\bthis\s+month\b").unwrap(),
    last_month: Regex::new(r"(?i)\b(?:last|past)\s+month\b").unwrap(),
    this_year: Regex::new(r"(?i)\bthis\s+year\b").unwrap(),
    last_n: Regex::new(r"(?i)\b(?:last|past|previous)\s+(\d{1,4})\s+(day|week|month|year)s?\b")
        .unwrap(),
    since_date: Regex::new(r"(?i)\bsince\s+(\d{4})-(\d{2})-(\d{2})\b").unwrap(),
    in_year: Regex::new(r"(?i)\bin\s+(20\d{2})\b").unwrap(),
});

struct MetricPatterns {
    count: Regex,
    average: Regex,
    largest: Regex,
    smallest: Regex,
    profit_loss: Regex,
    list: Regex,
    total: Regex,
    balance: Regex,
}

static METRIC_PATTERNS: LazyLock<MetricPatterns> = LazyLock::new(|| MetricPatterns {
    count: Regex::new(r"(?i)\b(?:how\s+many|number\s+of|count)\b").unwrap(),
    average: Regex::new(r"(?i)\b(?:average|avg|mean)\b").unwrap(),
    largest: Regex::new(r"(?i)\b(?:largest|biggest|highest|max(?:imum)?)\b").unwrap(),
    smallest: Regex::new(r"(?i)\b(?:smallest|lowest|min(?:imum)?)\b").unwrap(),
    profit_loss: Regex::new(r"(?i)\b(?:p\s*&\s*l|pnl|profits?|loss(?:es)?|gains?)\b").unwrap(),
    list: Regex::new(r"(?i)\b(?:list|history|itemi[sz]e)\b").unwrap(),
    total: Regex::new(r"(?i)\b(?:total|sum|overall|how\s+much)\b").unwrap(),
    balance: Regex::new(r"(?i)\bbalances?\b").unwrap(),
});

static LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:last|latest|recent|most\s+recent|top|first)\s+(\d{1,3})\b(?:\s+(\w+))?")
        .unwrap()
});

static DEPOSIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdeposit(?:s|ed)?\b").unwrap());
static WITHDRAW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:withdr[ae]w\w*|withdrawals?)\b").unwrap());
static OPEN_ORDERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:open|active|working)\s+orders?\b").unwrap());
static CLOSED_ORDERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:closed|cancell?ed|executed|completed|filled)\s+orders?\b").unwrap()
});
static BUY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:bought|buys?|buying|purchased?|purchases)\b").unwrap());
static SELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:sold|sells?|selling)\b").unwrap());

static FEE_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:fees?|commissions?|charges)\b").unwrap());
static PAID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:paid|pay|spent|spend)\b").unwrap());

static FEE_TOPICS: &[&str] = &[
    "futures",
    "derivatives",
    "spot",
    "options",
    "withdrawal",
    "deposit",
    "maker",
    "taker",
];

struct FaqTopicPatterns {
    kyc: Regex,
    upload: Regex,
    smart_invest: Regex,
    trading_types: Regex,
    withdrawal: Regex,
    deposit: Regex,
}

static FAQ_TOPICS: LazyLock<FaqTopicPatterns> = LazyLock::new(|| FaqTopicPatterns {
    kyc: Regex::new(r"(?i)\b(?:kyc|verification|verify|documents?|pan|aadhaar|passport|voter)\b")
        .unwrap(),
    upload: Regex::new(r"(?i)\b(?:upload|photos?|front|back|driving)\b").unwrap(),
    smart_invest: Regex::new(r"(?i)\bsmart\s+invest\b").unwrap(),
    trading_types: Regex::new(
        r"(?i)\b(?:(?:types?|kinds?)\s+of\s+(?:orders?|trading)|futures|options|margin)\b",
    )
    .unwrap(),
    withdrawal: Regex::new(r"(?i)\bwithdr[ae]w\w*\b").unwrap(),
    deposit: Regex::new(r"(?i)\b(?:deposit\w*|add\s+(?:funds|money)|bank\s+transfer)\b").unwrap(),
});

static STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "am", "be", "been", "have", "has", "had",
    "do", "does", "did", "will", "would", "should", "can", "could", "i", "me", "my", "we",
    "our", "you", "your", "it", "its", "they", "them", "what", "what's", "which", "who",
    "this", "that", "these", "those", "of", "in", "to", "for", "with", "on", "at", "from",
    "by", "about", "as", "and", "but", "or", "not", "no", "so", "if", "then", "than", "too",
    "very", "just", "also", "all", "any", "some", "how", "when", "where", "why", "tell",
    "show", "explain", "need", "want", "much", "many", "get", "there", "please",
];

// =============================================================================
// IntentClassifier
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct DomainHit {
    intent: Intent,
    confidence: f32,
    position: usize,
}

/// Deterministic multi-intent classifier.
pub struct IntentClassifier {
    config: ClassifierConfig,
}

impl IntentClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify against the current time.
    pub fn classify(&self, text: &str) -> Classification {
        self.classify_at(text, Utc::now())
    }

    /// Classify with relative dates resolved against `now`.
    pub fn classify_at(&self, text: &str, now: DateTime<Utc>) -> Classification {
        let text = text.trim();
        if text.is_empty() {
            return Classification::Unclassified;
        }

        let hits = self.select(score_domains(text));
        let is_question = QUESTION_RE.is_match(text) || text.contains('?');
        let hits = if hits.is_empty() && is_question {
            vec![DomainHit {
                intent: Intent::Faq,
                confidence: self.config.min_confidence,
                position: 0,
            }]
        } else {
            hits
        };

        if hits.is_empty() {
            debug!("Query left unclassified");
            return Classification::Unclassified;
        }

        let intents: Vec<ClassifiedIntent> = hits
            .into_iter()
            .map(|hit| {
                let clause = clause_at(text, hit.position);
                ClassifiedIntent {
                    intent: hit.intent,
                    confidence: hit.confidence,
                    position: hit.position,
                    params: self.extract_params(hit.intent, clause, text, now),
                }
            })
            .collect();

        debug!(
            intents = ?intents.iter().map(|c| c.intent).collect::<Vec<_>>(),
            "Query classified"
        );
        Classification::Intents(intents)
    }

    /// Keep strong domains and those tied with the best; order by position.
    fn select(&self, hits: Vec<DomainHit>) -> Vec<DomainHit> {
        let best = hits.iter().map(|h| h.confidence).fold(0.0_f32, f32::max);
        let mut kept: Vec<DomainHit> = hits
            .into_iter()
            .filter(|h| h.confidence + SCORE_EPSILON >= self.config.min_confidence)
            .filter(|h| {
                h.confidence + SCORE_EPSILON >= self.config.strong_confidence
                    || best - h.confidence <= self.config.tie_margin + SCORE_EPSILON
            })
            .collect();
        kept.sort_by_key(|h| (h.position, h.intent));
        kept
    }

    fn extract_params(
        &self,
        intent: Intent,
        clause: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> IntentParams {
        let asset = self
            .extract_asset(clause)
            .or_else(|| self.extract_asset(text));

        let window = match self.extract_window(clause, now) {
            w if w.is_all_time() => self.extract_window(text, now),
            w => w,
        };

        let limit = self.extract_limit(clause);
        let mut metric = self.extract_metric(clause);
        if limit.is_some() && metric == Metric::Summary {
            metric = Metric::List;
        }
        let limit = match metric {
            Metric::List => Some(limit.unwrap_or(self.config.default_list_limit)),
            _ => limit,
        };

        let mut params = IntentParams {
            asset,
            metric,
            window,
            direction: extract_direction(intent, clause),
            status: None,
            limit,
            topic: None,
            keywords: Vec::new(),
        };

        match intent {
            Intent::Wallet => {
                params.status = extract_status(clause);
                if METRIC_PATTERNS.balance.is_match(clause) {
                    params.topic = Some("balance".to_string());
                }
            }
            Intent::Trading => {
                if PAID_RE.is_match(clause) && FEE_WORD_RE.is_match(text) {
                    params.topic = Some("fees".to_string());
                    params.metric = Metric::Total;
                }
            }
            Intent::Portfolio => {}
            Intent::Fees => {
                let topic = fee_topic(clause).or_else(|| fee_topic(text));
                params.topic = Some(topic.unwrap_or_else(|| "trading".to_string()));
            }
            Intent::Faq => {
                params.topic = Some(faq_topic(clause).to_string());
                params.keywords = extract_keywords(clause);
            }
        }

        params
    }

    // -----------------------------------------------------------------
    // Parameter extraction
    // -----------------------------------------------------------------

    /// Canonical asset symbol named in the text. Trading pairs resolve to
    /// their base asset.
    pub fn extract_asset(&self, text: &str) -> Option<String> {
        if let Some(caps) = PAIR_RE.captures(text) {
            return caps.get(1).map(|m| m.as_str().to_uppercase());
        }

        let found = ASSET_RE.find(text)?.as_str().to_lowercase();
        KNOWN_ASSETS
            .iter()
            .find(|(_, names)| names.contains(&found.as_str()))
            .map(|(symbol, _)| symbol.to_string())
    }

    /// Time window named in the text, or all time.
    pub fn extract_window(&self, text: &str, now: DateTime<Utc>) -> TimeWindow {
        let tp = &*TIME_PATTERNS;
        let today = start_of_day(now.date_naive());

        if tp.yesterday.is_match(text) {
            return TimeWindow::new("yesterday", Some(today - Duration::days(1)), Some(today));
        }

        if tp.today.is_match(text) {
            return TimeWindow::new("today", Some(today), None);
        }

        if let Some(caps) = tp.last_n.captures(text) {
            let n: i64 = caps[1].parse().unwrap_or(1);
            let unit = caps[2].to_lowercase();
            let days = match unit.as_str() {
                "day" => n,
                "week" => n * 7,
                "month" => n * 30,
                _ => n * 365,
            };
            let label = format!("last {n} {unit}{}", if n == 1 { "" } else { "s" });
            return TimeWindow::new(label, Some(today - Duration::days(days)), None);
        }

        if tp.this_week.is_match(text) {
            let since_monday = i64::from(now.weekday().num_days_from_monday());
            return TimeWindow::new("this week", Some(today - Duration::days(since_monday)), None);
        }

        if tp.last_week.is_match(text) {
            return TimeWindow::new("last week", Some(today - Duration::days(7)), None);
        }

        if tp.this_month.is_match(text) {
            let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
                .map(start_of_day)
                .unwrap_or(today);
            return TimeWindow::new("this month", Some(first), None);
        }

        if tp.last_month.is_match(text) {
            return TimeWindow::new("last month", Some(today - Duration::days(30)), None);
        }

        if tp.this_year.is_match(text) {
            let first = NaiveDate::from_ymd_opt(now.year(), 1, 1)
                .map(start_of_day)
                .unwrap_or(today);
            return TimeWindow::new("this year", Some(first), None);
        }

        if let Some(caps) = tp.since_date.captures(text) {
            let date = NaiveDate::from_ymd_opt(
                caps[1].parse().unwrap_or(0),
                caps[2].parse().unwrap_or(0),
                caps[3].parse().unwrap_or(0),
            );
            if let Some(date) = date {
                return TimeWindow::new(format!("since {date}"), Some(start_of_day(date)), None);
            }
        }

        if let Some(caps) = tp.in_year.captures(text) {
            let year: i32 = caps[1].parse().unwrap_or(now.year());
            let start = NaiveDate::from_ymd_opt(year, 1, 1).map(start_of_day);
            let end = NaiveDate::from_ymd_opt(year + 1, 1, 1).map(start_of_day);
            if start.is_some() {
                return TimeWindow::new(format!("in {year}"), start, end);
            }
        }

        TimeWindow::all_time()
    }

    /// Requested aggregate. Counting phrases win over "how much".
    pub fn extract_metric(&self, text: &str) -> Metric {
        let mp = &*METRIC_PATTERNS;
        if mp.count.is_match(text) {
            Metric::Count
        } else if mp.average.is_match(text) {
            Metric::Average
        } else if mp.largest.is_match(text) {
            Metric::Largest
        } else if mp.smallest.is_match(text) {
            Metric::Smallest
        } else if mp.profit_loss.is_match(text) {
            Metric::ProfitLoss
        } else if mp.list.is_match(text) || self.extract_limit(text).is_some() {
            Metric::List
        } else if mp.total.is_match(text) {
            Metric::Total
        } else if mp.balance.is_match(text) {
            Metric::Balance
        } else {
            Metric::Summary
        }
    }

    /// Record count from phrases like "last 5". Ignores time spans such as
    /// "last 5 days".
    pub fn extract_limit(&self, text: &str) -> Option<usize> {
        LIMIT_RE.captures_iter(text).find_map(|caps| {
            let is_time_unit = caps.get(2).is_some_and(|unit| {
                matches!(
                    unit.as_str().to_lowercase().trim_end_matches('s'),
                    "day" | "week" | "month" | "year" | "hour"
                )
            });
            if is_time_unit {
                return None;
            }
            caps[1].parse::<usize>().ok().filter(|n| *n > 0)
        })
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Best weight and earliest match position per domain.
fn score_domains(text: &str) -> Vec<DomainHit> {
    let mut hits: Vec<DomainHit> = Vec::new();
    for pattern in DOMAIN_PATTERNS.iter() {
        let Some(m) = pattern.regex.find(text) else {
            continue;
        };
        match hits.iter_mut().find(|h| h.intent == pattern.intent) {
            Some(hit) => {
                hit.confidence = hit.confidence.max(pattern.weight);
                hit.position = hit.position.min(m.start());
            }
            None => hits.push(DomainHit {
                intent: pattern.intent,
                confidence: pattern.weight,
                position: m.start(),
            }),
        }
    }
    hits
}

/// The clause of `text` containing byte offset `position`.
fn clause_at(text: &str, position: usize) -> &str {
    let mut start = 0;
    for sep in CLAUSE_SPLIT_RE.find_iter(text) {
        if position < sep.start() {
            return &text[start..sep.start()];
        }
        start = sep.end();
    }
    &text[start..]
}

fn extract_direction(intent: Intent, clause: &str) -> Option<Direction> {
    match intent {
        Intent::Wallet => {
            match (DEPOSIT_RE.is_match(clause), WITHDRAW_RE.is_match(clause)) {
                (true, false) => Some(Direction::Deposit),
                (false, true) => Some(Direction::Withdrawal),
                _ => None,
            }
        }
        Intent::Trading => {
            if OPEN_ORDERS_RE.is_match(clause) {
                Some(Direction::Open)
            } else if CLOSED_ORDERS_RE.is_match(clause) {
                Some(Direction::Closed)
            } else {
                match (BUY_RE.is_match(clause), SELL_RE.is_match(clause)) {
                    (true, false) => Some(Direction::Buy),
                    (false, true) => Some(Direction::Sell),
                    _ => None,
                }
            }
        }
        _ => None,
    }
}

fn extract_status(clause: &str) -> Option<TxStatus> {
    let lower = clause.to_lowercase();
    if lower.contains("pending") {
        Some(TxStatus::Pending)
    } else if lower.contains("failed") || lower.contains("rejected") {
        Some(TxStatus::Failed)
    } else if lower.contains("successful") || lower.contains("completed") {
        Some(TxStatus::Completed)
    } else {
        None
    }
}

fn fee_topic(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    FEE_TOPICS
        .iter()
        .find(|topic| lower.contains(*topic))
        .map(|topic| topic.to_string())
}

fn faq_topic(text: &str) -> &'static str {
    let ft = &*FAQ_TOPICS;
    if ft.kyc.is_match(text) {
        if ft.upload.is_match(text) {
            "kyc-upload"
        } else {
            "kyc-documents"
        }
    } else if ft.smart_invest.is_match(text) {
        "smart-invest"
    } else if ft.trading_types.is_match(text) {
        "trading-types"
    } else if ft.withdrawal.is_match(text) {
        "withdrawal-processing"
    } else if ft.deposit.is_match(text) {
        "deposit-methods"
    } else {
        "general"
    }
}

/// Lowercase content words, in order, without duplicates.
fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
            .to_lowercase();
        if word.len() < 3 || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

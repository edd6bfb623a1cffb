//! Static knowledge: fee schedules and FAQ entries keyed by topic.
//!
//! The store is immutable after construction and is shared across requests
//! behind an `Arc`. Lookups for unknown keys return `None`.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use ledgerchat_core::error::LedgerError;

/// Most entries returned by a keyword search.
const MAX_SEARCH_RESULTS: usize = 3;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("failed to read knowledge file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse knowledge file: {0}")]
    Parse(String),
}

impl From<toml::de::Error> for KnowledgeError {
    fn from(err: toml::de::Error) -> Self {
        KnowledgeError::Parse(err.to_string())
    }
}

impl From<KnowledgeError> for LedgerError {
    fn from(err: KnowledgeError) -> Self {
        LedgerError::Knowledge(err.to_string())
    }
}

/// One line of a fee table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRow {
    /// e.g. "taker" or "maker".
    pub label: String,
    pub rate: Decimal,
    /// "%" for percentage rates, otherwise a currency code.
    #[serde(default = "percent_unit")]
    pub unit: String,
}

fn percent_unit() -> String {
    "%".to_string()
}

impl FeeRow {
    pub fn is_percentage(&self) -> bool {
        self.unit == "%"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub topic: String,
    pub title: String,
    /// Other topic keys that resolve to this schedule.
    #[serde(default)]
    pub aliases: Vec<String>,
    pub rows: Vec<FeeRow>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FeeSchedule {
    fn answers(&self, topic: &str) -> bool {
        self.topic.eq_ignore_ascii_case(topic)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(topic))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    /// Topic key, e.g. "kyc-documents".
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl FaqEntry {
    /// Lexical relevance: keyword hits weigh 3, title hits 2, content hits 1.
    fn score(&self, terms: &[String]) -> u32 {
        let title = self.title.to_lowercase();
        let content = self.content.to_lowercase();
        terms
            .iter()
            .map(|term| {
                let term = term.to_lowercase();
                let mut score = 0;
                if self
                    .keywords
                    .iter()
                    .any(|k| k.eq_ignore_ascii_case(&term) || k.to_lowercase().contains(&term))
                {
                    score += 3;
                }
                if title.contains(&term) {
                    score += 2;
                }
                if content.contains(&term) {
                    score += 1;
                }
                score
            })
            .sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct KnowledgeFile {
    fees: Vec<FeeSchedule>,
    faq: Vec<FaqEntry>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    fees: Vec<FeeSchedule>,
    faq: Vec<FaqEntry>,
}

impl KnowledgeStore {
    pub fn new(fees: Vec<FeeSchedule>, faq: Vec<FaqEntry>) -> Self {
        Self { fees, faq }
    }

    /// Built-in platform knowledge.
    pub fn with_defaults() -> Self {
        Self::new(default_fees(), default_faq())
    }

    /// Load fee schedules and FAQ entries from a TOML file with `[[fees]]`
    /// and `[[faq]]` tables.
    pub fn load(path: &Path) -> Result<Self, KnowledgeError> {
        let content = std::fs::read_to_string(path)?;
        let file: KnowledgeFile = toml::from_str(&content)?;
        info!(
            fees = file.fees.len(),
            faq = file.faq.len(),
            "Knowledge loaded from {}",
            path.display()
        );
        Ok(Self::new(file.fees, file.faq))
    }

    pub fn fee_schedule(&self, topic: &str) -> Option<&FeeSchedule> {
        self.fees.iter().find(|s| s.answers(topic))
    }

    pub fn fee_schedules(&self) -> &[FeeSchedule] {
        &self.fees
    }

    /// FAQ entry by id, falling back to the first entry in a matching category.
    pub fn faq(&self, topic: &str) -> Option<&FaqEntry> {
        self.faq
            .iter()
            .find(|e| e.id.eq_ignore_ascii_case(topic))
            .or_else(|| {
                self.faq
                    .iter()
                    .find(|e| e.category.eq_ignore_ascii_case(topic))
            })
    }

    /// Best-scoring entry per category, highest first, at most three.
    pub fn search_faq(&self, terms: &[String]) -> Vec<&FaqEntry> {
        let mut best: HashMap<&str, (u32, &FaqEntry)> = HashMap::new();
        for entry in &self.faq {
            let score = entry.score(terms);
            if score == 0 {
                continue;
            }
            let slot = best.entry(entry.category.as_str()).or_insert((score, entry));
            if score > slot.0 {
                *slot = (score, entry);
            }
        }

        let mut ranked: Vec<(u32, &FaqEntry)> = best.into_values().collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        ranked
            .into_iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|(_, entry)| entry)
            .collect()
    }

    /// All known topic keys, fee schedules first.
    pub fn topics(&self) -> Vec<&str> {
        self.fees
            .iter()
            .map(|s| s.topic.as_str())
            .chain(self.faq.iter().map(|e| e.id.as_str()))
            .collect()
    }
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn default_fees() -> Vec<FeeSchedule> {
    vec![FeeSchedule {
        topic: "futures".to_string(),
        title: "Futures trading fees".to_string(),
        aliases: vec![
            "trading".to_string(),
            "derivatives".to_string(),
            "maker".to_string(),
            "taker".to_string(),
        ],
        rows: vec![
            FeeRow {
                label: "taker".to_string(),
                rate: Decimal::new(2, 2),
                unit: percent_unit(),
            },
            FeeRow {
                label: "maker".to_string(),
                rate: Decimal::new(1, 2),
                unit: percent_unit(),
            },
        ],
        notes: None,
    }]
}

fn faq(
    id: &str,
    title: &str,
    content: &str,
    category: &str,
    subcategory: &str,
    keywords: &[&str],
) -> FaqEntry {
    FaqEntry {
        id: id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        category: category.to_string(),
        subcategory: subcategory.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

fn default_faq() -> Vec<FaqEntry> {
    vec![
        faq(
            "deposit-methods",
            "How can I deposit funds?",
            "You can deposit funds via bank transfer.",
            "wallet",
            "deposits",
            &["deposit", "bank", "transfer", "add funds", "fund"],
        ),
        faq(
            "withdrawal-processing",
            "How long do withdrawals take?",
            "Withdrawals are processed within 24 hours.",
            "withdrawals",
            "processing",
            &["withdraw", "withdrawal", "processing", "time", "hours"],
        ),
        faq(
            "smart-invest",
            "What is Smart Invest?",
            "Smart Invest is the platform's automated trading feature.",
            "smart_invest",
            "automated_trading",
            &["smart invest", "automated", "automatic", "invest"],
        ),
        faq(
            "trading-types",
            "What types of trading are available?",
            "Available trading types are API trading (spot and futures), Smart Invest \
             (automated trading), futures trading (margin) and options trading.",
            "trading",
            "products",
            &["types", "spot", "futures", "options", "margin", "api"],
        ),
        faq(
            "kyc-documents",
            "What documents do I need for KYC verification?",
            "To complete KYC verification you need a PAN card as ID proof and any one of \
             Aadhaar, Voter ID or Passport as address proof.",
            "kyc",
            "verification",
            &["kyc", "documents", "verification", "pan", "aadhaar", "passport", "voter id"],
        ),
        faq(
            "kyc-upload",
            "How do I upload my KYC documents?",
            "Upload photos of both the front and back of each document. The PAN and the \
             Aadhaar, Voter ID or Passport must belong to you. Driving licences are not accepted.",
            "kyc",
            "upload",
            &["upload", "photo", "front", "back", "driving licence", "driving license"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_default_futures_fees() {
        let store = KnowledgeStore::with_defaults();
        let schedule = store.fee_schedule("futures").unwrap();
        assert_eq!(schedule.rows.len(), 2);
        assert_eq!(schedule.rows[0].label, "taker");
        assert_eq!(schedule.rows[0].rate, dec!(0.02));
        assert_eq!(schedule.rows[1].rate, dec!(0.01));
        assert!(schedule.rows[0].is_percentage());
    }

    #[test]
    fn test_fee_schedule_resolves_aliases() {
        let store = KnowledgeStore::with_defaults();
        assert_eq!(store.fee_schedule("Trading").unwrap().topic, "futures");
        assert!(store.fee_schedule("staking").is_none());
    }

    #[test]
    fn test_faq_lookup_by_id_then_category() {
        let store = KnowledgeStore::with_defaults();
        assert_eq!(store.faq("kyc-upload").unwrap().subcategory, "upload");
        assert_eq!(store.faq("kyc").unwrap().id, "kyc-documents");
        assert!(store.faq("lending").is_none());
    }

    #[test]
    fn test_search_keeps_best_per_category() {
        let store = KnowledgeStore::with_defaults();
        let results = store.search_faq(&terms(&["kyc", "documents", "upload"]));
        let kyc: Vec<_> = results.iter().filter(|e| e.category == "kyc").collect();
        assert_eq!(kyc.len(), 1);
        assert_eq!(results[0].category, "kyc");
    }

    #[test]
    fn test_search_caps_results_and_skips_misses() {
        let store = KnowledgeStore::with_defaults();
        let results = store.search_faq(&terms(&[
            "deposit", "withdrawal", "kyc", "smart invest", "futures",
        ]));
        assert!(results.len() <= 3);
        assert!(store.search_faq(&terms(&["weather"])).is_empty());
        assert!(store.search_faq(&[]).is_empty());
    }

    #[test]
    fn test_topics_lists_fees_first() {
        let store = KnowledgeStore::with_defaults();
        let topics = store.topics();
        assert_eq!(topics[0], "futures");
        assert!(topics.contains(&"kyc-documents"));
    }

    #[test]
    fn test_load_from_toml() {
        let content = r#"
[[fees]]
topic = "spot"
title = "Spot trading fees"
aliases = ["trading"]

[[fees.rows]]
label = "taker"
rate = "0.2"

[[fees.rows]]
label = "withdrawal"
rate = "10"
unit = "INR"

[[faq]]
id = "lending"
title = "Can I lend my crypto?"
content = "Lending is not offered."
category = "products"
keywords = ["lend", "lending"]
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let store = KnowledgeStore::load(file.path()).unwrap();
        let spot = store.fee_schedule("trading").unwrap();
        assert_eq!(spot.topic, "spot");
        assert!(spot.rows[0].is_percentage());
        assert_eq!(spot.rows[1].unit, "INR");
        assert_eq!(spot.rows[1].rate, dec!(10));
        assert!(store.fee_schedule("futures").is_none());
        assert_eq!(store.faq("lending").unwrap().subcategory, "");
    }

    #[test]
    fn test_load_invalid_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[[faq]\nid = ").unwrap();
        let result = KnowledgeStore::load(file.path());
        assert!(matches!(result, Err(KnowledgeError::Parse(_))));
    }
}

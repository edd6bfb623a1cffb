//! Response composition.
//!
//! Turns the ordered fact sets of a request into one answer. The
//! deterministic narrative is always available; when a text backend is
//! configured it phrases the same facts and the narrative becomes the
//! fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use ledgerchat_core::config::{BackendConfig, ComposerConfig};
use ledgerchat_core::types::{Answer, Fact, FactHint, FactSet, FactValue, Intent, Query, TimeWindow};

use crate::backend::{build_prompt, generate_with_retry, TextBackend};

const CLARIFICATION: &str = "I'm not sure what you're asking. I can help with your wallet \
     deposits and withdrawals, your trades, your portfolio, our fees, or general questions \
     about the platform. Could you rephrase your question?";

/// Composes answers from fact sets.
pub struct ResponseComposer {
    max_list_items: usize,
    backend: Option<Arc<dyn TextBackend>>,
    max_attempts: u32,
    base_delay: Duration,
}

impl ResponseComposer {
    pub fn new(config: &ComposerConfig) -> Self {
        Self {
            max_list_items: config.max_list_items.max(1),
            backend: None,
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Phrase answers with `backend`, retrying per `config`.
    pub fn with_backend(mut self, backend: Arc<dyn TextBackend>, config: &BackendConfig) -> Self {
        self.backend = Some(backend);
        self.max_attempts = config.max_attempts;
        self.base_delay = Duration::from_millis(config.base_delay_ms);
        self
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Compose the answer for `query`. Always succeeds.
    pub async fn compose(&self, fact_sets: &[FactSet], query: &Query) -> Answer {
        let narrative = self.narrate(fact_sets);

        let Some(backend) = &self.backend else {
            return Answer::success(narrative);
        };
        // Nothing but flags: the narrative already says everything there is.
        if fact_sets.iter().all(|s| s.facts.is_empty()) {
            return Answer::success(narrative);
        }

        let prompt = build_prompt(&query.text, &prompt_facts(fact_sets));
        match generate_with_retry(backend.as_ref(), &prompt, self.max_attempts, self.base_delay)
            .await
        {
            Ok(text) => {
                debug!(backend = backend.name(), "Answer phrased by backend");
                Answer::success(text)
            }
            Err(e) => {
                warn!(backend = backend.name(), "Falling back to narrative answer: {e}");
                Answer::success(narrative)
            }
        }
    }

    /// Reply for queries that match no domain.
    pub fn clarification(&self) -> Answer {
        Answer::success(CLARIFICATION)
    }

    /// Deterministic rendering of `fact_sets`, one paragraph each, in order.
    pub fn narrate(&self, fact_sets: &[FactSet]) -> String {
        if fact_sets.is_empty() {
            return "I couldn't find an answer to that.".to_string();
        }
        fact_sets
            .iter()
            .map(|set| self.narrate_set(set))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn narrate_set(&self, set: &FactSet) -> String {
        let when = window_phrase(&set.window);
        match set.hint {
            Some(FactHint::NoRecords) => {
                return format!("I couldn't find any {}{when}.", set.subject);
            }
            Some(FactHint::TopicNotFound) => {
                return format!("I don't have information about {}.", set.subject);
            }
            Some(FactHint::Unavailable) => {
                return format!(
                    "I couldn't retrieve your {} right now. Please try again shortly.",
                    set.subject
                );
            }
            None => {}
        }

        if set.intent == Intent::Faq {
            return set
                .facts
                .iter()
                .map(format_value)
                .collect::<Vec<_>>()
                .join("\n\n");
        }

        match set.facts.as_slice() {
            [] => format!("I couldn't find any {}{when}.", set.subject),
            [fact] => format!("{}{when}: {}.", capitalize(&fact.label), format_fact(fact)),
            facts => {
                let mut lines = vec![format!("{}{when}:", capitalize(&set.subject))];
                for fact in facts.iter().take(self.max_list_items) {
                    lines.push(format!("- {}: {}", fact.label, format_fact(fact)));
                }
                if facts.len() > self.max_list_items {
                    lines.push(format!("- …and {} more", facts.len() - self.max_list_items));
                }
                lines.join("\n")
            }
        }
    }
}

/// One line per fact for the backend prompt.
fn prompt_facts(fact_sets: &[FactSet]) -> Vec<String> {
    let mut lines = Vec::new();
    for set in fact_sets {
        let when = window_phrase(&set.window);
        match set.hint {
            Some(hint) => lines.push(format!("{}{when}: {}", set.subject, hint.as_str())),
            None => lines.extend(
                set.facts
                    .iter()
                    .map(|f| format!("{}{when} - {}: {}", set.subject, f.label, format_fact(f))),
            ),
        }
    }
    lines
}

/// " in the last 7 days", " this month", or nothing for all time.
fn window_phrase(window: &TimeWindow) -> String {
    if window.is_all_time() {
        String::new()
    } else if window.label.starts_with("last ") || window.label.starts_with("past ") {
        format!(" in the {}", window.label)
    } else {
        format!(" {}", window.label)
    }
}

fn format_fact(fact: &Fact) -> String {
    let value = format_value(fact);
    match (&fact.value, &fact.unit) {
        (FactValue::Amount(_) | FactValue::Quantity(_), Some(unit)) => format!("{value} {unit}"),
        _ => value,
    }
}

fn format_value(fact: &Fact) -> String {
    match &fact.value {
        FactValue::Amount(v) => format!("{:.2}", v.round_dp(2)),
        FactValue::Quantity(v) => v.normalize().to_string(),
        FactValue::Count(n) => n.to_string(),
        FactValue::Percent(v) => format!("{}%", v.normalize()),
        FactValue::Text(s) => s.clone(),
        FactValue::Date(d) => d.format("%Y-%m-%d").to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

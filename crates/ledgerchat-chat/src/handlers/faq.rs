//! FAQ handler: knowledge lookups by topic with keyword search fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use ledgerchat_core::types::{ClassifiedIntent, Fact, FactHint, FactSet, Identity, Intent};
use ledgerchat_store::{FaqEntry, KnowledgeStore};

use super::DomainHandler;

/// Topic the classifier assigns when no specific entry applies.
const GENERAL_TOPIC: &str = "general";

pub struct FaqHandler {
    knowledge: Arc<KnowledgeStore>,
}

impl FaqHandler {
    pub fn new(knowledge: Arc<KnowledgeStore>) -> Self {
        Self { knowledge }
    }

    fn lookup(&self, topic: &str, keywords: &[String]) -> Vec<&FaqEntry> {
        if topic != GENERAL_TOPIC {
            if let Some(entry) = self.knowledge.faq(topic) {
                return vec![entry];
            }
        }
        self.knowledge.search_faq(keywords)
    }
}

#[async_trait]
impl DomainHandler for FaqHandler {
    fn intent(&self) -> Intent {
        Intent::Faq
    }

    async fn handle(&self, intent: &ClassifiedIntent, _identity: &Identity) -> FactSet {
        let params = &intent.params;
        let topic = params.topic.as_deref().unwrap_or(GENERAL_TOPIC);
        let window = params.window.clone();

        let entries = self.lookup(topic, &params.keywords);
        debug!(topic, found = entries.len(), "FAQ lookup");

        if entries.is_empty() {
            let subject = if topic != GENERAL_TOPIC {
                topic.replace('-', " ")
            } else if params.keywords.is_empty() {
                "that topic".to_string()
            } else {
                params.keywords.join(" ")
            };
            return FactSet::flagged(Intent::Faq, subject, window, FactHint::TopicNotFound);
        }

        let subject = entries[0].title.clone();
        let mut set = FactSet::new(Intent::Faq, subject, window);
        for entry in entries {
            set.push(Fact::text(entry.title.as_str(), entry.content.as_str()));
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ledgerchat_core::types::{FactValue, IntentParams};

    use crate::handlers::testing::{classified, identity};

    fn handler() -> FaqHandler {
        FaqHandler::new(Arc::new(KnowledgeStore::with_defaults()))
    }

    fn faq(topic: &str, keywords: &[&str]) -> ClassifiedIntent {
        classified(
            Intent::Faq,
            IntentParams {
                topic: Some(topic.to_string()),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                ..IntentParams::default()
            },
        )
    }

    #[tokio::test]
    async fn test_topic_lookup() {
        let set = handler().handle(&faq("kyc-documents", &[]), &identity("a")).await;
        assert_eq!(set.hint, None);
        assert_eq!(set.facts.len(), 1);
        let FactValue::Text(content) = &set.facts[0].value else {
            panic!("expected text fact");
        };
        assert!(content.contains("PAN card"));
    }

    #[tokio::test]
    async fn test_general_topic_searches_keywords() {
        let set = handler()
            .handle(&faq("general", &["bank", "transfer"]), &identity("a"))
            .await;
        assert_eq!(set.hint, None);
        assert_eq!(set.subject, "How can I deposit funds?");
    }

    #[tokio::test]
    async fn test_unknown_topic_falls_back_to_search() {
        let set = handler()
            .handle(&faq("staking", &["withdrawal", "hours"]), &identity("a"))
            .await;
        assert_eq!(set.subject, "How long do withdrawals take?");
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let set = handler()
            .handle(&faq("general", &["weather", "forecast"]), &identity("a"))
            .await;
        assert_eq!(set.hint, Some(FactHint::TopicNotFound));
        assert_eq!(set.subject, "weather forecast");

        let set = handler().handle(&faq("staking-rewards", &[]), &identity("a")).await;
        assert_eq!(set.subject, "staking rewards");
    }
}

//! Fees handler: fee schedules from the knowledge store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use ledgerchat_core::types::{ClassifiedIntent, Fact, FactHint, FactSet, Identity, Intent};
use ledgerchat_store::KnowledgeStore;

use super::DomainHandler;

pub struct FeesHandler {
    knowledge: Arc<KnowledgeStore>,
}

impl FeesHandler {
    pub fn new(knowledge: Arc<KnowledgeStore>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl DomainHandler for FeesHandler {
    fn intent(&self) -> Intent {
        Intent::Fees
    }

    async fn handle(&self, intent: &ClassifiedIntent, _identity: &Identity) -> FactSet {
        let params = &intent.params;
        let topic = params.topic.as_deref().unwrap_or("trading");
        let window = params.window.clone();

        let Some(schedule) = self.knowledge.fee_schedule(topic) else {
            debug!(topic, "No fee schedule for topic");
            return FactSet::flagged(
                Intent::Fees,
                format!("{topic} fees"),
                window,
                FactHint::TopicNotFound,
            );
        };

        let mut set = FactSet::new(Intent::Fees, schedule.title.as_str(), window);
        for row in &schedule.rows {
            let label = format!("{} fee", row.label);
            if row.is_percentage() {
                set.push(Fact::percent(label, row.rate));
            } else {
                set.push(Fact::amount(label, row.rate, row.unit.as_str()));
            }
        }
        if let Some(notes) = &schedule.notes {
            set.push(Fact::text("note", notes.as_str()));
        }
        set
    }
}

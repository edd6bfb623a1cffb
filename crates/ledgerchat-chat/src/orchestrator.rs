//! Chat orchestrator: the single entry point for a user question.
//!
//! Resolves the caller's session, classifies the question, fans the intents
//! out to their domain handlers concurrently, and composes one answer. Every
//! request walks the `RequestLifecycle` state machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ledgerchat_core::config::LedgerConfig;
use ledgerchat_core::types::{
    Answer, Classification, ClassifiedIntent, FactHint, FactSet, Identity, Intent, Query,
};
use ledgerchat_store::{AccountDataGateway, KnowledgeStore};

use crate::backend::TextBackend;
use crate::classifier::IntentClassifier;
use crate::composer::ResponseComposer;
use crate::error::ChatError;
use crate::handlers::HandlerRegistry;
use crate::lifecycle::{RequestLifecycle, RequestState};
use crate::session::SessionStore;

/// Everything known about a finished request.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub request_id: Uuid,
    pub answer: Answer,
    pub state: RequestState,
    pub classification: Classification,
    /// Handler output in intent order.
    pub fact_sets: Vec<FactSet>,
}

pub struct ChatOrchestrator {
    classifier: IntentClassifier,
    registry: HandlerRegistry,
    composer: ResponseComposer,
    sessions: Arc<SessionStore>,
    handler_timeout: Duration,
    max_query_length: usize,
}

impl ChatOrchestrator {
    pub fn new(
        config: &LedgerConfig,
        registry: HandlerRegistry,
        composer: ResponseComposer,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(config.classifier.clone()),
            registry,
            composer,
            sessions,
            handler_timeout: Duration::from_millis(config.dispatch.handler_timeout_ms),
            max_query_length: config.classifier.max_query_length,
        }
    }

    /// Wire the default handlers and composer over the given data sources.
    pub fn build(
        config: &LedgerConfig,
        gateway: Arc<dyn AccountDataGateway>,
        knowledge: Arc<KnowledgeStore>,
        backend: Option<Arc<dyn TextBackend>>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let registry = HandlerRegistry::with_defaults(gateway, knowledge, &config.dispatch);
        let mut composer = ResponseComposer::new(&config.composer);
        if let Some(backend) = backend {
            composer = composer.with_backend(backend, &config.backend);
        }
        Self::new(config, registry, composer, sessions)
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Answer `text` for the holder of `token`, mapping failures to error answers.
    pub async fn respond(&self, token: Option<&str>, text: &str) -> Answer {
        match self.handle(token, text).await {
            Ok(outcome) => outcome.answer,
            Err(e) => e.to_answer(),
        }
    }

    /// Run a request end to end.
    ///
    /// The session is resolved before anything else; an unauthenticated
    /// request never reaches a handler.
    pub async fn handle(&self, token: Option<&str>, text: &str) -> Result<ChatOutcome, ChatError> {
        let mut lifecycle = RequestLifecycle::new(Uuid::new_v4());

        let identity = match self.sessions.resolve(token) {
            Ok(identity) => identity,
            Err(e) => return Err(fail(&mut lifecycle, e.into())),
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(fail(&mut lifecycle, ChatError::EmptyQuery));
        }
        if text.chars().count() > self.max_query_length {
            return Err(fail(
                &mut lifecycle,
                ChatError::QueryTooLong(self.max_query_length),
            ));
        }

        let mut query = Query::new(text, identity);
        query.id = lifecycle.request_id();
        self.run(lifecycle, query).await
    }

    /// Run an already-authenticated query.
    pub async fn handle_query(&self, query: Query) -> Result<ChatOutcome, ChatError> {
        self.run(RequestLifecycle::new(query.id), query).await
    }

    async fn run(
        &self,
        mut lifecycle: RequestLifecycle,
        query: Query,
    ) -> Result<ChatOutcome, ChatError> {
        let started = Instant::now();
        lifecycle.advance(RequestState::Classifying)?;
        let classification = self.classifier.classify_at(&query.text, query.received_at);

        let (answer, fact_sets) = if classification.is_unclassified() {
            debug!(request_id = %query.id, "Query matched no domain");
            lifecycle.advance(RequestState::Composing)?;
            (self.composer.clarification(), Vec::new())
        } else {
            lifecycle.advance(RequestState::Dispatching)?;
            let fact_sets = self
                .dispatch(classification.intents(), &query.identity)
                .await;
            lifecycle.advance(RequestState::Composing)?;
            let answer = self.composer.compose(&fact_sets, &query).await;
            (answer, fact_sets)
        };
        lifecycle.advance(RequestState::Completed)?;

        info!(
            request_id = %query.id,
            user = %query.identity.user_id,
            intents = ?classification.intents().iter().map(|c| c.intent).collect::<Vec<_>>(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );

        Ok(ChatOutcome {
            request_id: query.id,
            answer,
            state: lifecycle.state(),
            classification,
            fact_sets,
        })
    }

    /// Run one handler per intent concurrently, each under the handler timeout.
    ///
    /// Output order follows `intents`, not completion order. A handler that
    /// times out, panics, or is not registered yields an unavailable set.
    async fn dispatch(&self, intents: &[ClassifiedIntent], identity: &Identity) -> Vec<FactSet> {
        let mut slots: Vec<Option<FactSet>> = vec![None; intents.len()];
        let mut tasks = JoinSet::new();

        for (index, classified) in intents.iter().enumerate() {
            let Some(handler) = self.registry.get(classified.intent) else {
                warn!(intent = %classified.intent, "No handler registered");
                continue;
            };
            let classified = classified.clone();
            let identity = identity.clone();
            let limit = self.handler_timeout;
            tasks.spawn(async move {
                let result = tokio::time::timeout(limit, handler.handle(&classified, &identity)).await;
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(set))) => slots[index] = Some(set),
                Ok((index, Err(_))) => {
                    warn!(
                        intent = %intents[index].intent,
                        timeout_ms = self.handler_timeout.as_millis() as u64,
                        "Handler timed out"
                    );
                }
                Err(e) => warn!("Handler task failed: {e}"),
            }
        }

        slots
            .into_iter()
            .zip(intents)
            .map(|(slot, classified)| slot.unwrap_or_else(|| unavailable(classified)))
            .collect()
    }
}

fn fail(lifecycle: &mut RequestLifecycle, err: ChatError) -> ChatError {
    // Received -> Failed is always valid.
    if let Err(e) = lifecycle.advance(RequestState::Failed) {
        warn!("Could not mark request failed: {e}");
    }
    info!(request_id = %lifecycle.request_id(), "Request rejected: {err}");
    err
}

fn unavailable(classified: &ClassifiedIntent) -> FactSet {
    let subject = match classified.intent {
        Intent::Wallet => "wallet activity",
        Intent::Trading => "trades",
        Intent::Portfolio => "portfolio",
        Intent::Fees => "fee details",
        Intent::Faq => "help articles",
    };
    FactSet::flagged(
        classified.intent,
        subject,
        classified.params.window.clone(),
        FactHint::Unavailable,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    use ledgerchat_core::types::{
        AnswerStatus, Balance, Holding, Order, PricePoint, TradeFill, UserId, WalletTransaction,
    };
    use ledgerchat_store::{Fixture, GatewayError, InMemoryGateway, RecordFilter};

    use crate::error::AuthError;

    const DEMO_TOKEN: &str = "8f14e45fceea167a5a36dedd4bea2543";
    const NEWCOMER_TOKEN: &str = "c9f0f895fb98ab9159f51fd0297e236d";

    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Pass,
        Slow,
        Down,
        /// Reads for this user take a little while.
        SlowUser(&'static str),
        /// Deposit, withdrawal and balance reads take a little while.
        SlowWallet,
    }

    /// Demo data behind a gateway that records every read.
    struct ProbeGateway {
        inner: InMemoryGateway,
        mode: Mode,
        reads: Mutex<Vec<UserId>>,
    }

    impl ProbeGateway {
        fn new(mode: Mode) -> Self {
            let fixture = Fixture::demo().unwrap();
            Self {
                inner: InMemoryGateway::from_fixture(&fixture),
                mode,
                reads: Mutex::new(Vec::new()),
            }
        }

        async fn probe(&self, identity: &Identity) -> Result<(), GatewayError> {
            self.read(identity, false).await
        }

        async fn probe_wallet(&self, identity: &Identity) -> Result<(), GatewayError> {
            self.read(identity, true).await
        }

        async fn read(&self, identity: &Identity, wallet: bool) -> Result<(), GatewayError> {
            self.reads.lock().unwrap().push(identity.user_id.clone());
            let pause = Duration::from_millis(200);
            match self.mode {
                Mode::Pass => Ok(()),
                Mode::Slow => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
                Mode::Down => Err(GatewayError::Unavailable("maintenance".into())),
                Mode::SlowUser(user) => {
                    if identity.user_id.as_str() == user {
                        tokio::time::sleep(pause).await;
                    }
                    Ok(())
                }
                Mode::SlowWallet => {
                    if wallet {
                        tokio::time::sleep(pause).await;
                    }
                    Ok(())
                }
            }
        }

        fn reads(&self) -> Vec<UserId> {
            self.reads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AccountDataGateway for ProbeGateway {
        async fn deposits(
            &self,
            identity: &Identity,
            filter: &RecordFilter,
        ) -> Result<Vec<WalletTransaction>, GatewayError> {
            self.probe_wallet(identity).await?;
            self.inner.deposits(identity, filter).await
        }
        async fn withdrawals(
            &self,
            identity: &Identity,
            filter: &RecordFilter,
        ) -> Result<Vec<WalletTransaction>, GatewayError> {
            self.probe_wallet(identity).await?;
            self.inner.withdrawals(identity, filter).await
        }
        async fn balances(
            &self,
            identity: &Identity,
            filter: &RecordFilter,
        ) -> Result<Vec<Balance>, GatewayError> {
            self.probe_wallet(identity).await?;
            self.inner.balances(identity, filter).await
        }
        async fn orders(
            &self,
            identity: &Identity,
            filter: &RecordFilter,
        ) -> Result<Vec<Order>, GatewayError> {
            self.probe(identity).await?;
            self.inner.orders(identity, filter).await
        }
        async fn fills(
            &self,
            identity: &Identity,
            filter: &RecordFilter,
        ) -> Result<Vec<TradeFill>, GatewayError> {
            self.probe(identity).await?;
            self.inner.fills(identity, filter).await
        }
        async fn holdings(
            &self,
            identity: &Identity,
            filter: &RecordFilter,
        ) -> Result<Vec<Holding>, GatewayError> {
            self.probe(identity).await?;
            self.inner.holdings(identity, filter).await
        }
        async fn price_history(
            &self,
            identity: &Identity,
            filter: &RecordFilter,
        ) -> Result<Vec<PricePoint>, GatewayError> {
            self.probe(identity).await?;
            self.inner.price_history(identity, filter).await
        }
    }

    fn orchestrator(gateway: Arc<ProbeGateway>) -> ChatOrchestrator {
        let config = LedgerConfig::default();
        let sessions = Arc::new(SessionStore::new(config.auth.session_ttl_minutes));
        for seeded in Fixture::demo().unwrap().sessions {
            sessions.insert(seeded.token, UserId::new(seeded.user_id));
        }
        ChatOrchestrator::build(
            &config,
            gateway,
            Arc::new(KnowledgeStore::with_defaults()),
            None,
            sessions,
        )
    }

    fn demo() -> (ChatOrchestrator, Arc<ProbeGateway>) {
        let gateway = Arc::new(ProbeGateway::new(Mode::Pass));
        (orchestrator(gateway.clone()), gateway)
    }

    #[tokio::test]
    async fn test_total_deposits() {
        let (chat, _) = demo();
        let outcome = chat
            .handle(Some(DEMO_TOKEN), "What's my total deposit amount?")
            .await
            .unwrap();
        assert_eq!(outcome.state, RequestState::Completed);
        assert!(outcome.classification.contains(Intent::Wallet));
        assert_eq!(outcome.answer.status, AnswerStatus::Success);
        assert!(outcome.answer.answer.contains("400.00 INR"), "{}", outcome.answer.answer);
    }

    #[tokio::test]
    async fn test_combined_query_keeps_detection_order() {
        let (chat, _) = demo();
        let outcome = chat
            .handle(
                Some(DEMO_TOKEN),
                "What are the trading fees and how much have I paid?",
            )
            .await
            .unwrap();
        let intents: Vec<Intent> = outcome.fact_sets.iter().map(|s| s.intent).collect();
        assert_eq!(intents, vec![Intent::Fees, Intent::Trading]);
        assert!(outcome.fact_sets.iter().all(|s| s.hint.is_none()));
        assert!(outcome.answer.is_success());
    }

    #[tokio::test]
    async fn test_no_deposits_is_a_successful_answer() {
        let (chat, _) = demo();
        let outcome = chat
            .handle(Some(NEWCOMER_TOKEN), "What's my total deposit amount?")
            .await
            .unwrap();
        assert_eq!(outcome.fact_sets[0].hint, Some(FactHint::NoRecords));
        assert!(outcome.answer.is_success());
        assert!(outcome.answer.answer.contains("couldn't find any"));
    }

    #[tokio::test]
    async fn test_unclassified_asks_for_clarification() {
        let (chat, gateway) = demo();
        let outcome = chat.handle(Some(DEMO_TOKEN), "hello there").await.unwrap();
        assert!(outcome.classification.is_unclassified());
        assert!(outcome.fact_sets.is_empty());
        assert_eq!(outcome.state, RequestState::Completed);
        assert!(outcome.answer.answer.contains("rephrase"));
        assert!(gateway.reads().is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_never_dispatches() {
        let (chat, gateway) = demo();
        let err = chat
            .handle(None, "What's my total deposit amount?")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(AuthError::MissingToken)));
        let err = chat
            .handle(Some("not-a-token"), "What's my total deposit amount?")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(AuthError::UnknownToken)));
        assert!(gateway.reads().is_empty());
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let (chat, gateway) = demo();
        let token = chat
            .sessions()
            .issue_at(UserId::new("demo"), Utc::now() - ChronoDuration::hours(2));
        let answer = chat
            .respond(Some(token.as_str()), "What's my total deposit amount?")
            .await;
        assert_eq!(answer.status, AnswerStatus::Error);
        assert!(answer.answer.contains("expired"));
        assert!(gateway.reads().is_empty());
    }

    #[tokio::test]
    async fn test_query_validation() {
        let (chat, _) = demo();
        let err = chat.handle(Some(DEMO_TOKEN), "   ").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyQuery));

        let long = "a".repeat(LedgerConfig::default().classifier.max_query_length + 1);
        let err = chat.handle(Some(DEMO_TOKEN), &long).await.unwrap_err();
        assert!(matches!(err, ChatError::QueryTooLong(_)));
    }

    #[tokio::test]
    async fn test_reads_only_the_callers_records() {
        let (chat, gateway) = demo();
        chat.handle(
            Some(NEWCOMER_TOKEN),
            "Show my deposits, my trades and my portfolio",
        )
        .await
        .unwrap();
        let reads = gateway.reads();
        assert!(!reads.is_empty());
        assert!(reads.iter().all(|user| user.as_str() == "newcomer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_stay_isolated() {
        let gateway = Arc::new(ProbeGateway::new(Mode::SlowUser("demo")));
        let chat = orchestrator(gateway.clone());
        let question = "What's my total deposit amount and my portfolio?";

        let (demo, newcomer) = tokio::join!(
            chat.handle(Some(DEMO_TOKEN), question),
            chat.handle(Some(NEWCOMER_TOKEN), question),
        );
        let (demo, newcomer) = (demo.unwrap(), newcomer.unwrap());

        assert!(demo.answer.answer.contains("400.00 INR"), "{}", demo.answer.answer);
        assert!(demo.fact_sets.iter().all(|s| s.hint.is_none()));
        assert!(newcomer
            .fact_sets
            .iter()
            .all(|s| s.hint == Some(FactHint::NoRecords)));
        assert!(!newcomer.answer.answer.contains("400.00"));
        assert_ne!(demo.request_id, newcomer.request_id);

        let reads = gateway.reads();
        let by = |user: &str| reads.iter().filter(|u| u.as_str() == user).count();
        assert!(by("demo") > 0);
        assert_eq!(by("demo"), by("newcomer"));
        assert_eq!(by("demo") + by("newcomer"), reads.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fact_sets_follow_detection_not_completion() {
        let chat = orchestrator(Arc::new(ProbeGateway::new(Mode::SlowWallet)));
        let outcome = chat
            .handle(
                Some(DEMO_TOKEN),
                "What's my total deposit amount, and what are the futures fees?",
            )
            .await
            .unwrap();

        let detected: Vec<Intent> = outcome
            .classification
            .intents()
            .iter()
            .map(|c| c.intent)
            .collect();
        let answered: Vec<Intent> = outcome.fact_sets.iter().map(|s| s.intent).collect();
        // The wallet set resolves last but is still answered first.
        assert_eq!(answered.first(), Some(&Intent::Wallet));
        assert!(answered.contains(&Intent::Fees));
        assert_eq!(answered, detected);
        assert!(outcome.fact_sets.iter().all(|s| s.hint.is_none()));
        let wallet = outcome.answer.answer.find("400.00 INR").unwrap();
        assert!(outcome.answer.answer[wallet..].to_lowercase().contains("futures"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let chat = orchestrator(Arc::new(ProbeGateway::new(Mode::Slow)));
        let outcome = chat
            .handle(Some(DEMO_TOKEN), "What's my total deposit amount?")
            .await
            .unwrap();
        assert_eq!(outcome.fact_sets[0].hint, Some(FactHint::Unavailable));
        assert!(outcome.answer.is_success());
        assert!(outcome.answer.answer.contains("right now"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_source_does_not_sink_siblings() {
        let chat = orchestrator(Arc::new(ProbeGateway::new(Mode::Down)));
        let outcome = chat
            .handle(
                Some(DEMO_TOKEN),
                "What are the trading fees and how much have I paid?",
            )
            .await
            .unwrap();
        assert_eq!(outcome.fact_sets.len(), 2);
        assert!(outcome.fact_sets[0].hint.is_none());
        assert!(!outcome.fact_sets[0].facts.is_empty());
        assert_eq!(outcome.fact_sets[1].hint, Some(FactHint::Unavailable));
        assert!(outcome.answer.is_success());
    }

    #[tokio::test]
    async fn test_missing_handler_is_unavailable() {
        let config = LedgerConfig::default();
        let sessions = Arc::new(SessionStore::new(60));
        let chat = ChatOrchestrator::new(
            &config,
            HandlerRegistry::new(),
            ResponseComposer::new(&config.composer),
            sessions,
        );
        let query = Query::new(
            "What's my total deposit amount?",
            Identity::new(UserId::new("demo")),
        );
        let outcome = chat.handle_query(query).await.unwrap();
        assert_eq!(outcome.fact_sets[0].hint, Some(FactHint::Unavailable));
        assert_eq!(outcome.state, RequestState::Completed);
    }

    #[tokio::test]
    async fn test_same_question_same_answer() {
        let (chat, _) = demo();
        let question = "How much BTC have I bought?";
        let first = chat.respond(Some(DEMO_TOKEN), question).await;
        let second = chat.respond(Some(DEMO_TOKEN), question).await;
        assert_eq!(first, second);
    }
}

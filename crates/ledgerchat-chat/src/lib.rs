//! Query understanding and response routing for ledgerchat.
//!
//! Classifies free-form questions into domain intents, dispatches them to
//! domain handlers concurrently, and composes the resulting fact sets into a
//! single answer.

pub mod backend;
pub mod classifier;
pub mod composer;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod orchestrator;
pub mod session;

pub use backend::{OpenAiBackend, TextBackend};
pub use classifier::IntentClassifier;
pub use composer::ResponseComposer;
pub use error::{AuthError, BackendError, ChatError};
pub use handlers::{DomainHandler, HandlerRegistry};
pub use lifecycle::{RequestLifecycle, RequestState};
pub use orchestrator::{ChatOrchestrator, ChatOutcome};
pub use session::SessionStore;

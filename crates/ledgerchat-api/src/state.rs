//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use ledgerchat_chat::ChatOrchestrator;
use ledgerchat_core::config::LedgerConfig;

/// Shared application state, cloned into each handler task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LedgerConfig>,
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: LedgerConfig, orchestrator: ChatOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            start_time: Instant::now(),
        }
    }
}

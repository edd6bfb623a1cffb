//! Per-request state machine with validated transitions.
//!
//! Received -> Classifying -> Dispatching -> Composing -> Completed
//! Any non-terminal state -> Failed

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::ChatError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    Classifying,
    Dispatching,
    Composing,
    Completed,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

/// Validate that a request state transition is allowed.
///
/// Valid transitions:
/// - Received -> Classifying
/// - Classifying -> Dispatching
/// - Classifying -> Composing (nothing to dispatch)
/// - Dispatching -> Composing
/// - Composing -> Completed
/// - any non-terminal state -> Failed
pub fn validate_transition(from: RequestState, to: RequestState) -> Result<(), ChatError> {
    let valid = matches!(
        (from, to),
        (RequestState::Received, RequestState::Classifying)
            | (RequestState::Classifying, RequestState::Dispatching)
            | (RequestState::Classifying, RequestState::Composing)
            | (RequestState::Dispatching, RequestState::Composing)
            | (RequestState::Composing, RequestState::Completed)
    ) || (to == RequestState::Failed && !from.is_terminal());

    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition { from, to })
    }
}

/// Tracks one request through its states.
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    request_id: Uuid,
    state: RequestState,
    history: Vec<RequestState>,
}

impl RequestLifecycle {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: RequestState::Received,
            history: vec![RequestState::Received],
        }
    }

    pub fn advance(&mut self, to: RequestState) -> Result<(), ChatError> {
        validate_transition(self.state, to)?;
        debug!(request_id = %self.request_id, from = ?self.state, to = ?to, "Request transition");
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn history(&self) -> &[RequestState] {
        &self.history
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

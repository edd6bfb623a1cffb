//! Error types for the chat pipeline.

use ledgerchat_core::error::LedgerError;
use ledgerchat_core::types::Answer;

use crate::lifecycle::RequestState;

/// Why a caller could not be identified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing session token")]
    MissingToken,
    #[error("unknown session token")]
    UnknownToken,
    #[error("session has expired")]
    Expired,
}

/// Errors from the generative text backend. Never surfaced to users.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(String),
    #[error("backend returned an empty response")]
    EmptyResponse,
    #[error("backend misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Http(err.to_string())
    }
}

/// Request-level failures. Each one ends the request in `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("query exceeds maximum length of {0} characters")]
    QueryTooLong(usize),
    #[error("invalid request transition from {from:?} to {to:?}")]
    InvalidTransition { from: RequestState, to: RequestState },
}

impl ChatError {
    /// The complete error reply sent to the client.
    pub fn to_answer(&self) -> Answer {
        let text = match self {
            ChatError::Unauthorized(AuthError::Expired) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ChatError::Unauthorized(_) => {
                "You need to be signed in to ask about your account.".to_string()
            }
            ChatError::EmptyQuery => "Please type a question.".to_string(),
            ChatError::QueryTooLong(max) => {
                format!("Your question is too long. Please keep it under {max} characters.")
            }
            ChatError::InvalidTransition { .. } => {
                "Something went wrong while handling your question.".to_string()
            }
        };
        Answer::error(text)
    }
}

impl From<BackendError> for LedgerError {
    fn from(err: BackendError) -> Self {
        LedgerError::Backend(err.to_string())
    }
}

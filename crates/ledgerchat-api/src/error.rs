//! API error responses.
//!
//! Every failure is answered with the same complete body as a successful
//! chat reply, `{ "answer": ..., "status": "error" }`, under a matching
//! HTTP status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use ledgerchat_chat::ChatError;
use ledgerchat_core::types::Answer;

#[derive(Debug)]
pub enum ApiError {
    /// 400 - malformed body or invalid parameters.
    BadRequest(String),
    /// 404 - endpoint disabled or unknown.
    NotFound(String),
    /// 500 - unexpected server error.
    Internal(String),
    /// Request rejected by the chat pipeline.
    Chat(ChatError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Chat(ChatError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Chat(ChatError::EmptyQuery | ChatError::QueryTooLong(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Chat(ChatError::InvalidTransition { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_answer(&self) -> Answer {
        match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => Answer::error(msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                Answer::error("Something went wrong while handling your request.")
            }
            ApiError::Chat(err) => err.to_answer(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidTransition { .. } => ApiError::Internal(err.to_string()),
            err => ApiError::Chat(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_answer())).into_response()
    }
}

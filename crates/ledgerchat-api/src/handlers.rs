//! Route handler functions.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use serde::{Deserialize, Serialize};

use ledgerchat_core::types::{Answer, UserId};

use crate::auth::{session_cookie, SessionToken};
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request and response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
    pub backend: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub expires_in_minutes: u64,
}

// =============================================================================
// Handler functions
// =============================================================================

/// POST /chat - answer one question for the session holder.
pub async fn chat(
    State(state): State<AppState>,
    token: SessionToken,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Json(request) = body.map_err(|e| {
        tracing::debug!("Rejected chat body: {e}");
        ApiError::BadRequest("Request body must be JSON like {\"query\": \"...\"}.".to_string())
    })?;

    let outcome = state
        .orchestrator
        .handle(token.as_deref(), &request.query)
        .await?;
    Ok(Json(outcome.answer))
}

/// GET /health - liveness and basic counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.orchestrator.sessions().len(),
        backend: state.config.backend.provider != "none",
    })
}

/// POST /auth/login - issue a session for a user id. Development only.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.config.auth.allow_dev_login {
        return Err(ApiError::NotFound("Login is not enabled.".to_string()));
    }
    let Json(request) = body.map_err(|_| {
        ApiError::BadRequest("Request body must be JSON like {\"user_id\": \"...\"}.".to_string())
    })?;
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty.".to_string()));
    }

    let ttl = state.config.auth.session_ttl_minutes;
    let token = state.orchestrator.sessions().issue(UserId::new(user_id));
    tracing::info!(user = user_id, "Development session issued");

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie(&token, ttl))]),
        Json(LoginResponse {
            token,
            user_id: user_id.to_string(),
            expires_in_minutes: ttl,
        }),
    ))
}

/// POST /auth/logout - revoke the presented session.
pub async fn logout(State(state): State<AppState>, token: SessionToken) -> StatusCode {
    if let Some(token) = token.as_deref() {
        if state.orchestrator.sessions().revoke(token) {
            tracing::info!("Session revoked");
        }
    }
    StatusCode::NO_CONTENT
}

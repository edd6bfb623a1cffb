//! ledgerchat API crate - axum HTTP surface for the chat orchestrator.
//!
//! Exposes `POST /chat` (one question in, one answer out), `GET /health`,
//! and session endpoints for local development.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;

//! Liveness probe.

use crate::state::AppState;
use axum::{routing::get, Router};

/// Registers `/health`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Answers `OK` while the process serves requests. The backend is never contacted, so
/// the relay stays "healthy" while the backend is down and relayed calls return 502.
async fn health_check() -> &'static str {
    "OK"
}

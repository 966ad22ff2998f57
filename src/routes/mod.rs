//! HTTP route definitions and handlers.
//!
//! This module organizes all HTTP endpoints into logical groups:
//! session endpoints, the authenticated relay, and health checks. The page guard and
//! request tracing wrap every route.

mod auth_routes;
mod guard;
mod health_routes;
mod proxy_routes;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::http_helpers::HTTPError;

pub use guard::requires_session;

/// Creates the application router with all configured routes.
///
/// Combines all route modules into a single router and attaches
/// the application state for access in handlers.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(auth_routes::routes())
        .merge(proxy_routes::routes(&state.config))
        .merge(health_routes::routes())
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), guard::page_guard))
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

async fn not_found() -> HTTPError {
    HTTPError::new(StatusCode::NOT_FOUND, "Not found")
}

/// Runs each request inside a span carrying a fresh request id.
async fn trace_request(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    async move {
        let response = next.run(request).await.into_response();
        info!(status = response.status().as_u16(), "request completed");
        response
    }
    .instrument(span)
    .await
}

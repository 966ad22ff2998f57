//! Session endpoints: login, logout and explicit refresh.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::backend::{LoginError, LoginRequest, RefreshError};
use crate::session::RequestContext;
use crate::state::AppState;
use crate::utils::http_helpers::HTTPError;

/// Registers session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/refresh", post(refresh))
}

/// Exchanges `{ email, password }` for session cookies.
async fn login(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Json(credentials): Json<LoginRequest>,
) -> Result<(RequestContext, Json<Value>), HTTPError> {
    state
        .login
        .login(&mut ctx, &credentials)
        .await
        .map_err(map_login_error)?;
    Ok((ctx, Json(json!({ "ok": true }))))
}

/// Clears both session cookies. Succeeds whether or not a session existed.
async fn logout(State(state): State<AppState>, mut ctx: RequestContext) -> (RequestContext, Json<Value>) {
    state.cookies.clear_tokens(&mut ctx);
    info!(
        event_name = "auth.logout",
        event_domain = "auth",
        "session cookies cleared"
    );
    (ctx, Json(json!({ "ok": true })))
}

/// Rotates the session with the refresh cookie and returns the new access token.
async fn refresh(
    State(state): State<AppState>,
    mut ctx: RequestContext,
) -> Result<(RequestContext, Json<Value>), HTTPError> {
    let pair = state
        .refresher
        .refresh(&mut ctx)
        .await
        .map_err(map_refresh_error)?;
    Ok((ctx, Json(json!({ "ok": true, "accessToken": pair.access }))))
}

fn map_login_error(e: LoginError) -> HTTPError {
    match e {
        LoginError::InvalidCredentials(_) => {
            HTTPError::new(StatusCode::UNAUTHORIZED, "Invalid credentials")
        }
        LoginError::InvalidResponse(_) => {
            HTTPError::new(StatusCode::INTERNAL_SERVER_ERROR, "Invalid login response")
        }
        LoginError::UpstreamUnreachable(_) => {
            HTTPError::new(StatusCode::BAD_GATEWAY, "Backend unreachable")
        }
    }
}

fn map_refresh_error(e: RefreshError) -> HTTPError {
    match e {
        RefreshError::NoRefreshToken => HTTPError::new(StatusCode::UNAUTHORIZED, "No refresh token"),
        RefreshError::RefreshRejected(_) => HTTPError::new(StatusCode::UNAUTHORIZED, "Refresh failed"),
        RefreshError::InvalidRefreshResponse(_) => {
            HTTPError::new(StatusCode::UNAUTHORIZED, "Invalid refresh response")
        }
        RefreshError::UpstreamUnreachable(_) => {
            HTTPError::new(StatusCode::BAD_GATEWAY, "Backend unreachable")
        }
    }
}

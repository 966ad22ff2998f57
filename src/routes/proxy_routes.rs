//! The authenticated relay: the catch-all under the proxy prefix plus a few named routes.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, RawQuery, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::backend::ProxyRequest;
use crate::config::ConfigV1;
use crate::session::RequestContext;
use crate::state::AppState;

/// Registers the relay routes. The catch-all lives under `config.proxy.prefix`.
pub fn routes(config: &ConfigV1) -> Router<AppState> {
    let catch_all = format!("{}/{{*path}}", config.proxy.prefix.trim_end_matches('/'));
    Router::new()
        .route(
            &catch_all,
            get(relay)
                .post(relay)
                .put(relay)
                .patch(relay)
                .delete(relay)
                .options(relay),
        )
        .route("/api/me", get(current_user))
        .route("/api/admins", get(list_admins))
        .layer(DefaultBodyLimit::max(config.proxy.max_body_bytes))
}

/// `ANY {prefix}/{*path}` → `{backend}/{path}{query}`.
async fn relay(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    method: Method,
    ctx: RequestContext,
    body: Bytes,
) -> Response {
    let request = ProxyRequest::new(method, path, query, ctx.headers().clone(), body);
    run(&state, ctx, request).await
}

/// The signed-in admin's roles and permissions.
async fn current_user(State(state): State<AppState>, ctx: RequestContext) -> Response {
    let request = ProxyRequest::new(
        Method::GET,
        "platform/rbac/current",
        None,
        ctx.headers().clone(),
        Bytes::new(),
    );
    run(&state, ctx, request).await
}

/// Platform admins; paging and filters are passed through.
async fn list_admins(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    ctx: RequestContext,
) -> Response {
    let request = ProxyRequest::new(
        Method::GET,
        "platform/admins",
        query,
        ctx.headers().clone(),
        Bytes::new(),
    );
    run(&state, ctx, request).await
}

async fn run(state: &AppState, mut ctx: RequestContext, request: ProxyRequest) -> Response {
    match state.proxy.handle(&mut ctx, &request).await {
        Ok(outcome) => (ctx, outcome).into_response(),
        Err(e) => (ctx, e).into_response(),
    }
}

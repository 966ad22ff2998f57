use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::info;

use crate::config::ConfigV1;
use crate::proxy::login_location;
use crate::state::AppState;

/// Whether `path` is a dashboard page that needs a signed-in session.
///
/// `/` protects only the root; any other prefix `p` protects `p` and `p/...`.
/// API routes and the login page are never guarded.
pub fn requires_session(path: &str, config: &ConfigV1) -> bool {
    if path == "/api" || path.starts_with("/api/") {
        return false;
    }
    let login_page = config.proxy.login_page.as_str();
    if path == login_page || path.starts_with(&format!("{}/", login_page)) {
        return false;
    }
    config.protected_pages.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            path == "/"
        } else {
            path == prefix || path.starts_with(&format!("{}/", prefix))
        }
    })
}

/// Sends anonymous visitors of protected pages to the login page, remembering where they were.
pub async fn page_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if requires_session(path, &state.config) && !state.cookies.has_access_cookie(request.headers()) {
        let location = login_location(&state.config.proxy.login_page, path);
        info!(
            event_name = "guard.redirect.login",
            event_domain = "guard",
            path,
            "anonymous request for protected page"
        );
        return Redirect::temporary(&location).into_response();
    }
    next.run(request).await
}

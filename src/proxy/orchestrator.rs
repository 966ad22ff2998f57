use std::sync::Arc;
use std::time::Duration;

use axum::response::{IntoResponse, Redirect, Response};
use http::StatusCode;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use super::state::{transition, ProxyAction, ProxyEvent, ProxyState};
use crate::backend::{ForwardError, Forwarder, ProxyAttempt, ProxyRequest, RefreshClient, RefreshError};
use crate::session::RequestContext;
use crate::utils::http_helpers::HTTPError;
use crate::utils::log_throttle::LogThrottle;

const UNREACHABLE_LOG_WINDOW: Duration = Duration::from_secs(30);

/// How a relayed request ends, as seen by the browser.
#[derive(Debug)]
pub enum ProxyOutcome {
    /// The backend's response, verbatim.
    Response(ProxyAttempt),
    /// The session could not be recovered; send the browser to the login page.
    RedirectToLogin { location: String },
}

impl IntoResponse for ProxyOutcome {
    fn into_response(self) -> Response {
        match self {
            ProxyOutcome::Response(attempt) => attempt.into_response(),
            ProxyOutcome::RedirectToLogin { location } => {
                Redirect::temporary(&location).into_response()
            }
        }
    }
}

/// Failures that are not about authentication: the backend could not be reached.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Forward(#[from] ForwardError),
    #[error("{0}")]
    Refresh(RefreshError),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        HTTPError::new(StatusCode::BAD_GATEWAY, "Backend unreachable").into_response()
    }
}

/// Drives one inbound request through forward, refresh-on-401 and a single retry.
pub struct ProxyOrchestrator {
    forwarder: Arc<Forwarder>,
    refresher: Arc<RefreshClient>,
    login_page: String,
    throttle: LogThrottle,
}

impl ProxyOrchestrator {
    pub fn new(
        forwarder: Arc<Forwarder>,
        refresher: Arc<RefreshClient>,
        login_page: impl Into<String>,
    ) -> Self {
        Self {
            forwarder,
            refresher,
            login_page: login_page.into(),
            throttle: LogThrottle::new(UNREACHABLE_LOG_WINDOW),
        }
    }

    /// Relays `request`. Refreshed cookies, if any, are written into `ctx`.
    ///
    /// A backend 401 never reaches the caller: it is either recovered by one refresh and
    /// retry, or turned into a redirect to the login page.
    pub async fn handle(
        &self,
        ctx: &mut RequestContext,
        request: &ProxyRequest,
    ) -> Result<ProxyOutcome, ProxyError> {
        let mut state = ProxyState::Attempting;

        while let Some(action) = state.action() {
            let event = match action {
                ProxyAction::Forward { access_override } => ProxyEvent::Forwarded(
                    self.forward(ctx, request, access_override.as_deref()).await?,
                ),
                ProxyAction::Refresh => {
                    info!(
                        event_name = "proxy.attempt.unauthorized",
                        event_domain = "proxy",
                        path = request.path.as_str(),
                        "backend answered 401, refreshing session"
                    );
                    match self.refresher.refresh(ctx).await {
                        Ok(pair) => ProxyEvent::Refreshed(pair),
                        Err(RefreshError::UpstreamUnreachable(reason)) => {
                            self.log_unreachable("refresh", &reason);
                            return Err(ProxyError::Refresh(RefreshError::UpstreamUnreachable(
                                reason,
                            )));
                        }
                        Err(error) => {
                            info!(
                                event_name = "proxy.refresh.failed",
                                event_domain = "proxy",
                                reason = %error,
                                "session refresh failed"
                            );
                            ProxyEvent::RefreshFailed(error)
                        }
                    }
                }
            };

            let previous = state.name();
            state = transition(state, event);
            debug!(from = previous, to = state.name(), "proxy state transition");
        }

        match state {
            ProxyState::Succeeded(attempt) => Ok(ProxyOutcome::Response(attempt)),
            _ => {
                let location = self.login_location(&request.path);
                info!(
                    event_name = "proxy.redirect.login",
                    event_domain = "proxy",
                    path = request.path.as_str(),
                    inbound_path = ctx.path(),
                    "redirecting to login"
                );
                Ok(ProxyOutcome::RedirectToLogin { location })
            }
        }
    }

    /// `{login_page}?next=<path>`, with the path form-encoded.
    pub fn login_location(&self, next: &str) -> String {
        login_location(&self.login_page, next)
    }

    async fn forward(
        &self,
        ctx: &RequestContext,
        request: &ProxyRequest,
        access_override: Option<&str>,
    ) -> Result<ProxyAttempt, ProxyError> {
        self.forwarder
            .forward(ctx, request, access_override)
            .await
            .map_err(|e| {
                self.log_unreachable("forward", &e.to_string());
                ProxyError::from(e)
            })
    }

    fn log_unreachable(&self, stage: &str, reason: &str) {
        if let Some(suppressed_count) = self.throttle.should_emit(stage) {
            warn!(
                event_name = "proxy.upstream.unreachable",
                event_domain = "proxy",
                stage,
                reason,
                suppressed_count,
                "backend unreachable"
            );
        }
    }
}

/// Builds the login redirect target for `next`.
pub fn login_location(login_page: &str, next: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    format!("{}?{}", login_page, query)
}

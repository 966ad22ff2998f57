//! Shared application state.
//!
//! Contains the state that is shared across all request handlers: configuration,
//! cookie settings and the backend clients. Nothing here is per-session.

use crate::backend::{LoginClient, RefreshClient};
use crate::config::ConfigV1;
use crate::proxy::ProxyOrchestrator;
use crate::session::CookieStore;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// Names and attributes of the session cookies.
    pub cookies: CookieStore,
    pub login: Arc<LoginClient>,
    pub refresher: Arc<RefreshClient>,
    /// Relay used by the catch-all and the named proxy routes.
    pub proxy: Arc<ProxyOrchestrator>,
}

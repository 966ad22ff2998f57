//! Application startup and server initialization.
//!
//! This module wires the backend clients, the cookie store and the relay into
//! [`AppState`], then binds the listener and serves the router.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::backend::{backend_url, build_client, Forwarder, LoginClient, RefreshClient};
use crate::config::{ConfigError, ConfigV1};
use crate::proxy::ProxyOrchestrator;
use crate::routes;
use crate::session::CookieStore;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid backend endpoint '{path}': {source}")]
    Endpoint {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("could not build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("could not bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Builds the shared state from a validated configuration.
pub fn build_state(config: Arc<ConfigV1>) -> Result<AppState, StartupError> {
    let base = config.backend_base()?;
    let client = build_client(&config)?;
    let cookies = CookieStore::new(&config.cookies, config.secure_cookies());

    let endpoint = |path: &str| {
        backend_url(&base, path, None).map_err(|source| StartupError::Endpoint {
            path: path.to_string(),
            source,
        })
    };
    let login_url = endpoint(&config.backend_paths.login)?;
    let refresh_url = endpoint(&config.backend_paths.refresh)?;

    let forwarder = Arc::new(Forwarder::new(client.clone(), base.clone(), cookies.clone()));
    let refresher = Arc::new(RefreshClient::new(client.clone(), refresh_url, cookies.clone()));
    let login = Arc::new(LoginClient::new(client, login_url, cookies.clone()));
    let proxy = Arc::new(ProxyOrchestrator::new(
        forwarder,
        refresher.clone(),
        config.proxy.login_page.clone(),
    ));

    Ok(AppState {
        config,
        cookies,
        login,
        refresher,
        proxy,
    })
}

/// Initializes and runs the application server.
///
/// Binds to the address specified in the configuration and serves until the
/// listener fails.
///
/// # Errors
///
/// Returns an error if the state cannot be built, the server fails to bind to
/// the specified address, or encounters a runtime error during execution.
pub async fn run(config: Arc<ConfigV1>) -> Result<(), StartupError> {
    let state = build_state(config.clone())?;
    let app = routes::create_router(state);

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.bind_address.clone(),
            source,
        })?;

    info!(
        event_name = "startup.listening",
        event_domain = "startup",
        bind_address = config.bind_address.as_str(),
        backend_url = config.backend_url.as_str(),
        environment = ?config.environment,
        "Starting server"
    );

    axum::serve(listener, app).await.map_err(StartupError::Serve)
}

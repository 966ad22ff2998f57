//! Outbound calls to the backend API: request relay, token refresh and login.

pub mod client;
pub mod forwarder;
pub mod login;
pub mod refresh;
pub mod tokens;

pub use client::{backend_url, build_client};
pub use forwarder::{ForwardError, Forwarder, ProxyAttempt, ProxyRequest};
pub use login::{LoginClient, LoginError, LoginRequest};
pub use refresh::{RefreshClient, RefreshError};
pub use tokens::TokenPair;

use std::fmt;

use http::StatusCode;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::tokens::TokenPair;
use crate::config::{ACCESS_TOKEN_TTL_SECONDS, REFRESH_TOKEN_TTL_SECONDS};
use crate::session::{CookieStore, RequestContext};

/// Credentials posted by the login form.
#[derive(Deserialize, Serialize, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Invalid credentials")]
    InvalidCredentials(StatusCode),
    #[error("Invalid login response: {0}")]
    InvalidResponse(String),
    #[error("Backend unreachable during login: {0}")]
    UpstreamUnreachable(String),
}

/// Exchanges credentials for a token pair at the backend's login endpoint.
pub struct LoginClient {
    client: Client,
    url: Url,
    cookies: CookieStore,
}

impl LoginClient {
    pub fn new(client: Client, url: Url, cookies: CookieStore) -> Self {
        Self {
            client,
            url,
            cookies,
        }
    }

    /// Logs in and stores the new session cookies in `ctx`.
    pub async fn login(
        &self,
        ctx: &mut RequestContext,
        credentials: &LoginRequest,
    ) -> Result<TokenPair, LoginError> {
        debug!(email = credentials.email.as_str(), "Sending login request to: {}", self.url);

        let response = self
            .client
            .post(self.url.clone())
            .json(credentials)
            .send()
            .await
            .map_err(|e| LoginError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            info!(
                event_name = "auth.login.rejected",
                event_domain = "auth",
                status = status.as_u16(),
                "backend rejected login"
            );
            return Err(LoginError::InvalidCredentials(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| LoginError::UpstreamUnreachable(e.to_string()))?;
        let pair = TokenPair::decode(&body).map_err(|reason| {
            warn!(
                event_name = "auth.login.invalid_response",
                event_domain = "auth",
                reason = reason.as_str(),
                "backend login response is missing tokens"
            );
            LoginError::InvalidResponse(reason)
        })?;

        self.cookies.set_tokens(
            ctx,
            &pair.access,
            ACCESS_TOKEN_TTL_SECONDS,
            &pair.refresh,
            REFRESH_TOKEN_TTL_SECONDS,
        );
        info!(
            event_name = "auth.login.succeeded",
            event_domain = "auth",
            email = credentials.email.as_str(),
            "user logged in"
        );
        Ok(pair)
    }
}

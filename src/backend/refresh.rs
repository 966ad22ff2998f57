//! Token refresh against the backend's refresh endpoint.
//!
//! Concurrent refreshes of the same refresh token are collapsed into a single backend
//! call (single-flight): the first caller performs the request, every other caller awaits
//! its result. Each caller then writes the new pair into its own [`RequestContext`], so
//! every concurrent response carries the rotated cookies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use http::StatusCode;
use reqwest::Client;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

use super::tokens::TokenPair;
use crate::config::{ACCESS_TOKEN_TTL_SECONDS, REFRESH_TOKEN_TTL_SECONDS};
use crate::session::{CookieStore, RequestContext};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("No refresh token")]
    NoRefreshToken,
    #[error("Refresh failed with status {0}")]
    RefreshRejected(StatusCode),
    #[error("Invalid refresh response: {0}")]
    InvalidRefreshResponse(String),
    #[error("Backend unreachable during refresh: {0}")]
    UpstreamUnreachable(String),
}

type Flight = Arc<OnceCell<Result<TokenPair, RefreshError>>>;

/// Removes its flight from the in-flight map on drop, unless a newer flight replaced it.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<String, Flight>>,
    key: &'a str,
    flight: Flight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.flight))
        {
            in_flight.remove(self.key);
        }
    }
}

pub struct RefreshClient {
    client: Client,
    url: Url,
    cookies: CookieStore,
    in_flight: Mutex<HashMap<String, Flight>>,
}

impl RefreshClient {
    pub fn new(client: Client, url: Url, cookies: CookieStore) -> Self {
        Self {
            client,
            url,
            cookies,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Mints a new token pair from the session's refresh cookie and stores it in `ctx`.
    ///
    /// Fails with [`RefreshError::NoRefreshToken`] without any network call when the
    /// refresh cookie is absent.
    pub async fn refresh(&self, ctx: &mut RequestContext) -> Result<TokenPair, RefreshError> {
        let refresh_token = self
            .cookies
            .refresh_token(ctx)
            .ok_or(RefreshError::NoRefreshToken)?;

        let pair = self.single_flight(&refresh_token).await?;

        self.cookies.set_tokens(
            ctx,
            &pair.access,
            ACCESS_TOKEN_TTL_SECONDS,
            &pair.refresh,
            REFRESH_TOKEN_TTL_SECONDS,
        );
        Ok(pair)
    }

    async fn single_flight(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let flight = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(refresh_token) {
                Some(flight) => {
                    debug!("joining in-flight token refresh");
                    flight.clone()
                }
                None => {
                    let flight = Flight::default();
                    in_flight.insert(refresh_token.to_string(), flight.clone());
                    flight
                }
            }
        };

        // Forget the flight once this caller is done with it, including when the caller is
        // cancelled mid-call, so a later refresh with this token asks the backend again.
        let _guard = FlightGuard {
            in_flight: &self.in_flight,
            key: refresh_token,
            flight: flight.clone(),
        };

        let result = flight
            .get_or_init(|| self.request_new_pair(refresh_token))
            .await
            .clone();
        result
    }

    async fn request_new_pair(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        debug!("Sending token refresh request to: {}", self.url);

        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({ "refresh": refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            info!(
                event_name = "auth.refresh.rejected",
                event_domain = "auth",
                status = status.as_u16(),
                "backend rejected refresh token"
            );
            return Err(RefreshError::RefreshRejected(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RefreshError::UpstreamUnreachable(e.to_string()))?;

        TokenPair::decode(&body).map_err(|reason| {
            warn!(
                event_name = "auth.refresh.invalid_response",
                event_domain = "auth",
                reason = reason.as_str(),
                "backend refresh response is missing tokens"
            );
            RefreshError::InvalidRefreshResponse(reason)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CookieConfig;
    use http::header::COOKIE;
    use http::{HeaderMap, HeaderValue};
    use mockito::{Matcher, Server};
    use std::io::Write;
    use time::Duration;

    fn client(base: &str) -> RefreshClient {
        let url = Url::parse(base).unwrap().join("/auth/refresh").unwrap();
        RefreshClient::new(
            Client::new(),
            url,
            CookieStore::new(&CookieConfig::default(), false),
        )
    }

    fn ctx(cookie: Option<&str>) -> RequestContext {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        RequestContext::new("/api/auth/refresh", headers)
    }

    #[tokio::test]
    async fn no_refresh_cookie_fails_without_network_call() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/refresh")
            .expect(0)
            .create_async()
            .await;

        let mut ctx = ctx(Some("platform_jwt=expired"));
        let err = client(&server.url()).refresh(&mut ctx).await.unwrap_err();

        m.assert_async().await;
        assert_eq!(err, RefreshError::NoRefreshToken);
        assert!(ctx.written_cookies().is_empty());
    }

    #[tokio::test]
    async fn success_persists_new_pair_with_fixed_ttls() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/refresh")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({ "refresh": "old-refresh" })))
            .with_status(200)
            .with_body(r#"{"access":"new-access","refresh":"new-refresh"}"#)
            .create_async()
            .await;

        let mut ctx = ctx(Some("platform_refresh=old-refresh"));
        let pair = client(&server.url()).refresh(&mut ctx).await.unwrap();

        m.assert_async().await;
        assert_eq!(pair.access, "new-access");
        assert_eq!(pair.refresh, "new-refresh");

        let written = ctx.written_cookies();
        assert_eq!(written[0].name(), "platform_jwt");
        assert_eq!(written[0].value(), "new-access");
        assert_eq!(written[0].max_age(), Some(Duration::seconds(900)));
        assert_eq!(written[1].name(), "platform_refresh");
        assert_eq!(written[1].value(), "new-refresh");
        assert_eq!(written[1].max_age(), Some(Duration::seconds(2_592_000)));
    }

    #[tokio::test]
    async fn rejected_refresh_is_not_retried() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/refresh")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let mut ctx = ctx(Some("platform_refresh=revoked"));
        let err = client(&server.url()).refresh(&mut ctx).await.unwrap_err();

        m.assert_async().await;
        assert_eq!(err, RefreshError::RefreshRejected(StatusCode::UNAUTHORIZED));
        assert!(ctx.written_cookies().is_empty());
    }

    #[tokio::test]
    async fn missing_fields_are_an_invalid_response() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_body(r#"{"access":"only-access"}"#)
            .create_async()
            .await;

        let mut ctx = ctx(Some("platform_refresh=r"));
        let err = client(&server.url()).refresh(&mut ctx).await.unwrap_err();

        assert!(matches!(err, RefreshError::InvalidRefreshResponse(_)));
        assert!(ctx.written_cookies().is_empty());
    }

    #[tokio::test]
    async fn unreachable_backend_is_classified() {
        let mut ctx = ctx(Some("platform_refresh=r"));
        let err = client("http://127.0.0.1:1").refresh(&mut ctx).await.unwrap_err();
        assert!(matches!(err, RefreshError::UpstreamUnreachable(_)));
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_backend_call() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(std::time::Duration::from_millis(200));
                w.write_all(br#"{"access":"a2","refresh":"r2"}"#)
            })
            .expect(1)
            .create_async()
            .await;

        let refresher = client(&server.url());
        let mut first = ctx(Some("platform_refresh=shared"));
        let mut second = ctx(Some("platform_refresh=shared"));

        let (a, b) = tokio::join!(refresher.refresh(&mut first), refresher.refresh(&mut second));

        m.assert_async().await;
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(first.written_cookies()[0].value(), "a2");
        assert_eq!(second.written_cookies()[0].value(), "a2");
    }

    #[tokio::test]
    async fn finished_flights_are_not_reused() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_body(r#"{"access":"a","refresh":"r"}"#)
            .expect(2)
            .create_async()
            .await;

        let refresher = client(&server.url());
        refresher.refresh(&mut ctx(Some("platform_refresh=same"))).await.unwrap();
        refresher.refresh(&mut ctx(Some("platform_refresh=same"))).await.unwrap();

        m.assert_async().await;
    }

    #[tokio::test]
    async fn cancelled_refreshes_leave_no_flight_behind() {
        // Unpooled server: the abandoned slow requests must not leak into later tests.
        let mut server = Server::new_with_opts_async(mockito::ServerOpts::default()).await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(std::time::Duration::from_millis(300));
                w.write_all(br#"{"access":"a","refresh":"r"}"#)
            })
            .create_async()
            .await;

        let refresher = client(&server.url());
        for i in 0..5 {
            let cookie = format!("platform_refresh=token-{}", i);
            let mut ctx = ctx(Some(cookie.as_str()));
            let attempt = tokio::time::timeout(
                std::time::Duration::from_millis(50),
                refresher.refresh(&mut ctx),
            )
            .await;
            assert!(attempt.is_err(), "refresh should have been cut off");
            assert!(ctx.written_cookies().is_empty());
        }

        assert!(refresher.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finished_flights_leave_the_map_empty() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(401)
            .create_async()
            .await;

        let refresher = client(&server.url());
        let _ = refresher.refresh(&mut ctx(Some("platform_refresh=gone"))).await;

        assert!(refresher.in_flight.lock().unwrap().is_empty());
    }
}

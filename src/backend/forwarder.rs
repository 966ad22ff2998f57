use std::fmt;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::TryStreamExt;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, COOKIE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use super::client::backend_url;
use crate::session::{CookieStore, RequestContext};

/// Connection-scoped headers that must not cross the relay in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("backend unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
}

/// An inbound request to relay, with its body already buffered so it can be sent twice.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Backend path, relative to the backend base URL.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        query: Option<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            query,
            headers,
            body,
        }
    }

    fn carries_body(&self) -> bool {
        self.method != Method::GET && self.method != Method::HEAD
    }
}

/// The backend's answer to one forwarded request, relayed unmodified.
pub struct ProxyAttempt {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl fmt::Debug for ProxyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAttempt")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl ProxyAttempt {
    fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);
        let stream = response.bytes_stream().inspect_err(|e| {
            warn!(
                event_name = "proxy.response.stream_failed",
                event_domain = "proxy",
                error = %e,
                "backend response body failed mid-stream"
            )
        });
        Self {
            status,
            headers,
            body: Body::from_stream(stream),
        }
    }
}

impl IntoResponse for ProxyAttempt {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Relays requests to the backend, attaching the session's bearer token.
pub struct Forwarder {
    client: Client,
    base: Url,
    cookies: CookieStore,
}

impl Forwarder {
    pub fn new(client: Client, base: Url, cookies: CookieStore) -> Self {
        Self {
            client,
            base,
            cookies,
        }
    }

    /// Sends `request` to `{base}/{request.path}{query}`.
    ///
    /// The bearer token is `access_override` when given, otherwise the access cookie. With
    /// neither, the call goes out without `Authorization` and the backend decides.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        request: &ProxyRequest,
        access_override: Option<&str>,
    ) -> Result<ProxyAttempt, ForwardError> {
        let url = backend_url(&self.base, &request.path, request.query.as_deref())?;

        let mut headers = outbound_headers(&request.headers);
        let token = access_override
            .map(str::to_string)
            .or_else(|| self.cookies.access_token(ctx));
        if let Some(token) = token {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!(
                    event_name = "proxy.forward.invalid_token",
                    event_domain = "proxy",
                    "access token is not a valid header value; sending request without it"
                ),
            }
        }

        debug!(method = %request.method, path = %url.path(), "forwarding request to backend");

        let mut outbound = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);
        if request.carries_body() {
            outbound = outbound.body(request.body.clone());
        }

        let response = outbound.send().await?;
        Ok(ProxyAttempt::from_response(response))
    }
}

/// Copies inbound headers for the backend. Cookies and credentials never travel upstream,
/// and `host`/`content-length` are recomputed by the client.
fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in [COOKIE, HOST, AUTHORIZATION, CONTENT_LENGTH] {
        headers.remove(name);
    }
    strip_hop_by_hop(&mut headers);
    headers
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are connection-scoped too.
    let listed: Vec<HeaderName> = headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CookieConfig;
    use mockito::{Matcher, Server};

    fn forwarder(base: &str) -> Forwarder {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        Forwarder::new(
            client,
            Url::parse(base).unwrap(),
            CookieStore::new(&CookieConfig::default(), false),
        )
    }

    fn inbound(cookie: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers.insert("x-tenant", HeaderValue::from_static("acme"));
        if let Some(cookie) = cookie {
            headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        headers
    }

    fn get(path: &str, headers: HeaderMap) -> ProxyRequest {
        ProxyRequest::new(Method::GET, path, None, headers, Bytes::new())
    }

    async fn body_text(attempt: ProxyAttempt) -> String {
        let bytes = axum::body::to_bytes(attempt.body, usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn sends_cookie_token_as_bearer_and_never_the_cookie() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/products/42")
            .match_header("authorization", "Bearer cookie-token")
            .match_header("cookie", Matcher::Missing)
            .match_header("x-tenant", "acme")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":42}"#)
            .create_async()
            .await;

        let headers = inbound(Some("platform_jwt=cookie-token; theme=dark"));
        let ctx = RequestContext::new("/api/proxy/products/42", headers.clone());
        let attempt = forwarder(&server.url())
            .forward(&ctx, &get("products/42", headers), None)
            .await
            .unwrap();

        m.assert_async().await;
        assert_eq!(attempt.status, StatusCode::OK);
        assert_eq!(attempt.headers["content-type"], "application/json");
        assert_eq!(body_text(attempt).await, r#"{"id":42}"#);
    }

    #[tokio::test]
    async fn omits_authorization_without_a_token() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/me")
            .match_header("authorization", Matcher::Missing)
            .with_status(401)
            .create_async()
            .await;

        // A browser-supplied Authorization header is not a substitute for the cookie.
        let mut headers = inbound(None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer forged"));
        let ctx = RequestContext::new("/api/proxy/me", headers.clone());
        let attempt = forwarder(&server.url())
            .forward(&ctx, &get("me", headers), None)
            .await
            .unwrap();

        m.assert_async().await;
        assert_eq!(attempt.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn override_token_wins_over_cookie() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .create_async()
            .await;

        let headers = inbound(Some("platform_jwt=stale"));
        let ctx = RequestContext::new("/api/proxy/me", headers.clone());
        forwarder(&server.url())
            .forward(&ctx, &get("me", headers), Some("fresh"))
            .await
            .unwrap();

        m.assert_async().await;
    }

    #[tokio::test]
    async fn relays_method_query_and_body() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("PATCH", "/products/7")
            .match_query(Matcher::UrlEncoded("draft".into(), "true".into()))
            .match_body(r#"{"name":"Mug"}"#)
            .with_status(204)
            .create_async()
            .await;

        let headers = inbound(None);
        let ctx = RequestContext::new("/api/proxy/products/7", headers.clone());
        let request = ProxyRequest::new(
            Method::PATCH,
            "products/7",
            Some("draft=true".to_string()),
            headers,
            Bytes::from_static(br#"{"name":"Mug"}"#),
        );
        let attempt = forwarder(&server.url())
            .forward(&ctx, &request, None)
            .await
            .unwrap();

        m.assert_async().await;
        assert_eq!(attempt.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn redirects_pass_through_unfollowed() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/files/1")
            .with_status(302)
            .with_header("location", "https://cdn.example.com/1.png")
            .expect(1)
            .create_async()
            .await;

        let headers = inbound(None);
        let ctx = RequestContext::new("/api/proxy/files/1", headers.clone());
        let attempt = forwarder(&server.url())
            .forward(&ctx, &get("files/1", headers), None)
            .await
            .unwrap();

        m.assert_async().await;
        assert_eq!(attempt.status, StatusCode::FOUND);
        assert_eq!(attempt.headers["location"], "https://cdn.example.com/1.png");
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_error() {
        let headers = inbound(None);
        let ctx = RequestContext::new("/api/proxy/me", headers.clone());
        let err = forwarder("http://127.0.0.1:1")
            .forward(&ctx, &get("me", headers), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Unreachable(_)));
    }

    #[test]
    fn strips_connection_listed_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("close, x-private"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert("x-public", HeaderValue::from_static("1"));
        let out = outbound_headers(&headers);
        assert!(out.get("connection").is_none());
        assert!(out.get("x-private").is_none());
        assert!(out.get("x-public").is_some());
    }
}

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::response::{IntoResponseParts, ResponseParts};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use http::header::SET_COOKIE;
use http::request::Parts;
use http::{HeaderMap, HeaderValue};
use tracing::warn;

/// Everything a handler needs to know about the browser's request, passed explicitly
/// to the forwarder, the refresh client and the orchestrator.
///
/// Inbound cookies are read from the request's jar. Cookie writes are buffered here and
/// emitted as `Set-Cookie` headers when the context is returned from a handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    path: String,
    headers: HeaderMap,
    jar: CookieJar,
    written: Vec<Cookie<'static>>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, headers: HeaderMap) -> Self {
        let jar = CookieJar::from_headers(&headers);
        Self {
            path: path.into(),
            headers,
            jar,
            written: Vec::new(),
        }
    }

    /// Path of the inbound request, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Inbound headers, including `cookie`.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Current value of a cookie. Writes made during this request shadow the inbound value.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        match self.written.iter().find(|c| c.name() == name) {
            Some(cookie) => Some(cookie.value()),
            None => self.jar.get(name).map(|c| c.value()),
        }
    }

    /// Buffers a cookie write; a later write for the same name replaces the earlier one.
    pub fn write_cookie(&mut self, cookie: Cookie<'static>) {
        self.written.retain(|c| c.name() != cookie.name());
        self.written.push(cookie);
    }

    /// Cookies written during this request, in write order.
    pub fn written_cookies(&self) -> &[Cookie<'static>] {
        &self.written
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestContext::new(parts.uri.path(), parts.headers.clone()))
    }
}

impl IntoResponseParts for RequestContext {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for cookie in self.written {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    res.headers_mut().append(SET_COOKIE, value);
                }
                Err(_) => warn!(cookie = cookie.name(), "dropping cookie with invalid header value"),
            }
        }
        Ok(res)
    }
}

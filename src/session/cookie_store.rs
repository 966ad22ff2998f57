use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use http::HeaderMap;
use time::Duration;

use super::context::RequestContext;
use crate::config::CookieConfig;

/// Reads and writes the access/refresh token cookies on a [`RequestContext`].
///
/// A missing or empty cookie is reported as `None`; that is the normal state of an
/// anonymous or expired session, never an error.
#[derive(Debug, Clone)]
pub struct CookieStore {
    access_name: String,
    refresh_name: String,
    domain: Option<String>,
    secure: bool,
}

impl CookieStore {
    pub fn new(config: &CookieConfig, secure: bool) -> Self {
        Self {
            access_name: config.access_name.clone(),
            refresh_name: config.refresh_name.clone(),
            domain: config.domain.clone().filter(|d| !d.is_empty()),
            secure,
        }
    }

    pub fn access_name(&self) -> &str {
        &self.access_name
    }

    pub fn refresh_name(&self) -> &str {
        &self.refresh_name
    }

    pub fn access_token(&self, ctx: &RequestContext) -> Option<String> {
        non_empty(ctx.cookie(&self.access_name))
    }

    pub fn refresh_token(&self, ctx: &RequestContext) -> Option<String> {
        non_empty(ctx.cookie(&self.refresh_name))
    }

    /// Whether raw request headers carry a non-empty access cookie.
    pub fn has_access_cookie(&self, headers: &HeaderMap) -> bool {
        CookieJar::from_headers(headers)
            .get(&self.access_name)
            .is_some_and(|c| !c.value().is_empty())
    }

    /// Writes both token cookies, replacing whatever the browser currently holds.
    pub fn set_tokens(
        &self,
        ctx: &mut RequestContext,
        access: &str,
        access_ttl_seconds: i64,
        refresh: &str,
        refresh_ttl_seconds: i64,
    ) {
        ctx.write_cookie(self.build(&self.access_name, access, access_ttl_seconds));
        ctx.write_cookie(self.build(&self.refresh_name, refresh, refresh_ttl_seconds));
    }

    /// Expires both token cookies. Safe to call when neither exists.
    pub fn clear_tokens(&self, ctx: &mut RequestContext) {
        ctx.write_cookie(self.build(&self.access_name, "", 0));
        ctx.write_cookie(self.build(&self.refresh_name, "", 0));
    }

    fn build(&self, name: &str, value: &str, max_age_seconds: i64) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_string(), value.to_string()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .path("/")
            .max_age(Duration::seconds(max_age_seconds));
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

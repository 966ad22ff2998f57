use std::time::Duration;

use reqwest::{redirect, Client};
use url::Url;

use crate::config::ConfigV1;

/// Builds the HTTP client shared by every backend call.
///
/// Redirects are never followed: a 3xx from the backend is relayed to the browser as is.
pub fn build_client(config: &ConfigV1) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .redirect(redirect::Policy::none())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout_ms) = config.proxy.request_timeout_in_ms {
        builder = builder.timeout(Duration::from_millis(timeout_ms));
    }
    builder.build()
}

/// Joins `path` under `base` and appends the raw query string, if any.
///
/// Unlike `Url::join`, a path component in `base` is always kept.
pub fn backend_url(base: &Url, path: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
    let mut target = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }
    Url::parse(&target)
}

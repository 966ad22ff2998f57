#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request};
use axum::response::Response;
use axum::Router;
use dashgate::config::{extract_config, ConfigV1};
use dashgate::routes::create_router;
use dashgate::startup::build_state;
use figment::providers::{Format, Serialized, Yaml};
use figment::Figment;
use http_body_util::BodyExt;
use serde_json::Value;

/// Test configuration pointing at `backend_url`, with any extra YAML appended.
pub fn load_test_config(backend_url: &str, extra: &str) -> ConfigV1 {
    let yaml = format!(
        r#"
backend_url: "{}"
bind_address: 127.0.0.1:0
logging:
  level: "debug"
  format: "json"
{}
"#,
        backend_url, extra
    );
    let figment = Figment::new()
        .merge(Serialized::default("version", "1.0.0"))
        .merge(Yaml::string(&yaml));
    extract_config(&figment).expect("Failed to parse test config YAML")
}

pub fn build_app(config: ConfigV1) -> Router {
    let state = build_state(Arc::new(config)).expect("state should build");
    create_router(state)
}

pub fn build_request(method: Method, path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("failed to build request")
}

pub fn json_request(method: Method, path: &str, cookie: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

/// All `Set-Cookie` header values of a response.
pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().expect("Set-Cookie not valid UTF-8").to_string())
        .collect()
}

/// The `Set-Cookie` value for cookie `name`.
pub fn set_cookie_for(headers: &HeaderMap, name: &str) -> String {
    let prefix = format!("{}=", name);
    set_cookies(headers)
        .into_iter()
        .find(|c| c.starts_with(&prefix))
        .unwrap_or_else(|| panic!("no Set-Cookie for {}", name))
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("body should be JSON")
}

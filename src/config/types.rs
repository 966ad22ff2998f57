use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use url::Url;

use super::cookies::CookieConfig;
use super::logging::LoggingConfig;

/// Default location of the YAML configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "DASHGATE_CONFIG";

/// Environment variables merged on top of the YAML file, with the config key each one sets.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("BACKEND_URL", "backend_url"),
    ("JWT_COOKIE_NAME", "cookies.access_name"),
    ("REFRESH_COOKIE_NAME", "cookies.refresh_name"),
    ("COOKIE_DOMAIN", "cookies.domain"),
    ("APP_ENV", "environment"),
    ("BIND_ADDRESS", "bind_address"),
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Error loading configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("backend_url must be a valid URL (e.g. https://api.example.com): {0}")]
    InvalidBackendUrl(String),
    #[error("cookies.access_name and cookies.refresh_name must be non-empty and distinct")]
    InvalidCookieNames,
}

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0: where to listen, which backend to relay to, and how the session cookies look.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    pub backend_url: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub cookies: CookieConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub backend_paths: BackendPaths,
    /// Page prefixes that require an access cookie; anonymous visitors are sent to the login page.
    #[serde(default = "default_protected_pages")]
    pub protected_pages: Vec<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ConfigV1 {
    /// Checks the fields that cannot be expressed through serde alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend_base()?;
        let cookies = &self.cookies;
        if cookies.access_name.trim().is_empty()
            || cookies.refresh_name.trim().is_empty()
            || cookies.access_name == cookies.refresh_name
        {
            return Err(ConfigError::InvalidCookieNames);
        }
        Ok(())
    }

    /// The backend base URL, parsed. Only `http` and `https` are accepted.
    pub fn backend_base(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.backend_url.trim())
            .map_err(|e| ConfigError::InvalidBackendUrl(format!("'{}': {}", self.backend_url, e)))?;
        match url.scheme() {
            "http" | "https" if url.has_host() => Ok(url),
            _ => Err(ConfigError::InvalidBackendUrl(format!(
                "'{}': expected an absolute http(s) URL",
                self.backend_url
            ))),
        }
    }

    /// Whether cookies carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Deployment environment; `production` turns on secure cookies.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

/// Settings for the catch-all relay.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_prefix")]
    pub prefix: String,
    #[serde(default = "default_login_page")]
    pub login_page: String,
    /// Overall timeout for each backend call; the client default applies when unset.
    #[serde(default)]
    pub request_timeout_in_ms: Option<u64>,
    /// Largest request body the relay buffers, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            prefix: default_proxy_prefix(),
            login_page: default_login_page(),
            request_timeout_in_ms: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Backend endpoints used by the gateway itself, relative to `backend_url`.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct BackendPaths {
    #[serde(default = "default_login_path")]
    pub login: String,
    #[serde(default = "default_refresh_path")]
    pub refresh: String,
}

impl Default for BackendPaths {
    fn default() -> Self {
        Self {
            login: default_login_path(),
            refresh: default_refresh_path(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_proxy_prefix() -> String {
    "/api/proxy".to_string()
}

fn default_login_page() -> String {
    "/login".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_login_path() -> String {
    "platform/auth/login".to_string()
}

fn default_refresh_path() -> String {
    "auth/refresh".to_string()
}

fn default_protected_pages() -> Vec<String> {
    ["/", "/admins", "/roles", "/permissions", "/tenants", "/billing"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

/// Builds the layered figment: version default, then the YAML file, then the environment.
pub fn figment(path: &str) -> Figment {
    Figment::new()
        .merge(Serialized::default("version", "1.0.0"))
        .merge(Yaml::file(path))
        .merge(env_overrides())
}

fn env_overrides() -> Env {
    let names: Vec<&str> = ENV_OVERRIDES.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        ENV_OVERRIDES
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, target)| (*target).into())
            .unwrap_or_else(|| key.into())
    })
}

/// Extracts and validates a configuration from any figment.
pub fn extract_config(figment: &Figment) -> Result<ConfigV1, ConfigError> {
    let config = figment.extract::<Config>().map_err(Box::new)?;
    let Config::ConfigV1(config) = config;
    config.validate()?;
    Ok(config)
}

/// Load config from the YAML file (or `DASHGATE_CONFIG`) merged with the environment.
/// Exits the process when the configuration is unusable.
pub fn load_config() -> ConfigV1 {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    match extract_config(&figment(&path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() {
    let schema = schema_for!(Config);
    match serde_json::to_string_pretty(&schema) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Could not render schema: {}", e),
    }
}

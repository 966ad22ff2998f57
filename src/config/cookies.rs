use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Access tokens live for 15 minutes.
pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
/// Refresh tokens live for 30 days.
pub const REFRESH_TOKEN_TTL_SECONDS: i64 = 60 * 60 * 24 * 30;

/// Names and scope of the two session cookies.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct CookieConfig {
    #[serde(default = "default_access_name")]
    pub access_name: String,
    #[serde(default = "default_refresh_name")]
    pub refresh_name: String,
    /// Optional `Domain` attribute; host-only cookies when absent.
    #[serde(default)]
    pub domain: Option<String>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            access_name: default_access_name(),
            refresh_name: default_refresh_name(),
            domain: None,
        }
    }
}

fn default_access_name() -> String {
    "platform_jwt".to_string()
}

fn default_refresh_name() -> String {
    "platform_refresh".to_string()
}

use std::fmt;

use serde::Deserialize;

/// A freshly minted access/refresh token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

// Tokens are credentials; keep them out of logs.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Token fields as the backend sends them. Both spellings have been seen in the wild.
#[derive(Deserialize)]
struct TokenPairBody {
    #[serde(default, alias = "accessToken")]
    access: Option<String>,
    #[serde(default, alias = "refreshToken")]
    refresh: Option<String>,
}

impl TokenPair {
    /// Decodes a backend token response. Missing, empty or non-string fields are errors.
    pub fn decode(body: &[u8]) -> Result<TokenPair, String> {
        let parsed: TokenPairBody =
            serde_json::from_slice(body).map_err(|e| format!("Error parsing JSON: {}", e))?;
        let access = parsed
            .access
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "missing access token".to_string())?;
        let refresh = parsed
            .refresh
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "missing refresh token".to_string())?;
        Ok(TokenPair { access, refresh })
    }
}

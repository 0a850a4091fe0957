use std::fmt;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "https://plausible.io/api/v2";
pub const API_KEY_ENV: &str = "PLAUSIBLE_API_KEY";
pub const API_URL_ENV: &str = "PLAUSIBLE_API_URL";

/// Process-wide settings, resolved once at startup and never mutated.
#[derive(Clone)]
pub struct RuntimeConfig {
    api_url: Url,
    api_key: String,
}

impl RuntimeConfig {
    pub fn new(api_url: &str, api_key: Option<String>) -> Result<Self, ConfigError> {
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        let api_url = Url::parse(api_url.trim()).map_err(|source| ConfigError::InvalidApiUrl {
            url: api_url.to_string(),
            source,
        })?;
        Ok(Self { api_url, api_key })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `{api_url}/query`, tolerant of a trailing slash on the base.
    pub fn query_endpoint(&self) -> String {
        format!("{}/query", self.api_url.as_str().trim_end_matches('/'))
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("api_url", &self.api_url.as_str())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

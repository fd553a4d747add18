//! Flexera adapter configuration, the `source.config` block of a pipeline.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use vulnfeed_sdk::prelude::{FetchError, HttpConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.app.secunia.com";
pub const DEFAULT_USER_AGENT: &str = "flexera2nvd";
pub const DEFAULT_TOKEN_ENV: &str = "FLEXERA_TOKEN";

const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Environment variable holding the API token. Read by the caller, never
    /// by the adapter.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_page_size() -> u32 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            token_env: default_token_env(),
            page_size: default_page_size(),
        }
    }
}

impl Config {
    /// Deserialize from a pipeline's adapter block. `null` means all defaults.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Setup`] for unknown keys or mistyped values.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, FetchError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(value)
            .map_err(|e| FetchError::Setup(format!("invalid flexera config: {e}")))
    }

    /// # Errors
    ///
    /// Returns [`FetchError::Setup`] describing the first invalid setting.
    pub fn validate(&self) -> Result<(), FetchError> {
        self.parsed_base_url()?;
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(FetchError::Setup(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.token_env.trim().is_empty() {
            return Err(FetchError::Setup("token_env must not be empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn parsed_base_url(&self) -> Result<Url, FetchError> {
        let url = Url::parse(self.base_url.trim_end_matches('/'))
            .map_err(|e| FetchError::Setup(format!("invalid base_url '{}': {e}", self.base_url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(FetchError::Setup(format!(
                "base_url '{}' must use http or https, not {other}",
                self.base_url
            ))),
        }
    }

    /// HTTP client settings for this adapter.
    #[must_use]
    pub fn http_config(&self, timeout: Duration, max_retries: u32) -> HttpConfig {
        HttpConfig {
            user_agent: self.user_agent.clone(),
            timeout,
            max_retries,
        }
    }
}

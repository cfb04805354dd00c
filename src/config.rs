use std::fmt;
use std::time::Duration;

use anyhow::{Result, bail};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Clone)]
pub struct ApiConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl ApiConfig {
    pub fn new(api_base: &str, api_key: &str, request_timeout: Duration) -> Result<Self> {
        let api_base = api_base.trim().trim_end_matches('/');
        if api_base.is_empty() {
            bail!("api base url must not be empty");
        }

        let api_key = api_key.trim();
        if api_key.is_empty() {
            bail!("missing API key: pass --api-key or set {API_KEY_ENV}");
        }

        Ok(Self {
            api_base: api_base.to_string(),
            api_key: api_key.to_string(),
            request_timeout,
        })
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

// Keeps the key out of logs.
impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

use std::env;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://csfloat.com/api/v1";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing CSFLOAT_API_KEY")]
    MissingApiKey,
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration for the marketplace client.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub safety_margin_secs: u64,
}

// The API key stays out of Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .field("safety_margin_secs", &self.safety_margin_secs)
            .finish()
    }
}

impl Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: default_user_agent(),
            timeout_secs: 15,
            safety_margin_secs: 5,
        }
    }

    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - CSFLOAT_API_KEY [required]
    /// - CSFLOAT_API_URL (default: https://csfloat.com/api/v1)
    /// - CSFLOAT_HTTP_TIMEOUT_SECS (default: 15)
    /// - CSFLOAT_USER_AGENT (default: csfloat-client/<version>)
    /// - CSFLOAT_RATE_SAFETY_MARGIN_SECS (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("CSFLOAT_API_KEY").map_err(|_| ConfigError::MissingApiKey)?;
        let mut cfg = Self::new(api_key);

        if let Ok(url) = env::var("CSFLOAT_API_URL") {
            cfg.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_secs("CSFLOAT_HTTP_TIMEOUT_SECS")? {
            cfg.timeout_secs = secs;
        }
        if let Some(secs) = parse_secs("CSFLOAT_RATE_SAFETY_MARGIN_SECS")? {
            cfg.safety_margin_secs = secs;
        }
        if let Ok(ua) = env::var("CSFLOAT_USER_AGENT") {
            cfg.user_agent = ua;
        }
        Ok(cfg)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }
}

fn default_user_agent() -> String {
    format!("csfloat-client/{}", env!("CARGO_PKG_VERSION"))
}

fn parse_secs(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(None),
    }
}

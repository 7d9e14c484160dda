//! Provider configuration.
//!
//! Values set in the provider block win; unset values fall back to
//! `TWINGATE_*` environment variables and then to defaults.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::client::transport::DEFAULT_CONCURRENCY;
use crate::client::DEFAULT_PAGE_LIMIT;

pub const ENV_API_TOKEN: &str = "TWINGATE_API_TOKEN";
pub const ENV_NETWORK: &str = "TWINGATE_NETWORK";
pub const ENV_URL: &str = "TWINGATE_URL";
pub const ENV_HTTP_TIMEOUT: &str = "TWINGATE_HTTP_TIMEOUT";
pub const ENV_HTTP_MAX_RETRY: &str = "TWINGATE_HTTP_MAX_RETRY";
pub const ENV_PAGE_LIMIT: &str = "TWINGATE_PAGE_LIMIT";
pub const ENV_RATE_LIMIT: &str = "TWINGATE_RATE_LIMIT";

pub const DEFAULT_URL: &str = "twingate.com";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HTTP_MAX_RETRY: u32 = 10;

/// Errors raised while resolving provider configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("token and network have to be provided")]
    MissingCredentials,

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("invalid provider configuration: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The provider block as written by the user.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    api_token: Option<String>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    http_timeout: Option<i64>,
    #[serde(default)]
    http_max_retry: Option<i64>,
}

/// Fully resolved client settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_token: String,
    /// Tenant name, the first label of the server host.
    pub network: String,
    /// Base domain, `twingate.com` unless testing against another stack.
    pub url: String,
    pub http_timeout: Duration,
    pub http_max_retry: u32,
    pub page_limit: usize,
    /// Maximum concurrent API requests.
    pub rate_limit: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            network: String::new(),
            url: DEFAULT_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            http_max_retry: DEFAULT_HTTP_MAX_RETRY,
            page_limit: DEFAULT_PAGE_LIMIT,
            rate_limit: DEFAULT_CONCURRENCY,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_token", &"<redacted>")
            .field("network", &self.network)
            .field("url", &self.url)
            .field("http_timeout", &self.http_timeout)
            .field("http_max_retry", &self.http_max_retry)
            .field("page_limit", &self.page_limit)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve against the process environment.
    pub fn from_env(config: &Value) -> Result<Self, ConfigError> {
        Self::resolve(config, |name| std::env::var(name).ok())
    }

    /// Resolve a provider block, reading fallbacks through `env`.
    pub fn resolve<F>(config: &Value, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = if config.is_null() {
            RawConfig::default()
        } else {
            serde_json::from_value(config.clone())?
        };
        let env = |name: &str| env(name).filter(|value| !value.is_empty());

        let api_token = non_empty(raw.api_token)
            .or_else(|| env(ENV_API_TOKEN))
            .unwrap_or_default();
        let network = non_empty(raw.network)
            .or_else(|| env(ENV_NETWORK))
            .unwrap_or_default();
        if api_token.is_empty() || network.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let url = non_empty(raw.url)
            .or_else(|| env(ENV_URL))
            .unwrap_or_else(|| DEFAULT_URL.to_string());

        let http_timeout = match raw.http_timeout {
            Some(secs) => non_negative("http_timeout", secs)?,
            None => parse_env(ENV_HTTP_TIMEOUT, env(ENV_HTTP_TIMEOUT))?
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        };
        let http_max_retry = match raw.http_max_retry {
            Some(n) => non_negative("http_max_retry", n)?,
            None => parse_env(ENV_HTTP_MAX_RETRY, env(ENV_HTTP_MAX_RETRY))?
                .unwrap_or(u64::from(DEFAULT_HTTP_MAX_RETRY)),
        };
        let http_max_retry = u32::try_from(http_max_retry).map_err(|_| ConfigError::InvalidValue {
            name: "http_max_retry",
            reason: format!("{} is too large", http_max_retry),
        })?;

        Ok(Self {
            api_token,
            network,
            url,
            http_timeout: Duration::from_secs(http_timeout),
            http_max_retry,
            page_limit: positive_env_or(ENV_PAGE_LIMIT, env(ENV_PAGE_LIMIT), DEFAULT_PAGE_LIMIT),
            rate_limit: positive_env_or(ENV_RATE_LIMIT, env(ENV_RATE_LIMIT), DEFAULT_CONCURRENCY),
        })
    }

    /// `https://{network}.{url}`
    pub fn server_url(&self) -> String {
        format!("https://{}.{}", self.network, self.url)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn non_negative(name: &'static str, value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value).map_err(|_| ConfigError::InvalidValue {
        name,
        reason: format!("{} must not be negative", value),
    })
}

fn parse_env(name: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|v| {
            v.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                name,
                reason: format!("`{}`: {}", v, e),
            })
        })
        .transpose()
}

/// Tuning knobs that only come from the environment fall back to the default
/// on bad input instead of failing configuration.
fn positive_env_or(name: &str, value: Option<String>, default: usize) -> usize {
    let Some(value) = value else {
        return default;
    };
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
            warn!(variable = name, value = %value, default, "Ignoring invalid value");
            default
        }
    }
}

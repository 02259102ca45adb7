use dotenvy::dotenv;
use reqwest::Url;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Process-wide settings, read once at startup and handed to each component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub elasticsearch_url: Url,
    pub es_api_key: String,
    pub elasticsearch_index: String,
    pub host: String,
    pub port: u16,
    /// Per-call timeout for requests to the index.
    pub request_timeout: Duration,
    /// Retries on connect/timeout failures. Zero disables retrying.
    pub max_retries: u32,
    /// `*` or a comma-separated list of allowed origins.
    pub cors_origins: String,
}

impl Config {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenv().ok(); // Load .env file if present
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = get_env(&lookup, "ELASTICSEARCH_URL")?;
        let elasticsearch_url = Url::parse(&raw_url).map_err(|e| ConfigError::Invalid {
            var: "ELASTICSEARCH_URL",
            reason: e.to_string(),
        })?;
        if !matches!(elasticsearch_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                var: "ELASTICSEARCH_URL",
                reason: format!("unsupported scheme '{}'", elasticsearch_url.scheme()),
            });
        }

        let timeout_secs: u64 = parse_env_or_default(
            &lookup,
            "ES_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "ES_REQUEST_TIMEOUT_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Config {
            elasticsearch_url,
            es_api_key: get_env(&lookup, "ES_API_KEY")?,
            elasticsearch_index: get_env(&lookup, "ELASTICSEARCH_INDEX")?,
            host: get_env_or_default(&lookup, "HOST", DEFAULT_HOST),
            port: parse_env_or_default(&lookup, "PORT", DEFAULT_PORT)?,
            request_timeout: Duration::from_secs(timeout_secs),
            max_retries: parse_env_or_default(&lookup, "ES_MAX_RETRIES", 0)?,
            cors_origins: get_env_or_default(&lookup, "CORS_ORIGINS", "*"),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn get_env<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).ok_or(ConfigError::Missing(key))
}

fn get_env_or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).unwrap_or_else(|| default.to_string())
}

fn parse_env_or_default<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

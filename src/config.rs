//! Typed configuration from environment variables.
//!
//! Loaded once at job-run start and passed into each component at
//! construction; never mutated mid-run. Fails fast if required vars are
//! missing. Credentials are wrapped in secrecy::SecretString to prevent
//! log leaks.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};

/// Default worker count for the enrichment pool.
pub const DEFAULT_WORKERS: usize = 5;
/// Default retry ceiling for enrichment calls.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default inter-attempt delay.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Default per-attempt deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct Config {
    /// Postgres document store: backlog source and result sink.
    pub database_url: SecretString,
    /// MySQL scheduler log: dedupe sweep target.
    pub sweep_database_url: SecretString,
    pub dify: DifySettings,
    pub worker_count: usize,
    pub log_level: String,
}

/// Settings for the Dify enrichment service.
#[derive(Debug, Clone)]
pub struct DifySettings {
    /// Base URL of the Dify API, e.g. `http://dify.internal/v1`.
    pub base_url: String,
    /// Key for the stage-classification workflow app.
    pub workflow_api_key: SecretString,
    /// Key for the indicator-extraction workflow app.
    pub indicator_api_key: SecretString,
    /// Key for the chat app (digit-answer variant).
    pub chat_api_key: SecretString,
    /// User identity reported on every request.
    pub user: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            sweep_database_url: SecretString::from(required_var("SWEEP_DATABASE_URL")?),
            dify: DifySettings {
                base_url: required_var("DIFY_BASE_URL")?,
                workflow_api_key: SecretString::from(required_var("DIFY_WORKFLOW_API_KEY")?),
                indicator_api_key: SecretString::from(required_var("DIFY_INDICATOR_API_KEY")?),
                chat_api_key: SecretString::from(required_var("DIFY_CHAT_API_KEY")?),
                user: std::env::var("DIFY_USER").unwrap_or_else(|_| "chartmill".to_string()),
                max_retries: positive_or(parsed_var("DIFY_MAX_RETRIES")?, DEFAULT_MAX_RETRIES),
                retry_delay: parsed_var("DIFY_RETRY_DELAY_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RETRY_DELAY),
                timeout: parsed_var("DIFY_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_TIMEOUT),
            },
            worker_count: positive_or(parsed_var("WORKER_COUNT")?, DEFAULT_WORKERS),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// Parse an optional numeric var, treating an unparsable value as a config
/// error rather than silently falling back.
fn parsed_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} is not a valid number: {raw}"))),
        Err(_) => Ok(None),
    }
}

/// Zero is treated the same as unset: fall back to the default.
fn positive_or<T: PartialEq + From<u8>>(value: Option<T>, default: T) -> T {
    match value {
        Some(v) if v != T::from(0) => v,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_falls_back_to_default() {
        assert_eq!(positive_or(Some(0u32), DEFAULT_MAX_RETRIES), 3);
        assert_eq!(positive_or(None::<u32>, DEFAULT_MAX_RETRIES), 3);
        assert_eq!(positive_or(Some(7u32), DEFAULT_MAX_RETRIES), 7);
        assert_eq!(positive_or(Some(0usize), DEFAULT_WORKERS), 5);
    }
}

//! Typed configuration from environment variables or TOML.
//!
//! Loads once at startup and fails fast on missing or malformed values.
//! The store URL may carry database credentials, so it is wrapped in
//! secrecy::SecretString to keep it out of logs.

pub mod secrets;

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::queue::{DuplicatePolicy, QueueConfig};
use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `memory:`, `sqlite://path.db` or `postgres://...`.
    #[serde(deserialize_with = "secret_string")]
    pub store_url: SecretString,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    #[serde(default = "default_recovery_batch_size")]
    pub recovery_batch_size: usize,
    #[serde(default)]
    pub otel_endpoint: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_workers() -> usize {
    QueueConfig::default().max_workers
}

fn default_cancel_grace_ms() -> u64 {
    QueueConfig::default().cancel_grace.as_millis() as u64
}

fn default_recovery_batch_size() -> usize {
    QueueConfig::default().recovery_batch_size
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load a `.env` file if one exists, then read the environment.
    /// Variables already set take precedence over the file.
    pub fn load() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(Error::Config(format!("failed to read .env: {e}")));
        }
        Self::from_env()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut retry = RetryPolicy::default();
        if let Some(max_retries) = parsed_var("DURQ_MAX_RETRIES")? {
            retry.max_retries = max_retries;
        }
        if let Some(initial_ms) = parsed_var::<u64>("DURQ_RETRY_INITIAL_MS")? {
            retry.initial_interval = Duration::from_millis(initial_ms);
        }

        Ok(Self {
            store_url: SecretString::from(required_var("DURQ_STORE_URL")?),
            max_workers: parsed_var("DURQ_MAX_WORKERS")?.unwrap_or_else(default_max_workers),
            retry,
            duplicate_policy: parsed_var("DURQ_DUPLICATE_POLICY")?.unwrap_or_default(),
            cancel_grace_ms: parsed_var("DURQ_CANCEL_GRACE_MS")?
                .unwrap_or_else(default_cancel_grace_ms),
            recovery_batch_size: parsed_var("DURQ_RECOVERY_BATCH_SIZE")?
                .unwrap_or_else(default_recovery_batch_size),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
        })
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        toml::from_str(&source)
            .map_err(|e| Error::Config(format!("invalid config in {}: {e}", path.display())))
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_workers: self.max_workers,
            retry: self.retry.clone(),
            duplicate_policy: self.duplicate_policy,
            cancel_grace: Duration::from_millis(self.cancel_grace_ms),
            recovery_batch_size: self.recovery_batch_size,
            ..QueueConfig::default()
        }
    }
}

fn secret_string<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

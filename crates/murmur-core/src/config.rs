//! Engine configuration, layered with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. TOML file (when given)
//! 3. `MURMUR_*` environment variables, `__` separating nested keys
//!    (`MURMUR_RETRY__BASE_DELAY_MS=500` sets `retry.base_delay_ms`)

#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] figment::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Cooldown between soft-failed attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 0 disables cooldown: retries go straight back to `CURRENT`.
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Relative spread in `[0.0, 1.0]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 0,
            multiplier: 2.0,
            max_delay_ms: 3_600_000,
            jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for one backend call.
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
    /// Park background commands in `SKIPPED` while the app is in the foreground.
    pub suppress_background_in_foreground: bool,
    /// Successful commands kept in `DONE`; 0 discards them.
    pub retain_done: usize,
    /// Directory of the JSON command store. In-memory when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,
    /// Default log filter; `RUST_LOG` wins when set.
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            retry: RetryConfig::default(),
            suppress_background_in_foreground: false,
            retain_done: 0,
            store_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry.base_delay_ms),
            self.retry.multiplier,
        )
        .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
        .with_jitter(self.retry.jitter)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".into(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::Invalid(format!(
                "retry.jitter must be within [0, 1], got {}",
                self.retry.jitter
            )));
        }
        Ok(())
    }
}

/// Load defaults, then `path` (if any), then `MURMUR_*` variables.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let mut figment = Figment::new().merge(Serialized::defaults(EngineConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    extract(figment.merge(env_provider()))
}

/// Load defaults overlaid with a TOML string only. Used by tests.
pub fn load_config_from_str(toml_content: &str) -> Result<EngineConfig, ConfigError> {
    extract(
        Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::string(toml_content)),
    )
}

fn extract(figment: Figment) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

fn env_provider() -> Env {
    Env::prefixed("MURMUR_").split("__")
}

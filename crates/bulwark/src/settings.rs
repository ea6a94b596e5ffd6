//! Externally tunable thresholds, loaded from TOML.
//!
//! Every key is optional; anything left out keeps its built-in default.
//!
//! ```toml
//! [circuit_breakers.database]
//! failure_threshold = 8
//! reset_timeout_ms = 20000
//!
//! [retry.database]
//! max_attempts = 4
//! backoff_ms = 100
//!
//! [retry.service]
//! max_attempts = 2
//! backoff_ms = 1000
//! jitter = true
//!
//! [rate_limits.create-comment]
//! requests = 10
//! window_seconds = 60
//! ```

use bulwark_circuitbreaker::{CircuitBreakerConfig, RegistryConfig};
use bulwark_retry::RetryOptions;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "ratelimiter")]
use bulwark_ratelimiter::RateLimitPolicy;
#[cfg(feature = "ratelimiter")]
use std::collections::BTreeMap;

/// Failure loading [`ResilienceSettings`].
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file could not be read.
    #[error("failed to read resilience settings from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has the wrong shape.
    #[error("invalid resilience settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The whole tunable surface: breaker profiles, retry presets and
/// per-action rate limits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    /// Overrides for each breaker category.
    pub circuit_breakers: BreakerSettings,
    /// Overrides for the retry presets.
    pub retry: RetrySettings,
    /// Policies keyed by action name.
    #[cfg(feature = "ratelimiter")]
    pub rate_limits: BTreeMap<String, RateLimitPolicy>,
}

impl ResilienceSettings {
    /// Parses settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Breaker profiles with overrides applied.
    pub fn registry_config(&self) -> RegistryConfig {
        self.circuit_breakers.resolve()
    }

    /// Policy configured for `action`.
    #[cfg(feature = "ratelimiter")]
    pub fn rate_limit(&self, action: &str) -> Option<RateLimitPolicy> {
        self.rate_limits.get(action).copied()
    }
}

/// Per-category breaker overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub database: BreakerOverrides,
    pub external_service: BreakerOverrides,
    pub fast: BreakerOverrides,
    pub upload: BreakerOverrides,
}

impl BreakerSettings {
    fn resolve(&self) -> RegistryConfig {
        let defaults = RegistryConfig::default();
        RegistryConfig {
            database: self.database.apply(defaults.database),
            external_service: self.external_service.apply(defaults.external_service),
            fast: self.fast.apply(defaults.fast),
            upload: self.upload.apply(defaults.upload),
        }
    }
}

/// Fields to change on a breaker profile. Unset fields keep the profile's
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BreakerOverrides {
    pub failure_threshold: Option<u32>,
    #[serde(rename = "reset_timeout_ms", deserialize_with = "opt_millis")]
    pub reset_timeout: Option<Duration>,
    pub half_open_success_threshold: Option<u32>,
    pub half_open_max_trials: Option<u32>,
    /// `0` disables the call timeout.
    #[serde(rename = "call_timeout_ms", deserialize_with = "opt_millis")]
    pub call_timeout: Option<Duration>,
}

impl BreakerOverrides {
    /// `base` with every set field replaced.
    pub fn apply(&self, base: CircuitBreakerConfig) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            reset_timeout: self.reset_timeout.unwrap_or(base.reset_timeout),
            half_open_success_threshold: self
                .half_open_success_threshold
                .unwrap_or(base.half_open_success_threshold),
            half_open_max_trials: self
                .half_open_max_trials
                .unwrap_or(base.half_open_max_trials),
            call_timeout: match self.call_timeout {
                Some(timeout) if timeout.is_zero() => None,
                Some(timeout) => Some(timeout),
                None => base.call_timeout,
            },
        }
    }
}

/// Overrides for the two retry presets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Applied on top of the database preset.
    pub database: RetryOptions,
    /// Applied on top of the external-service preset.
    pub service: RetryOptions,
}

/// `over` with unset fields taken from `base`.
pub(crate) fn overlay(base: &RetryOptions, over: RetryOptions) -> RetryOptions {
    RetryOptions {
        max_attempts: over.max_attempts.or(base.max_attempts),
        backoff: over.backoff.or(base.backoff),
        max_backoff: over.max_backoff.or(base.max_backoff),
        jitter: over.jitter.or(base.jitter),
        operation_name: over.operation_name.or_else(|| base.operation_name.clone()),
        cancellation: over.cancellation.or_else(|| base.cancellation.clone()),
    }
}

fn opt_millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

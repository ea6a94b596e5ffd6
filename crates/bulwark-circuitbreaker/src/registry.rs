//! Named breakers shared across an application.
//!
//! The registry is an ordinary value: create one at startup, wrap it in an
//! `Arc` and hand it to whatever needs breakers. The first request for a
//! name decides the breaker's thresholds; later requests return the same
//! handle whatever category they ask for.

use crate::{CircuitBreaker, CircuitBreakerConfig, CircuitHealth, CircuitState};
use dashmap::DashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Resource profile used when the registry creates a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BreakerCategory {
    /// Database queries.
    Database,
    /// Third-party APIs.
    ExternalService,
    /// Low-latency calls such as cache commands.
    Fast,
    /// Long-running uploads.
    Upload,
}

impl BreakerCategory {
    /// Lowercase label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerCategory::Database => "database",
            BreakerCategory::ExternalService => "external_service",
            BreakerCategory::Fast => "fast",
            BreakerCategory::Upload => "upload",
        }
    }
}

impl fmt::Display for BreakerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegistryConfig {
    pub database: CircuitBreakerConfig,
    pub external_service: CircuitBreakerConfig,
    pub fast: CircuitBreakerConfig,
    pub upload: CircuitBreakerConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database: CircuitBreakerConfig::database(),
            external_service: CircuitBreakerConfig::external_service(),
            fast: CircuitBreakerConfig::fast(),
            upload: CircuitBreakerConfig::upload(),
        }
    }
}

impl RegistryConfig {
    /// Thresholds for `category`.
    pub fn for_category(&self, category: BreakerCategory) -> &CircuitBreakerConfig {
        match category {
            BreakerCategory::Database => &self.database,
            BreakerCategory::ExternalService => &self.external_service,
            BreakerCategory::Fast => &self.fast,
            BreakerCategory::Upload => &self.upload,
        }
    }
}

/// Counts of breakers by health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthSummary {
    pub healthy: usize,
    pub unhealthy: usize,
    pub open: usize,
    pub total: usize,
}

/// Registry-wide statistics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RegistryStats {
    /// Number of registered breakers.
    pub breakers_count: usize,
    /// Breakers by health.
    pub health_summary: HealthSummary,
    /// Share of healthy breakers, rounded. `100` for an empty registry.
    pub overall_health_percentage: u8,
    /// Time since the registry was created.
    pub uptime: Duration,
}

/// Get-or-create store of named breakers.
///
/// ```rust
/// use bulwark_circuitbreaker::{CircuitBreaker, CircuitBreakerRegistry};
///
/// let registry = CircuitBreakerRegistry::new();
/// let a = registry.database_breaker("collections-db");
/// let b = registry.database_breaker("collections-db");
/// assert!(CircuitBreaker::ptr_eq(&a, &b));
///
/// let stats = registry.stats();
/// assert_eq!(stats.breakers_count, 1);
/// assert_eq!(stats.overall_health_percentage, 100);
/// ```
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, CircuitBreaker>,
    config: RegistryConfig,
    started_at: Instant,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerRegistry {
    /// Empty registry with the default category profiles.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Empty registry with custom category profiles.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            started_at: Instant::now(),
        }
    }

    /// The category profiles.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Breaker for a database. Created with the database profile on first use.
    pub fn database_breaker(&self, name: &str) -> CircuitBreaker {
        self.breaker(BreakerCategory::Database, name)
    }

    /// Breaker for a third-party API.
    pub fn external_service_breaker(&self, name: &str) -> CircuitBreaker {
        self.breaker(BreakerCategory::ExternalService, name)
    }

    /// Breaker for a low-latency dependency.
    pub fn fast_breaker(&self, name: &str) -> CircuitBreaker {
        self.breaker(BreakerCategory::Fast, name)
    }

    /// Breaker for uploads.
    pub fn upload_breaker(&self, name: &str) -> CircuitBreaker {
        self.breaker(BreakerCategory::Upload, name)
    }

    /// Breaker called `name`, created with `category`'s profile if absent.
    pub fn breaker(&self, category: BreakerCategory, name: &str) -> CircuitBreaker {
        let config = self.config.for_category(category).clone();
        self.get_or_create(name, config, Some(category))
    }

    /// Breaker called `name`, created with `config` if absent.
    ///
    /// An existing breaker keeps its original thresholds.
    pub fn breaker_with(&self, name: &str, config: CircuitBreakerConfig) -> CircuitBreaker {
        self.get_or_create(name, config, None)
    }

    fn get_or_create(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
        category: Option<BreakerCategory>,
    ) -> CircuitBreaker {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| logged_breaker(name, config, category))
            .clone()
    }

    /// Registered breaker called `name`, if any.
    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    /// Names of all registered breakers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// True when no breaker has been created.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Health of the breaker called `name`.
    pub fn health(&self, name: &str) -> Option<CircuitHealth> {
        self.get(name).map(|breaker| breaker.health())
    }

    /// Health of every breaker, sorted by name.
    pub fn health_statuses(&self) -> Vec<CircuitHealth> {
        let mut statuses: Vec<CircuitHealth> = self
            .snapshot()
            .iter()
            .map(CircuitBreaker::health)
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// True when any breaker reports unhealthy.
    pub fn has_unhealthy_breakers(&self) -> bool {
        self.snapshot().iter().any(|breaker| !breaker.health().is_healthy)
    }

    /// Forgets the breaker called `name`. Existing handles keep working.
    pub fn remove(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.remove(name).map(|(_, breaker)| breaker)
    }

    /// Resets one breaker. Returns `false` when no such breaker exists.
    pub fn reset_breaker(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Resets every registered breaker.
    pub fn reset_all_breakers(&self) {
        let breakers = self.snapshot();

        #[cfg(feature = "tracing")]
        tracing::info!(count = breakers.len(), "resetting all circuit breakers");

        for breaker in breakers {
            breaker.reset();
        }
    }

    /// Breaker counts by health and overall health percentage.
    pub fn stats(&self) -> RegistryStats {
        let mut summary = HealthSummary::default();
        for breaker in self.snapshot() {
            let health = breaker.health();
            summary.total += 1;
            if health.is_healthy {
                summary.healthy += 1;
            } else {
                summary.unhealthy += 1;
            }
            if health.state == CircuitState::Open {
                summary.open += 1;
            }
        }

        let overall_health_percentage = if summary.total == 0 {
            100
        } else {
            ((summary.healthy as f64 / summary.total as f64) * 100.0).round() as u8
        };

        RegistryStats {
            breakers_count: summary.total,
            health_summary: summary,
            overall_health_percentage,
            uptime: self.started_at.elapsed(),
        }
    }

    // Clones the handles out so no shard lock is held while breakers run
    // listeners or take their own locks.
    fn snapshot(&self) -> Vec<CircuitBreaker> {
        self.breakers.iter().map(|e| e.value().clone()).collect()
    }
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.names())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn logged_breaker(
    name: &str,
    config: CircuitBreakerConfig,
    category: Option<BreakerCategory>,
) -> CircuitBreaker {
    let builder = CircuitBreaker::builder(name).config(config);

    #[cfg(feature = "tracing")]
    let builder = {
        let breaker = name.to_string();
        let category = category.map(|c| c.as_str()).unwrap_or("custom");
        builder.on_state_transition(move |from, to| match to {
            CircuitState::Open => tracing::warn!(
                breaker = %breaker,
                category,
                from = %from,
                "circuit breaker opened; failing fast"
            ),
            CircuitState::HalfOpen => tracing::info!(
                breaker = %breaker,
                category,
                "circuit breaker testing recovery"
            ),
            CircuitState::Closed => tracing::info!(
                breaker = %breaker,
                category,
                from = %from,
                "circuit breaker closed"
            ),
        })
    };

    builder.build()
}

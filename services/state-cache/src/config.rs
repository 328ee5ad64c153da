//! Configuration for the state cache
//!
//! Every knob has a default. Values load from a TOML file and may then be
//! overridden by `STATE_CACHE_<SECTION>_<FIELD>` environment variables.

use std::path::Path;

use serde::Deserialize;
use tracing::info;
use types::errors::ConfigError;

const ENV_PREFIX: &str = "STATE_CACHE";

/// Orphan buffer settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrphanConfig {
    /// Time a buffered child may wait for its parent, in milliseconds.
    pub ttl_ms: i64,
    /// Minimum `claimed / buffered` ratio for the buffer to count as healthy.
    pub health_threshold: f64,
    /// Buffer size above which a warning is emitted and health fails.
    pub max_warning: usize,
    /// Number of recent claim delays kept for reporting.
    pub delay_sample_size: usize,
}

impl Default for OrphanConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            health_threshold: 0.95,
            max_warning: 10_000,
            delay_sample_size: 1_000,
        }
    }
}

/// Health monitor and circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Maximum tolerated gap between the newest slot seen and a cache's last update.
    pub max_slots_behind: u64,
    /// Process memory ceiling in megabytes.
    pub max_heap_mb: u64,
    /// Consecutive failed checks that open the breaker.
    pub failure_threshold: u32,
    /// Grace period after start before empty caches count as a failure.
    pub warmup_ms: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_slots_behind: 2,
            max_heap_mb: 4_096,
            failure_threshold: 3,
            warmup_ms: 30_000,
        }
    }
}

/// Cache entry store settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Eviction ceiling for the vault (balance) cache.
    pub balance_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            balance_capacity: 100_000,
        }
    }
}

/// Lifecycle oracle settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Child arrays required on each side of the active one.
    pub child_window_radius: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            child_window_radius: 1,
        }
    }
}

/// Runtime loop settings used by the binary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Interval between maintenance sweeps.
    pub sweep_interval_ms: u64,
    /// Capacity of the update channel between transport and core.
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1_000,
            channel_capacity: 10_000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StateCacheConfig {
    pub orphan: OrphanConfig,
    pub health: HealthConfig,
    pub cache: CacheConfig,
    pub lifecycle: LifecycleConfig,
    pub runtime: RuntimeConfig,
}

impl StateCacheConfig {
    /// Parse from TOML text. Missing sections and fields take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults; then
    /// apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                info!(path = %path.display(), "Loading configuration file");
                toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            _ => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STATE_CACHE_<SECTION>_<FIELD>` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |section: &str, field: &str| lookup(&format!("{ENV_PREFIX}_{section}_{field}"));

        override_field(&mut self.orphan.ttl_ms, get("ORPHAN", "TTL_MS"), "orphan.ttl_ms")?;
        override_field(
            &mut self.orphan.health_threshold,
            get("ORPHAN", "HEALTH_THRESHOLD"),
            "orphan.health_threshold",
        )?;
        override_field(
            &mut self.orphan.max_warning,
            get("ORPHAN", "MAX_WARNING"),
            "orphan.max_warning",
        )?;
        override_field(
            &mut self.orphan.delay_sample_size,
            get("ORPHAN", "DELAY_SAMPLE_SIZE"),
            "orphan.delay_sample_size",
        )?;
        override_field(
            &mut self.health.max_slots_behind,
            get("HEALTH", "MAX_SLOTS_BEHIND"),
            "health.max_slots_behind",
        )?;
        override_field(
            &mut self.health.max_heap_mb,
            get("HEALTH", "MAX_HEAP_MB"),
            "health.max_heap_mb",
        )?;
        override_field(
            &mut self.health.failure_threshold,
            get("HEALTH", "FAILURE_THRESHOLD"),
            "health.failure_threshold",
        )?;
        override_field(
            &mut self.health.warmup_ms,
            get("HEALTH", "WARMUP_MS"),
            "health.warmup_ms",
        )?;
        override_field(
            &mut self.cache.balance_capacity,
            get("CACHE", "BALANCE_CAPACITY"),
            "cache.balance_capacity",
        )?;
        override_field(
            &mut self.lifecycle.child_window_radius,
            get("LIFECYCLE", "CHILD_WINDOW_RADIUS"),
            "lifecycle.child_window_radius",
        )?;
        override_field(
            &mut self.runtime.sweep_interval_ms,
            get("RUNTIME", "SWEEP_INTERVAL_MS"),
            "runtime.sweep_interval_ms",
        )?;
        override_field(
            &mut self.runtime.channel_capacity,
            get("RUNTIME", "CHANNEL_CAPACITY"),
            "runtime.channel_capacity",
        )?;
        Ok(())
    }

    /// Reject values that would make a component meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orphan.ttl_ms <= 0 {
            return Err(invalid("orphan.ttl_ms", "must be positive"));
        }
        if !(self.orphan.health_threshold > 0.0 && self.orphan.health_threshold <= 1.0) {
            return Err(invalid("orphan.health_threshold", "must be in (0, 1]"));
        }
        if self.orphan.max_warning == 0 {
            return Err(invalid("orphan.max_warning", "must be non-zero"));
        }
        if self.orphan.delay_sample_size == 0 {
            return Err(invalid("orphan.delay_sample_size", "must be non-zero"));
        }
        if self.health.failure_threshold == 0 {
            return Err(invalid("health.failure_threshold", "must be non-zero"));
        }
        if self.health.warmup_ms < 0 {
            return Err(invalid("health.warmup_ms", "must not be negative"));
        }
        if self.cache.balance_capacity == 0 {
            return Err(invalid("cache.balance_capacity", "must be non-zero"));
        }
        if self.runtime.sweep_interval_ms == 0 {
            return Err(invalid("runtime.sweep_interval_ms", "must be non-zero"));
        }
        if self.runtime.channel_capacity == 0 {
            return Err(invalid("runtime.channel_capacity", "must be non-zero"));
        }
        Ok(())
    }
}

fn override_field<T: std::str::FromStr>(
    slot: &mut T,
    raw: Option<String>,
    field: &'static str,
) -> Result<(), ConfigError>
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = raw {
        *slot = raw.trim().parse().map_err(|e: T::Err| invalid(field, e.to_string()))?;
    }
    Ok(())
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

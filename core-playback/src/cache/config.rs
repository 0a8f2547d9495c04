//! Cache configuration

use core_runtime::config::CacheSettings;
use std::time::Duration;

/// Configuration for the [`ResourceCache`](super::ResourceCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached resources (default: 128)
    pub max_entries: usize,

    /// Resources not accessed for this long are freed (default: 1h)
    pub expire_after_access: Duration,

    /// Upper bound for outstanding frees when closing (default: 60s)
    pub close_timeout: Duration,

    /// Number of resources loaded at the same time (default: 4)
    pub max_concurrent_loads: usize,

    /// How often the background sweeper looks for idle entries (default: 60s)
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheSettings::default().into()
    }
}

impl From<CacheSettings> for CacheConfig {
    fn from(settings: CacheSettings) -> Self {
        Self {
            max_entries: settings.max_entries,
            expire_after_access: settings.expire_after_access,
            close_timeout: settings.close_timeout,
            max_concurrent_loads: settings.max_concurrent_loads,
            sweep_interval: settings.sweep_interval,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        settings.clone().into()
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_expire_after_access(mut self, idle: Duration) -> Self {
        self.expire_after_access = idle;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_loads(mut self, count: usize) -> Self {
        self.max_concurrent_loads = count;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("max_entries must be greater than 0".to_string());
        }

        if self.max_concurrent_loads == 0 {
            return Err("max_concurrent_loads must be at least 1".to_string());
        }

        if self.expire_after_access.is_zero() || self.sweep_interval.is_zero() {
            return Err("expire_after_access and sweep_interval must be non-zero".to_string());
        }

        Ok(())
    }
}

//! # Core Configuration Module
//!
//! Builder-based configuration for the playback core.
//!
//! ## Overview
//!
//! A [`CoreConfig`] bundles the collaborators the core is handed by the host
//! together with tuning settings for the resource cache and the player. The
//! builder validates everything up front so a misconfigured bot fails at
//! startup instead of at the first song.
//!
//! ## Required Dependencies
//!
//! - `PluginLookup` - resolves provider ids to live providers
//!
//! ## Optional Dependencies
//!
//! - `Suggester` - plays something when the queue is empty, either passed
//!   directly or resolved by id through the lookup
//! - `SongPlayedNotifier` - defaults to forwarding to the suggester
//! - `ConfigStorageAdapter` - source of stored settings overrides
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .plugin_lookup(Arc::new(registry))
//!     .suggester_id("random")
//!     .cache_max_entries(32)
//!     .cache_close_timeout(Duration::from_secs(10))
//!     .build()?;
//! ```
//!
//! ## Stored overrides
//!
//! Settings can be overridden from a flat string map, typically loaded from
//! the `General` config scope:
//!
//! | Key | Type |
//! |-----|------|
//! | `cache.max_entries` | integer |
//! | `cache.expire_after_access_secs` | seconds |
//! | `cache.close_timeout_secs` | seconds |
//! | `cache.max_concurrent_loads` | integer |
//! | `player.history_capacity` | integer |
//! | `player.preload_suggestions` | bool |
//! | `player.resume_on_insert` | bool |

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use plugin_traits::{
    ConfigStorageAdapter, NoopNotifier, PluginLookup, SongPlayedNotifier, Suggester,
    SuggesterNotifier,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default maximum number of cached song resources.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 128;
/// Default idle time after which a cached resource is freed.
pub const DEFAULT_CACHE_EXPIRE_AFTER_ACCESS: Duration = Duration::from_secs(60 * 60);
/// Default upper bound for outstanding frees when the cache closes.
pub const DEFAULT_CACHE_CLOSE_TIMEOUT: Duration = Duration::from_secs(60);
/// Default number of resources loaded at the same time.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 4;
/// Default number of played entries remembered by the history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 40;

/// Tuning for the resource cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub expire_after_access: Duration,
    pub close_timeout: Duration,
    pub max_concurrent_loads: usize,
    /// How often idle entries are swept.
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            expire_after_access: DEFAULT_CACHE_EXPIRE_AFTER_ACCESS,
            close_timeout: DEFAULT_CACHE_CLOSE_TIMEOUT,
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Tuning for the player and its observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSettings {
    pub history_capacity: usize,
    /// Warm the next suggestion while the queue is empty.
    pub preload_suggestions: bool,
    /// Start playing when a song is enqueued while the player is stopped.
    pub resume_on_insert: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            preload_suggestions: true,
            resume_on_insert: true,
        }
    }
}

/// Core configuration. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub plugin_lookup: Arc<dyn PluginLookup>,
    pub suggester: Option<Arc<dyn Suggester>>,
    /// Resolved through `plugin_lookup` when no suggester was passed directly.
    pub suggester_id: Option<String>,
    pub song_played_notifier: Option<Arc<dyn SongPlayedNotifier>>,
    pub config_storage: Option<Arc<dyn ConfigStorageAdapter>>,
    pub cache: CacheSettings,
    pub player: PlayerSettings,
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("plugin_lookup", &"PluginLookup { ... }")
            .field("suggester", &self.suggester.as_ref().map(|s| s.id().to_string()))
            .field("suggester_id", &self.suggester_id)
            .field(
                "song_played_notifier",
                &self
                    .song_played_notifier
                    .as_ref()
                    .map(|_| "SongPlayedNotifier { ... }"),
            )
            .field(
                "config_storage",
                &self
                    .config_storage
                    .as_ref()
                    .map(|_| "ConfigStorageAdapter { ... }"),
            )
            .field("cache", &self.cache)
            .field("player", &self.player)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the settings.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(Error::Config(
                "Cache must hold at least one entry".to_string(),
            ));
        }

        if self.cache.max_concurrent_loads == 0 {
            return Err(Error::Config(
                "At least one concurrent load must be allowed".to_string(),
            ));
        }

        if self.cache.close_timeout.is_zero() {
            return Err(Error::Config(
                "Cache close timeout must be greater than zero".to_string(),
            ));
        }

        if self.cache.expire_after_access.is_zero() || self.cache.sweep_interval.is_zero() {
            return Err(Error::Config(
                "Cache expiry and sweep interval must be greater than zero".to_string(),
            ));
        }

        if self.player.history_capacity == 0 {
            return Err(Error::Config(
                "History capacity must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply stored overrides, then validate again.
    ///
    /// Unknown keys are ignored. A malformed value fails with
    /// [`Error::InvalidSetting`] and leaves already applied keys in place.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) -> Result<()> {
        for (key, value) in overrides {
            let value = value.trim();
            match key.as_str() {
                "cache.max_entries" => self.cache.max_entries = parse(key, value)?,
                "cache.expire_after_access_secs" => {
                    self.cache.expire_after_access = Duration::from_secs(parse(key, value)?)
                }
                "cache.close_timeout_secs" => {
                    self.cache.close_timeout = Duration::from_secs(parse(key, value)?)
                }
                "cache.max_concurrent_loads" => {
                    self.cache.max_concurrent_loads = parse(key, value)?
                }
                "player.history_capacity" => self.player.history_capacity = parse(key, value)?,
                "player.preload_suggestions" => {
                    self.player.preload_suggestions = parse(key, value)?
                }
                "player.resume_on_insert" => self.player.resume_on_insert = parse(key, value)?,
                _ => debug!(key = %key, "Ignoring unknown setting"),
            }
        }

        self.validate()
    }

    /// The suggester to use, preferring one passed in directly.
    pub fn resolve_suggester(&self) -> Option<Arc<dyn Suggester>> {
        if let Some(suggester) = &self.suggester {
            return Some(Arc::clone(suggester));
        }

        let id = self.suggester_id.as_deref()?;
        let suggester = self.plugin_lookup.suggester(id);
        if suggester.is_none() {
            warn!(suggester = id, "Configured suggester is not available");
        }
        suggester
    }

    /// The configured notifier, or one forwarding to `suggester`, or a no-op.
    pub fn resolve_notifier(
        &self,
        suggester: Option<&Arc<dyn Suggester>>,
    ) -> Arc<dyn SongPlayedNotifier> {
        match (&self.song_played_notifier, suggester) {
            (Some(notifier), _) => Arc::clone(notifier),
            (None, Some(suggester)) => Arc::new(SuggesterNotifier::new(Arc::clone(suggester))),
            (None, None) => Arc::new(NoopNotifier),
        }
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| Error::InvalidSetting {
        key: key.to_string(),
        message: format!("{value:?}: {e}"),
    })
}

fn plugin_lookup_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "PluginLookup".to_string(),
        message: "A PluginLookup is required to resolve the provider of each song. \
                  Pass the plugin registry (or any other lookup) via .plugin_lookup()."
            .to_string(),
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    plugin_lookup: Option<Arc<dyn PluginLookup>>,
    suggester: Option<Arc<dyn Suggester>>,
    suggester_id: Option<String>,
    song_played_notifier: Option<Arc<dyn SongPlayedNotifier>>,
    config_storage: Option<Arc<dyn ConfigStorageAdapter>>,
    cache: CacheSettings,
    player: PlayerSettings,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    pub fn plugin_lookup(mut self, lookup: Arc<dyn PluginLookup>) -> Self {
        self.plugin_lookup = Some(lookup);
        self
    }

    pub fn suggester(mut self, suggester: Arc<dyn Suggester>) -> Self {
        self.suggester = Some(suggester);
        self
    }

    /// Resolve the suggester by plugin id at startup.
    pub fn suggester_id(mut self, id: impl Into<String>) -> Self {
        self.suggester_id = Some(id.into());
        self
    }

    pub fn song_played_notifier(mut self, notifier: Arc<dyn SongPlayedNotifier>) -> Self {
        self.song_played_notifier = Some(notifier);
        self
    }

    pub fn config_storage(mut self, storage: Arc<dyn ConfigStorageAdapter>) -> Self {
        self.config_storage = Some(storage);
        self
    }

    pub fn cache_settings(mut self, settings: CacheSettings) -> Self {
        self.cache = settings;
        self
    }

    pub fn player_settings(mut self, settings: PlayerSettings) -> Self {
        self.player = settings;
        self
    }

    pub fn cache_max_entries(mut self, max_entries: usize) -> Self {
        self.cache.max_entries = max_entries;
        self
    }

    pub fn cache_expire_after_access(mut self, idle: Duration) -> Self {
        self.cache.expire_after_access = idle;
        self
    }

    pub fn cache_close_timeout(mut self, timeout: Duration) -> Self {
        self.cache.close_timeout = timeout;
        self
    }

    pub fn max_concurrent_loads(mut self, loads: usize) -> Self {
        self.cache.max_concurrent_loads = loads;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.player.history_capacity = capacity;
        self
    }

    pub fn resume_on_insert(mut self, enabled: bool) -> Self {
        self.player.resume_on_insert = enabled;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the config.
    ///
    /// Fails with [`Error::CapabilityMissing`] without a plugin lookup and
    /// with [`Error::Config`] for invalid settings.
    pub fn build(self) -> Result<CoreConfig> {
        let plugin_lookup = self.plugin_lookup.ok_or_else(plugin_lookup_missing_error)?;

        let config = CoreConfig {
            plugin_lookup,
            suggester: self.suggester,
            suggester_id: self.suggester_id,
            song_played_notifier: self.song_played_notifier,
            config_storage: self.config_storage,
            cache: self.cache,
            player: self.player,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

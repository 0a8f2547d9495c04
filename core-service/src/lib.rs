//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host's plugins and config storage into the playback
//! core: it applies stored settings, builds the event bus, queue, resource
//! cache, player and history, and tears them down again in order.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::{CoreService, PluginRegistry};
//! use plugin_traits::LoggingProgressFeedback;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(PluginRegistry::new());
//! registry.register_provider(Arc::new(LocalFiles::new()));
//! registry.register_suggester(Arc::new(RandomSuggester::new()));
//!
//! let builder = CoreConfig::builder().suggester_id("random");
//! let core = CoreService::from_registry(registry, builder, &LoggingProgressFeedback).await?;
//!
//! core.enqueue(song, user);
//! core.player().next().await?;
//! core.shutdown().await?;
//! ```

pub mod error;
pub mod registry;

pub use error::{CoreError, Result};
pub use registry::{InitReport, PluginRegistry};

use core_playback::{
    CacheConfig, Player, PlayerConfig, PlayerHistory, ProviderSongLoader, QueueChangeListener,
    ResourceCache, SongQueue,
};
use core_runtime::config::{CoreConfig, CoreConfigBuilder};
use core_runtime::events::{EventBus, EventStream};
use plugin_traits::{ConfigScope, ProgressFeedback, QueueEntry, Song, Suggester, User};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Primary façade exposed to host applications.
pub struct CoreService {
    config: CoreConfig,
    event_bus: Arc<EventBus>,
    queue: Arc<SongQueue>,
    cache: ResourceCache,
    player: Player,
    history: PlayerHistory,
    suggester: Option<Arc<dyn Suggester>>,
    registry: Option<Arc<PluginRegistry>>,
}

impl CoreService {
    /// Build and start the core from a finished config.
    ///
    /// Settings stored in the [`ConfigScope::General`] scope of the config
    /// storage override the config's own.
    pub async fn bootstrap(mut config: CoreConfig) -> Result<Self> {
        apply_stored_overrides(&mut config).await?;
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Ok(Self::assemble(config, event_bus, None))
    }

    /// Initialize the registry's plugins and bootstrap the core on top of it.
    ///
    /// Plugins that fail to initialize are disabled, they never abort the
    /// bootstrap. The registry becomes the config's plugin lookup and
    /// publishes its lifecycle events on the core's event bus.
    pub async fn from_registry(
        registry: Arc<PluginRegistry>,
        builder: CoreConfigBuilder,
        feedback: &dyn ProgressFeedback,
    ) -> Result<Self> {
        let mut config = builder.plugin_lookup(registry.clone()).build()?;
        apply_stored_overrides(&mut config).await?;

        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        registry.set_event_bus(Arc::clone(&event_bus));

        let report = registry
            .initialize_all(config.config_storage.as_deref(), feedback)
            .await;
        if report.initialized.is_empty() && !report.disabled.is_empty() {
            warn!("Every plugin was disabled");
        }

        Ok(Self::assemble(config, event_bus, Some(registry)))
    }

    #[instrument(skip_all)]
    fn assemble(
        config: CoreConfig,
        event_bus: Arc<EventBus>,
        registry: Option<Arc<PluginRegistry>>,
    ) -> Self {
        let queue = Arc::new(SongQueue::new().with_event_bus(Arc::clone(&event_bus)));

        let loader = Arc::new(ProviderSongLoader::new(Arc::clone(&config.plugin_lookup)));
        let cache = ResourceCache::with_event_bus(
            CacheConfig::from(&config.cache),
            loader,
            Arc::clone(&event_bus),
        );
        cache.start_sweeper();

        let suggester = config.resolve_suggester();
        let notifier = config.resolve_notifier(suggester.as_ref());

        let mut builder = Player::builder(
            Arc::clone(&queue),
            cache.clone(),
            Arc::clone(&config.plugin_lookup),
        )
        .song_played_notifier(notifier)
        .config(PlayerConfig::from(&config.player))
        .event_bus(Arc::clone(&event_bus));
        if let Some(suggester) = &suggester {
            builder = builder.suggester(Arc::clone(suggester));
        }
        let player = builder.build();
        let history = PlayerHistory::attach(&player, config.player.history_capacity);
        player.start();

        info!(
            suggester = suggester.as_ref().map(|s| s.id().to_string()),
            "Core service started"
        );

        Self {
            config,
            event_bus,
            queue,
            cache,
            player,
            history,
            suggester,
            registry,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn queue(&self) -> &Arc<SongQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn history(&self) -> &PlayerHistory {
        &self.history
    }

    pub fn suggester(&self) -> Option<&Arc<dyn Suggester>> {
        self.suggester.as_ref()
    }

    pub fn registry(&self) -> Option<&Arc<PluginRegistry>> {
        self.registry.as_ref()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Subscribe to all core events from now on.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Enqueue `song` for `user`. Returns `false` if it is already queued.
    pub fn enqueue(&self, song: Song, user: User) -> bool {
        self.queue.insert(QueueEntry::new(song, user))
    }

    /// Observe queue changes.
    pub fn add_queue_listener(&self, listener: Arc<dyn QueueChangeListener>) {
        self.queue.add_listener(listener);
    }

    /// Tell the suggester the user does not want `song` again.
    pub async fn dislike(&self, song: &Song) -> Result<()> {
        if let Some(suggester) = &self.suggester {
            suggester.dislike(song).await?;
        }
        Ok(())
    }

    /// Stop the player, free cached resources and close the plugins.
    ///
    /// Every step runs even if an earlier one failed; the first failure is
    /// returned.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down core service");
        self.player.close().await;

        let cache_result = self.cache.close().await;
        if let Err(e) = &cache_result {
            warn!(error = %e, "Resource cache did not close cleanly");
        }

        if let Some(registry) = &self.registry {
            registry.close_all().await;
        }

        cache_result.map_err(CoreError::from)
    }
}

async fn apply_stored_overrides(config: &mut CoreConfig) -> Result<()> {
    if let Some(storage) = config.config_storage.clone() {
        let overrides = storage.load(&ConfigScope::General).await?;
        if !overrides.is_empty() {
            debug!(count = overrides.len(), "Applying stored settings");
            config.apply_overrides(&overrides)?;
        }
    }
    Ok(())
}

impl fmt::Debug for CoreService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .field("player", &self.player)
            .field("queue", &self.queue)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

//! # Resource Cache
//!
//! Keeps loaded song resources around so a song that is played again (or
//! was preloaded while the previous song played) starts without waiting.
//!
//! - At most one load per song is in flight; concurrent callers share it
//! - Loads across songs are throttled with a semaphore
//! - Entries are evicted by LRU capacity and by idle time
//! - Evicted resources are freed on background tasks, never on the caller

use crate::cache::config::CacheConfig;
use crate::cache::loader::SongLoader;
use crate::error::{PlaybackError, Result};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use plugin_traits::{PluginError, Resource, Song};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, trace, warn};

type LoadResult = std::result::Result<Arc<dyn Resource>, Arc<PluginError>>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

struct Slot {
    /// Distinguishes a slot from a later one for the same song.
    generation: u64,
    load: SharedLoad,
    last_access: Instant,
}

struct CacheInner {
    config: CacheConfig,
    loader: Arc<dyn SongLoader>,
    slots: Mutex<LruCache<Song, Slot>>,
    load_permits: Semaphore,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    next_generation: AtomicU64,
    sweeper_started: AtomicBool,
    event_bus: Option<Arc<EventBus>>,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl CacheInner {
    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }

    fn is_expired(&self, slot: &Slot, now: Instant) -> bool {
        now.saturating_duration_since(slot.last_access) > self.config.expire_after_access
    }

    async fn load(&self, song: &Song) -> LoadResult {
        let _permit = tokio::select! {
            permit = self.load_permits.acquire() => permit.map_err(|_| closed_while_loading())?,
            _ = self.shutdown.cancelled() => return Err(closed_while_loading()),
        };

        debug!(song = %song, "Loading song resource");
        self.emit(CacheEvent::LoadStarted {
            song_id: song.id().to_string(),
            provider: song.provider().to_string(),
        });

        self.loader.load(song).await.map_err(Arc::new)
    }

    /// Drop the slot for `song` if it is still the one with `generation`.
    fn remove_generation(&self, song: &Song, generation: u64) -> Option<Slot> {
        let mut slots = self.slots.lock();
        match slots.peek(song) {
            Some(slot) if slot.generation == generation => slots.pop(song),
            _ => None,
        }
    }

    /// Free the slot's resource in the background once its load settles.
    fn release(&self, song: Song, slot: Slot) {
        trace!(song = %song, generation = slot.generation, "Releasing cache slot");
        self.emit(CacheEvent::Evicted {
            song_id: song.id().to_string(),
            provider: song.provider().to_string(),
        });

        self.tasks.spawn(async move {
            // A failed load left nothing to free
            if let Ok(resource) = slot.load.await {
                if let Err(e) = resource.free().await {
                    warn!(song = %song, error = %e, "Failed to free song resource");
                }
            }
        });
    }
}

fn closed_while_loading() -> Arc<PluginError> {
    Arc::new(PluginError::SongLoading(
        "resource cache closed while loading".to_string(),
    ))
}

/// Cache of loaded song resources. Cloning yields another handle to the
/// same cache.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

impl ResourceCache {
    /// Create a new cache. Call [`start_sweeper`](Self::start_sweeper) from
    /// within a runtime to also free idle entries nobody asks for.
    pub fn new(config: CacheConfig, loader: Arc<dyn SongLoader>) -> Self {
        Self::build(config, loader, None)
    }

    /// Create a cache publishing [`CacheEvent`]s to `event_bus`.
    pub fn with_event_bus(
        config: CacheConfig,
        loader: Arc<dyn SongLoader>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::build(config, loader, Some(event_bus))
    }

    fn build(
        config: CacheConfig,
        loader: Arc<dyn SongLoader>,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        let permits = config.max_concurrent_loads.max(1);

        Self {
            inner: Arc::new(CacheInner {
                config,
                loader,
                slots: Mutex::new(LruCache::new(capacity)),
                load_permits: Semaphore::new(permits),
                tasks: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                next_generation: AtomicU64::new(0),
                sweeper_started: AtomicBool::new(false),
                event_bus,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Get the resource for `song`, loading it if needed.
    ///
    /// A cached resource that is no longer valid is discarded and loaded
    /// again, once.
    #[instrument(skip_all, fields(song = %song))]
    pub async fn get(&self, song: &Song) -> Result<Arc<dyn Resource>> {
        let mut reloaded = false;
        loop {
            let (generation, load) = self.slot_for(song)?;

            match load.await {
                Ok(resource) if resource.is_valid() => return Ok(resource),
                Ok(_) if !reloaded => {
                    debug!("Cached resource is no longer valid, reloading");
                    if let Some(slot) = self.inner.remove_generation(song, generation) {
                        self.inner.release(song.clone(), slot);
                    }
                    reloaded = true;
                }
                Ok(_) => {
                    return Err(PlaybackError::SongLoading {
                        song: song.clone(),
                        source: Arc::new(PluginError::Resource(
                            "freshly loaded resource is not valid".to_string(),
                        )),
                    });
                }
                Err(source) => {
                    return Err(PlaybackError::SongLoading {
                        song: song.clone(),
                        source,
                    });
                }
            }
        }
    }

    /// Start loading `song` without waiting for it.
    pub fn preload(&self, song: &Song) {
        if self.is_closed() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            trace!(song = %song, "No runtime, skipping preload");
            return;
        };

        let cache = self.clone();
        let song = song.clone();
        self.inner.tasks.spawn_on(
            async move {
                if let Err(e) = cache.get(&song).await {
                    debug!(song = %song, error = %e, "Preloading failed");
                }
            },
            &handle,
        );
    }

    /// Drop the entry for `song` and free its resource.
    pub fn invalidate(&self, song: &Song) {
        let removed = self.inner.slots.lock().pop(song);
        if let Some(slot) = removed {
            self.inner.release(song.clone(), slot);
        }
    }

    /// Free every entry that was not accessed for `expire_after_access`.
    pub fn sweep(&self) {
        let now = Instant::now();
        let expired: Vec<(Song, Slot)> = {
            let mut slots = self.inner.slots.lock();
            let songs: Vec<Song> = slots
                .iter()
                .filter(|(_, slot)| self.inner.is_expired(slot, now))
                .map(|(song, _)| song.clone())
                .collect();
            songs
                .into_iter()
                .filter_map(|song| slots.pop(&song).map(|slot| (song, slot)))
                .collect()
        };

        if !expired.is_empty() {
            debug!(count = expired.len(), "Evicting idle song resources");
        }
        for (song, slot) in expired {
            self.inner.release(song, slot);
        }
    }

    /// Periodically [`sweep`](Self::sweep) until the cache is closed or
    /// dropped. Calling this more than once has no effect.
    pub fn start_sweeper(&self) {
        if self.inner.sweeper_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        let period = self.inner.config.sweep_interval;

        self.inner.tasks.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ResourceCache { inner }.sweep();
            }
            trace!("Cache sweeper stopped");
        });
    }

    /// Close the cache.
    ///
    /// New requests fail with [`PlaybackError::CacheClosed`]. All entries are
    /// freed; waits at most `close_timeout` for the frees to finish.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        let drained: Vec<(Song, Slot)> = {
            let mut slots = self.inner.slots.lock();
            if self.inner.shutdown.is_cancelled() {
                return Ok(());
            }
            self.inner.shutdown.cancel();

            let mut drained = Vec::with_capacity(slots.len());
            while let Some(pair) = slots.pop_lru() {
                drained.push(pair);
            }
            drained
        };

        info!(entries = drained.len(), "Closing resource cache");
        for (song, slot) in drained {
            self.inner.release(song, slot);
        }

        self.inner.tasks.close();
        let close_timeout = self.inner.config.close_timeout;
        match timeout(close_timeout, self.inner.tasks.wait()).await {
            Ok(()) => {
                self.inner.emit(CacheEvent::Closed { timed_out: false });
                Ok(())
            }
            Err(_) => {
                warn!(timeout = ?close_timeout, "Timed out waiting for song resources to be freed");
                self.inner.emit(CacheEvent::Closed { timed_out: true });
                Err(PlaybackError::CacheCloseTimeout(close_timeout))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Number of cached (or loading) entries.
    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `song` has an entry, without touching its LRU position.
    pub fn contains(&self, song: &Song) -> bool {
        self.inner.slots.lock().contains(song)
    }

    /// Find the slot for `song` or start a load for it.
    fn slot_for(&self, song: &Song) -> Result<(u64, SharedLoad)> {
        let now = Instant::now();
        let mut displaced = Vec::new();

        let found = {
            let mut slots = self.inner.slots.lock();
            if self.inner.shutdown.is_cancelled() {
                return Err(PlaybackError::CacheClosed);
            }

            let cached = slots.get_mut(song).map(|slot| {
                if self.inner.is_expired(slot, now) {
                    None
                } else {
                    slot.last_access = now;
                    Some((slot.generation, slot.load.clone()))
                }
            });

            match cached {
                Some(Some(found)) => found,
                expired => {
                    if expired.is_some() {
                        if let Some(slot) = slots.pop(song) {
                            displaced.push((song.clone(), slot));
                        }
                    }

                    // Spawned under the lock so the task can't observe the
                    // map before its slot is in it.
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    let load = self.spawn_load(song.clone(), generation);
                    let slot = Slot {
                        generation,
                        load: load.clone(),
                        last_access: now,
                    };
                    if let Some(evicted) = slots.push(song.clone(), slot) {
                        displaced.push(evicted);
                    }
                    (generation, load)
                }
            }
        };

        for (song, slot) in displaced {
            self.inner.release(song, slot);
        }

        Ok(found)
    }

    fn spawn_load(&self, song: Song, generation: u64) -> SharedLoad {
        let inner = Arc::clone(&self.inner);
        let handle = self.inner.tasks.spawn(async move {
            let result = inner.load(&song).await;
            if let Err(e) = &result {
                warn!(song = %song, error = %e, "Failed to load song resource");
                inner.remove_generation(&song, generation);
                inner.emit(CacheEvent::LoadFailed {
                    song_id: song.id().to_string(),
                    provider: song.provider().to_string(),
                    message: e.to_string(),
                });
            }
            result
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(Arc::new(PluginError::SongLoading(format!(
                    "load task failed: {e}"
                )))),
            }
        }
        .boxed()
        .shared()
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("config", &self.inner.config)
            .field("entries", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::loader::MockSongLoader;
    use plugin_traits::NoResource;
    use std::time::Duration;

    fn song(id: &str) -> Song {
        Song::builder(id, "test")
            .title(format!("Song {id}"))
            .description("desc")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_caches_resource() {
        let mut loader = MockSongLoader::new();
        loader
            .expect_load()
            .times(1)
            .returning(|_| Ok(Arc::new(NoResource) as Arc<dyn Resource>));
        let cache = ResourceCache::new(CacheConfig::default(), Arc::new(loader));

        let first = cache.get(&song("1")).await.unwrap();
        let second = cache.get(&song("1")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&song("1")));
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_on_next_get() {
        let mut loader = MockSongLoader::new();
        let mut seq = mockall::Sequence::new();
        loader
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(PluginError::SongLoading("offline".into())));
        loader
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Arc::new(NoResource) as Arc<dyn Resource>));
        let cache = ResourceCache::new(CacheConfig::default(), Arc::new(loader));

        let error = cache.get(&song("1")).await.err().expect("expected load error");
        assert!(matches!(error, PlaybackError::SongLoading { .. }));
        assert!(!cache.contains(&song("1")));

        assert!(cache.get(&song("1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_after_close_is_rejected() {
        let cache = ResourceCache::new(CacheConfig::default(), Arc::new(MockSongLoader::new()));

        cache.close().await.unwrap();
        cache.close().await.unwrap();

        assert!(cache.is_closed());
        assert!(matches!(
            cache.get(&song("1")).await,
            Err(PlaybackError::CacheClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_entries_expire() {
        let mut loader = MockSongLoader::new();
        loader
            .expect_load()
            .times(2)
            .returning(|_| Ok(Arc::new(NoResource) as Arc<dyn Resource>));
        let config = CacheConfig::new().with_expire_after_access(Duration::from_secs(10));
        let cache = ResourceCache::new(config, Arc::new(loader));

        cache.get(&song("1")).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.get(&song("1")).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        cache.sweep();
        assert!(cache.is_empty());

        cache.get(&song("1")).await.unwrap();
    }
}

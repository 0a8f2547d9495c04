//! # Resource Cache Module
//!
//! Caches the per-song resources providers load before a song can be played.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │     ResourceCache                      │
//! │  - get() / preload()                   │
//! │  - invalidate() / sweep()              │
//! │  - close()                             │
//! └────────┬───────────────────────────────┘
//!          │
//!          └──> SongLoader ──> PluginLookup ──> Provider::load_song
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_playback::cache::{CacheConfig, ProviderSongLoader, ResourceCache};
//! use std::sync::Arc;
//!
//! let loader = Arc::new(ProviderSongLoader::new(lookup));
//! let cache = ResourceCache::new(CacheConfig::default(), loader);
//! cache.start_sweeper();
//!
//! let resource = cache.get(&song).await?;
//! // ...
//! cache.close().await?;
//! ```

pub mod config;
pub mod loader;
pub mod resource_cache;

pub use config::CacheConfig;
pub use loader::{ProviderSongLoader, SongLoader};
pub use resource_cache::ResourceCache;

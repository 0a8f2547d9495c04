//! # Plugin Traits
//!
//! Contracts between the playback core and the collaborators it is handed at
//! startup.
//!
//! ## Overview
//!
//! The core never discovers or loads plugins itself. The host resolves its
//! plugin set and passes the instances in through these traits:
//!
//! ### Songs
//! - [`Song`] / [`ProviderId`] - song identity, equal by `(id, provider)`
//! - [`SongEntry`] / [`QueueEntry`] / [`User`] - why a song is played
//!
//! ### Plugins
//! - [`Provider`] - search, lookup, load and play songs from one source
//! - [`Suggester`] - supplies songs when the queue runs dry
//! - [`PluginLookup`] - resolves a [`ProviderId`] to a live provider
//! - [`SongPlayedNotifier`] - told about every song right before it plays
//!
//! ### Playback
//! - [`Resource`] - data prepared by `Provider::load_song`, freed by the cache
//! - [`Playback`] - one active play of one song
//! - [`PlaybackFeedbackChannel`] - externally caused state changes
//!
//! ### Host integration
//! - [`ConfigStorageAdapter`] - flat string maps per [`ConfigScope`]
//! - [`ProgressFeedback`] - init progress and warnings
//! - [`LoggerSink`] - host log forwarding
//!
//! ## Error Handling
//!
//! Every trait reports failures as [`PluginError`]. The variants the player
//! reacts to are [`PluginError::BrokenSuggester`] (stop, try again later) and
//! [`PluginError::SongLoading`] (skip to error state for that song).
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`; the core calls them from tokio tasks.
//!
//! ## Example
//!
//! ```ignore
//! use plugin_traits::{NoResource, Provider, Resource, Song};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! #[async_trait]
//! impl Provider for RadioProvider {
//!     async fn load_song(&self, _song: &Song) -> plugin_traits::Result<Arc<dyn Resource>> {
//!         // streams need no preparation
//!         Ok(Arc::new(NoResource))
//!     }
//!     // ...
//! }
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod logging;
pub mod lookup;
pub mod playback;
pub mod plugin;
pub mod resource;
pub mod song;

pub use error::{PluginError, Result};

pub use config::{ConfigScope, ConfigStorageAdapter, MemoryConfigStorage};
pub use entry::{QueueEntry, SongEntry, User};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use lookup::{NoopNotifier, PluginLookup, SongPlayedNotifier, SuggesterNotifier};
pub use playback::{
    Playback, PlaybackCompletion, PlaybackFeedback, PlaybackFeedbackChannel, PlaybackState,
};
pub use plugin::{LoggingProgressFeedback, Plugin, ProgressFeedback, Provider, Suggester};
pub use resource::{FileResource, NoResource, Resource};
pub use song::{ProviderId, Song, SongBuilder};

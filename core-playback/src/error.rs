//! # Playback Error Types
//!
//! Errors surfaced by the queue, the resource cache and the player.

use plugin_traits::{PluginError, ProviderId, Song};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug, Clone)]
pub enum PlaybackError {
    // ========================================================================
    // Loading Errors
    // ========================================================================
    /// The resource of a song could not be loaded.
    ///
    /// Every caller waiting on the same load receives the same source error.
    #[error("Failed to load song '{song}': {source}")]
    SongLoading {
        song: Song,
        #[source]
        source: Arc<PluginError>,
    },

    /// No live provider is registered for the song's provider id.
    #[error("Provider not found: {0}")]
    ProviderNotFound(ProviderId),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The resource cache was closed and accepts no more requests.
    #[error("Resource cache is closed")]
    CacheClosed,

    /// Outstanding resource frees did not finish in time while closing.
    #[error("Timed out after {0:?} waiting for resources to be freed")]
    CacheCloseTimeout(Duration),

    /// The player was closed and accepts no more commands.
    #[error("Player is closed")]
    PlayerClosed,

    // ========================================================================
    // Plugin Errors
    // ========================================================================
    #[error("Plugin error: {0}")]
    Plugin(Arc<PluginError>),

    /// Internal error that should not happen.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PluginError> for PlaybackError {
    fn from(error: PluginError) -> Self {
        PlaybackError::Plugin(Arc::new(error))
    }
}

impl PlaybackError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlaybackError::SongLoading { source, .. } => source.is_transient(),
            PlaybackError::Plugin(source) => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

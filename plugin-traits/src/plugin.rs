//! Plugin base traits: providers and suggesters.

use crate::entry::SongEntry;
use crate::error::{PluginError, Result};
use crate::playback::Playback;
use crate::resource::Resource;
use crate::song::{ProviderId, Song};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Channel a plugin uses to report progress while it initializes.
pub trait ProgressFeedback: Send + Sync {
    /// Report what the plugin is currently doing.
    fn state(&self, message: &str);

    /// Report a non-fatal problem.
    fn warning(&self, message: &str);
}

/// [`ProgressFeedback`] that writes to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProgressFeedback;

impl ProgressFeedback for LoggingProgressFeedback {
    fn state(&self, message: &str) {
        tracing::info!(target: "plugin_init", "{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!(target: "plugin_init", "{message}");
    }
}

/// Lifecycle shared by every plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable identifier, unique among loaded plugins.
    fn id(&self) -> &str;

    /// Human readable name.
    fn name(&self) -> &str {
        self.id()
    }

    /// Apply stored configuration. Called before [`Plugin::initialize`].
    async fn configure(&self, _config: &HashMap<String, String>) -> Result<()> {
        Ok(())
    }

    async fn initialize(&self, _feedback: &dyn ProgressFeedback) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Supplies songs from one source and knows how to play them.
#[async_trait]
pub trait Provider: Plugin {
    /// Id stamped on every song this provider returns.
    fn provider_id(&self) -> ProviderId {
        ProviderId::new(self.id())
    }

    async fn search(&self, query: &str, offset: usize) -> Result<Vec<Song>>;

    /// Fails with [`PluginError::NoSuchSong`] for unknown ids.
    async fn lookup(&self, song_id: &str) -> Result<Song>;

    /// Look up several songs. Unknown ids are skipped.
    async fn lookup_batch(&self, song_ids: &[String]) -> Result<Vec<Song>> {
        let mut songs = Vec::with_capacity(song_ids.len());
        for id in song_ids {
            match self.lookup(id).await {
                Ok(song) => songs.push(song),
                Err(PluginError::NoSuchSong(_)) => {
                    warn!(provider = self.id(), song_id = %id, "Skipping unknown song")
                }
                Err(err) => return Err(err),
            }
        }
        Ok(songs)
    }

    /// Prepare everything needed to play `song`.
    ///
    /// Fails with [`PluginError::SongLoading`].
    async fn load_song(&self, song: &Song) -> Result<Arc<dyn Resource>>;

    /// Create a playback for a song whose resource was loaded by this provider.
    async fn supply_playback(
        &self,
        song: &Song,
        resource: Arc<dyn Resource>,
    ) -> Result<Arc<dyn Playback>>;
}

/// Picks songs to play when nobody queued anything.
#[async_trait]
pub trait Suggester: Plugin {
    /// Fails with [`PluginError::BrokenSuggester`] if no suggestion is
    /// possible right now.
    async fn suggest_next(&self) -> Result<Song>;

    /// Up to `max` upcoming suggestions, without consuming them.
    async fn next_suggestions(&self, max: usize) -> Result<Vec<Song>>;

    /// Called whenever a song starts playing, suggested or not.
    async fn notify_played(&self, entry: &SongEntry) -> Result<()> {
        self.remove_suggestion(entry.song()).await
    }

    /// Drop `song` from the upcoming suggestions if present.
    async fn remove_suggestion(&self, song: &Song) -> Result<()>;

    /// A user disliked `song`; it should not be suggested again soon.
    async fn dislike(&self, song: &Song) -> Result<()> {
        self.remove_suggestion(song).await
    }
}

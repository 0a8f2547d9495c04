//! Loading song resources from their providers.

use async_trait::async_trait;
use plugin_traits::{PluginError, PluginLookup, Resource, Result, Song};
use std::sync::Arc;

/// Produces the resource for a song on a cache miss.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SongLoader: Send + Sync {
    async fn load(&self, song: &Song) -> Result<Arc<dyn Resource>>;
}

/// Loads through the song's provider, resolved by id on every call.
pub struct ProviderSongLoader {
    lookup: Arc<dyn PluginLookup>,
}

impl ProviderSongLoader {
    pub fn new(lookup: Arc<dyn PluginLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl SongLoader for ProviderSongLoader {
    async fn load(&self, song: &Song) -> Result<Arc<dyn Resource>> {
        let provider = self.lookup.provider(song.provider()).ok_or_else(|| {
            PluginError::SongLoading(format!("provider '{}' is not available", song.provider()))
        })?;
        provider.load_song(song).await
    }
}

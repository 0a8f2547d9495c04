//! Resolving plugins and reporting played songs.

use crate::entry::SongEntry;
use crate::error::Result;
use crate::plugin::{Provider, Suggester};
use crate::song::ProviderId;
use async_trait::async_trait;
use std::sync::Arc;

/// Resolves stable plugin ids to live plugin instances.
///
/// A missing plugin is reported as `None`; it is not an error on the hot path.
pub trait PluginLookup: Send + Sync {
    fn provider(&self, id: &ProviderId) -> Option<Arc<dyn Provider>>;

    fn suggester(&self, id: &str) -> Option<Arc<dyn Suggester>>;
}

/// Side channel notified right before a song starts playing.
#[async_trait]
pub trait SongPlayedNotifier: Send + Sync {
    async fn notify_played(&self, entry: &SongEntry) -> Result<()>;
}

/// Forwards played songs to a suggester so it can adapt its suggestions.
pub struct SuggesterNotifier {
    suggester: Arc<dyn Suggester>,
}

impl SuggesterNotifier {
    pub fn new(suggester: Arc<dyn Suggester>) -> Self {
        Self { suggester }
    }
}

#[async_trait]
impl SongPlayedNotifier for SuggesterNotifier {
    async fn notify_played(&self, entry: &SongEntry) -> Result<()> {
        self.suggester.notify_played(entry).await
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl SongPlayedNotifier for NoopNotifier {
    async fn notify_played(&self, _entry: &SongEntry) -> Result<()> {
        Ok(())
    }
}

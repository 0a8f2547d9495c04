//! Song identity types.

use crate::error::{PluginError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Stable identifier of a provider plugin.
///
/// Songs reference their provider by id, never by instance, so a song stays
/// meaningful after the provider was reloaded or disabled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A playable song offered by a provider.
///
/// Two songs are equal when their `id` and `provider` match; the descriptive
/// fields are ignored by `PartialEq` and `Hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    id: String,
    provider: ProviderId,
    title: String,
    description: String,
    duration: Option<Duration>,
    album_art_url: Option<String>,
}

impl Song {
    /// Start building a song. `title` and `description` must be set before
    /// [`SongBuilder::build`] succeeds.
    pub fn builder(id: impl Into<String>, provider: impl Into<ProviderId>) -> SongBuilder {
        SongBuilder {
            id: id.into(),
            provider: provider.into(),
            title: None,
            description: None,
            duration: None,
            album_art_url: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn album_art_url(&self) -> Option<&str> {
        self.album_art_url.as_deref()
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.provider == other.provider
    }
}

impl Eq for Song {}

impl Hash for Song {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.provider.hash(state);
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.title, self.provider, self.id)
    }
}

/// Builder for [`Song`].
#[derive(Debug, Clone)]
pub struct SongBuilder {
    id: String,
    provider: ProviderId,
    title: Option<String>,
    description: Option<String>,
    duration: Option<Duration>,
    album_art_url: Option<String>,
}

impl SongBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn album_art_url(mut self, url: impl Into<String>) -> Self {
        self.album_art_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<Song> {
        if self.id.is_empty() {
            return Err(PluginError::InvalidSong("id must not be empty".to_string()));
        }
        let title = self
            .title
            .ok_or_else(|| PluginError::InvalidSong(format!("song {} has no title", self.id)))?;
        let description = self.description.ok_or_else(|| {
            PluginError::InvalidSong(format!("song {} has no description", self.id))
        })?;

        Ok(Song {
            id: self.id,
            provider: self.provider,
            title,
            description,
            duration: self.duration,
            album_art_url: self.album_art_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn song(id: &str, provider: &str, title: &str) -> Song {
        Song::builder(id, provider)
            .title(title)
            .description("desc")
            .build()
            .unwrap()
    }

    #[test]
    fn test_equality_ignores_descriptive_fields() {
        let a = song("1", "local", "First");
        let b = song("1", "local", "Renamed");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_same_id_different_provider_differs() {
        assert_ne!(song("1", "local", "x"), song("1", "youtube", "x"));
    }

    #[test]
    fn test_builder_requires_title_and_description() {
        let missing_title = Song::builder("1", "local").description("d").build();
        assert!(matches!(missing_title, Err(PluginError::InvalidSong(_))));

        let missing_description = Song::builder("1", "local").title("t").build();
        assert!(matches!(missing_description, Err(PluginError::InvalidSong(_))));

        let full = Song::builder("1", "local")
            .title("t")
            .description("d")
            .duration(Duration::from_secs(180))
            .album_art_url("http://art")
            .build()
            .unwrap();
        assert_eq!(full.duration(), Some(Duration::from_secs(180)));
        assert_eq!(full.album_art_url(), Some("http://art"));
        assert_eq!(full.provider().as_str(), "local");
    }
}

//! Queue and playback entries.

use crate::song::Song;
use serde::{Deserialize, Serialize};
use std::fmt;

const BOT_USER: &str = "MusicBot";

/// The user who enqueued a song.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The bot itself, used for songs enqueued without a human user.
    pub fn bot() -> Self {
        Self::new(BOT_USER)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A song explicitly enqueued by a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueEntry {
    song: Song,
    user: User,
}

impl QueueEntry {
    pub fn new(song: Song, user: User) -> Self {
        Self { song, user }
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn user(&self) -> &User {
        &self.user
    }
}

/// A song together with the reason it is played.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SongEntry {
    /// Taken from the queue.
    Queue(QueueEntry),
    /// Picked by the suggester because the queue was empty.
    Suggested { song: Song },
}

impl SongEntry {
    pub fn suggested(song: Song) -> Self {
        SongEntry::Suggested { song }
    }

    pub fn song(&self) -> &Song {
        match self {
            SongEntry::Queue(entry) => entry.song(),
            SongEntry::Suggested { song } => song,
        }
    }

    /// `None` for suggested entries.
    pub fn user(&self) -> Option<&User> {
        match self {
            SongEntry::Queue(entry) => Some(entry.user()),
            SongEntry::Suggested { .. } => None,
        }
    }

    pub fn is_suggested(&self) -> bool {
        matches!(self, SongEntry::Suggested { .. })
    }
}

impl From<QueueEntry> for SongEntry {
    fn from(entry: QueueEntry) -> Self {
        SongEntry::Queue(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: &str) -> Song {
        Song::builder(id, "local")
            .title(id)
            .description("d")
            .build()
            .unwrap()
    }

    #[test]
    fn test_entry_accessors() {
        let queued = SongEntry::from(QueueEntry::new(song("a"), User::new("alice")));
        assert_eq!(queued.song().id(), "a");
        assert_eq!(queued.user().map(User::name), Some("alice"));
        assert!(!queued.is_suggested());

        let suggested = SongEntry::suggested(song("b"));
        assert!(suggested.user().is_none());
        assert!(suggested.is_suggested());
    }

    #[test]
    fn test_entries_compare_song_and_user() {
        let a = QueueEntry::new(song("a"), User::new("alice"));
        let b = QueueEntry::new(song("a"), User::new("bob"));
        assert_ne!(a, b);
        assert_eq!(a.song(), b.song());
        assert_ne!(SongEntry::from(a.clone()), SongEntry::suggested(a.song().clone()));
    }
}

//! Player states.

use plugin_traits::SongEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the player. Only `Play` and `Pause` carry a song.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "entry")]
pub enum PlayerState {
    #[default]
    Stop,
    Play(SongEntry),
    Pause(SongEntry),
    /// Preparing or playing the last song failed.
    Error,
}

impl PlayerState {
    /// The entry of the current song, if any.
    pub fn entry(&self) -> Option<&SongEntry> {
        match self {
            PlayerState::Play(entry) | PlayerState::Pause(entry) => Some(entry),
            PlayerState::Stop | PlayerState::Error => None,
        }
    }

    pub fn has_song(&self) -> bool {
        self.entry().is_some()
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Play(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlayerState::Stop => "stop",
            PlayerState::Play(_) => "play",
            PlayerState::Pause(_) => "pause",
            PlayerState::Error => "error",
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entry() {
            Some(entry) => write!(f, "{}({})", self.name(), entry.song()),
            None => f.write_str(self.name()),
        }
    }
}

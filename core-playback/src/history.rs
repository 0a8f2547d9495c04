//! Recently played songs.

use crate::player::{Player, StateSubscription};
use crate::state::PlayerState;
use core_runtime::config::DEFAULT_HISTORY_CAPACITY;
use parking_lot::Mutex;
use plugin_traits::SongEntry;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
struct Entries {
    capacity: usize,
    played: Mutex<VecDeque<SongEntry>>,
}

impl Entries {
    fn record(&self, state: &PlayerState) {
        let PlayerState::Play(entry) = state else {
            return;
        };

        let mut played = self.played.lock();
        if played.back() == Some(entry) {
            return;
        }
        if played.len() == self.capacity {
            played.pop_front();
        }
        played.push_back(entry.clone());
    }
}

/// Bounded list of the songs the player started playing, oldest first.
///
/// An attached history stops recording when it is dropped.
pub struct PlayerHistory {
    entries: Arc<Entries>,
    _subscription: Option<StateSubscription>,
}

impl PlayerHistory {
    /// A history that is fed manually through [`record`](Self::record).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Entries {
                capacity: capacity.max(1),
                played: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            }),
            _subscription: None,
        }
    }

    /// A history recording every song `player` starts.
    pub fn attach(player: &Player, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        let entries = Arc::clone(&history.entries);
        history._subscription = Some(player.add_listener(move |_, new| entries.record(new)));
        history
    }

    /// Record a state; only a newly playing entry is kept.
    pub fn record(&self, state: &PlayerState) {
        self.entries.record(state);
    }

    /// Up to `limit` of the most recent entries, oldest first.
    pub fn history(&self, limit: usize) -> Vec<SongEntry> {
        let played = self.entries.played.lock();
        let skip = played.len().saturating_sub(limit);
        played.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.played.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity
    }
}

impl Default for PlayerHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl fmt::Debug for PlayerHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerHistory")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("attached", &self._subscription.is_some())
            .finish()
    }
}

//! # Playback Core
//!
//! The music player and everything it needs to get from a queued song to a
//! running playback.
//!
//! ## Overview
//!
//! This crate handles:
//! - The song queue with change listeners
//! - Caching of loaded song resources with coalesced async loading
//! - The player state machine, run as a single actor task
//! - Progress tracking and play history as passive observers of the player

pub mod cache;
pub mod error;
pub mod history;
pub mod player;
pub mod progress;
pub mod queue;
pub mod state;

pub use cache::{CacheConfig, ProviderSongLoader, ResourceCache, SongLoader};
pub use error::{PlaybackError, Result};
pub use history::PlayerHistory;
pub use player::{Player, PlayerBuilder, PlayerConfig, StateSubscription};
pub use progress::{Progress, ProgressTracker};
pub use queue::{QueueChangeListener, SongQueue};
pub use state::PlayerState;

//! # Event Bus System
//!
//! Broadcasts what the playback core is doing using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: one enum per domain, wrapped by [`CoreEvent`]
//! - **EventBus**: cloneable handle around the broadcast sender
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌───────────┐   emit    ┌───────────┐  subscribe  ┌────────────┐
//! │  Player   ├──────────>│           ├────────────>│ Chat bot   │
//! ├───────────┤           │ EventBus  │             └────────────┘
//! │ SongQueue ├──────────>│ (broadcast│  subscribe  ┌────────────┐
//! ├───────────┤           │  channel) ├────────────>│ Web UI     │
//! │  Cache    ├──────────>│           │             └────────────┘
//! └───────────┘           └───────────┘
//! ```
//!
//! Emitting never blocks and never fails the emitter: with no subscribers the
//! event is simply dropped. Slow subscribers see `RecvError::Lagged(n)` and
//! can keep receiving; `RecvError::Closed` means every sender is gone.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut events = bus.subscribe();
//!
//! bus.emit(CoreEvent::Queue(QueueEvent::Cleared { count: 3 })).ok();
//!
//! let event = events.recv().await.unwrap();
//! assert_eq!(event.description(), "Queue cleared");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Player(PlayerEvent),
    Queue(QueueEvent),
    Cache(CacheEvent),
    Plugin(PluginEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Player(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Plugin(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Player(PlayerEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::LoadFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::Closed { timed_out: true }) => EventSeverity::Error,
            CoreEvent::Plugin(PluginEvent::Disabled { .. }) => EventSeverity::Warning,
            CoreEvent::Player(PlayerEvent::SongStarted { .. }) => EventSeverity::Info,
            CoreEvent::Plugin(PluginEvent::Initialized { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Player Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlayerEvent {
    /// Any state transition. `from` and `to` are state names.
    StateChanged {
        from: String,
        to: String,
        song_id: Option<String>,
    },
    /// A new song began playing.
    SongStarted {
        song_id: String,
        provider: String,
        title: String,
        /// `None` for suggested songs.
        user: Option<String>,
    },
    /// Preparing a song failed; the player is in its error state.
    Failed {
        song_id: Option<String>,
        message: String,
    },
}

impl PlayerEvent {
    fn description(&self) -> &str {
        match self {
            PlayerEvent::StateChanged { .. } => "Player state changed",
            PlayerEvent::SongStarted { .. } => "Song started",
            PlayerEvent::Failed { .. } => "Player failed",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    Added {
        song_id: String,
        provider: String,
        user: String,
        position: usize,
    },
    Removed {
        song_id: String,
        provider: String,
    },
    Moved {
        song_id: String,
        from: usize,
        to: usize,
    },
    Cleared {
        count: usize,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Added { .. } => "Song enqueued",
            QueueEvent::Removed { .. } => "Song removed from queue",
            QueueEvent::Moved { .. } => "Song moved in queue",
            QueueEvent::Cleared { .. } => "Queue cleared",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    LoadStarted {
        song_id: String,
        provider: String,
    },
    LoadFailed {
        song_id: String,
        provider: String,
        message: String,
    },
    /// Dropped from the cache because it was idle, stale or over capacity.
    Evicted {
        song_id: String,
        provider: String,
    },
    Closed {
        /// Outstanding frees did not finish in time.
        timed_out: bool,
    },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::LoadStarted { .. } => "Loading song resource",
            CacheEvent::LoadFailed { .. } => "Song resource failed to load",
            CacheEvent::Evicted { .. } => "Song resource evicted",
            CacheEvent::Closed { .. } => "Resource cache closed",
        }
    }
}

// ============================================================================
// Plugin Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PluginEvent {
    Initialized { plugin_id: String },
    /// Configuring or initializing failed; the plugin is no longer used.
    Disabled { plugin_id: String, reason: String },
    Closed { plugin_id: String },
}

impl PluginEvent {
    fn description(&self) -> &str {
        match self {
            PluginEvent::Initialized { .. } => "Plugin initialized",
            PluginEvent::Disabled { .. } => "Plugin disabled",
            PluginEvent::Closed { .. } => "Plugin closed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus clones the sender; every clone publishes to the same
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a receiver for all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
///
/// let bus = EventBus::new(16);
/// let problems = EventStream::new(bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned from now on.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next matching event.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once all senders are dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

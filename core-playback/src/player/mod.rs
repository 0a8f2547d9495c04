//! # Player
//!
//! The music player state machine.
//!
//! ## Overview
//!
//! A [`Player`] is a cheap handle in front of a single actor task. Every
//! transition (user commands, playback feedback, auto-play) is sent as a
//! command over one unbounded channel and applied by the actor in order, so
//! two transitions never interleave.
//!
//! ```text
//! Player::play/pause/next ─┐
//! PlaybackFeedbackChannel ─┼──> mpsc ──> actor ──> watch<Snapshot> ──> auto-play loop
//! auto-play / preload     ─┘                  └──> state listeners, EventBus
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let player = Player::builder(queue, cache, lookup)
//!     .suggester(suggester)
//!     .build();
//! player.start();
//!
//! player.next().await?;
//! player.pause().await?;
//! player.close().await;
//! ```

mod actor;

use crate::cache::ResourceCache;
use crate::error::{PlaybackError, Result};
use crate::progress::{Progress, ProgressTracker};
use crate::queue::{QueueChangeListener, SongQueue};
use crate::state::PlayerState;
use actor::{Command, PlayerActor};
use core_runtime::config::PlayerSettings;
use core_runtime::events::EventBus;
use parking_lot::RwLock;
use plugin_traits::{
    NoopNotifier, Playback, PluginLookup, QueueEntry, SongPlayedNotifier, Suggester,
    SuggesterNotifier,
};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

/// Player behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Warm the next suggestion while the queue is empty.
    pub preload_suggestions: bool,
    /// Start playing when a song is enqueued while stopped.
    pub resume_on_insert: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerSettings::default().into()
    }
}

impl From<PlayerSettings> for PlayerConfig {
    fn from(settings: PlayerSettings) -> Self {
        Self {
            preload_suggestions: settings.preload_suggestions,
            resume_on_insert: settings.resume_on_insert,
        }
    }
}

impl From<&PlayerSettings> for PlayerConfig {
    fn from(settings: &PlayerSettings) -> Self {
        settings.clone().into()
    }
}

/// What the actor last published.
#[derive(Clone, Default)]
pub(crate) struct Snapshot {
    pub(crate) state: PlayerState,
    /// Incremented on every transition.
    pub(crate) version: u64,
    pub(crate) playback: Option<Arc<dyn Playback>>,
}

// ============================================================================
// State listeners
// ============================================================================

type StateListener = Arc<dyn Fn(&PlayerState, &PlayerState) + Send + Sync>;

#[derive(Default)]
pub(crate) struct StateListeners {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(u64, StateListener)>>,
}

impl StateListeners {
    fn add(self: &Arc<Self>, listener: StateListener) -> StateSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        StateSubscription {
            id,
            listeners: Arc::downgrade(self),
        }
    }

    pub(crate) fn notify(&self, old: &PlayerState, new: &PlayerState) {
        let listeners: Vec<StateListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(old, new);
        }
    }
}

/// Keeps a state listener registered. Dropping it unregisters the listener.
#[must_use = "the listener is removed when the subscription is dropped"]
pub struct StateSubscription {
    id: u64,
    listeners: Weak<StateListeners>,
}

impl StateSubscription {
    /// Unregister now.
    pub fn unsubscribe(self) {}
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.listeners.write().retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for StateSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSubscription").field("id", &self.id).finish()
    }
}

// ============================================================================
// Shared state
// ============================================================================

pub(crate) struct PlayerShared {
    pub(crate) snapshot: watch::Sender<Snapshot>,
    pub(crate) state: watch::Sender<PlayerState>,
    pub(crate) listeners: Arc<StateListeners>,
    pub(crate) progress: Arc<ProgressTracker>,
}

// ============================================================================
// Queue listener
// ============================================================================

/// Preloads upcoming songs and optionally resumes playback on insert.
struct QueueObserver {
    queue: Weak<SongQueue>,
    cache: ResourceCache,
    suggester: Option<Arc<dyn Suggester>>,
    commands: mpsc::WeakUnboundedSender<Command>,
    shared: Arc<PlayerShared>,
    tasks: TaskTracker,
    config: PlayerConfig,
}

impl QueueObserver {
    fn preload_suggestion(&self) {
        if !self.config.preload_suggestions {
            return;
        }
        let Some(suggester) = self.suggester.clone() else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            trace!("No runtime, skipping suggestion preload");
            return;
        };

        let cache = self.cache.clone();
        self.tasks.spawn_on(
            async move {
                match suggester.next_suggestions(1).await {
                    Ok(songs) => {
                        if let Some(song) = songs.first() {
                            debug!(song = %song, "Preloading next suggestion");
                            cache.preload(song);
                        }
                    }
                    Err(e) if e.is_broken_suggester() => {
                        debug!(error = %e, "No suggestion to preload")
                    }
                    Err(e) => warn!(error = %e, "Failed to get suggestion for preloading"),
                }
            },
            &handle,
        );
    }
}

impl QueueChangeListener for QueueObserver {
    fn on_add(&self, entry: &QueueEntry) {
        self.cache.preload(entry.song());

        if self.config.resume_on_insert {
            let snapshot = self.shared.snapshot.borrow();
            if snapshot.state == PlayerState::Stop {
                if let Some(commands) = self.commands.upgrade() {
                    debug!("Song enqueued while stopped, resuming");
                    let _ = commands.send(Command::Next {
                        expected: Some(snapshot.version),
                        reply: None,
                    });
                }
            }
        }
    }

    fn on_remove(&self, _entry: &QueueEntry) {
        let empty = self.queue.upgrade().map_or(true, |queue| queue.is_empty());
        if empty {
            self.preload_suggestion();
        }
    }
}

// ============================================================================
// Player
// ============================================================================

/// Handle to the player actor.
pub struct Player {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<PlayerShared>,
    queue: Arc<SongQueue>,
    queue_observer: Arc<QueueObserver>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
    closed: AtomicBool,
}

impl Player {
    /// Start building a player.
    pub fn builder(
        queue: Arc<SongQueue>,
        cache: ResourceCache,
        lookup: Arc<dyn PluginLookup>,
    ) -> PlayerBuilder {
        PlayerBuilder {
            queue,
            cache,
            lookup,
            suggester: None,
            notifier: None,
            progress: None,
            config: PlayerConfig::default(),
            event_bus: None,
        }
    }

    /// The current state.
    pub fn state(&self) -> PlayerState {
        self.shared.state.borrow().clone()
    }

    /// Watch state changes. Intermediate states may be skipped by slow
    /// receivers; use [`add_listener`](Self::add_listener) to see every one.
    pub fn subscribe(&self) -> watch::Receiver<PlayerState> {
        self.shared.state.subscribe()
    }

    /// Call `listener(old, new)` on every transition, on the actor task.
    ///
    /// The listener must not block.
    pub fn add_listener<F>(&self, listener: F) -> StateSubscription
    where
        F: Fn(&PlayerState, &PlayerState) + Send + Sync + 'static,
    {
        self.shared.listeners.add(Arc::new(listener))
    }

    pub fn progress(&self) -> Progress {
        self.shared.progress.current_progress()
    }

    pub fn progress_tracker(&self) -> &Arc<ProgressTracker> {
        &self.shared.progress
    }

    pub fn queue(&self) -> &Arc<SongQueue> {
        &self.queue
    }

    /// Resume a paused song. Does nothing unless paused.
    pub async fn play(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Play { reply })?;
        response.await.map_err(|_| PlaybackError::PlayerClosed)?
    }

    /// Pause the current song. Does nothing unless playing.
    pub async fn pause(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Pause { reply })?;
        response.await.map_err(|_| PlaybackError::PlayerClosed)?
    }

    /// Skip to the next song, resolving to the resulting state.
    ///
    /// The request is bound to the state at the time of the call: if another
    /// transition happens before it is processed it does nothing, so
    /// concurrent calls advance only once.
    pub fn next(&self) -> impl Future<Output = Result<PlayerState>> + Send + 'static {
        let expected = self.shared.snapshot.borrow().version;
        let (reply, response) = oneshot::channel();
        let sent = self.send(Command::Next {
            expected: Some(expected),
            reply: Some(reply),
        });

        async move {
            sent?;
            response.await.map_err(|_| PlaybackError::PlayerClosed)
        }
    }

    /// Start the auto-play loop: whenever the current song finishes, move on
    /// to the next one. Calling this more than once has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) || self.is_closed() {
            return;
        }

        info!("Starting player");
        if self.queue.is_empty() {
            self.queue_observer.preload_suggestion();
        }

        let mut snapshots = self.shared.snapshot.subscribe();
        let commands = self.commands.downgrade();
        let shutdown = self.shutdown.clone();

        self.tasks.spawn(async move {
            loop {
                let (version, playback) = {
                    let snapshot = snapshots.borrow_and_update();
                    (snapshot.version, snapshot.playback.clone())
                };

                let Some(playback) = playback else {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        changed = snapshots.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                    continue;
                };

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = playback.wait_for_finish() => {}
                }

                let Some(sender) = commands.upgrade() else {
                    break;
                };
                let (reply, response) = oneshot::channel();
                let request = Command::Next {
                    expected: Some(version),
                    reply: Some(reply),
                };
                if sender.send(request).is_err() {
                    break;
                }
                drop(sender);

                trace!(version, "Playback finished, requested next song");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = response => {}
                }
            }
            debug!("Auto-play loop stopped");
        });
    }

    /// Stop playing and shut the actor down. Safe to call more than once;
    /// commands sent afterwards fail with [`PlaybackError::PlayerClosed`].
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Closing player");
            let observer: Arc<dyn QueueChangeListener> = self.queue_observer.clone();
            self.queue.remove_listener(&observer);

            // Cancelling also interrupts a song that is still being prepared.
            let (reply, response) = oneshot::channel();
            let sent = self.commands.send(Command::Close { reply }).is_ok();
            self.shutdown.cancel();
            if sent {
                let _ = response.await;
            }
            self.tasks.close();
        }

        self.tasks.wait().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn send(&self, command: Command) -> Result<()> {
        if self.is_closed() {
            return Err(PlaybackError::PlayerClosed);
        }
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::PlayerClosed)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for [`Player`].
pub struct PlayerBuilder {
    queue: Arc<SongQueue>,
    cache: ResourceCache,
    lookup: Arc<dyn PluginLookup>,
    suggester: Option<Arc<dyn Suggester>>,
    notifier: Option<Arc<dyn SongPlayedNotifier>>,
    progress: Option<Arc<ProgressTracker>>,
    config: PlayerConfig,
    event_bus: Option<Arc<EventBus>>,
}

impl PlayerBuilder {
    /// Suggester used when the queue is empty.
    pub fn suggester(mut self, suggester: Arc<dyn Suggester>) -> Self {
        self.suggester = Some(suggester);
        self
    }

    /// Notified before each song is played. Defaults to the suggester.
    pub fn song_played_notifier(mut self, notifier: Arc<dyn SongPlayedNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn progress_tracker(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Spawn the actor and return its handle. Must be called within a tokio
    /// runtime.
    pub fn build(self) -> Player {
        let notifier: Arc<dyn SongPlayedNotifier> = match (self.notifier, &self.suggester) {
            (Some(notifier), _) => notifier,
            (None, Some(suggester)) => Arc::new(SuggesterNotifier::new(Arc::clone(suggester))),
            (None, None) => Arc::new(NoopNotifier),
        };

        let shared = Arc::new(PlayerShared {
            snapshot: watch::Sender::new(Snapshot::default()),
            state: watch::Sender::new(PlayerState::Stop),
            listeners: Arc::new(StateListeners::default()),
            progress: self.progress.unwrap_or_default(),
        });

        let (commands, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();

        let actor = PlayerActor::new(
            receiver,
            commands.downgrade(),
            Arc::clone(&shared),
            Arc::clone(&self.queue),
            self.cache.clone(),
            self.lookup,
            self.suggester.clone(),
            notifier,
            self.event_bus,
            shutdown.clone(),
        );
        tasks.spawn(actor.run());

        let queue_observer = Arc::new(QueueObserver {
            queue: Arc::downgrade(&self.queue),
            cache: self.cache,
            suggester: self.suggester,
            commands: commands.downgrade(),
            shared: Arc::clone(&shared),
            tasks: tasks.clone(),
            config: self.config,
        });
        self.queue.add_listener(queue_observer.clone());

        Player {
            commands,
            shared,
            queue: self.queue,
            queue_observer,
            shutdown,
            tasks,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }
}

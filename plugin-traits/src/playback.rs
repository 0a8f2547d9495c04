//! Playback sessions and their feedback channel.
//!
//! A [`Playback`] plays exactly one song. The player creates one per song via
//! `Provider::supply_playback`, drives it with `play`/`pause`, waits for it to
//! finish and closes it before moving on.
//!
//! State changes that originate outside the player (a user pausing a native
//! client, a stream breaking) are reported through a
//! [`PlaybackFeedbackChannel`]. The channel is never the finish signal;
//! [`Playback::wait_for_finish`] is.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// State reported by a playback through its feedback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Play,
    Pause,
    /// The playback can't continue. The player moves on to the next song.
    Broken,
}

/// A single message on the feedback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackFeedback {
    State(PlaybackState),
    Progress(Duration),
}

type FeedbackSink = Arc<dyn Fn(PlaybackFeedback) + Send + Sync>;

/// Handle a playback uses to report state changes back to the player.
///
/// Sending never blocks. Deliveries are serialized by the receiving side.
#[derive(Clone)]
pub struct PlaybackFeedbackChannel {
    sink: FeedbackSink,
}

impl PlaybackFeedbackChannel {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(PlaybackFeedback) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// A channel that drops everything.
    pub fn detached() -> Self {
        Self::new(|_| {})
    }

    pub fn update_state(&self, state: PlaybackState) {
        (self.sink)(PlaybackFeedback::State(state));
    }

    pub fn update_progress(&self, progress: Duration) {
        (self.sink)(PlaybackFeedback::Progress(progress));
    }
}

impl fmt::Debug for PlaybackFeedbackChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackFeedbackChannel").finish_non_exhaustive()
    }
}

/// An active playback of one song.
#[async_trait]
pub trait Playback: Send + Sync {
    /// Install the channel used for externally caused state changes.
    ///
    /// Playbacks that never change state on their own can ignore it.
    fn set_feedback_channel(&self, _channel: PlaybackFeedbackChannel) {}

    /// Start or resume playing. Idempotent.
    async fn play(&self) -> Result<()>;

    /// Pause playing. Idempotent.
    async fn pause(&self) -> Result<()>;

    /// Resolve once the song finished or the playback was closed.
    ///
    /// Dropping the returned future cancels the wait.
    async fn wait_for_finish(&self);

    /// Stop and release everything. Safe to call more than once and must make
    /// pending `wait_for_finish` calls resolve.
    async fn close(&self) -> Result<()>;
}

/// Bookkeeping shared by most [`Playback`] implementations: the finish signal
/// and the installed feedback channel.
#[derive(Debug, Default)]
pub struct PlaybackCompletion {
    done: CancellationToken,
    feedback: Mutex<Option<PlaybackFeedbackChannel>>,
}

impl PlaybackCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_feedback_channel(&self, channel: PlaybackFeedbackChannel) {
        *self.feedback.lock() = Some(channel);
    }

    /// Report a state change if a channel is installed.
    pub fn report_state(&self, state: PlaybackState) {
        if let Some(channel) = self.feedback.lock().as_ref() {
            channel.update_state(state);
        }
    }

    pub fn report_progress(&self, progress: Duration) {
        if let Some(channel) = self.feedback.lock().as_ref() {
            channel.update_progress(progress);
        }
    }

    /// Mark the playback finished, waking every waiter.
    pub fn finish(&self) {
        self.done.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    pub async fn wait(&self) {
        self.done.cancelled().await;
    }
}

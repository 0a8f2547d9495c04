//! The task that owns the player state and applies every transition.

use super::{PlayerShared, Snapshot};
use crate::cache::ResourceCache;
use crate::error::{PlaybackError, Result};
use crate::queue::SongQueue;
use crate::state::PlayerState;
use core_runtime::events::{CoreEvent, EventBus, PlayerEvent};
use plugin_traits::{
    Playback, PlaybackFeedback, PlaybackFeedbackChannel, PlaybackState, PluginLookup, Song,
    SongEntry, SongPlayedNotifier, Suggester,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

pub(crate) enum Command {
    Play {
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        reply: oneshot::Sender<Result<()>>,
    },
    Next {
        /// Only advance if the state version still matches.
        expected: Option<u64>,
        reply: Option<oneshot::Sender<PlayerState>>,
    },
    Feedback {
        generation: u64,
        feedback: PlaybackFeedback,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct PlayerActor {
    commands: mpsc::UnboundedReceiver<Command>,
    /// Weak so feedback channels held by playbacks don't keep the actor alive.
    feedback_sender: mpsc::WeakUnboundedSender<Command>,
    shared: Arc<PlayerShared>,
    queue: Arc<SongQueue>,
    cache: ResourceCache,
    lookup: Arc<dyn PluginLookup>,
    suggester: Option<Arc<dyn Suggester>>,
    notifier: Arc<dyn SongPlayedNotifier>,
    event_bus: Option<Arc<EventBus>>,
    shutdown: CancellationToken,

    state: PlayerState,
    version: u64,
    playback: Option<Arc<dyn Playback>>,
    /// Identifies the current playback in feedback commands.
    playback_generation: u64,
}

impl PlayerActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        commands: mpsc::UnboundedReceiver<Command>,
        feedback_sender: mpsc::WeakUnboundedSender<Command>,
        shared: Arc<PlayerShared>,
        queue: Arc<SongQueue>,
        cache: ResourceCache,
        lookup: Arc<dyn PluginLookup>,
        suggester: Option<Arc<dyn Suggester>>,
        notifier: Arc<dyn SongPlayedNotifier>,
        event_bus: Option<Arc<EventBus>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            commands,
            feedback_sender,
            shared,
            queue,
            cache,
            lookup,
            suggester,
            notifier,
            event_bus,
            shutdown,
            state: PlayerState::Stop,
            version: 0,
            playback: None,
            playback_generation: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Player actor started");
        loop {
            let command = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                Command::Play { reply } => {
                    let _ = reply.send(self.play().await);
                }
                Command::Pause { reply } => {
                    let _ = reply.send(self.pause().await);
                }
                Command::Next { expected, reply } => {
                    match expected {
                        Some(version) if version != self.version => {
                            trace!(expected = version, current = self.version, "Ignoring stale next");
                        }
                        _ => self.advance().await,
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(self.state.clone());
                    }
                }
                Command::Feedback {
                    generation,
                    feedback,
                } => {
                    if generation == self.playback_generation && self.playback.is_some() {
                        self.on_feedback(feedback).await;
                    } else {
                        trace!(generation, "Ignoring feedback from a previous playback");
                    }
                }
                Command::Close { reply } => {
                    self.stop().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }

        self.commands.close();
        self.stop().await;
        debug!("Player actor stopped");
    }

    async fn play(&mut self) -> Result<()> {
        match &self.state {
            PlayerState::Pause(entry) => {
                let entry = entry.clone();
                if let Some(playback) = &self.playback {
                    playback.play().await.map_err(|e| {
                        warn!(song = %entry.song(), error = %e, "Failed to resume playback");
                        PlaybackError::from(e)
                    })?;
                }
                self.set_state(PlayerState::Play(entry));
            }
            PlayerState::Play(_) => {}
            state => debug!(state = state.name(), "Nothing to play"),
        }
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        match &self.state {
            PlayerState::Play(entry) => {
                let entry = entry.clone();
                if let Some(playback) = &self.playback {
                    playback.pause().await.map_err(|e| {
                        warn!(song = %entry.song(), error = %e, "Failed to pause playback");
                        PlaybackError::from(e)
                    })?;
                }
                self.set_state(PlayerState::Pause(entry));
            }
            PlayerState::Pause(_) => {}
            state => debug!(state = state.name(), "Nothing to pause"),
        }
        Ok(())
    }

    /// Move on to the next song from the queue or the suggester.
    ///
    /// Every wait on a plugin gives up when the player shuts down, leaving
    /// the player stopped.
    #[instrument(skip(self), fields(version = self.version))]
    async fn advance(&mut self) {
        self.close_playback().await;
        let shutdown = self.shutdown.clone();

        let entry = match self.queue.pop() {
            Some(entry) => SongEntry::from(entry),
            None => match self.suggester.clone() {
                None => {
                    debug!("Queue is empty and there is no suggester");
                    self.set_state(PlayerState::Stop);
                    return;
                }
                Some(suggester) => match unless_shutdown(&shutdown, suggester.suggest_next()).await {
                    None => return self.interrupted().await,
                    Some(Ok(song)) => SongEntry::suggested(song),
                    Some(Err(e)) if e.is_broken_suggester() => {
                        warn!(suggester = suggester.id(), error = %e, "Suggester has nothing to play");
                        self.set_state(PlayerState::Stop);
                        return;
                    }
                    Some(Err(e)) => {
                        self.fail(None, format!("suggester failed: {e}"));
                        return;
                    }
                },
            },
        };

        match unless_shutdown(&shutdown, self.notifier.notify_played(&entry)).await {
            None => return self.interrupted().await,
            Some(Err(e)) => {
                warn!(song = %entry.song(), error = %e, "Failed to notify about played song")
            }
            Some(Ok(())) => {}
        }

        let playback = match unless_shutdown(&shutdown, self.prepare(entry.song())).await {
            None => return self.interrupted().await,
            Some(Ok(playback)) => playback,
            Some(Err(e)) => {
                self.fail(Some(entry.song()), e.to_string());
                return;
            }
        };

        self.playback_generation += 1;
        playback.set_feedback_channel(self.feedback_channel(self.playback_generation));
        self.playback = Some(Arc::clone(&playback));
        self.shared.progress.start_song();
        self.set_state(PlayerState::Pause(entry.clone()));

        match unless_shutdown(&shutdown, playback.play()).await {
            None => self.interrupted().await,
            Some(Ok(())) => {
                info!(song = %entry.song(), "Playing");
                self.emit(PlayerEvent::SongStarted {
                    song_id: entry.song().id().to_string(),
                    provider: entry.song().provider().to_string(),
                    title: entry.song().title().to_string(),
                    user: entry.user().map(|user| user.name().to_string()),
                });
                self.set_state(PlayerState::Play(entry));
            }
            Some(Err(e)) => {
                self.close_playback().await;
                self.fail(Some(entry.song()), format!("playback failed to start: {e}"));
            }
        }
    }

    /// Shut down in the middle of [`advance`](Self::advance).
    async fn interrupted(&mut self) {
        debug!("Player shut down while preparing the next song");
        self.stop().await;
    }

    /// Resource, provider and playback for `song`.
    async fn prepare(&self, song: &Song) -> Result<Arc<dyn Playback>> {
        let resource = self.cache.get(song).await?;
        let provider = self
            .lookup
            .provider(song.provider())
            .ok_or_else(|| PlaybackError::ProviderNotFound(song.provider().clone()))?;
        let playback = provider.supply_playback(song, resource).await?;
        Ok(playback)
    }

    async fn on_feedback(&mut self, feedback: PlaybackFeedback) {
        match feedback {
            PlaybackFeedback::Progress(progress) => {
                self.shared.progress.update_progress(progress);
            }
            PlaybackFeedback::State(PlaybackState::Play) => {
                if let PlayerState::Pause(entry) = &self.state {
                    let entry = entry.clone();
                    self.set_state(PlayerState::Play(entry));
                }
            }
            PlaybackFeedback::State(PlaybackState::Pause) => {
                if let PlayerState::Play(entry) = &self.state {
                    let entry = entry.clone();
                    self.set_state(PlayerState::Pause(entry));
                }
            }
            PlaybackFeedback::State(PlaybackState::Broken) => {
                if self.state != PlayerState::Error {
                    let song = self.state.entry().map(|entry| entry.song().clone());
                    self.close_playback().await;
                    self.fail(song.as_ref(), "playback broke".to_string());
                    self.advance().await;
                }
            }
        }
    }

    /// Close the current playback, logging failures.
    async fn close_playback(&mut self) {
        if let Some(playback) = self.playback.take() {
            if let Err(e) = playback.close().await {
                warn!(error = %e, "Failed to close playback");
            }
        }
    }

    async fn stop(&mut self) {
        self.close_playback().await;
        if self.state != PlayerState::Stop {
            self.set_state(PlayerState::Stop);
        }
    }

    fn feedback_channel(&self, generation: u64) -> PlaybackFeedbackChannel {
        let sender = self.feedback_sender.clone();
        PlaybackFeedbackChannel::new(move |feedback| {
            if let Some(sender) = sender.upgrade() {
                let _ = sender.send(Command::Feedback {
                    generation,
                    feedback,
                });
            }
        })
    }

    fn fail(&mut self, song: Option<&Song>, message: String) {
        error!(song = song.map(tracing::field::display), error = %message, "Player failed");
        self.emit(PlayerEvent::Failed {
            song_id: song.map(|song| song.id().to_string()),
            message,
        });
        self.set_state(PlayerState::Error);
    }

    fn set_state(&mut self, new: PlayerState) {
        let old = std::mem::replace(&mut self.state, new.clone());
        self.version += 1;

        self.track_progress(&new);

        self.shared.snapshot.send_replace(Snapshot {
            state: new.clone(),
            version: self.version,
            playback: self.playback.clone(),
        });
        self.shared.state.send_replace(new.clone());

        debug!(from = old.name(), to = %new, version = self.version, "Player state changed");
        self.emit(PlayerEvent::StateChanged {
            from: old.name().to_string(),
            to: new.name().to_string(),
            song_id: new.entry().map(|entry| entry.song().id().to_string()),
        });

        self.shared.listeners.notify(&old, &new);
    }

    /// Follow pauses and stops. A new song is started by `advance`.
    fn track_progress(&self, new: &PlayerState) {
        let progress = &self.shared.progress;
        match new {
            PlayerState::Stop | PlayerState::Error => progress.reset(),
            PlayerState::Pause(_) => progress.start_pause(),
            PlayerState::Play(_) => progress.stop_pause(),
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Player(event));
        }
    }
}

/// `None` if `shutdown` fires before `future` completes.
async fn unless_shutdown<F: Future>(shutdown: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        _ = shutdown.cancelled() => None,
        output = future => Some(output),
    }
}

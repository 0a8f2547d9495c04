//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use core_playback::PlayerState;
use parking_lot::Mutex;
use plugin_traits::{
    Playback, PlaybackCompletion, PlaybackFeedbackChannel, PlaybackState, Plugin, PluginError,
    PluginLookup, Provider, ProviderId, QueueEntry, Resource, Result, Song, Suggester, User,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const PROVIDER: &str = "dummy";

pub fn song(id: impl ToString) -> Song {
    let id = id.to_string();
    Song::builder(id.clone(), PROVIDER)
        .title(format!("Song {id}"))
        .description("Dummy artist")
        .duration(Duration::from_secs(180))
        .build()
        .unwrap()
}

pub fn entry(id: impl ToString) -> QueueEntry {
    QueueEntry::new(song(id), User::new("tester"))
}

/// Wait until the player reaches a state matching `predicate`.
pub async fn wait_for_state<F>(states: &mut watch::Receiver<PlayerState>, predicate: F) -> PlayerState
where
    F: FnMut(&PlayerState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), states.wait_for(predicate))
        .await
        .expect("timed out waiting for player state")
        .expect("player state channel closed")
        .clone()
}

// ============================================================================
// Resource
// ============================================================================

#[derive(Default)]
pub struct DummyResource {
    freed: AtomicBool,
    stale: AtomicBool,
    free_delay: Duration,
}

impl DummyResource {
    pub fn with_free_delay(free_delay: Duration) -> Self {
        Self {
            free_delay,
            ..Self::default()
        }
    }

    pub fn is_freed(&self) -> bool {
        self.freed.load(Ordering::SeqCst)
    }

    /// Make the resource report itself invalid, like a deleted download.
    pub fn go_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Resource for DummyResource {
    async fn free(&self) -> Result<()> {
        if !self.free_delay.is_zero() {
            tokio::time::sleep(self.free_delay).await;
        }
        self.freed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.freed.load(Ordering::SeqCst) && !self.stale.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Playback
// ============================================================================

#[derive(Default)]
pub struct DummyPlayback {
    completion: PlaybackCompletion,
    plays: AtomicUsize,
    pauses: AtomicUsize,
    closed: AtomicBool,
    fail_play: bool,
}

impl DummyPlayback {
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The song ended on its own.
    pub fn finish(&self) {
        self.completion.finish();
    }

    /// Simulate a state change the player did not ask for.
    pub fn report(&self, state: PlaybackState) {
        self.completion.report_state(state);
    }

    pub fn report_progress(&self, progress: Duration) {
        self.completion.report_progress(progress);
    }
}

#[async_trait]
impl Playback for DummyPlayback {
    fn set_feedback_channel(&self, channel: PlaybackFeedbackChannel) {
        self.completion.set_feedback_channel(channel);
    }

    async fn play(&self) -> Result<()> {
        if self.fail_play {
            return Err(PluginError::Playback("device unavailable".into()));
        }
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_for_finish(&self) {
        self.completion.wait().await;
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.completion.finish();
        Ok(())
    }
}

// ============================================================================
// Provider
// ============================================================================

#[derive(Default)]
pub struct DummyProvider {
    loads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    load_delay: Duration,
    free_delay: Duration,
    failing_loads: Mutex<HashSet<String>>,
    failing_playbacks: Mutex<HashSet<String>>,
    resources: Mutex<Vec<(Song, Arc<DummyResource>)>>,
    playbacks: Mutex<Vec<(Song, Arc<DummyPlayback>)>>,
}

impl DummyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load_delay(load_delay: Duration) -> Self {
        Self {
            load_delay,
            ..Self::default()
        }
    }

    pub fn with_free_delay(free_delay: Duration) -> Self {
        Self {
            free_delay,
            ..Self::default()
        }
    }

    pub fn fail_loading(&self, id: &str) {
        self.failing_loads.lock().insert(id.to_string());
    }

    pub fn fail_playing(&self, id: &str) {
        self.failing_playbacks.lock().insert(id.to_string());
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn resources(&self) -> Vec<(Song, Arc<DummyResource>)> {
        self.resources.lock().clone()
    }

    pub fn playbacks(&self) -> Vec<(Song, Arc<DummyPlayback>)> {
        self.playbacks.lock().clone()
    }

    pub fn last_playback(&self) -> Arc<DummyPlayback> {
        let playbacks = self.playbacks.lock();
        let (_, playback) = playbacks.last().expect("no playback was created");
        Arc::clone(playback)
    }
}

#[async_trait]
impl Plugin for DummyProvider {
    fn id(&self) -> &str {
        PROVIDER
    }
}

#[async_trait]
impl Provider for DummyProvider {
    async fn search(&self, _query: &str, _offset: usize) -> Result<Vec<Song>> {
        Ok(Vec::new())
    }

    async fn lookup(&self, song_id: &str) -> Result<Song> {
        Ok(song(song_id))
    }

    async fn load_song(&self, song: &Song) -> Result<Arc<dyn Resource>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_loads.lock().contains(song.id()) {
            return Err(PluginError::SongLoading(format!("{} is unavailable", song.id())));
        }

        let resource = Arc::new(DummyResource::with_free_delay(self.free_delay));
        self.resources
            .lock()
            .push((song.clone(), Arc::clone(&resource)));
        Ok(resource)
    }

    async fn supply_playback(
        &self,
        song: &Song,
        _resource: Arc<dyn Resource>,
    ) -> Result<Arc<dyn Playback>> {
        let playback = Arc::new(DummyPlayback {
            fail_play: self.failing_playbacks.lock().contains(song.id()),
            ..DummyPlayback::default()
        });
        self.playbacks
            .lock()
            .push((song.clone(), Arc::clone(&playback)));
        Ok(playback)
    }
}

// ============================================================================
// Lookup
// ============================================================================

pub struct TestLookup {
    provider: Arc<DummyProvider>,
}

impl TestLookup {
    pub fn new(provider: Arc<DummyProvider>) -> Self {
        Self { provider }
    }
}

impl PluginLookup for TestLookup {
    fn provider(&self, id: &ProviderId) -> Option<Arc<dyn Provider>> {
        (id.as_str() == PROVIDER).then(|| Arc::clone(&self.provider) as Arc<dyn Provider>)
    }

    fn suggester(&self, _id: &str) -> Option<Arc<dyn Suggester>> {
        None
    }
}

// ============================================================================
// Suggester
// ============================================================================

/// Suggests the given songs in order, then reports itself broken.
#[derive(Default)]
pub struct ScriptedSuggester {
    songs: Mutex<VecDeque<Song>>,
    fail_hard: AtomicBool,
    removed: Mutex<Vec<Song>>,
}

impl ScriptedSuggester {
    pub fn new(ids: impl IntoIterator<Item = usize>) -> Self {
        Self {
            songs: Mutex::new(ids.into_iter().map(song).collect()),
            ..Self::default()
        }
    }

    /// Fail with a non-suggester error from now on.
    pub fn fail_hard(&self) {
        self.fail_hard.store(true, Ordering::SeqCst);
    }

    pub fn removed(&self) -> Vec<Song> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl Plugin for ScriptedSuggester {
    fn id(&self) -> &str {
        "scripted"
    }
}

#[async_trait]
impl Suggester for ScriptedSuggester {
    async fn suggest_next(&self) -> Result<Song> {
        if self.fail_hard.load(Ordering::SeqCst) {
            return Err(PluginError::Io(std::io::Error::other("catalog offline")));
        }
        self.songs
            .lock()
            .pop_front()
            .ok_or_else(|| PluginError::BrokenSuggester("out of songs".into()))
    }

    async fn next_suggestions(&self, max: usize) -> Result<Vec<Song>> {
        let songs = self.songs.lock();
        if songs.is_empty() {
            return Err(PluginError::BrokenSuggester("out of songs".into()));
        }
        Ok(songs.iter().take(max).cloned().collect())
    }

    async fn remove_suggestion(&self, song: &Song) -> Result<()> {
        self.removed.lock().push(song.clone());
        self.songs.lock().retain(|queued| queued != song);
        Ok(())
    }
}

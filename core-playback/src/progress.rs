//! Elapsed time of the current song.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Playback position of the current song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub duration: Duration,
    pub is_paused: bool,
}

#[derive(Debug, Default)]
struct Times {
    start: Option<Instant>,
    /// Progress already made when `start` was taken.
    offset: Duration,
    paused_since: Option<Instant>,
}

/// Tracks how far into the current song the player is.
///
/// The player drives the tracker from its state transitions; progress
/// reported by the playback itself rebases it.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    times: Mutex<Times>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new song started playing from the beginning.
    pub fn start_song(&self) {
        let mut times = self.times.lock();
        times.start = Some(Instant::now());
        times.offset = Duration::ZERO;
        times.paused_since = None;
    }

    pub fn start_pause(&self) {
        let mut times = self.times.lock();
        if times.start.is_some() && times.paused_since.is_none() {
            times.paused_since = Some(Instant::now());
        }
    }

    /// Resume counting; the paused time does not count as progress.
    pub fn stop_pause(&self) {
        let mut times = self.times.lock();
        if let Some(paused_since) = times.paused_since.take() {
            if let Some(start) = times.start {
                times.start = Some(start + paused_since.elapsed());
            }
        }
    }

    /// Set the progress to `progress` and continue counting from there.
    pub fn update_progress(&self, progress: Duration) {
        let mut times = self.times.lock();
        times.start = Some(Instant::now());
        times.offset = progress;
        times.paused_since = None;
    }

    pub fn reset(&self) {
        let mut times = self.times.lock();
        times.start = None;
        times.offset = Duration::ZERO;
        times.paused_since = None;
    }

    /// Nothing playing reports zero progress as paused.
    pub fn current_progress(&self) -> Progress {
        let times = self.times.lock();
        match (times.start, times.paused_since) {
            (Some(start), Some(paused_since)) => Progress {
                duration: times.offset + paused_since.saturating_duration_since(start),
                is_paused: true,
            },
            (Some(start), None) => Progress {
                duration: times.offset + start.elapsed(),
                is_paused: false,
            },
            (None, _) => Progress {
                duration: Duration::ZERO,
                is_paused: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const SECOND: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn test_progress_counts_while_playing() {
        let tracker = ProgressTracker::new();
        assert_eq!(
            tracker.current_progress(),
            Progress {
                duration: Duration::ZERO,
                is_paused: true
            }
        );

        tracker.start_song();
        advance(3 * SECOND).await;

        let progress = tracker.current_progress();
        assert_eq!(progress.duration, 3 * SECOND);
        assert!(!progress.is_paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_progress() {
        let tracker = ProgressTracker::new();
        tracker.start_song();
        advance(2 * SECOND).await;

        tracker.start_pause();
        advance(10 * SECOND).await;
        assert_eq!(
            tracker.current_progress(),
            Progress {
                duration: 2 * SECOND,
                is_paused: true
            }
        );

        tracker.stop_pause();
        advance(SECOND).await;
        assert_eq!(tracker.current_progress().duration, 3 * SECOND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_pause_keeps_first_pause_time() {
        let tracker = ProgressTracker::new();
        tracker.start_song();
        advance(SECOND).await;
        tracker.start_pause();
        advance(SECOND).await;
        tracker.start_pause();

        tracker.stop_pause();
        tracker.stop_pause();
        assert_eq!(tracker.current_progress().duration, SECOND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_progress_rebases_and_resumes() {
        let tracker = ProgressTracker::new();
        tracker.start_song();
        tracker.start_pause();

        tracker.update_progress(42 * SECOND);
        advance(SECOND).await;

        let progress = tracker.current_progress();
        assert_eq!(progress.duration, 43 * SECOND);
        assert!(!progress.is_paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let tracker = ProgressTracker::new();
        tracker.start_song();
        advance(SECOND).await;
        tracker.reset();

        assert_eq!(tracker.current_progress().duration, Duration::ZERO);
    }
}

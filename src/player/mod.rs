mod command;
mod engine;
mod events;
mod now_playing;

pub use command::{PlayerHandle, TransportCommand};
pub use engine::PlaybackEngine;
pub use events::{EventBus, PlaybackEvent};
pub use now_playing::{LogNowPlaying, MediaKey, NowPlaying, NowPlayingSink};

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::audio::AnalyzerHandle;
use crate::catalog::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    /// No playable tracks.
    #[default]
    Empty,
    ReadyPaused,
    ReadyPlaying,
}

/// Whether a command changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// The command was a no-op, e.g. `play` with an empty catalog.
    Ignored,
}

/// Snapshot of the playback session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub status: PlayerStatus,
    /// Playable tracks in catalog order.
    pub tracks: Arc<Vec<Track>>,
    pub current_index: usize,
    pub is_playing: bool,
    pub elapsed: Duration,
    /// Reported by the decoded media; `None` until its metadata arrives.
    pub duration: Option<Duration>,
    pub volume: f32,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            status: PlayerStatus::Empty,
            tracks: Arc::new(Vec::new()),
            current_index: 0,
            is_playing: false,
            elapsed: Duration::ZERO,
            duration: None,
            volume: 1.0,
        }
    }
}

impl PlaybackState {
    pub fn current_track(&self) -> Option<&Track> {
        self.tracks.get(self.current_index)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Zero while the duration is unknown.
    pub fn duration_secs(&self) -> f64 {
        self.duration.map_or(0.0, |d| d.as_secs_f64())
    }

    /// Fraction of the track played, in 0.0..=1.0.
    pub fn progress(&self) -> f64 {
        let duration = self.duration_secs();
        if duration > 0.0 {
            (self.elapsed_secs() / duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Read-only view of the session for renderers on other tasks or threads.
///
/// Only the engine writes; it also attaches the analyzer once the media
/// output exists.
#[derive(Clone, Default)]
pub struct StateCell {
    inner: Arc<RwLock<CellContents>>,
}

#[derive(Default)]
struct CellContents {
    state: PlaybackState,
    analyzer: Option<AnalyzerHandle>,
}

impl StateCell {
    pub fn snapshot(&self) -> PlaybackState {
        self.read().state.clone()
    }

    pub fn analyzer(&self) -> Option<AnalyzerHandle> {
        self.read().analyzer.clone()
    }

    pub(crate) fn store(&self, state: PlaybackState) {
        self.write().state = state;
    }

    pub(crate) fn set_analyzer(&self, analyzer: Option<AnalyzerHandle>) {
        self.write().analyzer = analyzer;
    }

    fn read(&self) -> RwLockReadGuard<'_, CellContents> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CellContents> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for StateCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell")
            .field("state", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::track;

    #[test]
    fn progress_is_clamped_and_zero_without_duration() {
        let mut state = PlaybackState {
            tracks: Arc::new(vec![track("a", Some("a.wav"))]),
            elapsed: Duration::from_secs(30),
            ..PlaybackState::default()
        };
        assert_eq!(state.progress(), 0.0);

        state.duration = Some(Duration::from_secs(120));
        assert!((state.progress() - 0.25).abs() < 1e-9);

        state.elapsed = Duration::from_secs(500);
        assert_eq!(state.progress(), 1.0);
    }

    #[test]
    fn cell_hands_out_the_latest_snapshot() {
        let cell = StateCell::default();
        let reader = cell.clone();
        assert_eq!(reader.snapshot().status, PlayerStatus::Empty);
        assert!(reader.analyzer().is_none());

        cell.store(PlaybackState {
            status: PlayerStatus::ReadyPaused,
            volume: 0.4,
            ..PlaybackState::default()
        });
        assert_eq!(reader.snapshot().status, PlayerStatus::ReadyPaused);
        assert_eq!(reader.snapshot().volume, 0.4);
    }
}

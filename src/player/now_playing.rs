use log::info;
use std::time::Duration;

use super::{PlaybackState, TransportCommand};

/// Metadata published to platform "now playing" integrations.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub title: String,
    /// The track's frequency label.
    pub album: Option<String>,
    pub artwork: Option<String>,
    pub duration: Option<Duration>,
    pub position: Duration,
    pub is_playing: bool,
}

impl NowPlaying {
    /// `None` when nothing is selected.
    pub fn from_state(state: &PlaybackState, artwork: Option<&str>) -> Option<Self> {
        let track = state.current_track()?;
        Some(Self {
            title: track.display_title().to_string(),
            album: track.frequency.clone(),
            artwork: artwork.map(str::to_string),
            duration: state.duration,
            position: state.elapsed,
            is_playing: state.is_playing,
        })
    }
}

/// A platform media-session surface.
///
/// Receives every state change; commands coming back from the platform must
/// go through [`super::PlayerHandle`], see [`MediaKey`].
pub trait NowPlayingSink {
    fn publish(&mut self, now_playing: Option<&NowPlaying>);
}

/// Writes title and play-state changes to the log.
#[derive(Debug, Default)]
pub struct LogNowPlaying {
    last: Option<(String, bool)>,
}

impl NowPlayingSink for LogNowPlaying {
    fn publish(&mut self, now_playing: Option<&NowPlaying>) {
        let current = now_playing.map(|now| (now.title.clone(), now.is_playing));
        if current == self.last {
            return;
        }

        match now_playing {
            Some(now) => info!(
                "Now {}: {}{}",
                if now.is_playing { "playing" } else { "paused" },
                now.title,
                now.album
                    .as_deref()
                    .map(|album| format!(" [{album}]"))
                    .unwrap_or_default()
            ),
            None => info!("Nothing selected"),
        }
        self.last = current;
    }
}

/// Hardware and lock-screen transport keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaKey {
    PlayPause,
    Play,
    Pause,
    Next,
    Previous,
    /// Absolute position in seconds.
    SeekTo(f64),
}

impl MediaKey {
    pub fn command(self) -> TransportCommand {
        match self {
            MediaKey::PlayPause => TransportCommand::TogglePlay,
            MediaKey::Play => TransportCommand::Play,
            MediaKey::Pause => TransportCommand::Pause,
            MediaKey::Next => TransportCommand::Next,
            MediaKey::Previous => TransportCommand::Previous,
            MediaKey::SeekTo(seconds) => TransportCommand::Seek(seconds),
        }
    }
}

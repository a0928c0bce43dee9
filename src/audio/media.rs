use async_trait::async_trait;
use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, info, warn};
use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::AnalyzerHandle;
use crate::error::PlayerError;

/// Signals the platform raises on its own cadence.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// The decoded media reported its authoritative length.
    MetadataLoaded { duration: Duration },
    /// Periodic position report.
    TimeUpdate { position: Duration },
    /// The loaded source played through to its end.
    Ended,
    /// A source accepted by `load` could not be fetched or opened.
    LoadFailed { reason: String },
}

/// The single audio output element and its analysis tap.
///
/// Only the playback engine holds one. Everything else reads through the
/// [`AnalyzerHandle`] or goes through engine commands.
#[async_trait(?Send)]
pub trait MediaOutput {
    /// Replaces the current source. The new source starts paused at zero.
    ///
    /// Remote media may still be downloading when this returns; completion
    /// arrives as `MetadataLoaded` or `LoadFailed` from `poll_events`.
    fn load(&mut self, url: &str, volume: f32) -> Result<(), PlayerError>;

    /// Brings the output device out of suspension, if it was suspended.
    async fn resume(&mut self) -> Result<(), PlayerError>;

    /// Starts or continues the loaded source.
    fn start(&mut self) -> Result<(), PlayerError>;

    fn pause(&mut self);

    fn seek(&mut self, position: Duration) -> Result<(), PlayerError>;

    fn set_volume(&mut self, volume: f32);

    /// Drains pending platform signals, oldest first.
    fn poll_events(&mut self) -> Vec<MediaEvent>;

    fn analyzer(&self) -> AnalyzerHandle;
}

/// Builds the media output on first use.
pub trait MediaFactory {
    fn create(&mut self) -> Result<Box<dyn MediaOutput>, PlayerError>;
}

/// Where a track's `file_url` points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLocation {
    Local(PathBuf),
    Remote(String),
}

impl MediaLocation {
    pub fn classify(url: &str) -> Self {
        let trimmed = url.trim();
        if let Some(path) = trimmed.strip_prefix("file://") {
            return Self::Local(PathBuf::from(path));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Remote(trimmed.to_string())
        } else {
            Self::Local(PathBuf::from(trimmed))
        }
    }
}

/// Turns `file_url` values into local files the decoder can open.
///
/// Remote media is downloaded once into the cache directory, keyed by a hash
/// of its URL.
#[derive(Debug, Clone)]
pub struct MediaResolver {
    cache_dir: PathBuf,
}

impl MediaResolver {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn default_cache_dir() -> PathBuf {
        std::env::temp_dir().join("sacred-player-media")
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolves local and already cached media immediately. Uncached remote
    /// media is downloaded on a background thread.
    pub fn begin(&self, url: &str) -> Result<Resolution, PlayerError> {
        match MediaLocation::classify(url) {
            MediaLocation::Local(path) => {
                if path.is_file() {
                    Ok(Resolution::Ready(path))
                } else {
                    Err(PlayerError::load(url, "file not found"))
                }
            }
            MediaLocation::Remote(remote) => {
                let target = self.cache_path(&remote);
                if target.is_file() {
                    debug!("Using cached media for {}", remote);
                    return Ok(Resolution::Ready(target));
                }
                self.spawn_fetch(remote).map(Resolution::Pending)
            }
        }
    }

    pub fn cache_path(&self, url: &str) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        let extension = url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("audio");

        self.cache_dir
            .join(format!("{:016x}.{}", hasher.finish(), extension.to_ascii_lowercase()))
    }

    fn spawn_fetch(&self, url: String) -> Result<MediaFetch, PlayerError> {
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let resolver = self.clone();
        let thread_url = url.clone();

        std::thread::Builder::new()
            .name("media-fetch".to_string())
            .spawn(move || {
                let result = resolver.fetch(&thread_url);
                if let Err(e) = &result {
                    warn!("Download failed: {}", e);
                }
                let _ = result_tx.send(result);
            })?;

        Ok(MediaFetch {
            url,
            result_rx,
        })
    }

    fn fetch(&self, url: &str) -> Result<PathBuf, PlayerError> {
        let target = self.cache_path(url);
        std::fs::create_dir_all(&self.cache_dir)?;
        info!("Downloading {}", url);

        let response = ureq::get(url)
            .call()
            .map_err(|e| PlayerError::load(url, e))?;

        let partial = target.with_extension("part");
        {
            let mut writer = BufWriter::new(File::create(&partial)?);
            io::copy(&mut response.into_reader(), &mut writer)
                .map_err(|e| PlayerError::load(url, e))?;
        }
        std::fs::rename(&partial, &target)?;

        Ok(target)
    }
}

/// Outcome of [`MediaResolver::begin`].
#[derive(Debug)]
pub enum Resolution {
    Ready(PathBuf),
    Pending(MediaFetch),
}

/// A download running on its own thread.
#[derive(Debug)]
pub struct MediaFetch {
    url: String,
    result_rx: Receiver<Result<PathBuf, PlayerError>>,
}

impl MediaFetch {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Non-blocking. `None` while the download is still running.
    pub fn try_finish(&self) -> Option<Result<PathBuf, PlayerError>> {
        match self.result_rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Err(PlayerError::load(&self.url, "download thread exited")))
            }
        }
    }
}

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};
use log::{debug, info, warn};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::media::{MediaFetch, Resolution};
use super::{
    read_duration, AnalyzerHandle, MediaEvent, MediaFactory, MediaOutput, MediaResolver, ProgressTracker, SampleTap,
    TapSource,
};
use crate::error::PlayerError;

/// Output device plus one sink per loaded source, in the role of a media
/// element: loading a new track swaps the sink the way assigning a new `src`
/// would, the device stream itself lives as long as this value.
pub struct RodioOutput {
    #[allow(dead_code)]
    stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Option<Sink>,
    progress: ProgressTracker,
    analyzer: AnalyzerHandle,
    resolver: MediaResolver,
    loaded: Option<LoadedSource>,
    pending: Option<PendingSource>,
    volume: f32,
}

#[derive(Debug, Clone)]
struct LoadedSource {
    url: String,
    path: PathBuf,
}

/// A remote source still downloading. Transport calls made meanwhile are
/// remembered and applied once it opens.
#[derive(Debug)]
struct PendingSource {
    fetch: MediaFetch,
    start_at: Duration,
    play_requested: bool,
}

impl RodioOutput {
    pub fn open(device_name: Option<&str>, resolver: MediaResolver) -> Result<Self, PlayerError> {
        let (stream, stream_handle) = open_stream(device_name)?;
        let tap = SampleTap::default();
        let analyzer = AnalyzerHandle::new(tap.clone());

        info!("Audio output opened (media cache: {})", resolver.cache_dir().display());

        Ok(Self {
            stream,
            stream_handle,
            sink: None,
            progress: ProgressTracker::new(tap),
            analyzer,
            resolver,
            loaded: None,
            pending: None,
            volume: 1.0,
        })
    }

    fn stop_sink(&mut self) {
        if let Some(previous) = self.sink.take() {
            previous.stop();
        }
    }

    /// Replaces the active sink with one reading `path` from `start`.
    /// Returns the duration the decoder declares, if any.
    fn rebuild_sink(&mut self, path: &Path, url: &str, start: Duration, playing: bool) -> Result<Option<Duration>, PlayerError> {
        self.stop_sink();

        let file = File::open(path).map_err(|e| PlayerError::load(url, e))?;
        let decoder = Decoder::new(BufReader::new(file)).map_err(|e| PlayerError::load(url, e))?;
        let declared = decoder.total_duration();
        let source = TapSource::new(decoder.convert_samples::<f32>(), self.progress.tap().clone(), Duration::ZERO);

        let sink = Sink::try_new(&self.stream_handle).map_err(|e| PlayerError::Output(e.to_string()))?;
        sink.set_volume(self.volume);
        sink.pause();
        sink.append(source);
        if !start.is_zero() {
            sink.try_seek(start).map_err(|e| PlayerError::Seek(e.to_string()))?;
        }
        if playing {
            sink.play();
        }

        self.sink = Some(sink);
        Ok(declared)
    }

    /// Opens a resolved file as the current source.
    fn open_source(&mut self, url: &str, path: PathBuf, start: Duration, playing: bool) -> Result<(), PlayerError> {
        let declared = match self.rebuild_sink(&path, url, start, playing) {
            Ok(declared) => declared,
            Err(e) => {
                self.loaded = None;
                return Err(e);
            }
        };

        let duration = match read_duration(&path) {
            Ok(Some(duration)) => Some(duration),
            Ok(None) => declared,
            Err(e) => {
                debug!("Duration read failed for {}: {}", url, e);
                declared
            }
        };
        self.progress.opened(duration);
        if !start.is_zero() {
            self.progress.seeked(start);
        }

        debug!("Loaded {} ({:?})", url, duration);
        self.loaded = Some(LoadedSource {
            url: url.to_string(),
            path,
        });
        Ok(())
    }

    /// Opens a finished download, or reports why it could not be opened.
    fn finish_pending(&mut self) {
        let Some(result) = self.pending.as_ref().and_then(|pending| pending.fetch.try_finish()) else {
            return;
        };
        let Some(pending) = self.pending.take() else {
            return;
        };
        let url = pending.fetch.url().to_string();

        let opened = result.and_then(|path| self.open_source(&url, path, pending.start_at, pending.play_requested));
        if let Err(e) = opened {
            warn!("{}", e);
            self.progress.failed(e.to_string());
        }
    }
}

#[async_trait(?Send)]
impl MediaOutput for RodioOutput {
    fn load(&mut self, url: &str, volume: f32) -> Result<(), PlayerError> {
        self.volume = volume.clamp(0.0, 1.0);
        self.stop_sink();
        self.loaded = None;
        self.pending = None;
        self.progress.loading();

        match self.resolver.begin(url)? {
            Resolution::Ready(path) => self.open_source(url, path, Duration::ZERO, false),
            Resolution::Pending(fetch) => {
                debug!("Waiting for download of {}", url);
                self.pending = Some(PendingSource {
                    fetch,
                    start_at: Duration::ZERO,
                    play_requested: false,
                });
                Ok(())
            }
        }
    }

    async fn resume(&mut self) -> Result<(), PlayerError> {
        // The device stream runs from construction; there is no suspended
        // state to leave on this backend.
        Ok(())
    }

    fn start(&mut self) -> Result<(), PlayerError> {
        if let Some(pending) = &mut self.pending {
            pending.play_requested = true;
            return Ok(());
        }

        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| PlayerError::Start("no source loaded".to_string()))?;
        sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(pending) = &mut self.pending {
            pending.play_requested = false;
        }
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn seek(&mut self, position: Duration) -> Result<(), PlayerError> {
        if let Some(pending) = &mut self.pending {
            pending.start_at = position;
            return Ok(());
        }

        let loaded = self
            .loaded
            .clone()
            .ok_or_else(|| PlayerError::Seek("no source loaded".to_string()))?;

        match self.sink.as_ref().filter(|sink| !sink.empty()) {
            Some(sink) => {
                sink.try_seek(position).map_err(|e| PlayerError::Seek(e.to_string()))?;
            }
            // A drained sink has nothing left to seek within.
            None => {
                let playing = self.sink.as_ref().map_or(false, |sink| !sink.is_paused());
                self.rebuild_sink(&loaded.path, &loaded.url, position, playing)
                    .map_err(|e| PlayerError::Seek(e.to_string()))?;
            }
        }

        self.progress.seeked(position);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        self.finish_pending();
        self.progress.poll()
    }

    fn analyzer(&self) -> AnalyzerHandle {
        self.analyzer.clone()
    }
}

/// Opens [`RodioOutput`] lazily on the engine's first `play()`.
#[derive(Debug, Clone)]
pub struct RodioFactory {
    device_name: Option<String>,
    resolver: MediaResolver,
}

impl RodioFactory {
    pub fn new(device_name: Option<String>, resolver: MediaResolver) -> Self {
        Self {
            device_name,
            resolver,
        }
    }
}

impl MediaFactory for RodioFactory {
    fn create(&mut self) -> Result<Box<dyn MediaOutput>, PlayerError> {
        let output = RodioOutput::open(self.device_name.as_deref(), self.resolver.clone())?;
        Ok(Box::new(output))
    }
}

/// Names of the output devices on the default host.
pub fn list_output_devices() -> Result<Vec<String>, PlayerError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PlayerError::Output(e.to_string()))?;

    Ok(devices
        .map(|device| device.name().unwrap_or_else(|_| "Unknown".to_string()))
        .collect())
}

fn open_stream(device_name: Option<&str>) -> Result<(OutputStream, OutputStreamHandle), PlayerError> {
    if let Some(name) = device_name {
        match find_output_device(name) {
            Some(device) => {
                info!("Using output device: {}", name);
                return OutputStream::try_from_device(&device).map_err(|e| PlayerError::Output(e.to_string()));
            }
            None => warn!("Output device '{}' not found, falling back to the default device", name),
        }
    }

    OutputStream::try_default().map_err(|e| PlayerError::Output(e.to_string()))
}

fn find_output_device(name: &str) -> Option<cpal::Device> {
    let host = cpal::default_host();
    let mut devices = host.output_devices().ok()?;
    devices.find(|device| device.name().map(|n| n == name).unwrap_or(false))
}

use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::{
    CommandOutcome, EventBus, NowPlaying, NowPlayingSink, PlaybackEvent, PlaybackState, PlayerHandle, PlayerStatus,
    StateCell, TransportCommand,
};
use crate::audio::{AnalyzerHandle, MediaEvent, MediaFactory, MediaOutput};
use crate::catalog::{playable_tracks, CatalogGateway, Track};
use crate::error::PlayerError;

/// Identity of the source currently loaded into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceKey {
    id: String,
    url: String,
}

impl SourceKey {
    fn of(track: &Track) -> Option<Self> {
        track.media_url().map(|url| Self {
            id: track.id.clone(),
            url: url.to_string(),
        })
    }
}

/// Single source of truth for what is playing, where, and how loud.
///
/// Owns the one media output, created on the first `play()` and kept until
/// [`PlaybackEngine::shutdown`]. Every mutating operation takes `&mut self`,
/// so transport commands are applied strictly one after another: the
/// exclusive borrow is held across the await inside `play()`.
///
/// Failures never leave the session wedged. They are logged, turned into a
/// [`PlaybackEvent::Notice`] and returned; the next user-initiated `play()`
/// retries.
pub struct PlaybackEngine {
    catalog: Arc<dyn CatalogGateway>,
    factory: Box<dyn MediaFactory>,
    media: Option<Box<dyn MediaOutput>>,
    tracks: Arc<Vec<Track>>,
    current_index: usize,
    loaded: Option<SourceKey>,
    is_playing: bool,
    elapsed: Duration,
    duration: Option<Duration>,
    volume: f32,
    bus: EventBus,
    cell: StateCell,
    last_published: Option<PlaybackState>,
    handle: PlayerHandle,
    commands: Receiver<TransportCommand>,
    now_playing: Vec<Box<dyn NowPlayingSink>>,
    artwork: Option<String>,
}

impl PlaybackEngine {
    pub fn new(catalog: Arc<dyn CatalogGateway>, factory: Box<dyn MediaFactory>) -> Self {
        let (handle, commands) = PlayerHandle::channel();

        let mut engine = Self {
            catalog,
            factory,
            media: None,
            tracks: Arc::new(Vec::new()),
            current_index: 0,
            loaded: None,
            is_playing: false,
            elapsed: Duration::ZERO,
            duration: None,
            volume: 1.0,
            bus: EventBus::new(),
            cell: StateCell::default(),
            last_published: None,
            handle,
            commands,
            now_playing: Vec::new(),
            artwork: None,
        };
        engine.publish();
        engine
    }

    /// Session volume before anything is loaded; clamped into [0, 1].
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.set_volume(volume);
        self
    }

    /// Artwork locator published with the now-playing metadata.
    pub fn with_artwork(mut self, artwork: Option<String>) -> Self {
        self.artwork = artwork;
        self
    }

    pub fn add_now_playing_sink(&mut self, mut sink: Box<dyn NowPlayingSink>) {
        let state = self.state();
        sink.publish(NowPlaying::from_state(&state, self.artwork.as_deref()).as_ref());
        self.now_playing.push(sink);
    }

    pub fn subscribe(&mut self) -> Receiver<PlaybackEvent> {
        self.bus.subscribe()
    }

    pub fn handle(&self) -> PlayerHandle {
        self.handle.clone()
    }

    pub fn state_cell(&self) -> StateCell {
        self.cell.clone()
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.state()
    }

    /// `None` until the first `play()` has created the output.
    pub fn analyzer(&self) -> Option<AnalyzerHandle> {
        self.media.as_ref().map(|media| media.analyzer())
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Replaces the playable list with a fresh read of the catalog.
    ///
    /// Keeps the previous list when the read fails. Never starts playback.
    pub async fn load_catalog(&mut self) -> Result<usize, PlayerError> {
        let catalog = Arc::clone(&self.catalog);
        let origin = catalog.describe();

        let slots = match catalog.list().await {
            Ok(slots) => slots,
            Err(e) => {
                warn!(
                    "Catalog refresh from {} failed, keeping {} tracks: {}",
                    origin,
                    self.tracks.len(),
                    e
                );
                self.notice(format!("Could not refresh tracks: {e}"));
                return Err(e);
            }
        };

        let total = slots.len();
        let tracks = playable_tracks(slots);
        let playable = tracks.len();
        info!("Catalog loaded from {}: {} rows, {} playable", origin, total, playable);

        self.tracks = Arc::new(tracks);
        if self.tracks.is_empty() {
            self.current_index = 0;
        } else if self.current_index >= self.tracks.len() {
            self.current_index = self.tracks.len() - 1;
        }

        let current = self.tracks.get(self.current_index).and_then(SourceKey::of);
        if self.loaded.is_some() && current != self.loaded {
            debug!("Track at index {} changed, source will reload", self.current_index);
            self.loaded = None;
            self.halt();
        }

        self.bus.publish(PlaybackEvent::CatalogReplaced { playable });
        self.publish();
        Ok(playable)
    }

    /// Starts the current track, creating the output and loading the source
    /// as needed.
    ///
    /// Must be driven by a user action: platforms that gate audio on a
    /// gesture may keep the device silent even though this succeeds.
    pub async fn play(&mut self) -> Result<CommandOutcome, PlayerError> {
        if self.tracks.is_empty() {
            debug!("Play ignored: no playable tracks");
            return Ok(CommandOutcome::Ignored);
        }

        match self.start_current().await {
            Ok(()) => {
                self.is_playing = true;
                self.publish();
                Ok(CommandOutcome::Applied)
            }
            Err(e) => {
                self.absorb("Playback failed", &e);
                Err(e)
            }
        }
    }

    pub fn pause(&mut self) -> CommandOutcome {
        if let Some(media) = self.media.as_mut() {
            media.pause();
        }
        self.is_playing = false;
        self.publish();
        CommandOutcome::Applied
    }

    pub async fn toggle_play(&mut self) -> Result<CommandOutcome, PlayerError> {
        if self.is_playing {
            Ok(self.pause())
        } else {
            self.play().await
        }
    }

    /// Selects `index` and loads it from the start. Keeps playing if the
    /// session was playing, otherwise stays paused with the source preloaded.
    pub fn skip_to(&mut self, index: usize) -> Result<CommandOutcome, PlayerError> {
        if index >= self.tracks.len() {
            debug!("Skip to {} ignored: {} playable tracks", index, self.tracks.len());
            return Ok(CommandOutcome::Ignored);
        }

        let keep_playing = self.is_playing;
        match self.switch_to(index, keep_playing) {
            Ok(()) => {
                self.publish();
                Ok(CommandOutcome::Applied)
            }
            Err(e) => {
                self.absorb("Could not switch track", &e);
                Err(e)
            }
        }
    }

    pub fn next(&mut self) -> Result<CommandOutcome, PlayerError> {
        let count = self.tracks.len();
        if count == 0 {
            return Ok(CommandOutcome::Ignored);
        }
        self.skip_to((self.current_index + 1) % count)
    }

    pub fn previous(&mut self) -> Result<CommandOutcome, PlayerError> {
        let count = self.tracks.len();
        if count == 0 {
            return Ok(CommandOutcome::Ignored);
        }
        let index = if self.current_index == 0 {
            count - 1
        } else {
            self.current_index - 1
        };
        self.skip_to(index)
    }

    /// Moves to `seconds`, clamped to [0, duration]. Elapsed time updates
    /// immediately rather than on the next position report.
    pub fn seek(&mut self, seconds: f64) -> Result<CommandOutcome, PlayerError> {
        if !seconds.is_finite() || self.loaded.is_none() {
            debug!("Seek to {} ignored", seconds);
            return Ok(CommandOutcome::Ignored);
        }

        let mut target = seconds.max(0.0);
        if let Some(duration) = self.duration {
            target = target.min(duration.as_secs_f64());
        }
        let position = Duration::from_secs_f64(target);

        let result = match self.media.as_mut() {
            Some(media) => media.seek(position),
            None => Err(PlayerError::Seek("audio output not available".to_string())),
        };

        match result {
            Ok(()) => {
                self.elapsed = position;
                self.publish();
                Ok(CommandOutcome::Applied)
            }
            Err(e) => {
                self.loaded = None;
                self.absorb("Seek failed", &e);
                Err(e)
            }
        }
    }

    /// Clamps into [0, 1]; also applies to tracks loaded later.
    pub fn set_volume(&mut self, level: f32) -> CommandOutcome {
        if !level.is_finite() {
            return CommandOutcome::Ignored;
        }

        self.volume = level.clamp(0.0, 1.0);
        if let Some(media) = self.media.as_mut() {
            media.set_volume(self.volume);
        }
        self.publish();
        CommandOutcome::Applied
    }

    /// Applies pending output signals: metadata, position reports and
    /// end-of-track. Call once per UI tick. Returns the number of signals.
    pub fn pump(&mut self) -> usize {
        let events = match self.media.as_mut() {
            Some(media) => media.poll_events(),
            None => return 0,
        };
        let count = events.len();

        for event in events {
            match event {
                MediaEvent::MetadataLoaded { duration } => {
                    self.duration = Some(duration);
                    self.elapsed = self.elapsed.min(duration);
                }
                MediaEvent::TimeUpdate { position } => {
                    self.elapsed = match self.duration {
                        Some(duration) => position.min(duration),
                        None => position,
                    };
                }
                MediaEvent::Ended => {
                    // Anything after the end belongs to the finished source.
                    self.advance_after_end();
                    break;
                }
                MediaEvent::LoadFailed { reason } => {
                    // The next play reloads the source from scratch.
                    let url = self.loaded.take().map(|key| key.url).unwrap_or_default();
                    self.absorb("Playback failed", &PlayerError::load(url, reason));
                    break;
                }
            }
        }

        self.publish();
        count
    }

    /// Drains queued [`PlayerHandle`] commands in the order they were sent.
    pub async fn process_commands(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(command) = self.commands.try_recv() {
            if let Err(e) = self.execute(command).await {
                debug!("Queued command failed: {}", e);
            }
            processed += 1;
        }
        processed
    }

    pub async fn execute(&mut self, command: TransportCommand) -> Result<CommandOutcome, PlayerError> {
        match command {
            TransportCommand::Play => self.play().await,
            TransportCommand::Pause => Ok(self.pause()),
            TransportCommand::TogglePlay => self.toggle_play().await,
            TransportCommand::Next => self.next(),
            TransportCommand::Previous => self.previous(),
            TransportCommand::SkipTo(index) => self.skip_to(index),
            TransportCommand::Seek(seconds) => self.seek(seconds),
            TransportCommand::SetVolume(level) => Ok(self.set_volume(level)),
            TransportCommand::Refresh => self.load_catalog().await.map(|_| CommandOutcome::Applied),
        }
    }

    /// Releases the media output. Also runs on drop.
    pub fn shutdown(&mut self) {
        if let Some(mut media) = self.media.take() {
            media.pause();
            info!("Audio output released");
        }
        self.cell.set_analyzer(None);
        self.loaded = None;
        self.is_playing = false;
        self.elapsed = Duration::ZERO;
        self.duration = None;
        self.publish();
    }

    async fn start_current(&mut self) -> Result<(), PlayerError> {
        self.ensure_media()?;
        let key = self
            .tracks
            .get(self.current_index)
            .and_then(SourceKey::of)
            .ok_or_else(|| PlayerError::Start("no playable track selected".to_string()))?;
        if self.loaded.as_ref() != Some(&key) {
            self.load_source(key)?;
        }

        let media = self.media_mut()?;
        media.resume().await?;
        media.start()
    }

    fn ensure_media(&mut self) -> Result<(), PlayerError> {
        if self.media.is_none() {
            info!("Creating audio output");
            let media = self.factory.create()?;
            self.cell.set_analyzer(Some(media.analyzer()));
            self.media = Some(media);
        }
        Ok(())
    }

    fn load_source(&mut self, key: SourceKey) -> Result<(), PlayerError> {
        self.loaded = None;
        self.elapsed = Duration::ZERO;
        self.duration = None;

        let volume = self.volume;
        self.media_mut()?.load(&key.url, volume)?;

        debug!("Loaded {} from {}", key.id, key.url);
        self.loaded = Some(key);
        Ok(())
    }

    /// Selects `index` with elapsed reset. Without an output yet, the source
    /// is loaded by the first `play()` instead.
    fn switch_to(&mut self, index: usize, keep_playing: bool) -> Result<(), PlayerError> {
        self.current_index = index;
        self.elapsed = Duration::ZERO;
        self.duration = None;

        if self.media.is_none() {
            self.loaded = None;
            return Ok(());
        }

        let key = self
            .tracks
            .get(index)
            .and_then(SourceKey::of)
            .ok_or_else(|| PlayerError::Start("no playable track selected".to_string()))?;
        self.load_source(key)?;

        if keep_playing {
            self.media_mut()?.start()?;
        }
        Ok(())
    }

    fn advance_after_end(&mut self) {
        let count = self.tracks.len();
        if count == 0 || self.loaded.is_none() {
            return;
        }

        let next = (self.current_index + 1) % count;
        info!("Track {} ended, advancing to {}", self.current_index, next);

        match self.switch_to(next, true) {
            Ok(()) => self.is_playing = true,
            Err(e) => self.absorb("Auto-advance failed", &e),
        }
    }

    fn media_mut(&mut self) -> Result<&mut Box<dyn MediaOutput>, PlayerError> {
        self.media
            .as_mut()
            .ok_or_else(|| PlayerError::Output("audio output not available".to_string()))
    }

    /// Stops sound and forgets position; the selection stays.
    fn halt(&mut self) {
        if let Some(media) = self.media.as_mut() {
            media.pause();
        }
        self.is_playing = false;
        self.elapsed = Duration::ZERO;
        self.duration = None;
    }

    fn absorb(&mut self, context: &str, error: &PlayerError) {
        warn!("{}: {}", context, error);
        if let Some(media) = self.media.as_mut() {
            media.pause();
        }
        self.is_playing = false;
        self.notice(format!("{context}: {error}"));
        self.publish();
    }

    fn notice(&mut self, message: String) {
        self.bus.publish(PlaybackEvent::Notice(message));
    }

    fn state(&self) -> PlaybackState {
        let status = if self.tracks.is_empty() {
            PlayerStatus::Empty
        } else if self.is_playing {
            PlayerStatus::ReadyPlaying
        } else {
            PlayerStatus::ReadyPaused
        };

        PlaybackState {
            status,
            tracks: Arc::clone(&self.tracks),
            current_index: self.current_index,
            is_playing: self.is_playing,
            elapsed: self.elapsed,
            duration: self.duration,
            volume: self.volume,
        }
    }

    /// Pushes the current state to the cell, subscribers and now-playing
    /// sinks when it differs from the last published one.
    fn publish(&mut self) {
        let state = self.state();
        if self.last_published.as_ref() == Some(&state) {
            return;
        }

        let previous_id = self
            .last_published
            .as_ref()
            .and_then(|previous| previous.current_track().map(|track| (previous.current_index, track.id.clone())));
        let current_id = state
            .current_track()
            .map(|track| (state.current_index, track.id.clone()));

        self.cell.store(state.clone());
        self.bus.publish(PlaybackEvent::StateChanged(state.clone()));

        if current_id.is_some() && current_id != previous_id {
            if let Some(track) = state.current_track() {
                self.bus.publish(PlaybackEvent::TrackChanged {
                    index: state.current_index,
                    track: track.clone(),
                });
            }
        }

        let now_playing = NowPlaying::from_state(&state, self.artwork.as_deref());
        for sink in &mut self.now_playing {
            sink.publish(now_playing.as_ref());
        }

        self.last_published = Some(state);
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if self.media.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleTap;
    use crate::catalog::{track, StaticCatalog};
    use async_trait::async_trait;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::sync::Mutex;

    const TRACK_LENGTH: Duration = Duration::from_secs(180);

    #[derive(Default)]
    struct MediaLog {
        created: usize,
        failed_creates_left: usize,
        loads: Vec<(String, f32)>,
        resumes: usize,
        starts: usize,
        pauses: usize,
        seeks: Vec<Duration>,
        volume: Option<f32>,
        failing_urls: Vec<String>,
        fail_start: bool,
        queued: Vec<MediaEvent>,
    }

    type SharedLog = Rc<RefCell<MediaLog>>;

    struct FakeMedia {
        log: SharedLog,
        analyzer: AnalyzerHandle,
    }

    #[async_trait(?Send)]
    impl MediaOutput for FakeMedia {
        fn load(&mut self, url: &str, volume: f32) -> Result<(), PlayerError> {
            let mut log = self.log.borrow_mut();
            log.loads.push((url.to_string(), volume));
            log.queued.clear();
            if log.failing_urls.iter().any(|failing| failing == url) {
                return Err(PlayerError::load(url, "decode error"));
            }
            log.queued.push(MediaEvent::MetadataLoaded {
                duration: TRACK_LENGTH,
            });
            Ok(())
        }

        async fn resume(&mut self) -> Result<(), PlayerError> {
            self.log.borrow_mut().resumes += 1;
            Ok(())
        }

        fn start(&mut self) -> Result<(), PlayerError> {
            let mut log = self.log.borrow_mut();
            if log.fail_start {
                return Err(PlayerError::Start("blocked by policy".to_string()));
            }
            log.starts += 1;
            Ok(())
        }

        fn pause(&mut self) {
            self.log.borrow_mut().pauses += 1;
        }

        fn seek(&mut self, position: Duration) -> Result<(), PlayerError> {
            self.log.borrow_mut().seeks.push(position);
            Ok(())
        }

        fn set_volume(&mut self, volume: f32) {
            self.log.borrow_mut().volume = Some(volume);
        }

        fn poll_events(&mut self) -> Vec<MediaEvent> {
            std::mem::take(&mut self.log.borrow_mut().queued)
        }

        fn analyzer(&self) -> AnalyzerHandle {
            self.analyzer.clone()
        }
    }

    struct FakeFactory {
        log: SharedLog,
    }

    impl MediaFactory for FakeFactory {
        fn create(&mut self) -> Result<Box<dyn MediaOutput>, PlayerError> {
            let mut log = self.log.borrow_mut();
            if log.failed_creates_left > 0 {
                log.failed_creates_left -= 1;
                return Err(PlayerError::Output("no device".to_string()));
            }
            log.created += 1;
            Ok(Box::new(FakeMedia {
                log: Rc::clone(&self.log),
                analyzer: AnalyzerHandle::new(SampleTap::default()),
            }))
        }
    }

    /// Answers each `list()` with the next scripted response.
    struct ScriptedCatalog {
        responses: Mutex<VecDeque<Result<Vec<Track>, String>>>,
    }

    impl ScriptedCatalog {
        fn new(responses: Vec<Result<Vec<Track>, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl CatalogGateway for ScriptedCatalog {
        async fn list(&self) -> Result<Vec<Track>, PlayerError> {
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(tracks)) => Ok(tracks),
                Some(Err(reason)) => Err(PlayerError::Catalog(reason)),
                None => Ok(Vec::new()),
            }
        }

        fn describe(&self) -> String {
            "scripted catalog".to_string()
        }
    }

    fn playable(ids: &[&str]) -> Vec<Track> {
        ids.iter()
            .map(|id| track(id, Some(&format!("{id}.wav"))))
            .collect()
    }

    fn engine_over(catalog: impl CatalogGateway + 'static) -> (PlaybackEngine, SharedLog) {
        let log = SharedLog::default();
        let engine = PlaybackEngine::new(
            Arc::new(catalog),
            Box::new(FakeFactory {
                log: Rc::clone(&log),
            }),
        );
        (engine, log)
    }

    async fn loaded_engine(ids: &[&str]) -> (PlaybackEngine, SharedLog) {
        let (mut engine, log) = engine_over(StaticCatalog::new(playable(ids)));
        engine.load_catalog().await.unwrap();
        (engine, log)
    }

    fn notices(receiver: &Receiver<PlaybackEvent>) -> Vec<String> {
        receiver
            .try_iter()
            .filter_map(|event| match event {
                PlaybackEvent::Notice(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_catalog_ignores_transport() {
        let (mut engine, log) = engine_over(StaticCatalog::new(vec![track("slot", None)]));
        assert_eq!(engine.load_catalog().await.unwrap(), 0);

        assert_eq!(engine.play().await.unwrap(), CommandOutcome::Ignored);
        assert_eq!(engine.next().unwrap(), CommandOutcome::Ignored);
        assert_eq!(engine.previous().unwrap(), CommandOutcome::Ignored);
        assert_eq!(engine.skip_to(0).unwrap(), CommandOutcome::Ignored);
        assert_eq!(engine.toggle_play().await.unwrap(), CommandOutcome::Ignored);

        assert!(!engine.is_playing());
        assert_eq!(engine.snapshot().status, PlayerStatus::Empty);
        assert_eq!(log.borrow().created, 0);
    }

    #[tokio::test]
    async fn placeholders_are_skipped_by_navigation() {
        let slots = vec![
            track("a", Some("a.wav")),
            track("b", None),
            track("c", Some("c.wav")),
        ];
        let (mut engine, _log) = engine_over(StaticCatalog::new(slots));
        engine.load_catalog().await.unwrap();

        let ids: Vec<&str> = engine.tracks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(engine.snapshot().status, PlayerStatus::ReadyPaused);

        engine.skip_to(1).unwrap();
        assert_eq!(engine.snapshot().current_track().unwrap().id, "c");

        engine.next().unwrap();
        assert_eq!(engine.current_index(), 0);
        assert_eq!(engine.snapshot().current_track().unwrap().id, "a");
    }

    #[tokio::test]
    async fn next_n_times_returns_to_start() {
        let ids = ["a", "b", "c", "d"];
        for count in 1..=ids.len() {
            for start in 0..count {
                let (mut engine, _log) = loaded_engine(&ids[..count]).await;
                engine.skip_to(start).unwrap();
                for _ in 0..count {
                    engine.next().unwrap();
                }
                assert_eq!(engine.current_index(), start, "count {count}, start {start}");
            }
        }
    }

    #[tokio::test]
    async fn previous_from_first_wraps_to_last() {
        let (mut engine, _log) = loaded_engine(&["a", "b", "c"]).await;
        engine.previous().unwrap();
        assert_eq!(engine.current_index(), 2);
        engine.previous().unwrap();
        assert_eq!(engine.current_index(), 1);
    }

    #[tokio::test]
    async fn out_of_range_skip_is_ignored() {
        let (mut engine, _log) = loaded_engine(&["a", "b"]).await;
        assert_eq!(engine.skip_to(2).unwrap(), CommandOutcome::Ignored);
        assert_eq!(engine.current_index(), 0);
    }

    #[tokio::test]
    async fn play_and_pause_are_deterministic() {
        let (mut engine, log) = loaded_engine(&["a", "b"]).await;

        assert_eq!(engine.play().await.unwrap(), CommandOutcome::Applied);
        assert!(engine.is_playing());
        assert_eq!(engine.snapshot().status, PlayerStatus::ReadyPlaying);

        engine.pause();
        assert!(!engine.is_playing());
        assert_eq!(engine.pause(), CommandOutcome::Applied);
        assert!(!engine.is_playing());

        engine.play().await.unwrap();
        assert!(engine.is_playing());

        let log = log.borrow();
        assert_eq!(log.created, 1);
        assert_eq!(log.loads.len(), 1, "resuming must not reload the source");
        assert_eq!(log.resumes, 2);
        assert_eq!(log.starts, 2);
    }

    #[tokio::test]
    async fn toggle_play_alternates() {
        let (mut engine, _log) = loaded_engine(&["a"]).await;
        engine.toggle_play().await.unwrap();
        assert!(engine.is_playing());
        engine.toggle_play().await.unwrap();
        assert!(!engine.is_playing());
        engine.toggle_play().await.unwrap();
        assert!(engine.is_playing());
    }

    #[tokio::test]
    async fn metadata_and_time_updates_drive_elapsed() {
        let (mut engine, log) = loaded_engine(&["a"]).await;
        engine.play().await.unwrap();
        assert_eq!(engine.snapshot().duration, None);

        engine.pump();
        assert_eq!(engine.snapshot().duration, Some(TRACK_LENGTH));

        log.borrow_mut().queued.push(MediaEvent::TimeUpdate {
            position: Duration::from_secs(12),
        });
        assert_eq!(engine.pump(), 1);
        assert_eq!(engine.snapshot().elapsed, Duration::from_secs(12));
    }

    #[tokio::test]
    async fn seek_clamps_to_track_bounds() {
        let (mut engine, log) = loaded_engine(&["a"]).await;
        engine.play().await.unwrap();
        engine.pump();

        engine.seek(-5.0).unwrap();
        assert_eq!(engine.snapshot().elapsed, Duration::ZERO);

        engine.seek(TRACK_LENGTH.as_secs_f64() + 100.0).unwrap();
        assert_eq!(engine.snapshot().elapsed, TRACK_LENGTH);

        engine.seek(42.5).unwrap();
        assert_eq!(engine.snapshot().elapsed, Duration::from_secs_f64(42.5));

        assert_eq!(engine.seek(f64::NAN).unwrap(), CommandOutcome::Ignored);
        assert_eq!(log.borrow().seeks.len(), 3);
    }

    #[tokio::test]
    async fn seek_without_a_loaded_source_is_ignored() {
        let (mut engine, _log) = loaded_engine(&["a"]).await;
        assert_eq!(engine.seek(10.0).unwrap(), CommandOutcome::Ignored);
        assert_eq!(engine.snapshot().elapsed, Duration::ZERO);
    }

    #[tokio::test]
    async fn volume_clamps_and_carries_into_new_loads() {
        let (mut engine, log) = loaded_engine(&["a", "b"]).await;

        engine.set_volume(-0.2);
        assert_eq!(engine.snapshot().volume, 0.0);
        engine.set_volume(1.5);
        assert_eq!(engine.snapshot().volume, 1.0);
        assert_eq!(engine.set_volume(f32::NAN), CommandOutcome::Ignored);

        engine.set_volume(0.3);
        engine.play().await.unwrap();
        engine.set_volume(0.6);
        assert_eq!(log.borrow().volume, Some(0.6));

        engine.next().unwrap();
        let log = log.borrow();
        assert_eq!(log.loads[0], ("a.wav".to_string(), 0.3));
        assert_eq!(log.loads[1], ("b.wav".to_string(), 0.6));
    }

    #[tokio::test]
    async fn end_of_last_track_wraps_and_keeps_playing() {
        let (mut engine, log) = loaded_engine(&["a", "b", "c"]).await;
        engine.play().await.unwrap();
        engine.skip_to(2).unwrap();
        engine.pump();

        log.borrow_mut().queued.push(MediaEvent::TimeUpdate {
            position: Duration::from_secs(90),
        });
        log.borrow_mut().queued.push(MediaEvent::Ended);
        engine.pump();

        assert_eq!(engine.current_index(), 0);
        assert!(engine.is_playing());
        assert_eq!(engine.snapshot().elapsed, Duration::ZERO);
        assert_eq!(log.borrow().loads.last().unwrap().0, "a.wav");
    }

    #[tokio::test]
    async fn late_load_failure_pauses_and_reloads_on_next_play() {
        let (mut engine, log) = loaded_engine(&["a", "b"]).await;
        let events = engine.subscribe();
        engine.play().await.unwrap();
        engine.pump();

        log.borrow_mut().queued.push(MediaEvent::LoadFailed {
            reason: "connection reset".to_string(),
        });
        log.borrow_mut().queued.push(MediaEvent::Ended);
        engine.pump();

        assert!(!engine.is_playing());
        assert_eq!(engine.current_index(), 0);
        let messages = notices(&events);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("connection reset"));

        engine.play().await.unwrap();
        assert!(engine.is_playing());
        assert_eq!(log.borrow().loads.len(), 2);
        assert_eq!(log.borrow().loads[1].0, "a.wav");
    }

    #[tokio::test]
    async fn skipping_while_paused_preloads_without_starting() {
        let (mut engine, log) = loaded_engine(&["a", "b", "c"]).await;
        engine.play().await.unwrap();
        engine.pause();

        engine.skip_to(1).unwrap();
        assert!(!engine.is_playing());
        assert_eq!(log.borrow().loads.len(), 2);
        assert_eq!(log.borrow().starts, 1);

        engine.play().await.unwrap();
        engine.skip_to(2).unwrap();
        assert!(engine.is_playing());
        assert_eq!(log.borrow().starts, 3);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_previous_list() {
        let (mut engine, _log) = engine_over(ScriptedCatalog::new(vec![
            Ok(playable(&["a", "b", "c"])),
            Err("offline".to_string()),
        ]));
        let events = engine.subscribe();

        engine.load_catalog().await.unwrap();
        assert!(matches!(
            engine.load_catalog().await,
            Err(PlayerError::Catalog(_))
        ));

        assert_eq!(engine.tracks().len(), 3);
        assert_eq!(notices(&events).len(), 1);
    }

    #[tokio::test]
    async fn shrinking_catalog_clamps_the_index() {
        let (mut engine, _log) = engine_over(ScriptedCatalog::new(vec![
            Ok(playable(&["a", "b", "c"])),
            Ok(playable(&["a"])),
            Ok(Vec::new()),
        ]));
        engine.load_catalog().await.unwrap();
        engine.skip_to(2).unwrap();

        engine.load_catalog().await.unwrap();
        assert_eq!(engine.current_index(), 0);
        assert_eq!(engine.snapshot().status, PlayerStatus::ReadyPaused);

        engine.load_catalog().await.unwrap();
        assert_eq!(engine.current_index(), 0);
        assert_eq!(engine.snapshot().status, PlayerStatus::Empty);
    }

    #[tokio::test]
    async fn replaced_current_track_reloads_on_next_play() {
        let (mut engine, log) = engine_over(ScriptedCatalog::new(vec![
            Ok(playable(&["a", "b"])),
            Ok(playable(&["x", "b"])),
        ]));
        engine.load_catalog().await.unwrap();
        engine.play().await.unwrap();

        engine.load_catalog().await.unwrap();
        assert!(!engine.is_playing());

        engine.play().await.unwrap();
        assert_eq!(log.borrow().loads.last().unwrap().0, "x.wav");
    }

    #[tokio::test]
    async fn load_failure_is_recoverable() {
        let (mut engine, log) = loaded_engine(&["a", "b"]).await;
        let events = engine.subscribe();
        log.borrow_mut().failing_urls.push("b.wav".to_string());

        engine.skip_to(1).unwrap();
        assert!(matches!(engine.play().await, Err(PlayerError::Load { .. })));
        assert!(!engine.is_playing());
        assert_eq!(engine.snapshot().status, PlayerStatus::ReadyPaused);
        assert_eq!(notices(&events).len(), 1);

        log.borrow_mut().failing_urls.clear();
        engine.play().await.unwrap();
        assert!(engine.is_playing());
    }

    #[tokio::test]
    async fn blocked_start_is_recoverable() {
        let (mut engine, log) = loaded_engine(&["a"]).await;
        log.borrow_mut().fail_start = true;
        assert!(engine.play().await.is_err());
        assert!(!engine.is_playing());

        log.borrow_mut().fail_start = false;
        engine.play().await.unwrap();
        assert!(engine.is_playing());
        assert_eq!(log.borrow().loads.len(), 1);
    }

    #[tokio::test]
    async fn output_is_created_once_and_retried_after_failure() {
        let (mut engine, log) = loaded_engine(&["a"]).await;
        log.borrow_mut().failed_creates_left = 1;

        assert!(matches!(engine.play().await, Err(PlayerError::Output(_))));
        assert!(engine.analyzer().is_none());
        assert!(engine.state_cell().analyzer().is_none());

        engine.play().await.unwrap();
        engine.pause();
        engine.play().await.unwrap();

        assert_eq!(log.borrow().created, 1);
        assert!(engine.analyzer().is_some());
        assert!(engine.state_cell().analyzer().is_some());
    }

    #[tokio::test]
    async fn queued_commands_apply_in_issue_order() {
        let (mut engine, _log) = loaded_engine(&["a", "b"]).await;
        let handle = engine.handle();

        handle.play();
        handle.pause();
        assert_eq!(engine.process_commands().await, 2);
        assert!(!engine.is_playing());

        handle.pause();
        handle.play();
        handle.set_volume(2.0);
        handle.skip_to(9);
        handle.next();
        engine.process_commands().await;
        assert!(engine.is_playing());
        assert_eq!(engine.snapshot().volume, 1.0);
        assert_eq!(engine.current_index(), 1);
    }

    #[tokio::test]
    async fn observers_see_state_track_and_now_playing() {
        struct Recorder(Rc<RefCell<Vec<Option<NowPlaying>>>>);

        impl NowPlayingSink for Recorder {
            fn publish(&mut self, now_playing: Option<&NowPlaying>) {
                self.0.borrow_mut().push(now_playing.cloned());
            }
        }

        let (mut engine, _log) = loaded_engine(&["a", "b"]).await;
        let published = Rc::new(RefCell::new(Vec::new()));
        engine.add_now_playing_sink(Box::new(Recorder(Rc::clone(&published))));
        let events = engine.subscribe();
        let cell = engine.state_cell();

        engine.play().await.unwrap();
        engine.next().unwrap();

        let received: Vec<PlaybackEvent> = events.try_iter().collect();
        assert!(received.iter().any(|event| matches!(
            event,
            PlaybackEvent::StateChanged(state) if state.status == PlayerStatus::ReadyPlaying
        )));
        assert!(received.iter().any(|event| matches!(
            event,
            PlaybackEvent::TrackChanged { index: 1, track } if track.id == "b"
        )));

        assert_eq!(cell.snapshot().current_index, 1);
        let last = published.borrow().last().cloned().flatten().unwrap();
        assert_eq!(last.title, "Track b");
        assert_eq!(last.album.as_deref(), Some("528Hz"));
        assert!(last.is_playing);
    }

    #[tokio::test]
    async fn shutdown_releases_the_output() {
        let (mut engine, log) = loaded_engine(&["a"]).await;
        engine.play().await.unwrap();
        let cell = engine.state_cell();

        engine.shutdown();
        assert!(!engine.is_playing());
        assert!(engine.analyzer().is_none());
        assert!(cell.analyzer().is_none());
        assert!(!cell.snapshot().is_playing);
        assert!(log.borrow().pauses >= 1);
    }
}

use rodio::source::SeekError;
use rodio::Source;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Mono frames gathered before the shared ring is locked.
const FLUSH_FRAMES: usize = 256;

/// Default ring length: a few analysis windows of history.
pub const DEFAULT_TAP_CAPACITY: usize = 4096;

/// Shared view of the samples the output device is currently pulling.
///
/// The output thread writes through [`TapSource`]; the analyzer and the
/// engine read. Every new source opens a session so that stragglers from a
/// replaced source cannot move the position of the current one.
#[derive(Clone)]
pub struct SampleTap {
    shared: Arc<TapShared>,
}

struct TapShared {
    ring: Mutex<VecDeque<f32>>,
    capacity: usize,
    session: AtomicU64,
    generation: AtomicU64,
    frames_played: AtomicU64,
    sample_rate: AtomicU32,
    finished: AtomicBool,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(TapShared {
                ring: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity: capacity.max(1),
                session: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                frames_played: AtomicU64::new(0),
                sample_rate: AtomicU32::new(44_100),
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// Starts a new session at `start` and returns its id.
    ///
    /// The ring is cleared so analysis never mixes two sources.
    pub fn begin_session(&self, sample_rate: u32, start: Duration) -> u64 {
        let session = self.shared.session.fetch_add(1, Ordering::SeqCst) + 1;
        let sample_rate = sample_rate.max(1);
        self.shared.sample_rate.store(sample_rate, Ordering::SeqCst);
        self.shared
            .frames_played
            .store((start.as_secs_f64() * sample_rate as f64) as u64, Ordering::SeqCst);
        self.shared.finished.store(false, Ordering::SeqCst);
        self.lock_ring().clear();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        session
    }

    /// Appends mono samples on behalf of `session`. Stale sessions are dropped.
    pub fn push(&self, session: u64, mono: &[f32]) {
        if mono.is_empty() || !self.is_current(session) {
            return;
        }

        {
            let mut ring = self.lock_ring();
            ring.extend(mono.iter().copied());
            let overflow = ring.len().saturating_sub(self.shared.capacity);
            if overflow > 0 {
                ring.drain(..overflow);
            }
        }

        self.shared
            .frames_played
            .fetch_add(mono.len() as u64, Ordering::SeqCst);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn mark_finished(&self, session: u64) {
        if self.is_current(session) {
            self.shared.finished.store(true, Ordering::SeqCst);
        }
    }

    /// Copies the most recent `out.len()` samples, zero-padding the front
    /// when fewer are available. Returns the generation they belong to.
    pub fn latest(&self, out: &mut [f32]) -> u64 {
        let ring = self.lock_ring();
        let available = ring.len().min(out.len());
        let pad = out.len() - available;

        out[..pad].fill(0.0);
        for (slot, sample) in out[pad..].iter_mut().zip(ring.iter().skip(ring.len() - available)) {
            *slot = *sample;
        }

        self.shared.generation.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Play position of the current session.
    pub fn position(&self) -> Duration {
        let frames = self.shared.frames_played.load(Ordering::SeqCst);
        let rate = self.shared.sample_rate.load(Ordering::SeqCst).max(1);
        Duration::from_secs_f64(frames as f64 / rate as f64)
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    fn is_current(&self, session: u64) -> bool {
        self.shared.session.load(Ordering::SeqCst) == session
    }

    fn lock_ring(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.shared
            .ring
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SampleTap {
    fn default() -> Self {
        Self::new(DEFAULT_TAP_CAPACITY)
    }
}

impl std::fmt::Debug for SampleTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleTap")
            .field("position", &self.position())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Pass-through source that mirrors a mono mixdown into a [`SampleTap`].
pub struct TapSource<S> {
    inner: S,
    tap: SampleTap,
    session: u64,
    channels: u16,
    channel_index: u16,
    frame_sum: f32,
    pending: Vec<f32>,
    done: bool,
}

impl<S> TapSource<S>
where
    S: Source<Item = f32>,
{
    /// Wraps `inner`, which is assumed to begin at `start` within its track.
    pub fn new(inner: S, tap: SampleTap, start: Duration) -> Self {
        let channels = inner.channels().max(1);
        let session = tap.begin_session(inner.sample_rate(), start);

        Self {
            inner,
            tap,
            session,
            channels,
            channel_index: 0,
            frame_sum: 0.0,
            pending: Vec::with_capacity(FLUSH_FRAMES),
            done: false,
        }
    }

    fn flush(&mut self) {
        self.tap.push(self.session, &self.pending);
        self.pending.clear();
    }
}

impl<S> Iterator for TapSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        match self.inner.next() {
            Some(sample) => {
                self.frame_sum += sample;
                self.channel_index += 1;
                if self.channel_index == self.channels {
                    self.pending.push(self.frame_sum / self.channels as f32);
                    self.frame_sum = 0.0;
                    self.channel_index = 0;
                    if self.pending.len() >= FLUSH_FRAMES {
                        self.flush();
                    }
                }
                Some(sample)
            }
            None => {
                if !self.done {
                    self.done = true;
                    self.flush();
                    self.tap.mark_finished(self.session);
                }
                None
            }
        }
    }
}

impl<S> Source for TapSource<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    /// Seeks the wrapped source in place and restarts the tap session at
    /// `pos`, so position reports follow the jump without a new sink.
    fn try_seek(&mut self, pos: Duration) -> Result<(), SeekError> {
        self.inner.try_seek(pos)?;

        self.pending.clear();
        self.frame_sum = 0.0;
        self.channel_index = 0;
        self.done = false;
        self.session = self.tap.begin_session(self.inner.sample_rate(), pos);
        Ok(())
    }
}

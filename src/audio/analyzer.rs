use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::{Arc, Mutex, MutexGuard};

use super::tap::SampleTap;
use super::{BIN_COUNT, FFT_SIZE};

const SMOOTHING_TIME_CONSTANT: f32 = 0.8;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Frequency-domain view of whatever the output is playing.
///
/// Magnitudes follow the usual analyser-node conventions: a Blackman window,
/// per-bin exponential smoothing across blocks, then a linear map of
/// [-100 dB, -30 dB] onto 0..=255.
pub struct FrequencyAnalyzer {
    tap: SampleTap,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    bins: [u8; BIN_COUNT],
    last_generation: Option<u64>,
}

impl FrequencyAnalyzer {
    pub fn new(tap: SampleTap) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        Self {
            tap,
            fft,
            window: Self::blackman_window(FFT_SIZE),
            input: vec![0.0; FFT_SIZE],
            buffer: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            smoothed: vec![0.0; BIN_COUNT],
            bins: [0; BIN_COUNT],
            last_generation: None,
        }
    }

    fn blackman_window(size: usize) -> Vec<f32> {
        let alpha = 0.16;
        let a0 = 0.5 * (1.0 - alpha);
        let a1 = 0.5;
        let a2 = 0.5 * alpha;

        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
                a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
            })
            .collect()
    }

    /// Copies the current magnitudes into `out` (up to [`BIN_COUNT`] values).
    ///
    /// The transform only runs when the tap has delivered new audio since
    /// the previous call, so pulling twice in one frame is free and returns
    /// the same window.
    pub fn fill(&mut self, out: &mut [u8]) {
        let generation = self.tap.generation();
        if self.last_generation != Some(generation) {
            let mut block = std::mem::take(&mut self.input);
            self.tap.latest(&mut block);
            self.analyze_block(&block);
            self.input = block;
            self.last_generation = Some(generation);
        }

        let len = out.len().min(BIN_COUNT);
        out[..len].copy_from_slice(&self.bins[..len]);
    }

    /// Runs one transform over `samples` (zero-padded or truncated to
    /// [`FFT_SIZE`]) and folds it into the smoothed magnitudes.
    pub fn analyze_block(&mut self, samples: &[f32]) {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / FFT_SIZE as f32;
        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.buffer[k].norm() * scale;
            *smoothed = SMOOTHING_TIME_CONSTANT * *smoothed + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
            self.bins[k] = Self::to_byte(*smoothed);
        }
    }

    fn to_byte(magnitude: f32) -> u8 {
        if magnitude <= 0.0 {
            return 0;
        }

        let decibels = 20.0 * magnitude.log10();
        let scaled = 255.0 * (decibels - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
        scaled.clamp(0.0, 255.0) as u8
    }

    pub fn bins(&self) -> &[u8; BIN_COUNT] {
        &self.bins
    }
}

/// Read-only, cloneable handle handed to renderers.
#[derive(Clone)]
pub struct AnalyzerHandle {
    inner: Arc<Mutex<FrequencyAnalyzer>>,
}

impl AnalyzerHandle {
    pub fn new(tap: SampleTap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FrequencyAnalyzer::new(tap))),
        }
    }

    /// See [`FrequencyAnalyzer::fill`]. Call at most once per animation frame.
    pub fn fill(&self, out: &mut [u8]) {
        self.lock().fill(out);
    }

    pub fn bin_count(&self) -> usize {
        BIN_COUNT
    }

    fn lock(&self) -> MutexGuard<'_, FrequencyAnalyzer> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for AnalyzerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerHandle")
            .field("bins", &BIN_COUNT)
            .finish()
    }
}

use crate::audio::{AnalyzerHandle, BIN_COUNT};

/// Synthetic idle spectrum at `time` seconds: two slow sine sweeps across
/// the bins, so the scene keeps breathing when nothing is playing.
pub fn ambient_bins(time: f32, out: &mut [u8]) {
    for (i, bin) in out.iter_mut().enumerate() {
        let i = i as f32;
        let value = 60.0 + 40.0 * (time * 1.3 + i * 0.12).sin() + 20.0 * (time * 0.7 + i * 0.05).sin();
        *bin = value.clamp(0.0, 255.0) as u8;
    }
}

/// Picks the spectrum a renderer draws each frame.
///
/// Live analyzer data while playing; the ambient signal when paused, when no
/// analyzer exists yet, or when the analyzer delivers silence (e.g. a source
/// whose samples cannot be tapped).
#[derive(Debug, Clone)]
pub struct SpectrumSource {
    bins: [u8; BIN_COUNT],
    ambient: bool,
}

impl SpectrumSource {
    pub fn new() -> Self {
        Self {
            bins: [0; BIN_COUNT],
            ambient: true,
        }
    }

    pub fn sample(&mut self, analyzer: Option<&AnalyzerHandle>, is_playing: bool, time: f32) -> &[u8; BIN_COUNT] {
        self.ambient = true;

        if is_playing {
            if let Some(analyzer) = analyzer {
                analyzer.fill(&mut self.bins);
                self.ambient = self.bins.iter().all(|&b| b == 0);
            }
        }

        if self.ambient {
            ambient_bins(time, &mut self.bins);
        }
        &self.bins
    }

    pub fn is_ambient(&self) -> bool {
        self.ambient
    }

    pub fn bins(&self) -> &[u8; BIN_COUNT] {
        &self.bins
    }
}

impl Default for SpectrumSource {
    fn default() -> Self {
        Self::new()
    }
}

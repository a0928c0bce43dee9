use glam::Vec2;

use super::canvas::{Canvas, Rgba};
use crate::audio::{AnalyzerHandle, BIN_COUNT};
use crate::player::PlaybackState;

pub const DEFAULT_SLOTS: usize = 100;

/// Height given to slots that playback skipped over, and the floor for
/// written ones.
pub const LOW_SAMPLE: f32 = 0.05;

const BACKGROUND: Rgba = Rgba::rgb(14, 10, 24);
const PASSED_START: Rgba = Rgba::rgb(138, 43, 226);
const PASSED_END: Rgba = Rgba::rgb(255, 196, 84);
const FUTURE: Rgba = Rgba::rgb(70, 66, 84);

/// Elapsed time treated as "back at the start" after a track change.
const RESTART_SECONDS: f64 = 0.05;

/// Mean bin magnitude scaled to `LOW_SAMPLE..=1.0`.
pub fn mean_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return LOW_SAMPLE;
    }
    let sum: u32 = bins.iter().map(|&b| b as u32).sum();
    (sum as f32 / bins.len() as f32 / 255.0).clamp(LOW_SAMPLE, 1.0)
}

/// Scrubbable progress bar drawn as a bar-graph waveform that is built up
/// from live amplitude while the track plays.
///
/// One slot per equal share of the track's duration. Slots are only ever
/// raised; anything playback jumped over is backfilled with [`LOW_SAMPLE`].
#[derive(Debug, Clone)]
pub struct WaveformProgress {
    slots: Vec<Option<f32>>,
    last_elapsed: f64,
    track_id: Option<String>,
    bins: [u8; BIN_COUNT],
}

impl WaveformProgress {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count.max(1)],
            last_elapsed: 0.0,
            track_id: None,
            bins: [0; BIN_COUNT],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn samples(&self) -> &[Option<f32>] {
        &self.slots
    }

    pub fn written(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.last_elapsed = 0.0;
    }

    /// `floor(elapsed / duration * N)`, clamped to the last slot.
    pub fn slot_for(&self, elapsed: f64, duration: f64) -> Option<usize> {
        if !(duration > 0.0) || !elapsed.is_finite() {
            return None;
        }
        let ratio = (elapsed / duration).clamp(0.0, 1.0);
        let slot = (ratio * self.slots.len() as f64).floor() as usize;
        Some(slot.min(self.slots.len() - 1))
    }

    /// Writes `level` at the slot for `elapsed`, keeping the larger of old
    /// and new, and backfills earlier gaps. Returns the slot written.
    pub fn record(&mut self, elapsed: f64, duration: f64, level: f32) -> Option<usize> {
        let slot = self.slot_for(elapsed, duration)?;

        for earlier in &mut self.slots[..slot] {
            earlier.get_or_insert(LOW_SAMPLE);
        }

        let level = level.clamp(LOW_SAMPLE, 1.0);
        let entry = &mut self.slots[slot];
        *entry = Some(entry.map_or(level, |existing| existing.max(level)));
        Some(slot)
    }

    /// Per-frame bookkeeping: clears on track change or restart, then records
    /// while playing.
    pub fn update(&mut self, state: &PlaybackState, bins: &[u8]) {
        let track_id = state.current_track().map(|track| track.id.as_str());
        if track_id != self.track_id.as_deref() {
            self.reset();
            self.track_id = track_id.map(str::to_string);
        }

        let elapsed = state.elapsed_secs();
        if elapsed < RESTART_SECONDS && self.last_elapsed > 0.5 {
            self.reset();
        }
        self.last_elapsed = elapsed;

        if state.is_playing {
            self.record(elapsed, state.duration_secs(), mean_level(bins));
        }
    }

    /// Pulls the spectrum, updates and renders in one go.
    pub fn draw(&mut self, canvas: &mut dyn Canvas, state: &PlaybackState, analyzer: Option<&AnalyzerHandle>) {
        let mut bins = self.bins;
        match (state.is_playing, analyzer) {
            (true, Some(analyzer)) => analyzer.fill(&mut bins),
            _ => bins.fill(0),
        }
        self.bins = bins;

        self.update(state, &bins);
        self.render(canvas, state.elapsed_secs(), state.duration_secs());
    }

    pub fn render(&self, canvas: &mut dyn Canvas, elapsed: f64, duration: f64) {
        let width = canvas.width() as f32;
        let height = canvas.height() as f32;
        if width <= 0.0 || height <= 0.0 {
            return;
        }

        canvas.fill(BACKGROUND);

        let count = self.slots.len();
        let slot_width = width / count as f32;
        let gap = (slot_width * 0.2).min(2.0);
        let current = self.slot_for(elapsed, duration);

        for (i, sample) in self.slots.iter().enumerate() {
            let sample = sample.unwrap_or(LOW_SAMPLE);
            let bar_height = (sample * height * 0.9).max(2.0);
            let gradient = PASSED_START.lerp(PASSED_END, i as f32 / (count.max(2) - 1) as f32);

            let color = match current {
                Some(c) if i < c => gradient,
                Some(c) if i == c => gradient.lerp(Rgba::WHITE, 0.5),
                _ => FUTURE,
            };

            canvas.fill_rect(
                Vec2::new(i as f32 * slot_width, (height - bar_height) * 0.5),
                Vec2::new(slot_width - gap, bar_height),
                color,
            );
        }

        let progress = if duration > 0.0 {
            (elapsed / duration).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };
        let playhead = Vec2::new(progress * width, height * 0.5);
        let radius = (height * 0.18).max(3.0);
        canvas.circle(playhead, radius + 1.5, 1.5, PASSED_END);
        canvas.fill_circle(playhead, radius, Rgba::WHITE);
    }

    /// Seek position for a click `x` pixels into a bar `width` wide.
    ///
    /// Needs no samples, so scrubbing works before playback starts.
    pub fn seek_target(x: f32, width: f32, duration: f64) -> f64 {
        if !(width > 0.0) || !(duration > 0.0) || !x.is_finite() {
            return 0.0;
        }
        let fraction = (x / width).clamp(0.0, 1.0) as f64;
        (fraction * duration).clamp(0.0, duration)
    }
}

impl Default for WaveformProgress {
    fn default() -> Self {
        Self::new(DEFAULT_SLOTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::track;
    use crate::visual::canvas::ShapeCanvas;
    use egui::{Color32, Pos2, Shape};
    use std::sync::Arc;
    use std::time::Duration;

    fn playing(ids: &[&str], index: usize, elapsed: f64, duration: f64) -> PlaybackState {
        PlaybackState {
            tracks: Arc::new(ids.iter().map(|id| track(id, Some("x.wav"))).collect()),
            current_index: index,
            is_playing: true,
            elapsed: Duration::from_secs_f64(elapsed),
            duration: Some(Duration::from_secs_f64(duration)),
            ..PlaybackState::default()
        }
    }

    #[test]
    fn slot_index_is_proportional_and_clamped() {
        let waveform = WaveformProgress::new(100);
        assert_eq!(waveform.slot_for(0.0, 200.0), Some(0));
        assert_eq!(waveform.slot_for(1.99, 200.0), Some(0));
        assert_eq!(waveform.slot_for(2.0, 200.0), Some(1));
        assert_eq!(waveform.slot_for(137.0, 200.0), Some(68));
        assert_eq!(waveform.slot_for(199.9, 200.0), Some(99));
        assert_eq!(waveform.slot_for(200.0, 200.0), Some(99));
        assert_eq!(waveform.slot_for(10.0, 0.0), None);
    }

    #[test]
    fn full_playback_writes_every_slot() {
        let mut waveform = WaveformProgress::new(100);
        let duration = 61.0;
        let mut elapsed = 0.0;
        while elapsed < duration {
            waveform.record(elapsed, duration, 0.4);
            elapsed += 0.37;
        }
        waveform.record(duration, duration, 0.4);

        assert_eq!(waveform.written(), 100);
    }

    #[test]
    fn skipped_slots_are_backfilled_low() {
        let mut waveform = WaveformProgress::new(100);
        assert_eq!(waveform.record(50.0, 100.0, 0.8), Some(50));

        let samples = waveform.samples();
        assert!(samples[..50].iter().all(|s| *s == Some(LOW_SAMPLE)));
        assert_eq!(samples[50], Some(0.8));
        assert!(samples[51..].iter().all(Option::is_none));
    }

    #[test]
    fn slots_only_grow() {
        let mut waveform = WaveformProgress::new(10);
        waveform.record(1.0, 10.0, 0.6);
        waveform.record(1.5, 10.0, 0.3);
        assert_eq!(waveform.samples()[1], Some(0.6));
        waveform.record(1.9, 10.0, 0.9);
        assert_eq!(waveform.samples()[1], Some(0.9));
    }

    #[test]
    fn track_change_and_restart_clear_samples() {
        let bins = [128u8; BIN_COUNT];
        let mut waveform = WaveformProgress::new(20);

        waveform.update(&playing(&["a", "b"], 0, 30.0, 60.0), &bins);
        assert!(waveform.written() > 0);

        waveform.update(&playing(&["a", "b"], 1, 0.0, 60.0), &bins);
        assert_eq!(waveform.written(), 1);

        waveform.update(&playing(&["a", "b"], 1, 12.0, 60.0), &bins);
        waveform.update(&playing(&["a", "b"], 1, 0.0, 60.0), &bins);
        assert_eq!(waveform.written(), 1);
    }

    #[test]
    fn paused_frames_do_not_record() {
        let mut waveform = WaveformProgress::new(20);
        let mut state = playing(&["a"], 0, 30.0, 60.0);
        state.is_playing = false;
        waveform.update(&state, &[255u8; BIN_COUNT]);
        assert_eq!(waveform.written(), 0);
    }

    #[test]
    fn click_maps_to_clamped_seek() {
        assert_eq!(WaveformProgress::seek_target(50.0, 200.0, 120.0), 30.0);
        assert_eq!(WaveformProgress::seek_target(-10.0, 200.0, 120.0), 0.0);
        assert_eq!(WaveformProgress::seek_target(500.0, 200.0, 120.0), 120.0);
        assert_eq!(WaveformProgress::seek_target(50.0, 0.0, 120.0), 0.0);
        assert_eq!(WaveformProgress::seek_target(50.0, 200.0, 0.0), 0.0);
    }

    fn slot_fill(canvas: &ShapeCanvas, slot: usize) -> Color32 {
        // Background quad comes first, then one rect per slot.
        match &canvas.shapes()[1 + slot] {
            Shape::Rect(rect) => rect.fill,
            other => panic!("slot {slot} is not a rect: {other:?}"),
        }
    }

    fn playhead(canvas: &ShapeCanvas) -> (Pos2, Color32) {
        match canvas.shapes().last() {
            Some(Shape::Circle(circle)) => (circle.center, circle.fill),
            other => panic!("no playhead: {other:?}"),
        }
    }

    #[test]
    fn render_colors_passed_slots_and_places_playhead() {
        let mut waveform = WaveformProgress::new(100);
        waveform.record(30.0, 120.0, 0.5);

        let mut canvas = ShapeCanvas::sized(200.0, 20.0);
        waveform.render(&mut canvas, 30.0, 120.0);

        assert_eq!(canvas.shapes().len(), 1 + 100 + 2);
        assert_ne!(slot_fill(&canvas, 10), Color32::from(FUTURE));
        assert_eq!(slot_fill(&canvas, 90), Color32::from(FUTURE));
        assert_eq!(playhead(&canvas), (Pos2::new(50.0, 10.0), Color32::WHITE));
    }

    #[test]
    fn render_before_any_samples() {
        let waveform = WaveformProgress::default();
        let mut canvas = ShapeCanvas::sized(100.0, 10.0);
        waveform.render(&mut canvas, 0.0, 0.0);

        assert!((0..DEFAULT_SLOTS).all(|slot| slot_fill(&canvas, slot) == Color32::from(FUTURE)));
        assert_eq!(playhead(&canvas), (Pos2::new(0.0, 5.0), Color32::WHITE));
    }

    #[test]
    fn render_skips_an_empty_area() {
        let waveform = WaveformProgress::default();
        let mut canvas = ShapeCanvas::sized(0.0, 24.0);
        waveform.render(&mut canvas, 1.0, 10.0);
        assert!(canvas.shapes().is_empty());
    }
}

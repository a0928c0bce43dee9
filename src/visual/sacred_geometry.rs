use glam::Vec2;
use std::f32::consts::{PI, TAU};

use super::ambient::SpectrumSource;
use super::canvas::{Canvas, Rgba};
use super::motif::{Motif, Palette};
use crate::audio::{AnalyzerHandle, TransientDetector, FLASH_EPSILON};
use crate::player::PlaybackState;

/// Radial bars drawn around the motif.
pub const RADIAL_BARS: usize = 64;

const BASS_BINS: std::ops::Range<usize> = 0..20;
const MID_BINS: std::ops::Range<usize> = 20..80;
const HIGH_BINS: std::ops::Range<usize> = 80..180;
/// Band watched by the transient detector.
const TRANSIENT_BINS: std::ops::Range<usize> = 60..180;

const BAND_SMOOTHING: f32 = 0.7;
const BASE_ROTATION_STEP: f32 = 0.002;
const BASS_ROTATION_STEP: f32 = 0.01;
const FRAME_SECONDS: f32 = 1.0 / 60.0;

/// Normalized (0.0..=1.0) band averages of one spectrum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandLevels {
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
}

impl BandLevels {
    pub fn from_bins(bins: &[u8]) -> Self {
        Self {
            bass: band_average(bins, BASS_BINS),
            mid: band_average(bins, MID_BINS),
            high: band_average(bins, HIGH_BINS),
        }
    }
}

/// Mean of `bins[range]` scaled to 0.0..=1.0; bins past the end count as 0.
pub fn band_average(bins: &[u8], range: std::ops::Range<usize>) -> f32 {
    let len = range.len();
    if len == 0 {
        return 0.0;
    }
    let sum: u32 = range.map(|i| bins.get(i).copied().unwrap_or(0) as u32).sum();
    sum as f32 / len as f32 / 255.0
}

/// What one frame did, for meters and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub levels: BandLevels,
    pub transient: bool,
    pub flash: f32,
    pub rotation: f32,
    pub ambient: bool,
}

/// Audio-reactive sacred-geometry scene.
///
/// Each frame washes the previous one toward black, draws the motif for the
/// current track modulated by the band levels, rings it with radial bars and
/// overlays a rotating triangle while a transient flash is decaying.
#[derive(Debug, Clone)]
pub struct SacredGeometryRenderer {
    trail_fade: f32,
    levels: BandLevels,
    rotation: f32,
    time: f32,
    transient: TransientDetector,
    spectrum: SpectrumSource,
}

impl SacredGeometryRenderer {
    pub fn new(trail_fade: f32) -> Self {
        Self {
            trail_fade: trail_fade.clamp(0.01, 1.0),
            levels: BandLevels::default(),
            rotation: 0.0,
            time: 0.0,
            transient: TransientDetector::new(),
            spectrum: SpectrumSource::new(),
        }
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Pulls this frame's spectrum (live or ambient) and draws it.
    pub fn draw(&mut self, canvas: &mut dyn Canvas, state: &PlaybackState, analyzer: Option<&AnalyzerHandle>) -> FrameStats {
        let bins = *self.spectrum.sample(analyzer, state.is_playing, self.time);
        let ambient = self.spectrum.is_ambient();

        let mut stats = self.render_frame(canvas, &bins, state.current_index);
        stats.ambient = ambient;
        stats
    }

    /// Draws one frame from an explicit spectrum.
    pub fn render_frame(&mut self, canvas: &mut dyn Canvas, bins: &[u8], track_index: usize) -> FrameStats {
        canvas.fill(Rgba::BLACK.with_opacity(self.trail_fade));

        let raw = BandLevels::from_bins(bins);
        self.levels = BandLevels {
            bass: smooth(self.levels.bass, raw.bass),
            mid: smooth(self.levels.mid, raw.mid),
            high: smooth(self.levels.high, raw.high),
        };

        let transient = self.transient.update(band_average(bins, TRANSIENT_BINS));

        let motif = Motif::for_track(track_index);
        let palette = motif.palette();
        let center = canvas.center();
        let radius = canvas.min_side() * 0.28;

        if radius > 0.0 {
            match motif {
                Motif::Flower => self.draw_flower(canvas, center, radius, &palette),
                Motif::Cube => self.draw_cube(canvas, center, radius, &palette),
                Motif::Yantra => self.draw_yantra(canvas, center, radius, &palette),
            }
            self.draw_radial_bars(canvas, bins, center, radius, &palette);

            let flash = self.transient.flash();
            if flash >= FLASH_EPSILON {
                self.draw_flash(canvas, center, radius, palette.accent, flash);
            }
        }

        self.rotation += BASE_ROTATION_STEP + self.levels.bass * BASS_ROTATION_STEP;
        self.time += FRAME_SECONDS;

        FrameStats {
            levels: self.levels,
            transient,
            flash: self.transient.flash(),
            rotation: self.rotation,
            ambient: false,
        }
    }

    /// Bass swells the figure and makes it wobble.
    fn scale(&self) -> f32 {
        1.0 + self.levels.bass * 0.25 + (self.time * 3.0).sin() * self.levels.bass * 0.05
    }

    /// High band drives stroke opacity.
    fn pulse(&self) -> f32 {
        0.45 + self.levels.high * 0.55
    }

    fn draw_flower(&self, canvas: &mut dyn Canvas, center: Vec2, radius: f32, palette: &Palette) {
        let scale = self.scale();
        let pulse = self.pulse();
        let petal = radius * 0.5 * scale;

        for ring in 1..=3 {
            let r = radius * ring as f32 / 3.0 * scale;
            canvas.circle(center, r, 1.0, palette.primary.with_opacity(pulse * 0.6));
        }

        canvas.circle(center, petal, 1.5, palette.secondary.with_opacity(pulse));
        for k in 0..6 {
            let wobble = 1.0 + self.levels.bass * 0.15 * (self.time * 4.0 + k as f32).sin();
            let at = center + polar(petal * wobble, self.rotation + k as f32 * TAU / 6.0);
            canvas.circle(at, petal, 1.5, palette.secondary.with_opacity(pulse));
        }
        for k in 0..12 {
            let at = center + polar(petal * 1.732 * scale, -self.rotation + (k as f32 + 0.5) * TAU / 12.0);
            canvas.circle(at, petal * 0.5, 1.0, palette.primary.with_opacity(pulse * 0.5));
        }
    }

    fn draw_cube(&self, canvas: &mut dyn Canvas, center: Vec2, radius: f32, palette: &Palette) {
        let scale = self.scale();
        let pulse = self.pulse();

        let mut nodes = Vec::with_capacity(13);
        nodes.push(center);
        for ring in [0.5, 1.0] {
            for k in 0..6 {
                let wobble = 1.0 + self.levels.bass * 0.1 * (self.time * 5.0 + k as f32 * ring).sin();
                nodes.push(center + polar(radius * ring * scale * wobble, self.rotation + k as f32 * TAU / 6.0));
            }
        }

        let edge = palette.primary.with_opacity(pulse * 0.35);
        for (i, &a) in nodes.iter().enumerate() {
            for &b in &nodes[i + 1..] {
                canvas.line(a, b, 1.0, edge);
            }
        }

        let node_radius = 3.0 + self.levels.bass * 4.0;
        for &node in &nodes {
            canvas.circle(node, radius * 0.12 * scale, 1.0, palette.secondary.with_opacity(pulse * 0.7));
            canvas.fill_circle(node, node_radius, palette.secondary.with_opacity(pulse));
        }
    }

    fn draw_yantra(&self, canvas: &mut dyn Canvas, center: Vec2, radius: f32, palette: &Palette) {
        let scale = self.scale();
        let pulse = self.pulse();

        for level in 0..4 {
            let size = radius * (1.0 - level as f32 * 0.2) * scale;
            let upward = level % 2 == 0;
            let offset = if upward { -PI / 2.0 } else { PI / 2.0 };
            let turn = if upward { self.rotation } else { -self.rotation };
            let color = if upward { palette.primary } else { palette.secondary };
            canvas.polygon(&triangle(center, size, offset + turn), 1.5, color.with_opacity(pulse));
        }

        canvas.fill_circle(center, 2.0 + self.levels.high * 6.0, palette.accent.with_opacity(pulse));

        let petals = 16;
        let inner = radius * 1.02 * scale;
        let outer = inner + radius * (0.14 + self.levels.mid * 0.1);
        for k in 0..petals {
            let angle = self.rotation * 0.5 + k as f32 * TAU / petals as f32;
            let half = TAU / petals as f32 * 0.35;
            let shape = [
                center + polar(inner, angle - half),
                center + polar((inner + outer) * 0.5, angle - half * 0.6),
                center + polar(outer, angle),
                center + polar((inner + outer) * 0.5, angle + half * 0.6),
                center + polar(inner, angle + half),
            ];
            let color = if k % 2 == 0 { palette.primary } else { palette.secondary };
            canvas.polygon(&shape, 1.0, color.with_opacity(pulse * 0.8));
        }
        canvas.circle(center, outer + 4.0, 1.0, palette.primary.with_opacity(pulse * 0.5));
    }

    fn draw_radial_bars(&self, canvas: &mut dyn Canvas, bins: &[u8], center: Vec2, radius: f32, palette: &Palette) {
        if bins.is_empty() {
            return;
        }
        let inner = radius * 1.35;
        let reach = radius * 0.6;

        for i in 0..RADIAL_BARS {
            let bin = bins[i * bins.len() / RADIAL_BARS];
            let length = bin as f32 / 255.0 * reach;
            if length < 0.5 {
                continue;
            }
            let angle = self.rotation + i as f32 * TAU / RADIAL_BARS as f32;
            let direction = polar(1.0, angle);
            let color = if i % 2 == 0 { palette.primary } else { palette.secondary };
            canvas.line(center + direction * inner, center + direction * (inner + length), 2.0, color);
        }
    }

    fn draw_flash(&self, canvas: &mut dyn Canvas, center: Vec2, radius: f32, color: Rgba, flash: f32) {
        let glyph = triangle(center, radius * 1.25, -PI / 2.0 - self.rotation * 2.0);
        canvas.polygon(&glyph, 3.0, color.with_opacity(flash));
    }
}

impl Default for SacredGeometryRenderer {
    fn default() -> Self {
        Self::new(0.15)
    }
}

fn smooth(previous: f32, current: f32) -> f32 {
    previous * BAND_SMOOTHING + current * (1.0 - BAND_SMOOTHING)
}

fn polar(radius: f32, angle: f32) -> Vec2 {
    Vec2::new(angle.cos(), angle.sin()) * radius
}

fn triangle(center: Vec2, radius: f32, start: f32) -> [Vec2; 3] {
    [0, 1, 2].map(|k| center + polar(radius, start + k as f32 * TAU / 3.0))
}

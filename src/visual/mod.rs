//! Per-frame renderers and the loops that drive them.
//!
//! Renderers draw through the [`Canvas`] seam and only read playback state
//! and the analyzer handle; they never touch the audio output.

pub mod ambient;
pub mod canvas;
pub mod motif;
pub mod render_loop;
pub mod sacred_geometry;
pub mod waveform;

pub use ambient::{ambient_bins, SpectrumSource};
pub use canvas::{Canvas, Rgba, ShapeCanvas};
pub use motif::{Motif, Palette};
pub use render_loop::RenderLoop;
pub use sacred_geometry::{band_average, BandLevels, FrameStats, SacredGeometryRenderer, RADIAL_BARS};
pub use waveform::{mean_level, WaveformProgress, DEFAULT_SLOTS, LOW_SAMPLE};

//! Sacred Player: a single-session music player with a reactive
//! sacred-geometry visualizer.
//!
//! The [`player::PlaybackEngine`] owns the one audio output and its analysis
//! tap. Front-ends observe it through events and a shared state cell, and
//! drive it through [`player::PlayerHandle`]. Renderers in [`visual`] are
//! plain per-frame functions of frequency data and playback state.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod error;
pub mod graphics;
pub mod player;
pub mod ui;
pub mod visual;

pub use audio::{AnalyzerHandle, FrequencyAnalyzer, BIN_COUNT, FFT_SIZE};
pub use catalog::{CatalogGateway, Track};
pub use config::PlayerConfig;
pub use error::PlayerError;
pub use player::{
    CommandOutcome, PlaybackEngine, PlaybackEvent, PlaybackState, PlayerHandle, PlayerStatus, StateCell, TransportCommand,
};
pub use visual::{Motif, SacredGeometryRenderer, WaveformProgress};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio::MediaResolver;
use crate::catalog::{CatalogGateway, HttpCatalog, JsonFileCatalog};

/// Where the track list comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogSource {
    File {
        path: PathBuf,
    },
    Http {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

impl Default for CatalogSource {
    fn default() -> Self {
        CatalogSource::File {
            path: PathBuf::from("catalog.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            title: "Sacred Player".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub catalog: CatalogSource,
    pub initial_volume: f32,
    /// Redraws per second for render loops.
    pub frame_rate: u32,
    pub waveform_slots: usize,
    /// Alpha of the black wash laid over each frame; lower leaves longer trails.
    pub trail_fade: f32,
    pub output_device: Option<String>,
    pub media_cache_dir: Option<PathBuf>,
    pub artwork_url: Option<String>,
    pub window: WindowConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogSource::default(),
            initial_volume: 0.8,
            frame_rate: 60,
            waveform_slots: 100,
            trail_fade: 0.15,
            output_device: None,
            media_cache_dir: None,
            artwork_url: None,
            window: WindowConfig::default(),
        }
    }
}

/// Command-line flags shared by the player front-ends.
#[derive(Debug, Clone, Default, Parser)]
pub struct PlayerArgs {
    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Catalog JSON file (overrides the configured catalog)
    #[arg(long, conflicts_with = "catalog_url")]
    pub catalog: Option<PathBuf>,

    /// Catalog endpoint returning a JSON array of tracks
    #[arg(long)]
    pub catalog_url: Option<String>,

    /// API key sent with catalog requests
    #[arg(long)]
    pub api_key: Option<String>,

    /// Initial volume, 0.0 to 1.0
    #[arg(long)]
    pub volume: Option<f32>,

    /// Output device name
    #[arg(long)]
    pub device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: PlayerConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Config file (if any) with command-line overrides applied.
    pub fn from_args(args: &PlayerArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(path) = &args.catalog {
            config.catalog = CatalogSource::File { path: path.clone() };
        }
        if let Some(url) = &args.catalog_url {
            config.catalog = CatalogSource::Http {
                url: url.clone(),
                api_key: args.api_key.clone(),
            };
        } else if let (Some(key), CatalogSource::Http { api_key, .. }) = (&args.api_key, &mut config.catalog) {
            *api_key = Some(key.clone());
        }
        if let Some(volume) = args.volume {
            config.initial_volume = volume;
        }
        if let Some(device) = &args.device {
            config.output_device = Some(device.clone());
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 {
            return Err(anyhow!("frame_rate must be at least 1"));
        }
        if self.waveform_slots == 0 {
            return Err(anyhow!("waveform_slots must be at least 1"));
        }
        if !self.initial_volume.is_finite() {
            return Err(anyhow!("initial_volume must be a number"));
        }
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.initial_volume.clamp(0.0, 1.0)
    }

    pub fn trail_fade(&self) -> f32 {
        self.trail_fade.clamp(0.01, 1.0)
    }

    pub fn catalog_gateway(&self) -> Arc<dyn CatalogGateway> {
        match &self.catalog {
            CatalogSource::File { path } => Arc::new(JsonFileCatalog::new(path.clone())),
            CatalogSource::Http { url, api_key } => Arc::new(HttpCatalog::new(url.clone(), api_key.clone())),
        }
    }

    pub fn media_resolver(&self) -> MediaResolver {
        MediaResolver::new(
            self.media_cache_dir
                .clone()
                .unwrap_or_else(MediaResolver::default_cache_dir),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_file_fills_defaults() {
        let config: PlayerConfig = serde_json::from_str(
            r#"{ "catalog": { "kind": "http", "url": "https://db.example/tracks" }, "frame_rate": 30 }"#,
        )
        .unwrap();

        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.waveform_slots, 100);
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(
            config.catalog,
            CatalogSource::Http {
                url: "https://db.example/tracks".to_string(),
                api_key: None
            }
        );
    }

    #[test]
    fn flags_override_the_file() {
        let dir = std::env::temp_dir().join(format!("sacred-player-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("player.json");
        std::fs::write(&path, r#"{ "initial_volume": 0.2, "output_device": "Speakers" }"#).unwrap();

        let args = PlayerArgs::parse_from([
            "sacred-player",
            "--config",
            path.to_str().unwrap(),
            "--catalog-url",
            "https://db.example/tracks",
            "--api-key",
            "anon",
            "--volume",
            "0.6",
        ]);
        let config = PlayerConfig::from_args(&args).unwrap();

        assert_eq!(config.initial_volume, 0.6);
        assert_eq!(config.output_device.as_deref(), Some("Speakers"));
        assert_eq!(
            config.catalog,
            CatalogSource::Http {
                url: "https://db.example/tracks".to_string(),
                api_key: Some("anon".to_string())
            }
        );
    }

    #[test]
    fn volume_is_clamped_when_applied() {
        let config = PlayerConfig {
            initial_volume: 3.0,
            ..PlayerConfig::default()
        };
        assert_eq!(config.volume(), 1.0);
    }

    #[test]
    fn zero_frame_rate_is_rejected() {
        let args = PlayerArgs::default();
        assert!(PlayerConfig::from_args(&args).is_ok());

        let config = PlayerConfig {
            frame_rate: 0,
            ..PlayerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(PlayerConfig::load(Path::new("/definitely/not/here.json")).is_err());
    }
}

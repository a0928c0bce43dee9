pub mod file;
pub mod http;

pub use file::JsonFileCatalog;
pub use http::HttpCatalog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlayerError;

/// One catalog row as served by the backend.
///
/// A row without a `file_url` is a slot placeholder reserved for a future
/// upload. It is never selectable for playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Free-text label such as "528Hz".
    #[serde(default)]
    pub frequency: Option<String>,
    /// Display string only. The decoded media reports the real duration.
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Track {
    pub fn media_url(&self) -> Option<&str> {
        self.file_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn is_playable(&self) -> bool {
        self.media_url().is_some()
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.id
        } else {
            &self.title
        }
    }
}

/// Keeps only playable rows, preserving catalog order.
pub fn playable_tracks(slots: Vec<Track>) -> Vec<Track> {
    slots.into_iter().filter(Track::is_playable).collect()
}

/// Read side of the hosted track catalog.
///
/// Implementations return the full ordered slot list; the engine filters it.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn list(&self) -> Result<Vec<Track>, PlayerError>;

    /// Human readable origin, used in log lines.
    fn describe(&self) -> String;
}

/// In-memory catalog, handy for tests and for embedding a fixed playlist.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tracks: Vec<Track>,
}

impl StaticCatalog {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }
}

#[async_trait]
impl CatalogGateway for StaticCatalog {
    async fn list(&self) -> Result<Vec<Track>, PlayerError> {
        Ok(self.tracks.clone())
    }

    fn describe(&self) -> String {
        format!("static catalog ({} rows)", self.tracks.len())
    }
}

#[cfg(test)]
pub(crate) fn track(id: &str, file_url: Option<&str>) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {id}"),
        frequency: Some("528Hz".to_string()),
        duration: Some("3:00".to_string()),
        file_url: file_url.map(str::to_string),
        description: None,
    }
}

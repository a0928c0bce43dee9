use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};

use super::{CatalogGateway, Track};
use crate::error::PlayerError;

/// Catalog stored as a JSON array of track rows on disk.
///
/// Relative `file_url` entries are resolved against the catalog's directory
/// so a catalog folder can be moved around as a unit.
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.contains("://") || Path::new(url).is_absolute() {
            return url.to_string();
        }

        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(url).to_string_lossy().into_owned(),
            _ => url.to_string(),
        }
    }
}

#[async_trait]
impl CatalogGateway for JsonFileCatalog {
    async fn list(&self) -> Result<Vec<Track>, PlayerError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PlayerError::Catalog(format!("{}: {}", self.path.display(), e)))?;

        let mut rows: Vec<Track> = serde_json::from_str(&text)
            .map_err(|e| PlayerError::Catalog(format!("{}: {}", self.path.display(), e)))?;

        for row in &mut rows {
            if let Some(url) = row.media_url() {
                let resolved = self.resolve_url(url);
                row.file_url = Some(resolved);
            }
        }

        debug!("Read {} catalog rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

use async_trait::async_trait;
use log::debug;

use super::{CatalogGateway, Track};
use crate::error::PlayerError;

/// Catalog served as a JSON array by a REST endpoint.
///
/// Hosted database REST layers expect the key twice: once as `apikey` and
/// once as a bearer token, so both headers are sent when a key is set.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    url: String,
    api_key: Option<String>,
}

impl HttpCatalog {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }

    fn fetch_blocking(url: &str, api_key: Option<&str>) -> Result<Vec<Track>, PlayerError> {
        let mut request = ureq::get(url).set("Accept", "application/json");
        if let Some(key) = api_key {
            request = request
                .set("apikey", key)
                .set("Authorization", &format!("Bearer {key}"));
        }

        let body = request
            .call()
            .map_err(|e| PlayerError::Catalog(format!("{url}: {e}")))?
            .into_string()
            .map_err(|e| PlayerError::Catalog(format!("{url}: {e}")))?;

        parse_rows(url, &body)
    }
}

fn parse_rows(origin: &str, body: &str) -> Result<Vec<Track>, PlayerError> {
    serde_json::from_str(body).map_err(|e| PlayerError::Catalog(format!("{origin}: {e}")))
}

#[async_trait]
impl CatalogGateway for HttpCatalog {
    async fn list(&self) -> Result<Vec<Track>, PlayerError> {
        let url = self.url.clone();
        let api_key = self.api_key.clone();

        let rows = tokio::task::spawn_blocking(move || Self::fetch_blocking(&url, api_key.as_deref()))
            .await
            .map_err(|e| PlayerError::Catalog(format!("catalog request aborted: {e}")))??;

        debug!("Fetched {} catalog rows from {}", rows.len(), self.url);
        Ok(rows)
    }

    fn describe(&self) -> String {
        format!("endpoint {}", self.url)
    }
}

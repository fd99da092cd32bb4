//! HTTP fetcher
//!
//! Downloads the media URL into a `.part` file and renames it into place,
//! so a half-written download never looks resident. When sidecars are
//! enabled it also tries `<name>.lrc` and `<name>.jpg` next to the media URL;
//! missing sidecars are not an error.

use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{FetchError, FetchedMedia, RemoteFetcher};
use crate::cache::PARTIAL_EXTENSION;
use crate::model::RemoteRef;

/// Fetches remote references that are plain HTTP(S) URLs.
pub struct HttpFetcher {
    http_client: reqwest::Client,
    fetch_sidecars: bool,
}

impl HttpFetcher {
    /// Create a new fetcher with a per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tunequeue/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            fetch_sidecars: true,
        }
    }

    /// Enable or disable the caption/thumbnail lookups.
    pub fn with_sidecars(mut self, enabled: bool) -> Self {
        self.fetch_sidecars = enabled;
        self
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }

        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?
            .to_vec())
    }

    /// Best-effort sidecar download. Any failure just means "no sidecar".
    async fn download_sidecar(&self, url: &Url, dest: &Path, extension: &str) -> Option<PathBuf> {
        let sidecar_url = sibling_url(url, extension)?;
        match self.download(&sidecar_url).await {
            Ok(bytes) => {
                let path = dest.with_extension(extension);
                match tokio::fs::write(&path, &bytes).await {
                    Ok(()) => Some(path),
                    Err(e) => {
                        tracing::warn!(target: "tunequeue::fetch", path = ?path, error = %e, "Failed to store sidecar");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::debug!(target: "tunequeue::fetch", url = %sidecar_url, "No sidecar: {}", e);
                None
            }
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(180))
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, remote_ref: &RemoteRef, dest: &Path) -> Result<FetchedMedia, FetchError> {
        let url = Url::parse(remote_ref.as_str())
            .map_err(|e| FetchError::InvalidReference(format!("{}: {}", remote_ref, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidReference(remote_ref.to_string()));
        }

        let bytes = self.download(&url).await?;
        store(&bytes, dest).await?;

        tracing::info!(target: "tunequeue::fetch", url = %url, bytes = bytes.len(), "Downloaded track");

        if !self.fetch_sidecars {
            return Ok(FetchedMedia::default());
        }

        Ok(FetchedMedia {
            caption_path: self.download_sidecar(&url, dest, "lrc").await,
            cover_path: self.download_sidecar(&url, dest, "jpg").await,
        })
    }
}

/// Write `bytes` to `dest` through a `.part` file. On failure neither file
/// is left behind.
async fn store(bytes: &[u8], dest: &Path) -> Result<(), FetchError> {
    let partial = dest.with_extension(PARTIAL_EXTENSION);
    let result = match tokio::fs::write(&partial, bytes).await {
        Ok(()) => tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| FetchError::Write(dest.to_path_buf(), e.to_string())),
        Err(e) => Err(FetchError::Write(partial.clone(), e.to_string())),
    };
    if result.is_err() && tokio::fs::remove_file(&partial).await.is_ok() {
        tracing::debug!(target: "tunequeue::fetch", path = ?partial, "Removed partial download");
    }
    result
}

/// Same URL with the file extension of the last path segment replaced.
fn sibling_url(url: &Url, extension: &str) -> Option<Url> {
    let path = url.path();
    let file_start = path.rfind('/')? + 1;
    let file = &path[file_start..];
    let stem = match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    };
    if stem.is_empty() {
        return None;
    }

    let mut sibling = url.clone();
    sibling.set_path(&format!("{}{}.{}", &path[..file_start], stem, extension));
    sibling.set_query(None);
    Some(sibling)
}

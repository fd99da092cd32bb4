//! Remote fetching of tracks into the cache.
//!
//! [`RemoteFetcher`] is the seam the queue's worker pool calls through.
//! [`HttpFetcher`] treats a [`RemoteRef`] as a URL and downloads it;
//! tests substitute the mocks in [`mocks`].

mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::model::RemoteRef;

/// What a successful fetch left on disk besides the media file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedMedia {
    /// Caption sidecar, if the source had one
    pub caption_path: Option<PathBuf>,
    /// Thumbnail sidecar, if the source had one
    pub cover_path: Option<PathBuf>,
}

/// Errors that can occur while fetching
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid remote reference: {0}")]
    InvalidReference(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Remote track not found: {0}")]
    NotFound(String),

    #[error("Failed to write {0}: {1}")]
    Write(PathBuf, String),
}

/// Retrieves a remote-origin track's media into local storage.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch `remote_ref` into `dest`. Must leave no file at `dest` on failure.
    async fn fetch(&self, remote_ref: &RemoteRef, dest: &Path) -> Result<FetchedMedia, FetchError>;
}

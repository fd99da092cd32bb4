//! Test utilities and fixtures for tunequeue tests.
//!
//! This module provides common track factories, a fixed-output metadata
//! extractor and polling helpers to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use tunequeue::test_utils::{local_track, wait_until};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let track = local_track("song");
//!     assert!(wait_until(|| true).await);
//! }
//! ```

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use crate::metadata::MetadataExtractor;
use crate::model::{CaptionLine, RemoteRef, Track, TrackMetadata};

/// Extractor that returns the same metadata for every path.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    pub metadata: TrackMetadata,
}

impl MetadataExtractor for StaticExtractor {
    fn extract(&self, _path: &Path) -> TrackMetadata {
        self.metadata.clone()
    }
}

/// Creates a local track at a non-existent path with no metadata.
///
/// Its title is `name`, taken from the file stem.
pub fn local_track(name: &str) -> Track {
    Track::local_with_metadata(format!("/music/{}.mp3", name), TrackMetadata::default())
}

/// Creates a local track with the given title, artist and duration.
pub fn tagged_track(title: &str, artist: &str, duration: Duration) -> Track {
    Track::local_with_metadata(
        format!("/music/{}.mp3", title),
        TrackMetadata {
            title: Some(title.to_string()),
            artist: Some(artist.to_string()),
            duration: Some(duration),
            ..TrackMetadata::default()
        },
    )
}

/// Creates a local track carrying the given `(seconds, text)` captions.
pub fn captioned_track(title: &str, lines: &[(u64, &str)]) -> Track {
    Track::local_with_metadata(
        format!("/music/{}.mp3", title),
        TrackMetadata {
            title: Some(title.to_string()),
            captions: lines
                .iter()
                .map(|(secs, text)| CaptionLine {
                    offset: Duration::from_secs(*secs),
                    text: text.to_string(),
                })
                .collect(),
            ..TrackMetadata::default()
        },
    )
}

/// Creates a remote track whose destination lives in `cache_dir`, named by
/// the cache stem of `name` so eviction bookkeeping applies to it.
pub fn remote_track(cache_dir: &TempDir, name: &str) -> Track {
    let remote_ref = RemoteRef::new(name);
    let dest = cache_dir
        .path()
        .join(format!("{}.mp3", remote_ref.cache_stem()));
    Track::remote(remote_ref, Some(name.to_string()), None, dest)
}

/// Polls `condition` every 10ms for up to five seconds.
///
/// Returns whether the condition became true.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

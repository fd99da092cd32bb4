//! Best-effort metadata and caption extraction.
//!
//! Uses the lofty crate for format-independent tag access (MP3, FLAC, OGG,
//! M4A, WAV) and reads caption/cover sidecars from disk.
//!
//! Extraction never fails: a file without readable tags degrades to its file
//! name, a broken caption file degrades to no captions. Problems are logged
//! as warnings.

pub mod lrc;
pub mod sidecar;

use anyhow::{Context, Result};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{MimeType, PictureType};
use lofty::probe::Probe;
use lofty::tag::Accessor;
use std::path::Path;
use std::time::Duration;

use crate::fetch::FetchedMedia;
use crate::model::{CoverImage, TrackMetadata};

/// Reads display metadata for a media file.
///
/// Implementations must never fail; they return whatever they could read.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> TrackMetadata;

    /// Extract a freshly fetched file. Sidecars the fetch reported win over
    /// whatever sits next to the file.
    fn extract_fetched(&self, path: &Path, fetched: &FetchedMedia) -> TrackMetadata {
        let mut metadata = self.extract(path);
        if let Some(caption_path) = &fetched.caption_path {
            let captions = sidecar::read_captions(caption_path);
            if !captions.is_empty() {
                metadata.captions = captions;
            }
        }
        if metadata.cover.is_none() {
            metadata.cover = fetched.cover_path.as_deref().and_then(sidecar::read_cover);
        }
        metadata
    }
}

/// Production extractor: embedded tags via lofty plus sidecar files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagExtractor;

impl MetadataExtractor for TagExtractor {
    fn extract(&self, path: &Path) -> TrackMetadata {
        let mut metadata = match read_tags(path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(target: "tunequeue::metadata", path = ?path, "Tags unavailable: {:#}", e);
                TrackMetadata::default()
            }
        };

        if metadata.cover.is_none() {
            metadata.cover = sidecar::find_cover(path);
        }
        metadata.captions = sidecar::load_captions(path);
        metadata
    }
}

/// Read embedded tags and the front cover.
pub fn read_tags(path: &Path) -> Result<TrackMetadata> {
    let tagged_file = Probe::open(path)
        .context("Failed to open file for probing")?
        .read()
        .context("Failed to read file metadata")?;

    let duration = tagged_file.properties().duration();

    // Get the primary tag, or fall back to the first available tag
    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        return Ok(TrackMetadata {
            duration: non_zero(duration),
            ..TrackMetadata::default()
        });
    };

    let title = tag.title().map(|s| s.to_string()).filter(|s| !s.is_empty());
    // ID3v2.4 separates multiple artists with NUL
    let artist = tag
        .artist()
        .map(|s| s.replace('\0', ", "))
        .filter(|s| !s.is_empty());
    let album = tag.album().map(|s| s.to_string()).filter(|s| !s.is_empty());

    // Prefer front cover, fall back to first picture
    let pictures = tag.pictures();
    let cover = pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())
        .map(|picture| CoverImage {
            data: picture.data().to_vec(),
            mime_type: match picture.mime_type() {
                Some(MimeType::Png) => "image/png",
                Some(MimeType::Gif) => "image/gif",
                _ => "image/jpeg",
            }
            .to_string(),
        });

    Ok(TrackMetadata {
        title,
        artist,
        album,
        duration: non_zero(duration),
        cover,
        captions: Vec::new(),
    })
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

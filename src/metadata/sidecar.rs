//! Sidecar files that live next to an audio file.
//!
//! Captions come from `<stem>.lrc`. Cover art comes from `<stem>.jpg` (what
//! remote fetches leave behind as a thumbnail), falling back to common
//! folder-level names:
//! - cover.jpg, cover.png
//! - folder.jpg, folder.png
//! - front.jpg, front.png

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::model::{CaptionLine, CoverImage};

use super::lrc;

/// Common folder-level cover art filenames (lowercase for matching)
const COVER_FILENAMES: &[&str] = &["cover", "folder", "album", "front", "artwork"];

/// Supported image extensions
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Caption sidecar extension
pub const CAPTION_EXTENSION: &str = "lrc";

/// Path of the caption sidecar for an audio file.
pub fn caption_path(audio_path: &Path) -> PathBuf {
    audio_path.with_extension(CAPTION_EXTENSION)
}

/// Load the caption sidecar.
///
/// A missing file means "no captions" and is silent. Unreadable or non-UTF-8
/// files are logged and degrade to no captions.
pub fn load_captions(audio_path: &Path) -> Vec<CaptionLine> {
    read_captions(&caption_path(audio_path))
}

/// Parse the LRC file at `path`, degrading to no captions like
/// [`load_captions`].
pub fn read_captions(path: &Path) -> Vec<CaptionLine> {
    match std::fs::read_to_string(path) {
        Ok(contents) => lrc::parse(&contents),
        Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            tracing::warn!(target: "tunequeue::metadata", path = ?path, "Captions are not UTF-8, ignoring");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(target: "tunequeue::metadata", path = ?path, error = %e, "Failed to read captions");
            Vec::new()
        }
    }
}

/// Find a cover image for an audio file on disk.
pub fn find_cover(audio_path: &Path) -> Option<CoverImage> {
    for ext in IMAGE_EXTENSIONS {
        let candidate = audio_path.with_extension(ext);
        if candidate.is_file() {
            return read_cover(&candidate);
        }
    }

    let parent = audio_path.parent()?;
    let entries = std::fs::read_dir(parent).ok()?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());

        if let (Some(stem), Some(ext)) = (stem, ext)
            && COVER_FILENAMES.contains(&stem.as_str())
            && IMAGE_EXTENSIONS.contains(&ext.as_str())
        {
            return read_cover(&path);
        }
    }

    None
}

/// Load an image file as cover art. The MIME type follows the extension.
pub fn read_cover(path: &Path) -> Option<CoverImage> {
    let data = std::fs::read(path).ok()?;
    let mime_type = match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };
    Some(CoverImage {
        data,
        mime_type: mime_type.to_string(),
    })
}

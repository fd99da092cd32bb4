//! Core data models for queued playback.
//!
//! Defines the primary entities: [`Track`] and its [`Availability`] state,
//! plus the metadata carried alongside it ([`TrackMetadata`],
//! [`CaptionLine`], [`CoverImage`]).
//!
//! # Availability
//!
//! ```text
//!   Local ───────────────────────────────── (terminal)
//!   NotAvailable ──► Downloading ──► Available (terminal)
//!                                └─► NotFound  (terminal)
//! ```

mod slug;

pub use slug::slugify;

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::metadata::MetadataExtractor;

/// Source of fresh track ids. Starts at 1 so 0 never appears as an id.
static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonic identity of a track. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(u64);

impl TrackId {
    /// Draw the next id from the process-wide sequence.
    pub fn next() -> Self {
        Self(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw sequence number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Readiness of a track relative to local playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
    /// Part of the local library. Never changes.
    Local,
    /// Fetched from the remote source and resident in the cache.
    Available,
    /// A fetch is in flight.
    Downloading,
    /// Remote-origin track that has not been fetched yet.
    NotAvailable,
    /// The fetch failed. Never retried automatically.
    NotFound,
}

impl Availability {
    /// Ordering rank used by the queue. Lower sorts earlier.
    ///
    /// Local and Available tie so ready tracks keep their arrival order.
    pub fn rank(self) -> u8 {
        match self {
            Availability::Local | Availability::Available => 0,
            Availability::NotFound => 1,
            Availability::Downloading => 2,
            Availability::NotAvailable => 3,
        }
    }

    /// Whether the track can be handed to the audio sink right now.
    pub fn is_ready(self) -> bool {
        matches!(self, Availability::Local | Availability::Available)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Availability::Local => "local",
            Availability::Available => "available",
            Availability::Downloading => "downloading",
            Availability::NotAvailable => "not available",
            Availability::NotFound => "not found",
        };
        f.write_str(s)
    }
}

/// External identifier used to fetch a remote-origin track.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteRef(String);

impl RemoteRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem under which this reference is stored in a cache directory.
    ///
    /// First 16 hex chars of the SHA-256 of the reference, so arbitrary
    /// URLs map to filesystem-safe names.
    pub fn cache_stem(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One timed caption (lyric) line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionLine {
    /// Offset from the start of the track
    pub offset: Duration,
    pub text: String,
}

/// Cover image bytes ready to attach to an announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub data: Vec<u8>,
    /// MIME type (image/jpeg, image/png)
    pub mime_type: String,
}

/// Display metadata for a track. Every field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<Duration>,
    pub cover: Option<CoverImage>,
    /// Ordered by offset
    pub captions: Vec<CaptionLine>,
}

/// One playable unit.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    /// Where the audio sink reads the file once available
    pub source_path: PathBuf,
    pub metadata: TrackMetadata,
    availability: Availability,
    remote_ref: Option<RemoteRef>,
    slug: String,
}

impl Track {
    /// Create a track from the local library.
    ///
    /// Extraction is best-effort: a track without readable tags or captions
    /// falls back to its file name.
    pub fn local(path: impl Into<PathBuf>, extractor: &dyn MetadataExtractor) -> Self {
        let path = path.into();
        let metadata = extractor.extract(&path);
        Self::local_with_metadata(path, metadata)
    }

    /// Create a local track from metadata the caller already has.
    pub fn local_with_metadata(path: impl Into<PathBuf>, metadata: TrackMetadata) -> Self {
        let source_path = path.into();
        let slug = slug_for(&source_path, &metadata);
        Self {
            id: TrackId::next(),
            source_path,
            metadata,
            availability: Availability::Local,
            remote_ref: None,
            slug,
        }
    }

    /// Create a track that must be fetched into `dest_path` before playing.
    pub fn remote(
        remote_ref: RemoteRef,
        known_title: Option<String>,
        artist: Option<String>,
        dest_path: impl Into<PathBuf>,
    ) -> Self {
        let metadata = TrackMetadata {
            title: known_title,
            artist,
            ..TrackMetadata::default()
        };
        let source_path = dest_path.into();
        let slug = slug_for(&source_path, &metadata);
        Self {
            id: TrackId::next(),
            source_path,
            metadata,
            availability: Availability::NotAvailable,
            remote_ref: Some(remote_ref),
            slug,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn remote_ref(&self) -> Option<&RemoteRef> {
        self.remote_ref.as_ref()
    }

    /// Normalized title used for guess comparisons.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// File name without extension.
    pub fn base_name(&self) -> String {
        base_name(&self.source_path)
    }

    /// Tag title, or the file name when there is none.
    pub fn title(&self) -> String {
        self.metadata
            .title
            .clone()
            .unwrap_or_else(|| self.base_name())
    }

    /// "Title - Artist" when both are known, otherwise the file name.
    pub fn display_name(&self) -> String {
        match (&self.metadata.title, &self.metadata.artist) {
            (Some(title), Some(artist)) => format!("{} - {}", title, artist),
            _ => self.base_name(),
        }
    }

    pub fn has_captions(&self) -> bool {
        !self.metadata.captions.is_empty()
    }

    /// Assign a fresh insertion sequence number.
    pub(crate) fn restamp(&mut self) -> TrackId {
        self.id = TrackId::next();
        self.id
    }

    /// Move along the availability state machine. Local tracks never move.
    pub(crate) fn set_availability(&mut self, availability: Availability) {
        if self.availability == Availability::Local {
            return;
        }
        self.availability = availability;
    }

    /// Merge freshly extracted metadata, keeping known fields the extraction
    /// could not supply.
    pub(crate) fn merge_metadata(&mut self, extracted: TrackMetadata) {
        let meta = &mut self.metadata;
        if extracted.title.is_some() {
            meta.title = extracted.title;
        }
        if extracted.artist.is_some() {
            meta.artist = extracted.artist;
        }
        if extracted.album.is_some() {
            meta.album = extracted.album;
        }
        if extracted.duration.is_some() {
            meta.duration = extracted.duration;
        }
        if extracted.cover.is_some() {
            meta.cover = extracted.cover;
        }
        if !extracted.captions.is_empty() {
            meta.captions = extracted.captions;
        }
        self.slug = slug_for(&self.source_path, &self.metadata);
    }
}

fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn slug_for(path: &Path, metadata: &TrackMetadata) -> String {
    match &metadata.title {
        Some(title) => slugify(title),
        None => slugify(&base_name(path)),
    }
}

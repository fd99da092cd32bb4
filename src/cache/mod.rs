//! Disk cache for fetched remote tracks.
//!
//! Every remote track is stored as `<stem>.<ext>` where the stem is
//! [`RemoteRef::cache_stem`]. Caption and thumbnail sidecars share the stem
//! (`<stem>.lrc`, `<stem>.jpg`) and are removed together with the media file.
//!
//! The cache is bounded by file count, not bytes: before a fetch starts the
//! worker checks [`CacheDirectory::should_evict_before_fetch`] and removes
//! the oldest file nobody needs with [`CacheDirectory::evict_one_candidate`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::metadata::sidecar::{CAPTION_EXTENSION, IMAGE_EXTENSIONS};
use crate::model::RemoteRef;

/// Extension used while a download is being written.
pub const PARTIAL_EXTENSION: &str = "part";

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to create cache directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to list cache directory {0}: {1}")]
    List(PathBuf, std::io::Error),

    #[error("Failed to remove {0}: {1}")]
    Remove(PathBuf, std::io::Error),
}

/// Stems that must survive eviction, captured from the queue.
///
/// Taken under the queue lock and used after it is released, so slow
/// deletions never block enqueue/dequeue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Stems referenced by entries still in the queue
    pub queued: HashSet<String>,
    /// Stem of the most recently dequeued remote track
    pub last_dequeued: Option<String>,
}

impl CacheSnapshot {
    pub fn protects(&self, stem: &str) -> bool {
        self.queued.contains(stem) || self.last_dequeued.as_deref() == Some(stem)
    }
}

/// A media file resident in the cache.
#[derive(Debug, Clone)]
pub struct ResidentFile {
    pub path: PathBuf,
    pub stem: String,
    /// Creation time, or modification time where the filesystem has none
    pub created: SystemTime,
    pub size: u64,
}

/// Result of a successful eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted {
    pub stem: String,
    /// Media file first, then sidecars
    pub removed: Vec<PathBuf>,
}

/// One storage root for fetched remote tracks.
#[derive(Debug, Clone)]
pub struct CacheDirectory {
    root: PathBuf,
}

impl CacheDirectory {
    /// Open (and create if needed) a cache directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CacheError::CreateDir(root.clone(), e))?;
        Ok(Self { root })
    }

    /// Default location under the user cache directory.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("tunequeue")
            .join("media")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a fetch for `remote_ref` should write its media file.
    pub fn path_for(&self, remote_ref: &RemoteRef, extension: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", remote_ref.cache_stem(), extension))
    }

    /// Media files currently in the cache, oldest first.
    pub fn resident(&self) -> Result<Vec<ResidentFile>, CacheError> {
        let entries =
            fs::read_dir(&self.root).map_err(|e| CacheError::List(self.root.clone(), e))?;

        let mut files: Vec<ResidentFile> = entries
            .filter_map(|e| e.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let meta = entry.metadata().ok()?;
                if !meta.is_file() || !is_media_file(&path) {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?.to_string();
                let created = meta
                    .created()
                    .or_else(|_| meta.modified())
                    .unwrap_or(UNIX_EPOCH);
                Some(ResidentFile {
                    path,
                    stem,
                    created,
                    size: meta.len(),
                })
            })
            .collect();

        files.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.stem.cmp(&b.stem)));
        Ok(files)
    }

    /// Number of media files in the cache. Unreadable directories count as empty.
    pub fn resident_count(&self) -> usize {
        self.resident().map(|files| files.len()).unwrap_or(0)
    }

    /// Whether a fetch should evict first: resident count ≥ 2 × `limit`.
    pub fn should_evict_before_fetch(&self, limit: usize) -> bool {
        self.resident_count() >= limit.saturating_mul(2)
    }

    /// Remove the oldest media file the snapshot does not protect, with its
    /// sidecars.
    ///
    /// A candidate that cannot be deleted is logged and skipped in favour of
    /// the next-oldest. Returns `None` when nothing is eligible.
    pub fn evict_one_candidate(&self, snapshot: &CacheSnapshot) -> Option<Evicted> {
        let resident = match self.resident() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(target: "tunequeue::cache", "Cannot scan cache for eviction: {}", e);
                return None;
            }
        };
        self.evict_first(resident, snapshot, |path| fs::remove_file(path))
    }

    fn evict_first<F>(
        &self,
        resident: Vec<ResidentFile>,
        snapshot: &CacheSnapshot,
        mut remove: F,
    ) -> Option<Evicted>
    where
        F: FnMut(&Path) -> std::io::Result<()>,
    {
        for candidate in resident {
            if snapshot.protects(&candidate.stem) {
                continue;
            }

            if let Err(e) = remove(&candidate.path) {
                let err = CacheError::Remove(candidate.path.clone(), e);
                tracing::warn!(target: "tunequeue::cache", "{}, trying next candidate", err);
                continue;
            }

            let mut removed = vec![candidate.path.clone()];
            removed.extend(self.remove_sidecars(&candidate.stem));
            tracing::info!(target: "tunequeue::cache", stem = %candidate.stem, files = removed.len(), "Evicted cached track");
            return Some(Evicted {
                stem: candidate.stem,
                removed,
            });
        }

        None
    }

    /// Delete every non-media file sharing `stem`.
    fn remove_sidecars(&self, stem: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) != Some(stem) || is_media_file(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) => {
                    tracing::warn!(target: "tunequeue::cache", path = ?path, error = %e, "Failed to remove sidecar")
                }
            }
        }
        removed
    }

    /// Remove every file in the cache.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let entries =
            fs::read_dir(&self.root).map_err(|e| CacheError::List(self.root.clone(), e))?;
        let mut count = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|e| CacheError::Remove(path.clone(), e))?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Total size of all files in bytes.
    pub fn size_bytes(&self) -> u64 {
        fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .filter(|m| m.is_file())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// Media files are everything that is not a sidecar or a partial download.
fn is_media_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
        return true;
    };
    let ext = ext.to_lowercase();
    ext != CAPTION_EXTENSION && ext != PARTIAL_EXTENSION && !IMAGE_EXTENSIONS.contains(&ext.as_str())
}

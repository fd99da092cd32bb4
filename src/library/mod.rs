//! Local track catalog.
//!
//! Scans a library root once, reads every track's metadata in parallel and
//! answers the queries producers use to pick what to enqueue. Playlists are
//! the `.m3u` files found under the same root.

pub mod playlist;
pub mod scan;

use rand::seq::{IndexedRandom, SliceRandom};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::metadata::MetadataExtractor;
use crate::model::Track;

/// Results per page in listings.
pub const ITEMS_PER_PAGE: usize = 10;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LibraryError {
    #[error("Library root {0} is not a directory")]
    RootMissing(PathBuf),

    #[error("No tracks matching '{query}' were found")]
    NoEligibleTracks { query: String },
}

/// Which of the matching tracks to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The n-th match, 1-based
    Nth(usize),
    All,
    /// One track picked at random from the whole library
    Random,
}

/// Scanned tracks plus playlists.
#[derive(Debug, Default)]
pub struct Library {
    tracks: Vec<Track>,
    /// Playlist name to track indices
    playlists: BTreeMap<String, Vec<usize>>,
}

impl Library {
    /// Scan `root`, skipping folders containing any of `ignored_paths`.
    pub fn load(
        root: &Path,
        ignored_paths: &[String],
        extractor: &dyn MetadataExtractor,
    ) -> Result<Self, LibraryError> {
        if !root.is_dir() {
            return Err(LibraryError::RootMissing(root.to_path_buf()));
        }

        tracing::info!(target: "tunequeue::library", root = ?root, "Searching for tracks");
        let summary = scan::collect(root, ignored_paths);
        let tracks: Vec<Track> = summary
            .paths
            .par_iter()
            .map(|path| Track::local(path, extractor))
            .collect();
        tracing::info!(
            target: "tunequeue::library",
            found = tracks.len(),
            ignored = summary.ignored,
            "Scan complete"
        );

        let mut library = Self::from_tracks(tracks);
        library.load_playlists(root);
        Ok(library)
    }

    /// Build a library from tracks already in hand.
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            playlists: BTreeMap::new(),
        }
    }

    fn load_playlists(&mut self, root: &Path) {
        let by_path: HashMap<&Path, usize> = self
            .tracks
            .iter()
            .enumerate()
            .map(|(idx, track)| (track.source_path.as_path(), idx))
            .collect();

        let mut playlists = BTreeMap::new();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || !playlist::is_playlist(path) {
                continue;
            }
            let contents = match std::fs::read_to_string(path) {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::warn!(target: "tunequeue::library", path = ?path, error = %e, "Unreadable playlist");
                    continue;
                }
            };
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();

            let mut indices = Vec::new();
            for item in playlist::parse_m3u(path, &contents) {
                match by_path.get(item.as_path()) {
                    Some(idx) => indices.push(*idx),
                    None => tracing::warn!(
                        target: "tunequeue::library",
                        playlist = %name,
                        entry = ?item,
                        "Playlist entry is not in the library"
                    ),
                }
            }
            playlists.insert(name, indices);
        }

        tracing::info!(target: "tunequeue::library", count = playlists.len(), "Loaded playlists");
        self.playlists = playlists;
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Playlist names with their track counts.
    pub fn playlists(&self) -> impl Iterator<Item = (&str, usize)> {
        self.playlists
            .iter()
            .map(|(name, indices)| (name.as_str(), indices.len()))
    }

    /// Tracks matching `query`.
    ///
    /// A query equal to a playlist name returns that playlist. Otherwise
    /// every whitespace-separated term must appear (case-insensitively) in
    /// the path or display name, and no `-term` may.
    pub fn find_by_query(&self, query: &str) -> Result<Vec<Track>, LibraryError> {
        if let Some(indices) = self.playlists.get(query)
            && !indices.is_empty()
        {
            return Ok(indices.iter().map(|idx| self.tracks[*idx].clone()).collect());
        }

        let lowered = query.to_lowercase();
        let (exclusions, terms): (Vec<&str>, Vec<&str>) =
            lowered.split_whitespace().partition(|t| t.starts_with('-'));
        let exclusions: Vec<&str> = exclusions
            .iter()
            .map(|t| &t[1..])
            .filter(|t| !t.is_empty())
            .collect();

        let found: Vec<Track> = self
            .tracks
            .iter()
            .filter(|track| {
                let path = track.source_path.to_string_lossy().to_lowercase();
                let name = track.display_name().to_lowercase();
                let hit = |term: &&str| path.contains(*term) || name.contains(*term);
                !exclusions.iter().any(hit) && terms.iter().all(hit)
            })
            .cloned()
            .collect();

        if found.is_empty() {
            return Err(LibraryError::NoEligibleTracks {
                query: query.to_string(),
            });
        }
        Ok(found)
    }

    /// Pick tracks to enqueue, shuffled.
    ///
    /// With a query, [`Selection::Nth`] and [`Selection::All`] choose among
    /// the matches. Without one (or with [`Selection::Random`]) the whole
    /// library is the pool.
    pub fn select(
        &self,
        query: Option<&str>,
        selection: Selection,
    ) -> Result<Vec<Track>, LibraryError> {
        let no_match = || LibraryError::NoEligibleTracks {
            query: query.unwrap_or_default().to_string(),
        };
        let mut rng = rand::rng();

        let mut picked = match (query.filter(|q| !q.trim().is_empty()), selection) {
            (Some(query), Selection::Nth(n)) => {
                let found = self.find_by_query(query)?;
                let track = n
                    .checked_sub(1)
                    .and_then(|idx| found.into_iter().nth(idx))
                    .ok_or_else(no_match)?;
                vec![track]
            }
            (Some(query), Selection::All) => self.find_by_query(query)?,
            (_, Selection::All) => self.tracks.clone(),
            _ => self.tracks.choose(&mut rng).cloned().into_iter().collect(),
        };

        if picked.is_empty() {
            return Err(no_match());
        }
        picked.shuffle(&mut rng);
        Ok(picked)
    }
}

/// One page of `items` (1-based) and the total page count.
pub fn page<T>(items: &[T], page: usize) -> Option<(&[T], usize)> {
    let total = items.len().div_ceil(ITEMS_PER_PAGE);
    let start = page.checked_sub(1)? * ITEMS_PER_PAGE;
    if start >= items.len() {
        return None;
    }
    let end = (start + ITEMS_PER_PAGE).min(items.len());
    Some((&items[start..end], total))
}

//! M3U playlists found in the library.

use std::path::{Path, PathBuf};

/// Entries of an M3U playlist, resolved against the playlist's folder.
///
/// Comment and directive lines (`#...`) and blank lines are skipped.
pub fn parse_m3u(playlist_path: &Path, contents: &str) -> Vec<PathBuf> {
    let base = playlist_path.parent().unwrap_or(Path::new(""));
    contents
        .lines()
        .map(|line| line.trim().trim_start_matches('\u{feff}'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let entry = PathBuf::from(line);
            if entry.is_absolute() {
                entry
            } else {
                base.join(entry)
            }
        })
        .collect()
}

/// Whether `path` is an M3U playlist.
pub fn is_playlist(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "m3u" | "m3u8"))
}

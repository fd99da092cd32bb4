use futures::stream::Stream;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Audio file extensions picked up by a scan (case-insensitive).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a"];

/// Whether `path` has a supported audio extension.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Whether the folder holding `path` contains any ignored fragment.
pub fn is_ignored(path: &Path, ignored_paths: &[String]) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    let parent = parent.to_string_lossy();
    ignored_paths
        .iter()
        .any(|fragment| !fragment.is_empty() && parent.contains(fragment.as_str()))
}

/// Result of a synchronous scan.
#[derive(Debug, Default)]
pub struct ScanSummary {
    pub paths: Vec<PathBuf>,
    pub ignored: usize,
}

/// Walks `root` recursively and collects audio files outside ignored folders.
///
/// Paths come back sorted so listings are stable.
pub fn collect(root: &Path, ignored_paths: &[String]) -> ScanSummary {
    let mut summary = ScanSummary::default();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_audio_file(path) {
            continue;
        }
        if is_ignored(path, ignored_paths) {
            summary.ignored += 1;
        } else {
            summary.paths.push(path.to_path_buf());
        }
    }
    summary.paths.sort();
    summary
}

/// Scans `root` for audio files, yielding paths as they are found.
///
/// The walk runs on a blocking thread and stops early when the stream is
/// dropped.
pub fn scan(root: PathBuf, ignored_paths: Vec<String>) -> impl Stream<Item = PathBuf> {
    let (tx, rx) = mpsc::channel(100);

    tokio::task::spawn_blocking(move || {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_type().is_file()
                && is_audio_file(path)
                && !is_ignored(path, &ignored_paths)
                && tx.blocking_send(path.to_path_buf()).is_err()
            {
                break;
            }
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|path| (path, rx))
    })
}

//! Library scanning and searching commands.

use futures::StreamExt;
use std::path::PathBuf;
use tokio::runtime::Runtime;

use super::library_root;
use crate::config::Config;
use crate::error::ResultExt;
use crate::library::{self, Library};
use crate::metadata::TagExtractor;
use crate::model::{Track, slugify};

/// Number of files whose tags are read concurrently during a scan.
const SCAN_CONCURRENCY: usize = 8;

/// Scan a directory and print every track found
pub fn cmd_scan(rt: &Runtime, config: &Config, path: Option<&PathBuf>) -> anyhow::Result<()> {
    let root = library_root(config, path)?;
    let ignored = config.library.ignored_paths.clone();

    rt.block_on(async {
        println!("Scanning directory: {:?}", root);

        let stream = library::scan::scan(root, ignored)
            .map(|path| tokio::task::spawn_blocking(move || Track::local(&path, &TagExtractor)))
            .buffer_unordered(SCAN_CONCURRENCY);
        let mut stream = std::pin::pin!(stream);
        let mut count = 0;
        let mut captioned = 0;

        while let Some(result) = stream.next().await {
            match result {
                Ok(track) => {
                    count += 1;
                    if track.has_captions() {
                        captioned += 1;
                        println!("{} [LRC]", track.display_name());
                    } else {
                        println!("{}", track.display_name());
                    }
                }
                Err(e) => eprintln!("Failed to read track: {}", e),
            }
        }
        println!(
            "\nScan complete. {} tracks, {} with captions.",
            count, captioned
        );
    });
    Ok(())
}

/// Search the library and print one page of results
pub fn cmd_search(
    config: &Config,
    query: &str,
    page: usize,
    library: Option<&PathBuf>,
) -> anyhow::Result<()> {
    let root = library_root(config, library)?;
    let library = Library::load(&root, &config.library.ignored_paths, &TagExtractor)
        .with_context(format!("loading library at {}", root.display()))?;
    let found = library.find_by_query(query)?;

    let Some((items, total)) = library::page(&found, page) else {
        println!("Nothing on page {}.", page);
        return Ok(());
    };
    let first = (page - 1) * library::ITEMS_PER_PAGE;
    for (offset, track) in items.iter().enumerate() {
        let marker = if track.has_captions() { " [LRC]" } else { "" };
        println!("{}. {}{}", first + offset + 1, track.display_name(), marker);
    }
    println!("\nPage {} of {}", page, total);
    Ok(())
}

/// Print the slug of a title
pub fn cmd_slug(text: &str) {
    println!("{}", slugify(text));
}

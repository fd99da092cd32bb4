//! Cache maintenance commands.

use crate::cache::CacheDirectory;
use crate::config::Config;
use crate::error::{self, ResultExt};

pub(super) fn open_cache(config: &Config) -> error::Result<CacheDirectory> {
    let root = config.queue.cache_root();
    CacheDirectory::new(&root).with_context(format!("opening cache at {}", root.display()))
}

/// Show what the cache holds
pub fn cmd_cache_status(config: &Config) -> anyhow::Result<()> {
    let cache = open_cache(config)?;
    let resident = cache
        .resident()
        .with_context("listing cached tracks")?;
    let limit = config.queue.max_concurrent_downloads.max(1);

    println!("Cache: {}", cache.root().display());
    println!(
        "Tracks: {} (eviction starts at {})",
        resident.len(),
        2 * limit
    );
    println!("Size: {:.1} MiB", cache.size_bytes() as f64 / (1024.0 * 1024.0));
    for file in resident {
        println!("  {} ({} bytes)", file.path.display(), file.size);
    }
    Ok(())
}

/// Delete every cached track and sidecar
pub fn cmd_cache_clear(config: &Config) -> anyhow::Result<()> {
    let cache = open_cache(config)?;
    let removed = cache.clear().with_context("clearing cache")?;
    println!("Removed {} files from {}", removed, cache.root().display());
    Ok(())
}

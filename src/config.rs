//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\tunequeue\config.toml
//! - macOS: ~/Library/Application Support/tunequeue/config.toml
//! - Linux: ~/.config/tunequeue/config.toml
//!
//! The config file is human-readable and editable. Every section and key is
//! optional; missing values take the defaults below. The queue and the
//! scheduler never read this directly, they are handed options built from
//! it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Download queue and cache
    pub queue: QueueConfig,

    /// Remote fetching
    pub fetch: FetchConfig,

    /// Playback loop timing
    pub playback: PlaybackConfig,

    /// Guess mode rules
    pub guess: GuessConfig,

    /// Caption display
    pub captions: CaptionConfig,

    /// Local library
    pub library: LibraryConfig,
}

/// Download queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Size of the fetch pool; the cache keeps about twice this many files
    pub max_concurrent_downloads: usize,

    /// Where fetched tracks are stored (empty = OS cache directory)
    pub cache_dir: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 5,
            cache_dir: None,
        }
    }
}

impl QueueConfig {
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(crate::cache::CacheDirectory::default_root)
    }
}

/// Remote fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout
    pub timeout_secs: u64,

    /// Also look for `.lrc`/`.jpg` files next to the media URL
    pub sidecars: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 180,
            sidecars: true,
        }
    }
}

/// Playback loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Disconnect after this long with nothing ready to play
    pub idle_timeout_secs: u64,

    /// How often the loop checks whether the current track ended
    pub poll_interval_ms: u64,

    /// The session's own name; its messages are never treated as guesses
    pub identity: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 180,
            poll_interval_ms: 500,
            identity: None,
        }
    }
}

/// Guess mode settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuessConfig {
    /// Fraction of listeners whose votes skip a track (unset = no voting)
    pub vote_skip_fraction: Option<f64>,

    /// Accept guesses that contain the title rather than equal it
    pub lenient_matching: bool,
}

/// Caption display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Lines of context shown around the current caption line
    pub window_lines: usize,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self { window_lines: 5 }
    }
}

/// Library settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Library root scanned for local tracks
    pub root: Option<PathBuf>,

    /// Path fragments excluded from scans
    pub ignored_paths: Vec<String>,
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tunequeue"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from `path`, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save configuration to `path`
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while the CLI
//! uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level error enum the CLI converts into
//! - Module-specific errors ([`CacheError`], [`SchedulerError`],
//!   [`LibraryError`]) for detailed handling; [`FetchError`] never leaves the
//!   queue
//!
//! None of these are fatal to a running session: a fetch failure marks one
//! track `NotFound`, a cache failure skips one eviction candidate, a lost
//! connection ends one consume loop.
//!
//! [`FetchError`]: crate::fetch::FetchError
//! [`CacheError`]: crate::cache::CacheError
//! [`SchedulerError`]: crate::player::SchedulerError
//! [`LibraryError`]: crate::library::LibraryError

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache directory error
    #[error("Cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),

    /// Playback scheduling error
    #[error("Playback error: {0}")]
    Scheduler(#[from] crate::player::SchedulerError),

    /// Catalog error
    #[error("Library error: {0}")]
    Library(#[from] crate::library::LibraryError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(ctx))
    }
}

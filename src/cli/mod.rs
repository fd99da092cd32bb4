//! Command-line interface for tunequeue.
//!
//! This module provides CLI commands for scanning and searching a local
//! library, maintaining the fetch cache, and running a listening session
//! against the simulated audio sink.

mod commands;

pub use commands::{Cli, Commands, run_command};

use tracing_subscriber::EnvFilter;

/// Default log directive. Every event target in the crate is under it.
pub const DEFAULT_LOG_DIRECTIVE: &str = "tunequeue=info";

/// `RUST_LOG` filter plus the crate's default level.
pub fn log_filter() -> EnvFilter {
    let filter = EnvFilter::from_default_env();
    match DEFAULT_LOG_DIRECTIVE.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

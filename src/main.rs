//! tunequeue command-line entry point.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*};
use tunequeue::cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(cli::log_filter())
        .init();

    cli::run_command(&args)
}

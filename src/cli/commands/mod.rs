//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `library`: scanning, searching and slug preview
//! - `cache`: fetched-track cache maintenance
//! - `play`: a full listening session on the simulated sink

mod cache;
mod library;
mod play;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::error::ResultExt;
use crate::player::StartPosition;

pub use cache::{cmd_cache_clear, cmd_cache_status};
pub use library::{cmd_scan, cmd_search, cmd_slug};
pub use play::{PlayArgs, cmd_play};

/// tunequeue CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "TUNEQUEUE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory and list its tracks
    Scan {
        /// Directory to scan (defaults to the configured library root)
        path: Option<PathBuf>,
    },
    /// Search the library
    Search {
        /// Terms that must all match; prefix a term with '-' to exclude it
        query: String,
        /// Result page (10 per page)
        #[arg(long, default_value = "1")]
        page: usize,
        /// Library root (defaults to the configured one)
        #[arg(long)]
        library: Option<PathBuf>,
    },
    /// Show the normalized form a title is matched by
    Slug {
        /// Title text
        text: String,
    },
    /// Inspect or empty the fetched-track cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Play tracks in a simulated listening session
    Play {
        /// Library query (a playlist name, or search terms)
        query: Option<String>,
        /// Queue every match instead of one
        #[arg(long)]
        all: bool,
        /// Which match to queue, 1-based
        #[arg(long, default_value = "1")]
        index: usize,
        /// Queue a random library track
        #[arg(long, conflicts_with_all = ["all", "index"])]
        random: bool,
        /// Remote track URLs to fetch and play
        #[arg(long = "remote", value_name = "URL")]
        remotes: Vec<String>,
        /// Put the selected tracks at the front of the queue
        #[arg(long)]
        now: bool,
        /// Hide captions for queued tracks
        #[arg(long)]
        no_captions: bool,
        /// Play in guess mode
        #[arg(long)]
        guess: bool,
        /// Announce the artist of each guess round
        #[arg(long, requires = "guess")]
        show_artist: bool,
        /// Guess-mode start position: beginning, random or chorus
        #[arg(long, default_value = "beginning", requires = "guess")]
        start_position: StartPosition,
        /// Channel name for the session
        #[arg(long, default_value = "local")]
        channel: String,
        /// Cut each simulated track after this many seconds
        #[arg(long)]
        max_track_secs: Option<u64>,
        /// Leave after this many idle seconds (overrides the config)
        #[arg(long)]
        idle_timeout: Option<u64>,
        /// Library root (defaults to the configured one)
        #[arg(long)]
        library: Option<PathBuf>,
    },
    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show resident files and total size
    Status,
    /// Delete every cached file
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration if none exists
    Init,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };

    match &cli.command {
        Commands::Scan { path } => {
            let rt = Runtime::new().with_context("starting async runtime")?;
            cmd_scan(&rt, &config, path.as_ref())
        }
        Commands::Search {
            query,
            page,
            library,
        } => cmd_search(&config, query, *page, library.as_ref()),
        Commands::Slug { text } => {
            cmd_slug(text);
            Ok(())
        }
        Commands::Cache { action } => match action {
            CacheAction::Status => cmd_cache_status(&config),
            CacheAction::Clear => cmd_cache_clear(&config),
        },
        Commands::Play {
            query,
            all,
            index,
            random,
            remotes,
            now,
            no_captions,
            guess,
            show_artist,
            start_position,
            channel,
            max_track_secs,
            idle_timeout,
            library,
        } => {
            let rt = Runtime::new().with_context("starting async runtime")?;
            let args = PlayArgs {
                query: query.clone(),
                all: *all,
                index: *index,
                random: *random,
                remotes: remotes.clone(),
                now: *now,
                captions: !*no_captions,
                guess: *guess,
                show_artist: *show_artist,
                start_position: *start_position,
                channel: channel.clone(),
                max_track_secs: *max_track_secs,
                idle_timeout: *idle_timeout,
                library: library.clone(),
            };
            cmd_play(&rt, config, args)
        }
        Commands::Config { action } => cmd_config(cli, &config, action),
    }
}

fn cmd_config(cli: &Cli, config: &Config, action: &ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigAction::Init => {
            let path = match &cli.config {
                Some(path) => path.clone(),
                None => config::config_path()
                    .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
            };
            if path.exists() {
                println!("Config already exists at {}", path.display());
            } else {
                config::save_to(&Config::default(), &path)
                    .with_context(format!("writing {}", path.display()))?;
                println!("Wrote default config to {}", path.display());
            }
        }
    }
    Ok(())
}

/// Library root from the flag, else the config.
fn library_root(config: &Config, flag: Option<&PathBuf>) -> anyhow::Result<PathBuf> {
    flag.cloned()
        .or_else(|| config.library.root.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("No library root: pass --library or set [library] root in the config")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_play_command() {
        let cli = Cli::try_parse_from([
            "tunequeue",
            "play",
            "blue -live",
            "--all",
            "--remote",
            "https://example.com/a.mp3",
            "--guess",
            "--start-position",
            "chorus",
        ])
        .unwrap();
        match cli.command {
            Commands::Play {
                query,
                all,
                remotes,
                guess,
                start_position,
                ..
            } => {
                assert_eq!(query.as_deref(), Some("blue -live"));
                assert!(all);
                assert_eq!(remotes, vec!["https://example.com/a.mp3".to_string()]);
                assert!(guess);
                assert_eq!(start_position, StartPosition::Chorus);
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn test_show_artist_requires_guess() {
        assert!(Cli::try_parse_from(["tunequeue", "play", "--show-artist"]).is_err());
        assert!(Cli::try_parse_from(["tunequeue", "play", "--random", "--all"]).is_err());
    }

    #[test]
    fn test_library_root_prefers_flag() {
        let mut config = Config::default();
        config.library.root = Some(PathBuf::from("/configured"));
        let flag = PathBuf::from("/flag");
        assert_eq!(library_root(&config, Some(&flag)).unwrap(), flag);
        assert_eq!(
            library_root(&config, None).unwrap(),
            PathBuf::from("/configured")
        );
        assert!(library_root(&Config::default(), None).is_err());
    }
}

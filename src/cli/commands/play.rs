//! Listening session on the simulated sink.
//!
//! Queues library and remote tracks, connects, then reads console commands
//! until the session ends (idle timeout, `/stop` or Ctrl-C). In guess mode
//! any line that is not a command is a guess.

use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;

use super::cache::open_cache;
use super::library_root;
use crate::cache::CacheDirectory;
use crate::config::Config;
use crate::error::ResultExt;
use crate::fetch::HttpFetcher;
use crate::library::{Library, Selection};
use crate::metadata::TagExtractor;
use crate::model::{RemoteRef, Track};
use crate::notify::LogNotifier;
use crate::player::{Mode, Scheduler, SchedulerOptions, SimulatedSink, StartPosition};
use crate::queue::{MediaQueue, QueueEntry, QueueOptions};

/// Name guesses typed at the console are scored under.
const CONSOLE_USER: &str = "you";

const CONSOLE_HELP: &str =
    "Commands: /skip [n], /queue, /np, /remove N, /clear, /now QUERY, /scores, /stop";

/// Options for [`cmd_play`].
#[derive(Debug, Clone)]
pub struct PlayArgs {
    pub query: Option<String>,
    pub all: bool,
    pub index: usize,
    pub random: bool,
    pub remotes: Vec<String>,
    pub now: bool,
    pub captions: bool,
    pub guess: bool,
    pub show_artist: bool,
    pub start_position: StartPosition,
    pub channel: String,
    pub max_track_secs: Option<u64>,
    pub idle_timeout: Option<u64>,
    pub library: Option<PathBuf>,
}

impl PlayArgs {
    fn selection(&self) -> Selection {
        if self.random {
            Selection::Random
        } else if self.all {
            Selection::All
        } else {
            Selection::Nth(self.index)
        }
    }

    /// Whether any library tracks were asked for.
    fn wants_library(&self) -> bool {
        self.query.is_some() || self.all || self.random || self.remotes.is_empty()
    }
}

/// Run a listening session until it ends
pub fn cmd_play(rt: &Runtime, config: Config, args: PlayArgs) -> anyhow::Result<()> {
    let cache = open_cache(&config)?;

    let library = if args.wants_library() {
        let root = library_root(&config, args.library.as_ref())?;
        Some(
            Library::load(&root, &config.library.ignored_paths, &TagExtractor)
                .with_context(format!("loading library at {}", root.display()))?,
        )
    } else {
        None
    };
    let local = match &library {
        Some(library) => library.select(args.query.as_deref(), args.selection())?,
        None => Vec::new(),
    };
    let remote = args
        .remotes
        .iter()
        .map(|url| remote_track(&cache, url))
        .collect::<anyhow::Result<Vec<Track>>>()?;

    rt.block_on(async move {
        let mut options = SchedulerOptions::from(&config);
        if let Some(secs) = args.idle_timeout {
            options.idle_timeout = Duration::from_secs(secs);
        }

        let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch.timeout_secs))
            .with_sidecars(config.fetch.sidecars);
        let queue = MediaQueue::new(
            QueueOptions::from(&config),
            cache,
            Arc::new(fetcher),
            Arc::new(TagExtractor),
        );
        let sink = SimulatedSink::default()
            .with_max_length(args.max_track_secs.map(Duration::from_secs));
        let scheduler = Scheduler::new(
            queue.clone(),
            Arc::new(sink),
            Arc::new(LogNotifier::default()),
            options,
        );

        if args.guess {
            scheduler
                .start_guess(args.show_artist, args.start_position)
                .await
                .with_context("starting guess mode")?;
        }

        let count = local.len() + remote.len();
        for track in local {
            queue.enqueue(QueueEntry::new(track, args.captions), args.now);
        }
        for track in remote {
            queue.enqueue(QueueEntry::new(track, args.captions), args.now);
        }
        println!("Added {} tracks to the queue.", count);

        scheduler
            .connect(&args.channel)
            .await
            .with_context(format!("connecting to {}", args.channel))?;
        println!("{}", CONSOLE_HELP);

        tokio::select! {
            _ = scheduler.wait() => {}
            _ = console(&scheduler, library.as_ref(), args.captions) => {}
            _ = tokio::signal::ctrl_c() => {
                println!();
                scheduler.stop().await;
            }
        }

        let standings = scheduler.leaderboard();
        if !standings.is_empty() {
            println!("Final scores:");
            print_scores(&standings);
        }
        anyhow::Ok(())
    })
}

/// Queue entry for a remote URL, stored in the cache under its stem.
fn remote_track(cache: &CacheDirectory, url: &str) -> anyhow::Result<Track> {
    let parsed = Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid URL {}: {}", url, e))?;
    let file = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let extension = file
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 4)
        .unwrap_or_else(|| "mp3".to_string());
    let title = file
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file)
        .to_string();

    let remote_ref = RemoteRef::new(url);
    let dest = cache.path_for(&remote_ref, &extension);
    Ok(Track::remote(
        remote_ref,
        (!title.is_empty()).then_some(title),
        None,
        dest,
    ))
}

/// One console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand<'a> {
    Skip(usize),
    Queue,
    NowPlaying,
    /// 1-based listing position
    Remove(usize),
    Clear,
    /// Library query to play next
    PlayNow(&'a str),
    Scores,
    Stop,
    /// Anything else; a guess in guess mode
    Text(&'a str),
    Usage(&'static str),
    Empty,
}

impl<'a> ConsoleCommand<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word {
            "" => Self::Empty,
            "/skip" => Self::Skip(rest.parse().unwrap_or(1)),
            "/queue" => Self::Queue,
            "/np" => Self::NowPlaying,
            "/remove" => match rest.parse::<usize>() {
                Ok(n) if n > 0 => Self::Remove(n),
                _ => Self::Usage("Usage: /remove N (position from /queue)"),
            },
            "/clear" => Self::Clear,
            "/now" if rest.is_empty() => Self::Usage("Usage: /now QUERY"),
            "/now" => Self::PlayNow(rest),
            "/scores" => Self::Scores,
            "/stop" => Self::Stop,
            _ => Self::Text(line),
        }
    }
}

/// Read console commands until `/stop` or end of input.
async fn console(scheduler: &Scheduler, library: Option<&Library>, captions: bool) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            // Without a console the session simply runs to its end
            Ok(None) | Err(_) => return std::future::pending().await,
        };
        if !handle(scheduler, library, captions, ConsoleCommand::parse(&line)).await {
            return;
        }
    }
}

/// Run one console command. Returns false once the session was stopped.
async fn handle(
    scheduler: &Scheduler,
    library: Option<&Library>,
    captions: bool,
    command: ConsoleCommand<'_>,
) -> bool {
    let queue = scheduler.queue();
    match command {
        ConsoleCommand::Skip(n) => scheduler.skip(n),
        ConsoleCommand::Queue => {
            let items = queue.snapshot();
            if items.is_empty() {
                println!("The queue is empty.");
            }
            for item in items {
                println!(
                    "{}. {} ({}{})",
                    item.position + 1,
                    item.display_name,
                    item.availability,
                    if item.has_captions && item.captions_enabled {
                        ", captions"
                    } else {
                        ""
                    }
                );
            }
        }
        ConsoleCommand::NowPlaying => match scheduler.now_playing() {
            Some(now) => println!(
                "Now playing: {} [{}s]",
                now.display_name,
                now.position.as_secs()
            ),
            None => println!("Nothing is playing."),
        },
        ConsoleCommand::Remove(n) => match queue.remove(n - 1) {
            Some(entry) => println!("Removed {}.", entry.track.display_name()),
            None => println!("There is no entry {} in the queue.", n),
        },
        ConsoleCommand::Clear => println!("Cleared {} entries.", queue.clear()),
        ConsoleCommand::PlayNow(query) => {
            let Some(library) = library else {
                println!("No library loaded.");
                return true;
            };
            match library.select(Some(query), Selection::Nth(1)) {
                Ok(tracks) => {
                    for track in tracks {
                        println!("Playing next: {}", track.display_name());
                        queue.enqueue(QueueEntry::new(track, captions), true);
                    }
                }
                Err(e) => println!("{}", e),
            }
        }
        ConsoleCommand::Scores => print_scores(&scheduler.leaderboard()),
        ConsoleCommand::Stop => {
            scheduler.stop().await;
            return false;
        }
        ConsoleCommand::Text(text) => {
            if scheduler.check_guess(CONSOLE_USER, text).await.is_none()
                && scheduler.mode() == Mode::Guess
            {
                println!("Nope.");
            }
        }
        ConsoleCommand::Usage(usage) => println!("{}", usage),
        ConsoleCommand::Empty => {}
    }
    true
}

fn print_scores(standings: &[(String, u32)]) {
    for (rank, (author, score)) in standings.iter().enumerate() {
        println!("{}. {}: {}", rank + 1, author, score);
    }
}

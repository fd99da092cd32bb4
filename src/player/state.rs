//! Session state types.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use super::guess::Leaderboard;
use crate::model::TrackId;
use crate::queue::QueueEntry;

/// Lifecycle of a listening session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Connecting,
    Playing,
    /// Torn down. A later connect opens a fresh session.
    Stopped,
}

/// Playback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Guess,
}

/// Where guess-mode playback starts within a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    #[default]
    Beginning,
    /// A caption line from the first third of the track, or the start
    Random,
    /// First occurrence of the most repeated caption line
    Chorus,
}

impl FromStr for StartPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "beginning" => Ok(Self::Beginning),
            "random" => Ok(Self::Random),
            "chorus" => Ok(Self::Chorus),
            other => Err(format!(
                "unknown start position '{}' (expected beginning, random or chorus)",
                other
            )),
        }
    }
}

impl fmt::Display for StartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Beginning => "beginning",
            Self::Random => "random",
            Self::Chorus => "chorus",
        })
    }
}

/// The entry occupying the playback slot.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub entry: QueueEntry,
    pub started_at: Instant,
    pub start_offset: Duration,
}

impl NowPlaying {
    pub fn id(&self) -> TrackId {
        self.entry.track.id()
    }

    /// Position within the track.
    pub fn position(&self) -> Duration {
        self.start_offset + self.started_at.elapsed()
    }
}

/// Guess-mode bookkeeping.
#[derive(Debug, Default)]
pub struct GuessState {
    pub show_artist: bool,
    pub start_position: StartPosition,
    pub leaderboard: Leaderboard,
    /// Skip votes for the current track
    pub votes: HashSet<String>,
    /// Track already answered correctly this round
    pub solved: Option<TrackId>,
}

impl GuessState {
    pub fn new(show_artist: bool, start_position: StartPosition) -> Self {
        Self {
            show_artist,
            start_position,
            ..Self::default()
        }
    }

    /// Forget per-track state when a new track starts.
    pub fn next_round(&mut self) {
        self.votes.clear();
        self.solved = None;
    }
}

/// Everything the scheduler tracks for one listening session.
#[derive(Debug, Default)]
pub struct Session {
    pub state: SchedulerState,
    pub mode: Mode,
    pub guess: GuessState,
    pub current: Option<NowPlaying>,
    /// Channel the sink is connected to
    pub target: Option<String>,
    /// A dequeued entry is being handed to the sink
    pub starting: bool,
    /// A skip arrived while `starting`; applied once playback begins
    pub skip_pending: bool,
}

//! Guess-mode rules: start offsets, answer matching, vote skipping, scores.

use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::time::Duration;

use super::state::StartPosition;
use crate::model::{Track, slugify};

/// A correct guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessHit {
    pub author: String,
    /// Author's score after this guess
    pub score: u32,
    /// Display name of the track that was guessed
    pub answer: String,
}

/// Result of a skip vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote recorded, threshold not reached
    Counted { votes: usize, listeners: usize },
    /// Threshold reached, the track was skipped
    Skipped { votes: usize, listeners: usize },
    AlreadyVoted { votes: usize, listeners: usize },
    /// Voter is not listening in the channel
    NotInChannel,
    NothingPlaying,
    /// Not in guess mode, or no vote fraction configured
    Disabled,
}

/// Per-author correct-guess counts for one guess session.
#[derive(Debug, Clone, Default)]
pub struct Leaderboard {
    scores: HashMap<String, u32>,
}

impl Leaderboard {
    /// Count a correct guess; returns the new score.
    pub fn record(&mut self, author: &str) -> u32 {
        let score = self.scores.entry(author.to_string()).or_default();
        *score += 1;
        *score
    }

    pub fn score(&self, author: &str) -> u32 {
        self.scores.get(author).copied().unwrap_or(0)
    }

    /// Highest score first, ties by name.
    pub fn standings(&self) -> Vec<(String, u32)> {
        let mut standings: Vec<(String, u32)> =
            self.scores.iter().map(|(a, s)| (a.clone(), *s)).collect();
        standings.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        standings
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Where playback should start for a guess round.
pub fn start_offset<R: Rng + ?Sized>(
    track: &Track,
    position: StartPosition,
    rng: &mut R,
) -> Duration {
    let captions = &track.metadata.captions;
    match position {
        StartPosition::Beginning => Duration::ZERO,
        StartPosition::Random => {
            let mut choices = vec![Duration::ZERO];
            choices.extend(captions[..captions.len() / 3].iter().map(|line| line.offset));
            choices.choose(rng).copied().unwrap_or_default()
        }
        StartPosition::Chorus => chorus_offset(track).unwrap_or_default(),
    }
}

/// Offset of the first occurrence of the most repeated caption line.
///
/// Ties go to the line that appears first.
fn chorus_offset(track: &Track) -> Option<Duration> {
    let captions = &track.metadata.captions;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in captions {
        *counts.entry(line.text.as_str()).or_default() += 1;
    }

    let mut best: Option<(usize, Duration)> = None;
    for line in captions {
        let count = counts[line.text.as_str()];
        if best.is_none_or(|(top, _)| count > top) {
            best = Some((count, line.offset));
        }
    }
    best.map(|(_, offset)| offset)
}

/// Whether `guess` names the track with slug `slug`.
///
/// Strict matching compares slugs; lenient matching accepts any guess whose
/// slug contains the title's. An empty slug never matches.
pub fn matches(guess: &str, slug: &str, lenient: bool) -> bool {
    if slug.is_empty() {
        return false;
    }
    let guess = slugify(guess);
    if lenient {
        guess.contains(slug)
    } else {
        guess == slug
    }
}

/// Whether `votes` is enough to skip with `members` in the channel.
///
/// One member is the session itself and does not vote.
pub fn vote_threshold_met(votes: usize, members: usize, fraction: f64) -> bool {
    votes as f64 >= fraction * members.saturating_sub(1) as f64
}

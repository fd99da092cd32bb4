//! Caption synchronizer.
//!
//! One task per playing track: post the now-playing card, then edit it as
//! each caption line comes due. The task polls the scheduler's now-playing
//! id every [`TICK`] and exits quietly once another track (or nothing) is
//! playing, so it never needs an explicit cancel.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::model::{CaptionLine, Track, TrackId};
use crate::notify::{Announcement, Attachment, MessageId, Notifier};

/// Identity check interval while waiting for the next line.
pub const TICK: Duration = Duration::from_millis(100);

/// Render the caption window around line `current`.
///
/// Shows up to `window` lines of context on each side, keeping the window
/// `2 * window + 1` lines tall near the start and end. The current line is
/// bold.
pub fn render_window(lines: &[CaptionLine], current: usize, window: usize) -> String {
    if current >= lines.len() {
        return String::new();
    }

    let len = lines.len() as isize;
    let i = current as isize;
    let w = window as isize;
    let before = (i - w).min(len - 2 * w).max(0) as usize;
    let after = (i + w).max(2 * w + 1 - before as isize).min(len) as usize;

    let mut rendered: Vec<String> = lines[before..current]
        .iter()
        .map(|line| line.text.clone())
        .collect();
    rendered.push(format!("**{}**", lines[current].text));
    if current + 1 < after {
        rendered.extend(lines[current + 1..after].iter().map(|line| line.text.clone()));
    }
    rendered.join("\n")
}

/// The first `2 * window + 1` lines, shown before the first line is due.
pub fn initial_window(lines: &[CaptionLine], window: usize) -> String {
    lines
        .iter()
        .take(2 * window + 1)
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The now-playing card: title, artist, album, optional lyrics and cover.
pub fn now_playing_card(track: &Track, lyrics: Option<&str>) -> Announcement {
    let mut text = format!("**{}**", track.title());
    for field in [&track.metadata.artist, &track.metadata.album]
        .into_iter()
        .flatten()
    {
        text.push('\n');
        text.push_str(field);
    }
    if let Some(lyrics) = lyrics {
        text.push_str("\n\nLyrics\n");
        text.push_str(lyrics);
    }

    let mut card = Announcement::text(text);
    if let Some(cover) = &track.metadata.cover {
        let extension = cover.mime_type.rsplit('/').next().unwrap_or("jpg");
        card = card.with_attachment(Attachment {
            filename: format!("cover.{}", extension),
            mime_type: cover.mime_type.clone(),
            data: cover.data.clone(),
        });
    }
    card
}

/// Follows one track's captions while it plays.
pub struct CaptionSync {
    pub notifier: Arc<dyn Notifier>,
    pub track: Track,
    pub captions_enabled: bool,
    pub window_lines: usize,
    pub started_at: Instant,
    pub start_offset: Duration,
    /// Id of the track the scheduler is playing right now
    pub current: watch::Receiver<Option<TrackId>>,
}

impl CaptionSync {
    fn still_current(&self) -> bool {
        *self.current.borrow() == Some(self.track.id())
    }

    pub async fn run(self) {
        let lines = &self.track.metadata.captions;
        let show = self.captions_enabled && !lines.is_empty();

        let initial = show.then(|| initial_window(lines, self.window_lines));
        let message = match self
            .notifier
            .announce(now_playing_card(&self.track, initial.as_deref()))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(target: "tunequeue::captions", track = %self.track.id(), "Could not post now-playing card: {}", e);
                return;
            }
        };
        if !show {
            return;
        }

        for (i, line) in lines.iter().enumerate() {
            if line.offset < self.start_offset {
                continue;
            }
            let due = self.started_at + (line.offset - self.start_offset);
            if !self.wait_until(due).await {
                tracing::debug!(target: "tunequeue::captions", track = %self.track.id(), "Track changed, stopping captions");
                return;
            }
            self.publish(message, i).await;
        }
    }

    /// Sleep until `due` in [`TICK`] steps. Returns false once this track is
    /// no longer the one playing.
    async fn wait_until(&self, due: Instant) -> bool {
        loop {
            if !self.still_current() {
                return false;
            }
            let now = Instant::now();
            if now >= due {
                return true;
            }
            tokio::time::sleep((due - now).min(TICK)).await;
        }
    }

    async fn publish(&self, message: MessageId, line: usize) {
        let window = render_window(&self.track.metadata.captions, line, self.window_lines);
        let card = now_playing_card(&self.track, Some(&window));
        if let Err(e) = self.notifier.update(message, card).await {
            tracing::warn!(target: "tunequeue::captions", track = %self.track.id(), "Caption update failed: {}", e);
        }
    }
}

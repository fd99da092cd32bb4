//! Audio output seam.
//!
//! The scheduler never touches a voice transport or an encoder directly: it
//! connects, plays a file from an offset and polls [`AudioSink::is_playing`].
//! [`SimulatedSink`] stands in for a real transport by "playing" for the
//! track's tagged duration.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Errors from the audio output.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("Not connected to an audio channel")]
    NotConnected,

    #[error("Failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    #[error("Failed to play {path}: {reason}")]
    Play { path: PathBuf, reason: String },
}

/// Plays audio into one shared channel.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn connect(&self, target: &str) -> Result<(), SinkError>;

    /// Switch an existing connection to another channel.
    async fn move_to(&self, target: &str) -> Result<(), SinkError>;

    /// Channel currently connected to.
    fn target(&self) -> Option<String>;

    /// Start playing `path` from `start_offset`, replacing anything playing.
    async fn play(&self, path: &Path, start_offset: Duration) -> Result<(), SinkError>;

    fn is_playing(&self) -> bool;

    fn is_connected(&self) -> bool;

    /// Stop the current track. The connection stays open.
    fn stop(&self);

    async fn disconnect(&self);
}

#[derive(Debug, Default)]
struct SimulatedState {
    target: Option<String>,
    playing_until: Option<Instant>,
}

/// Plays nothing, but takes as long as the track would.
///
/// Track length comes from the file's tags; files without a readable
/// duration play for `fallback_length`.
#[derive(Debug)]
pub struct SimulatedSink {
    state: Mutex<SimulatedState>,
    fallback_length: Duration,
    max_length: Option<Duration>,
}

impl SimulatedSink {
    pub fn new(fallback_length: Duration) -> Self {
        Self {
            state: Mutex::new(SimulatedState::default()),
            fallback_length,
            max_length: None,
        }
    }

    /// Cut every track short after `max_length`.
    pub fn with_max_length(mut self, max_length: Option<Duration>) -> Self {
        self.max_length = max_length;
        self
    }

    fn remaining(&self, duration: Option<Duration>, start_offset: Duration) -> Duration {
        let length = duration
            .unwrap_or(self.fallback_length)
            .saturating_sub(start_offset);
        match self.max_length {
            Some(max) => length.min(max),
            None => length,
        }
    }
}

impl Default for SimulatedSink {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl AudioSink for SimulatedSink {
    async fn connect(&self, target: &str) -> Result<(), SinkError> {
        tracing::info!(target: "tunequeue::sink", channel = target, "Connected");
        self.state.lock().target = Some(target.to_string());
        Ok(())
    }

    async fn move_to(&self, target: &str) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.target.is_none() {
            return Err(SinkError::NotConnected);
        }
        tracing::info!(target: "tunequeue::sink", channel = target, "Moved");
        state.target = Some(target.to_string());
        Ok(())
    }

    fn target(&self) -> Option<String> {
        self.state.lock().target.clone()
    }

    async fn play(&self, path: &Path, start_offset: Duration) -> Result<(), SinkError> {
        if !self.is_connected() {
            return Err(SinkError::NotConnected);
        }

        let owned = path.to_path_buf();
        let duration = tokio::task::spawn_blocking(move || {
            crate::metadata::read_tags(&owned)
                .ok()
                .and_then(|meta| meta.duration)
        })
        .await
        .map_err(|e| SinkError::Play {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let remaining = self.remaining(duration, start_offset);
        tracing::info!(
            target: "tunequeue::sink",
            path = ?path,
            offset_ms = start_offset.as_millis() as u64,
            length_ms = remaining.as_millis() as u64,
            "Playing"
        );
        self.state.lock().playing_until = Some(Instant::now() + remaining);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state
            .lock()
            .playing_until
            .is_some_and(|until| Instant::now() < until)
    }

    fn is_connected(&self) -> bool {
        self.state.lock().target.is_some()
    }

    fn stop(&self) {
        self.state.lock().playing_until = None;
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock();
        if let Some(target) = state.target.take() {
            tracing::info!(target: "tunequeue::sink", channel = %target, "Disconnected");
        }
        state.playing_until = None;
    }
}

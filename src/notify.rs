//! Outbound announcements.
//!
//! The scheduler and the caption synchronizer talk to listeners only through
//! [`Notifier`]: post a message, edit it in place, set the "listening to"
//! presence. [`LogNotifier`] writes everything to the log, which is what the
//! CLI uses.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// A file sent along with an announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A message for listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Announcement {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl Announcement {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Handle to a posted announcement, for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

/// Session-wide status shown to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Listening(String),
    Clear,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to deliver announcement: {0}")]
    Delivery(String),

    #[error("Unknown message {0:?}")]
    UnknownMessage(MessageId),
}

/// Delivers announcements to listeners.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn announce(&self, announcement: Announcement) -> Result<MessageId, NotifyError>;

    /// Replace the content of a previously posted announcement.
    async fn update(&self, id: MessageId, announcement: Announcement) -> Result<(), NotifyError>;

    async fn presence(&self, presence: Presence) -> Result<(), NotifyError>;
}

/// Writes announcements to the log.
#[derive(Debug, Default)]
pub struct LogNotifier {
    next_id: AtomicU64,
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn announce(&self, announcement: Announcement) -> Result<MessageId, NotifyError> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::info!(
            target: "tunequeue::notify",
            message = id.0,
            attachments = announcement.attachments.len(),
            "{}",
            announcement.text
        );
        Ok(id)
    }

    async fn update(&self, id: MessageId, announcement: Announcement) -> Result<(), NotifyError> {
        tracing::info!(target: "tunequeue::notify", message = id.0, "(edited) {}", announcement.text);
        Ok(())
    }

    async fn presence(&self, presence: Presence) -> Result<(), NotifyError> {
        match presence {
            Presence::Listening(name) => tracing::info!(target: "tunequeue::notify", "Listening to {}", name),
            Presence::Clear => tracing::debug!(target: "tunequeue::notify", "Presence cleared"),
        }
        Ok(())
    }
}

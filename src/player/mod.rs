//! Playback scheduler for a shared listening session.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  dequeue_ready   ┌───────────────────────┐
//! │  MediaQueue  │ ───────────────► │  consume loop (task)  │
//! └──────────────┘                  │  one track at a time  │
//!                                   └───┬───────────┬───────┘
//!                          play / poll  │           │ spawn per track
//!                                       ▼           ▼
//!                               ┌───────────┐ ┌─────────────┐
//!                               │ AudioSink │ │ CaptionSync │──► Notifier
//!                               └───────────┘ └─────────────┘
//! ```
//!
//! Producers call [`Scheduler::connect`], [`Scheduler::skip`],
//! [`Scheduler::stop`] and the guess-mode operations from any task. Session
//! state lives behind one mutex that is never held across an await. The id
//! of the track in the playback slot is published on a watch channel that
//! caption tasks poll to notice they are stale.

pub mod captions;
pub mod guess;
pub mod sink;
pub mod state;

pub use guess::{GuessHit, Leaderboard, VoteOutcome};
pub use sink::{AudioSink, SimulatedSink, SinkError};
pub use state::{Mode, NowPlaying, SchedulerState, Session, StartPosition};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::model::TrackId;
use crate::notify::{Announcement, MessageId, Notifier, Presence};
use crate::queue::{MediaQueue, QueueEntry};
use captions::CaptionSync;
use state::GuessState;

/// Errors from scheduler operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    #[error("Not connected to an audio channel")]
    NotConnected,

    #[error("Guess mode can only be started before connecting")]
    GuessWhileConnected,

    #[error("Audio output error: {0}")]
    Sink(#[from] SinkError),
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Tear the session down after this long with nothing ready
    pub idle_timeout: Duration,
    /// How often to check whether the current track ended
    pub poll_interval: Duration,
    /// Caption lines shown either side of the current one
    pub caption_window: usize,
    /// Fraction of listeners needed to vote-skip; `None` disables voting
    pub vote_skip_fraction: Option<f64>,
    pub lenient_matching: bool,
    /// The session's own name, never scored as a guesser
    pub identity: Option<String>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SchedulerOptions {
    fn from(config: &Config) -> Self {
        Self {
            idle_timeout: Duration::from_secs(config.playback.idle_timeout_secs),
            poll_interval: Duration::from_millis(config.playback.poll_interval_ms.max(1)),
            caption_window: config.captions.window_lines,
            vote_skip_fraction: config
                .guess
                .vote_skip_fraction
                .map(|f| f.clamp(0.0, 1.0)),
            lenient_matching: config.guess.lenient_matching,
            identity: config.playback.identity.clone(),
        }
    }
}

/// Read-only view of the playback slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlayingView {
    pub id: TrackId,
    pub display_name: String,
    pub position: Duration,
    pub duration: Option<Duration>,
}

struct Inner {
    queue: MediaQueue,
    sink: Arc<dyn AudioSink>,
    notifier: Arc<dyn Notifier>,
    options: SchedulerOptions,
    session: Mutex<Session>,
    current_tx: watch::Sender<Option<TrackId>>,
    consume_task: Mutex<Option<JoinHandle<()>>>,
    /// True while a consume loop is alive
    running_tx: watch::Sender<bool>,
}

/// Clears the running flag when the consume loop ends or is aborted.
struct RunningGuard<'a>(&'a watch::Sender<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

/// Drives one listening session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        queue: MediaQueue,
        sink: Arc<dyn AudioSink>,
        notifier: Arc<dyn Notifier>,
        options: SchedulerOptions,
    ) -> Self {
        let (current_tx, _) = watch::channel(None);
        let (running_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                queue,
                sink,
                notifier,
                options,
                session: Mutex::new(Session::default()),
                current_tx,
                consume_task: Mutex::new(None),
                running_tx,
            }),
        }
    }

    pub fn queue(&self) -> &MediaQueue {
        &self.inner.queue
    }

    /// Join `target`, moving an existing connection if needed, and make
    /// sure the consume loop is running.
    pub async fn connect(&self, target: &str) -> Result<(), SchedulerError> {
        let inner = &self.inner;
        {
            let mut session = inner.session.lock();
            if session.state == SchedulerState::Stopped {
                session.state = SchedulerState::Idle;
                session.current = None;
                session.guess.next_round();
            }
        }

        match inner.sink.target() {
            Some(current) if current == target => {
                tracing::debug!(target: "tunequeue::scheduler", channel = target, "Already connected");
            }
            Some(current) => {
                tracing::info!(target: "tunequeue::scheduler", from = %current, to = target, "Moving session");
                inner.sink.move_to(target).await?;
            }
            None => {
                inner.session.lock().state = SchedulerState::Connecting;
                if let Err(e) = inner.sink.connect(target).await {
                    inner.session.lock().state = SchedulerState::Idle;
                    return Err(e.into());
                }
                tracing::info!(target: "tunequeue::scheduler", channel = target, "Session connected");
            }
        }

        {
            let mut session = inner.session.lock();
            session.target = Some(target.to_string());
            if session.state == SchedulerState::Connecting {
                session.state = SchedulerState::Idle;
            }
        }
        self.ensure_consume_loop();
        Ok(())
    }

    fn ensure_consume_loop(&self) {
        let mut task = self.inner.consume_task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        self.inner.running_tx.send_replace(true);
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            let _running = RunningGuard(&inner.running_tx);
            consume_loop(&inner).await;
        }));
    }

    /// Skip the current track and the `n - 1` entries after it.
    ///
    /// Does nothing when not connected.
    pub fn skip(&self, n: usize) {
        let inner = &self.inner;
        if !inner.sink.is_connected() {
            return;
        }
        let dropped = inner.queue.drop_front(n.saturating_sub(1));
        let stop_now = {
            let mut session = inner.session.lock();
            if session.current.is_none() && session.starting {
                session.skip_pending = true;
            }
            session.current.is_some()
        };
        if stop_now {
            inner.sink.stop();
        }
        tracing::info!(target: "tunequeue::scheduler", dropped, "Skipped");
    }

    /// End the session: clear the queue, leave guess mode, disconnect.
    pub async fn stop(&self) {
        if let Some(task) = self.inner.consume_task.lock().take() {
            task.abort();
        }
        self.inner.teardown().await;
    }

    /// Enter guess mode with a fresh leaderboard. Only allowed before
    /// connecting.
    pub async fn start_guess(
        &self,
        show_artist: bool,
        start_position: StartPosition,
    ) -> Result<(), SchedulerError> {
        if self.inner.sink.is_connected() {
            return Err(SchedulerError::GuessWhileConnected);
        }
        {
            let mut session = self.inner.session.lock();
            session.mode = Mode::Guess;
            session.guess = GuessState::new(show_artist, start_position);
        }
        tracing::info!(target: "tunequeue::scheduler", show_artist, %start_position, "Guess mode on");
        self.inner
            .announce(Announcement::text(
                "Guess mode activated! Type your guess of the song!",
            ))
            .await;
        Ok(())
    }

    /// Score a chat message as a guess for the current track.
    ///
    /// A correct guess counts once per track, skips it and is announced.
    pub async fn check_guess(&self, author: &str, text: &str) -> Option<GuessHit> {
        let inner = &self.inner;
        if inner.options.identity.as_deref() == Some(author) {
            return None;
        }

        let hit = {
            let mut session = inner.session.lock();
            if session.mode != Mode::Guess {
                return None;
            }
            let (id, slug, answer) = {
                let now = session.current.as_ref()?;
                (
                    now.id(),
                    now.entry.track.slug().to_string(),
                    now.entry.track.display_name(),
                )
            };
            if session.guess.solved == Some(id)
                || !guess::matches(text, &slug, inner.options.lenient_matching)
            {
                return None;
            }
            session.guess.solved = Some(id);
            let score = session.guess.leaderboard.record(author);
            GuessHit {
                author: author.to_string(),
                score,
                answer,
            }
        };

        tracing::info!(target: "tunequeue::scheduler", author, score = hit.score, "Correct guess");
        inner
            .announce(Announcement::text(format!(
                "✅ Correct, {}! Score: {}",
                hit.author, hit.score
            )))
            .await;
        self.skip(1);
        Some(hit)
    }

    /// Register a skip vote from `voter`. `members` lists everyone in the
    /// channel, the session included.
    pub fn vote_skip(
        &self,
        voter: &str,
        members: &[String],
    ) -> Result<VoteOutcome, SchedulerError> {
        let inner = &self.inner;
        if !inner.sink.is_connected() {
            return Err(SchedulerError::NotConnected);
        }

        let outcome = {
            let mut session = inner.session.lock();
            let Some(fraction) = inner.options.vote_skip_fraction else {
                return Ok(VoteOutcome::Disabled);
            };
            if session.mode != Mode::Guess {
                return Ok(VoteOutcome::Disabled);
            }
            if session.current.is_none() {
                return Ok(VoteOutcome::NothingPlaying);
            }
            if !members.iter().any(|m| m == voter) {
                return Ok(VoteOutcome::NotInChannel);
            }

            let listeners = members.len().saturating_sub(1);
            let votes = &mut session.guess.votes;
            let newly_cast = votes.insert(voter.to_string());
            let count = votes.len();
            if guess::vote_threshold_met(count, members.len(), fraction) {
                VoteOutcome::Skipped {
                    votes: count,
                    listeners,
                }
            } else if newly_cast {
                VoteOutcome::Counted {
                    votes: count,
                    listeners,
                }
            } else {
                VoteOutcome::AlreadyVoted {
                    votes: count,
                    listeners,
                }
            }
        };

        tracing::debug!(target: "tunequeue::scheduler", voter, ?outcome, "Skip vote");
        if matches!(outcome, VoteOutcome::Skipped { .. }) {
            self.skip(1);
        }
        Ok(outcome)
    }

    pub fn leaderboard(&self) -> Vec<(String, u32)> {
        self.inner.session.lock().guess.leaderboard.standings()
    }

    pub fn now_playing(&self) -> Option<NowPlayingView> {
        let session = self.inner.session.lock();
        session.current.as_ref().map(|now| NowPlayingView {
            id: now.id(),
            display_name: now.entry.track.display_name(),
            position: now.position(),
            duration: now.entry.track.metadata.duration,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.session.lock().state
    }

    pub fn mode(&self) -> Mode {
        self.inner.session.lock().mode
    }

    /// Whether the consume loop is alive.
    pub fn is_running(&self) -> bool {
        *self.inner.running_tx.borrow()
    }

    /// Wait for the consume loop to exit: idle timeout, lost connection or
    /// [`stop`](Self::stop).
    pub async fn wait(&self) {
        let mut running = self.inner.running_tx.subscribe();
        // The sender lives as long as `self`
        let _ = running.wait_for(|running| !*running).await;
    }
}

impl Inner {
    async fn announce(&self, announcement: Announcement) -> Option<MessageId> {
        match self.notifier.announce(announcement).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(target: "tunequeue::scheduler", "Announcement failed: {}", e);
                None
            }
        }
    }

    async fn set_presence(&self, presence: Presence) {
        if let Err(e) = self.notifier.presence(presence).await {
            tracing::warn!(target: "tunequeue::scheduler", "Presence update failed: {}", e);
        }
    }

    /// Publish the playback slot. Returns true when a skip arrived while
    /// the new track was starting.
    fn set_current(&self, current: Option<NowPlaying>) -> bool {
        let id = current.as_ref().map(NowPlaying::id);
        let skip_pending = {
            let mut session = self.session.lock();
            let skip_pending = std::mem::take(&mut session.skip_pending);
            session.starting = false;
            session.guess.next_round();
            session.state = match (&current, session.state) {
                (_, SchedulerState::Stopped) => SchedulerState::Stopped,
                (Some(_), _) => SchedulerState::Playing,
                (None, _) => SchedulerState::Idle,
            };
            session.current = current;
            skip_pending
        };
        self.current_tx.send_replace(id);
        skip_pending
    }

    async fn teardown(&self) {
        let cleared = self.queue.clear();
        {
            let mut session = self.session.lock();
            session.mode = Mode::Normal;
            session.current = None;
            session.target = None;
            session.starting = false;
            session.skip_pending = false;
            session.state = SchedulerState::Stopped;
        }
        self.current_tx.send_replace(None);
        self.set_presence(Presence::Clear).await;
        self.sink.stop();
        self.sink.disconnect().await;
        tracing::info!(target: "tunequeue::scheduler", cleared, "Session stopped");
    }
}

async fn consume_loop(inner: &Arc<Inner>) {
    tracing::debug!(target: "tunequeue::scheduler", "Consume loop started");
    loop {
        let entry =
            match tokio::time::timeout(inner.options.idle_timeout, inner.queue.dequeue_ready())
                .await
            {
                Ok(entry) => entry,
                Err(_) => {
                    tracing::info!(target: "tunequeue::scheduler", "Idle timeout, leaving");
                    inner.teardown().await;
                    return;
                }
            };

        if !inner.sink.is_connected() {
            tracing::warn!(target: "tunequeue::scheduler", track = %entry.track.id(), "Connection lost before playback");
            inner.set_presence(Presence::Clear).await;
            inner.set_current(None);
            return;
        }

        if !play_one(inner, entry).await {
            tracing::warn!(target: "tunequeue::scheduler", "Connection lost, consume loop ending");
            inner.set_presence(Presence::Clear).await;
            return;
        }
    }
}

/// Play one entry to completion. Returns false when the connection dropped.
async fn play_one(inner: &Arc<Inner>, entry: QueueEntry) -> bool {
    let (guessing, show_artist, start_offset) = {
        let mut session = inner.session.lock();
        session.starting = true;
        let guessing = session.mode == Mode::Guess;
        let offset = if guessing {
            guess::start_offset(
                &entry.track,
                session.guess.start_position,
                &mut rand::rng(),
            )
        } else {
            Duration::ZERO
        };
        (guessing, session.guess.show_artist, offset)
    };

    if let Err(e) = inner.sink.play(&entry.track.source_path, start_offset).await {
        tracing::warn!(target: "tunequeue::scheduler", track = %entry.track.id(), "Playback failed: {}", e);
        {
            let mut session = inner.session.lock();
            session.starting = false;
            session.skip_pending = false;
        }
        return inner.sink.is_connected();
    }

    let track = entry.track.clone();
    let captions_enabled = entry.captions_enabled;
    let started_at = Instant::now();
    tracing::info!(
        target: "tunequeue::scheduler",
        track = %track.id(),
        name = %track.display_name(),
        offset_ms = start_offset.as_millis() as u64,
        "Now playing"
    );
    if inner.set_current(Some(NowPlaying {
        entry,
        started_at,
        start_offset,
    })) {
        tracing::info!(target: "tunequeue::scheduler", track = %track.id(), "Skipped while starting");
        inner.sink.stop();
    }

    if guessing {
        let text = match (&track.metadata.artist, show_artist) {
            (Some(artist), true) => format!("New song by **{}**!", artist),
            _ => "New song!".to_string(),
        };
        inner.announce(Announcement::text(text)).await;
    } else {
        inner
            .set_presence(Presence::Listening(track.display_name()))
            .await;
        tokio::spawn(
            CaptionSync {
                notifier: Arc::clone(&inner.notifier),
                track: track.clone(),
                captions_enabled,
                window_lines: inner.options.caption_window,
                started_at,
                start_offset,
                current: inner.current_tx.subscribe(),
            }
            .run(),
        );
    }

    while inner.sink.is_playing() && inner.sink.is_connected() {
        tokio::time::sleep(inner.options.poll_interval).await;
    }

    inner.set_presence(Presence::Clear).await;
    if guessing {
        inner
            .announce(Announcement::text(format!(
                "That was **{}** ({})!",
                track.display_name(),
                track.slug()
            )))
            .await;
    }
    inner.set_current(None);
    inner.sink.is_connected()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheDirectory;
    use crate::fetch::mocks::MockFetcher;
    use crate::notify::mocks::RecordingNotifier;
    use crate::queue::QueueOptions;
    use crate::test_utils::{StaticExtractor, captioned_track, local_track, tagged_track, wait_until};
    use sink::mocks::MockSink;
    use tempfile::TempDir;

    struct Harness {
        scheduler: Scheduler,
        sink: MockSink,
        notifier: RecordingNotifier,
        _temp: TempDir,
    }

    fn harness(sink: MockSink, options: SchedulerOptions) -> Harness {
        let temp = TempDir::new().unwrap();
        let queue = MediaQueue::new(
            QueueOptions {
                max_concurrent_downloads: 2,
            },
            CacheDirectory::new(temp.path()).unwrap(),
            Arc::new(MockFetcher::default()),
            Arc::new(StaticExtractor::default()),
        );
        let notifier = RecordingNotifier::default();
        let scheduler = Scheduler::new(
            queue,
            Arc::new(sink.clone()),
            Arc::new(notifier.clone()),
            options,
        );
        Harness {
            scheduler,
            sink,
            notifier,
            _temp: temp,
        }
    }

    fn fast_options() -> SchedulerOptions {
        SchedulerOptions {
            idle_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(5),
            caption_window: 5,
            vote_skip_fraction: Some(0.5),
            lenient_matching: false,
            identity: Some("tunequeue".to_string()),
        }
    }

    fn enqueue(scheduler: &Scheduler, track: crate::model::Track) -> TrackId {
        scheduler.queue().enqueue(QueueEntry::new(track, true), false)
    }

    #[tokio::test]
    async fn test_plays_queue_in_order() {
        let h = harness(MockSink::with_track_length(Duration::from_millis(20)), fast_options());
        enqueue(&h.scheduler, local_track("one"));
        enqueue(&h.scheduler, local_track("two"));

        h.scheduler.connect("lounge").await.unwrap();
        assert!(wait_until(|| h.sink.plays().len() == 2).await);
        let plays: Vec<_> = h.sink.plays().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            plays,
            vec![
                std::path::PathBuf::from("/music/one.mp3"),
                std::path::PathBuf::from("/music/two.mp3")
            ]
        );
        assert!(wait_until(|| h.scheduler.now_playing().is_none()).await);
        assert_eq!(h.notifier.last_presence(), Some(Presence::Clear));
    }

    #[tokio::test]
    async fn test_connect_same_target_does_not_reconnect() {
        let h = harness(MockSink::default(), fast_options());
        h.scheduler.connect("lounge").await.unwrap();
        h.scheduler.connect("lounge").await.unwrap();
        assert_eq!(h.sink.connects(), 1);
        assert_eq!(h.sink.moves(), 0);

        h.scheduler.connect("kitchen").await.unwrap();
        assert_eq!(h.sink.moves(), 1);
        assert_eq!(h.sink.target().as_deref(), Some("kitchen"));
        assert!(h.scheduler.is_running());
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_skip_stops_current_and_drops_pending() {
        let h = harness(MockSink::default(), fast_options());
        for name in ["a", "b", "c", "d"] {
            enqueue(&h.scheduler, local_track(name));
        }
        h.scheduler.connect("lounge").await.unwrap();
        assert!(wait_until(|| h.scheduler.now_playing().is_some()).await);

        // Skips "a" and drops "b"
        h.scheduler.skip(2);
        assert!(wait_until(|| h.sink.plays().len() == 2).await);
        assert_eq!(h.sink.plays()[1].0, std::path::PathBuf::from("/music/c.mp3"));
        assert_eq!(h.scheduler.queue().len(), 1);
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_skip_when_disconnected_is_noop() {
        let h = harness(MockSink::default(), fast_options());
        enqueue(&h.scheduler, local_track("a"));
        enqueue(&h.scheduler, local_track("b"));
        h.scheduler.skip(2);
        assert_eq!(h.scheduler.queue().len(), 2);
    }

    #[tokio::test]
    async fn test_skip_while_starting_stops_new_track() {
        let h = harness(MockSink::default(), fast_options());
        h.sink.connect("lounge").await.unwrap();
        let inner = &h.scheduler.inner;

        // Track handed to the sink but not yet published as current
        inner.session.lock().starting = true;
        h.sink.play(std::path::Path::new("/music/a.mp3"), Duration::ZERO).await.unwrap();
        h.scheduler.skip(1);
        assert!(inner.session.lock().skip_pending);
        assert!(h.sink.is_playing());

        let skipped = inner.set_current(Some(NowPlaying {
            entry: QueueEntry::new(local_track("a"), true),
            started_at: Instant::now(),
            start_offset: Duration::ZERO,
        }));
        assert!(skipped);
        let session = inner.session.lock();
        assert!(!session.starting);
        assert!(!session.skip_pending);
    }

    #[tokio::test]
    async fn test_skip_while_idle_is_not_deferred() {
        let h = harness(MockSink::default(), fast_options());
        h.sink.connect("lounge").await.unwrap();
        h.scheduler.skip(1);
        assert!(!h.scheduler.inner.session.lock().skip_pending);

        let skipped = h.scheduler.inner.set_current(Some(NowPlaying {
            entry: QueueEntry::new(local_track("a"), true),
            started_at: Instant::now(),
            start_offset: Duration::ZERO,
        }));
        assert!(!skipped);
    }

    #[tokio::test]
    async fn test_stop_clears_everything() {
        let h = harness(MockSink::default(), fast_options());
        h.scheduler
            .start_guess(false, StartPosition::Beginning)
            .await
            .unwrap();
        enqueue(&h.scheduler, local_track("a"));
        enqueue(&h.scheduler, local_track("b"));
        h.scheduler.connect("lounge").await.unwrap();
        assert!(wait_until(|| h.scheduler.now_playing().is_some()).await);

        h.scheduler.stop().await;
        assert!(h.scheduler.queue().is_empty());
        assert_eq!(h.scheduler.mode(), Mode::Normal);
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert!(h.scheduler.now_playing().is_none());
        assert!(!h.sink.is_connected());
        assert_eq!(h.sink.disconnects(), 1);
        assert_eq!(h.notifier.last_presence(), Some(Presence::Clear));

        // A new connect opens a fresh session
        h.scheduler.connect("lounge").await.unwrap();
        assert_eq!(h.scheduler.state(), SchedulerState::Idle);
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_idle_timeout_tears_down() {
        let options = SchedulerOptions {
            idle_timeout: Duration::from_millis(50),
            ..fast_options()
        };
        let h = harness(MockSink::default(), options);
        h.scheduler.connect("lounge").await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), h.scheduler.wait())
            .await
            .expect("loop did not exit");
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert!(!h.sink.is_connected());
    }

    #[tokio::test]
    async fn test_idle_timer_not_running_while_playing() {
        let options = SchedulerOptions {
            idle_timeout: Duration::from_millis(50),
            ..fast_options()
        };
        let h = harness(MockSink::with_track_length(Duration::from_millis(150)), options);
        enqueue(&h.scheduler, local_track("long"));
        h.scheduler.connect("lounge").await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.sink.is_connected());
        assert!(h.scheduler.now_playing().is_some());
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_connection_loss_ends_loop() {
        let h = harness(MockSink::default(), fast_options());
        enqueue(&h.scheduler, local_track("a"));
        h.scheduler.connect("lounge").await.unwrap();
        assert!(wait_until(|| h.scheduler.now_playing().is_some()).await);

        h.sink.drop_connection();
        tokio::time::timeout(Duration::from_secs(2), h.scheduler.wait())
            .await
            .expect("loop did not exit");
        assert!(h.scheduler.now_playing().is_none());
        assert_eq!(h.notifier.last_presence(), Some(Presence::Clear));
    }

    #[tokio::test]
    async fn test_normal_mode_sets_presence_and_card() {
        let h = harness(MockSink::default(), fast_options());
        enqueue(&h.scheduler, tagged_track("Song", "Band", Duration::from_secs(60)));
        h.scheduler.connect("lounge").await.unwrap();

        assert!(
            wait_until(|| h.notifier.presences.lock().first()
                == Some(&Presence::Listening("Song - Band".to_string())))
            .await
        );
        assert!(wait_until(|| h.notifier.texts().iter().any(|t| t.starts_with("**Song**"))).await);
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_guess_requires_disconnected() {
        let h = harness(MockSink::default(), fast_options());
        h.scheduler.connect("lounge").await.unwrap();
        let result = h.scheduler.start_guess(true, StartPosition::Random).await;
        assert!(matches!(result, Err(SchedulerError::GuessWhileConnected)));
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_guess_round() {
        let h = harness(MockSink::default(), fast_options());
        h.scheduler
            .start_guess(true, StartPosition::Chorus)
            .await
            .unwrap();
        let track = captioned_track(
            "Hello, World! (Remix)",
            &[(1, "verse"), (4, "hook"), (8, "hook")],
        );
        let mut track = track;
        track.metadata.artist = Some("Band".to_string());
        enqueue(&h.scheduler, track);
        enqueue(&h.scheduler, local_track("next"));
        h.scheduler.connect("lounge").await.unwrap();
        assert!(wait_until(|| h.scheduler.now_playing().is_some()).await);

        // Starts at the chorus, announces the artist, no presence
        assert_eq!(h.sink.plays()[0].1, Duration::from_secs(4));
        assert!(wait_until(|| h.notifier.texts().contains(&"New song by **Band**!".to_string())).await);
        assert!(h.notifier.presences.lock().is_empty());

        // Own messages and wrong answers never score
        assert!(h.scheduler.check_guess("tunequeue", "hello world").await.is_none());
        assert!(h.scheduler.check_guess("bob", "goodbye").await.is_none());

        let hit = h.scheduler.check_guess("alice", "hello world").await.unwrap();
        assert_eq!(hit.score, 1);
        // Same round cannot be scored twice
        assert!(h.scheduler.check_guess("bob", "hello world").await.is_none());

        assert!(wait_until(|| h.sink.plays().len() == 2).await);
        assert!(
            wait_until(|| h
                .notifier
                .texts()
                .iter()
                .any(|t| t == "That was **Hello, World! (Remix) - Band** (helloworld)!"))
            .await
        );
        assert_eq!(h.scheduler.leaderboard(), vec![("alice".to_string(), 1)]);
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_vote_skip() {
        let h = harness(MockSink::default(), fast_options());
        let members: Vec<String> = ["tunequeue", "alice", "bob", "carol", "dave"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert!(matches!(
            h.scheduler.vote_skip("alice", &members),
            Err(SchedulerError::NotConnected)
        ));

        h.scheduler
            .start_guess(false, StartPosition::Beginning)
            .await
            .unwrap();
        enqueue(&h.scheduler, local_track("a"));
        enqueue(&h.scheduler, local_track("b"));
        h.scheduler.connect("lounge").await.unwrap();
        assert!(wait_until(|| h.scheduler.now_playing().is_some()).await);
        let first = h.scheduler.now_playing().unwrap().id;

        assert_eq!(
            h.scheduler.vote_skip("mallory", &members).unwrap(),
            VoteOutcome::NotInChannel
        );
        assert_eq!(
            h.scheduler.vote_skip("alice", &members).unwrap(),
            VoteOutcome::Counted {
                votes: 1,
                listeners: 4
            }
        );
        assert_eq!(
            h.scheduler.vote_skip("alice", &members).unwrap(),
            VoteOutcome::AlreadyVoted {
                votes: 1,
                listeners: 4
            }
        );
        assert_eq!(
            h.scheduler.vote_skip("bob", &members).unwrap(),
            VoteOutcome::Skipped {
                votes: 2,
                listeners: 4
            }
        );

        // Votes reset on the next track
        assert!(wait_until(|| h.scheduler.now_playing().is_some_and(|n| n.id != first)).await);
        assert_eq!(
            h.scheduler.vote_skip("alice", &members).unwrap(),
            VoteOutcome::Counted {
                votes: 1,
                listeners: 4
            }
        );
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_vote_skip_disabled_outside_guess_mode() {
        let h = harness(MockSink::default(), fast_options());
        enqueue(&h.scheduler, local_track("a"));
        h.scheduler.connect("lounge").await.unwrap();
        let members = vec!["tunequeue".to_string(), "alice".to_string()];
        assert_eq!(
            h.scheduler.vote_skip("alice", &members).unwrap(),
            VoteOutcome::Disabled
        );
        h.scheduler.stop().await;
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.guess.vote_skip_fraction = Some(1.5);
        config.playback.poll_interval_ms = 0;
        let options = SchedulerOptions::from(&config);
        assert_eq!(options.vote_skip_fraction, Some(1.0));
        assert_eq!(options.poll_interval, Duration::from_millis(1));
        assert_eq!(options.idle_timeout, Duration::from_secs(180));
        assert_eq!(options.caption_window, 5);
    }
}

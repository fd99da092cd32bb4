//! Priority download queue.
//!
//! # Architecture
//!
//! ```text
//!  enqueue / remove / clear ──┐
//!                             ▼
//!                  ┌──────────────────────┐   readiness (watch<bool>)
//!                  │ QueueState (1 mutex) │──────────────────────────► dequeue_ready()
//!                  └──────────┬───────────┘
//!                             │ update hook: window → NotAvailable → Downloading
//!                             ▼
//!                  ┌──────────────────────┐
//!                  │ FetchPool (N permits)│── evict? ── fetch ── extract
//!                  └──────────┬───────────┘
//!                             │ Available / NotFound + update hook
//!                             └──────────► QueueState
//! ```
//!
//! Every structural change and every fetch completion runs the update hook
//! under the same lock, so a wakeup can never be lost between "state
//! changed" and "readiness published", and no track is submitted twice.

mod pool;
mod state;

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, watch};

use crate::cache::{CacheDirectory, CacheSnapshot};
use crate::fetch::{FetchError, FetchedMedia, RemoteFetcher};
use crate::metadata::MetadataExtractor;
use crate::model::{Availability, RemoteRef, Track, TrackId, TrackMetadata};

use pool::FetchPool;
use state::QueueState;

/// A track waiting in the queue, with its caption preference.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub track: Track,
    /// Whether the caption synchronizer should show lyrics for this entry
    pub captions_enabled: bool,
}

impl QueueEntry {
    pub fn new(track: Track, captions_enabled: bool) -> Self {
        Self {
            track,
            captions_enabled,
        }
    }

    /// Priority key: availability rank, then insertion id.
    pub fn key(&self) -> (u8, TrackId) {
        (self.track.availability().rank(), self.track.id())
    }
}

/// Read-only view of one queued entry, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItemView {
    pub position: usize,
    pub id: TrackId,
    pub display_name: String,
    pub availability: Availability,
    pub captions_enabled: bool,
    pub has_captions: bool,
}

/// Queue tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Size of the fetch pool and of the download window
    pub max_concurrent_downloads: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 5,
        }
    }
}

impl From<&crate::config::Config> for QueueOptions {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            max_concurrent_downloads: config.queue.max_concurrent_downloads.max(1),
        }
    }
}

struct Shared {
    state: Mutex<QueueState>,
    ready_tx: watch::Sender<bool>,
    pool: FetchPool,
    cache: CacheDirectory,
    fetcher: Arc<dyn RemoteFetcher>,
    extractor: Arc<dyn MetadataExtractor>,
}

/// Handle to the playback queue. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct MediaQueue {
    shared: Arc<Shared>,
}

/// Work order for one fetch.
struct FetchJob {
    id: TrackId,
    remote_ref: RemoteRef,
    dest: std::path::PathBuf,
}

impl MediaQueue {
    /// Create a queue whose fetch pool runs on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(
        options: QueueOptions,
        cache: CacheDirectory,
        fetcher: Arc<dyn RemoteFetcher>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                ready_tx,
                pool: FetchPool::new(options.max_concurrent_downloads),
                cache,
                fetcher,
                extractor,
            }),
        }
    }

    /// Add an entry by priority, or at the absolute front when `at_front`.
    ///
    /// The track gets a fresh insertion id, which is returned.
    pub fn enqueue(&self, mut entry: QueueEntry, at_front: bool) -> TrackId {
        let id = entry.track.restamp();
        let mut state = self.shared.state.lock();
        tracing::debug!(
            target: "tunequeue::queue",
            track = %id,
            name = %entry.track.display_name(),
            availability = %entry.track.availability(),
            at_front,
            "Enqueued"
        );
        state.insert(entry, at_front);
        update(&self.shared, &mut state);
        id
    }

    /// Wait for a consumable entry and take it.
    ///
    /// Returns the ready entry (Local or Available) with the smallest
    /// priority key. Suspends on the readiness signal while none exists;
    /// concurrent callers never receive the same entry. Cancel-safe: an
    /// entry is only removed when this returns it.
    pub async fn dequeue_ready(&self) -> QueueEntry {
        let mut ready_rx = self.shared.ready_tx.subscribe();
        loop {
            {
                let mut state = self.shared.state.lock();
                if let Some(entry) = state.pop_ready() {
                    update(&self.shared, &mut state);
                    tracing::debug!(target: "tunequeue::queue", track = %entry.track.id(), "Dequeued");
                    return entry;
                }
            }

            // Returns at once if another change already raised the flag
            if ready_rx.wait_for(|ready| *ready).await.is_err() {
                // The sender lives in `shared`, which we hold
                std::future::pending::<()>().await;
            }
        }
    }

    /// Take a ready entry without waiting.
    pub fn try_dequeue_ready(&self) -> Option<QueueEntry> {
        let mut state = self.shared.state.lock();
        let entry = state.pop_ready()?;
        update(&self.shared, &mut state);
        Some(entry)
    }

    /// Remove the entry at `position` (0-based, listing order).
    pub fn remove(&self, position: usize) -> Option<QueueEntry> {
        let mut state = self.shared.state.lock();
        let removed = state.remove(position);
        update(&self.shared, &mut state);
        removed
    }

    /// Drop up to `n` entries from the front without playing them.
    pub fn drop_front(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let mut state = self.shared.state.lock();
        let dropped = state.drop_front(n).len();
        update(&self.shared, &mut state);
        dropped
    }

    /// Remove every entry. In-flight fetches run to completion.
    pub fn clear(&self) -> usize {
        let mut state = self.shared.state.lock();
        let count = state.clear();
        update(&self.shared, &mut state);
        count
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in listing order.
    pub fn snapshot(&self) -> Vec<QueueItemView> {
        self.shared
            .state
            .lock()
            .entries()
            .enumerate()
            .map(|(position, entry)| QueueItemView {
                position,
                id: entry.track.id(),
                display_name: entry.track.display_name(),
                availability: entry.track.availability(),
                captions_enabled: entry.captions_enabled,
                has_captions: entry.track.has_captions(),
            })
            .collect()
    }

    /// Number of queued entries in `availability`.
    pub fn count(&self, availability: Availability) -> usize {
        self.shared.state.lock().count(availability)
    }

    /// Fetches currently holding a pool slot.
    pub fn in_flight(&self) -> usize {
        self.shared.pool.in_flight()
    }

    /// Stems eviction must preserve right now.
    pub fn membership_snapshot(&self) -> CacheSnapshot {
        self.shared.state.lock().membership()
    }

    pub fn cache(&self) -> &CacheDirectory {
        &self.shared.cache
    }

    /// Current value of the readiness signal.
    pub fn is_ready(&self) -> bool {
        *self.shared.ready_tx.borrow()
    }
}

/// The update hook. Caller holds the state lock.
fn update(shared: &Arc<Shared>, state: &mut QueueState) {
    state.resort();

    for position in state.window(shared.pool.size()) {
        let Some(entry) = state.get_mut(position) else {
            continue;
        };
        if entry.track.availability() != Availability::NotAvailable {
            continue;
        }

        let Some(remote_ref) = entry.track.remote_ref().cloned() else {
            tracing::warn!(target: "tunequeue::queue", track = %entry.track.id(), "Pending track has no remote reference");
            entry.track.set_availability(Availability::NotFound);
            continue;
        };

        let Some(permit) = shared.pool.try_reserve() else {
            break;
        };

        entry.track.set_availability(Availability::Downloading);
        let job = FetchJob {
            id: entry.track.id(),
            remote_ref,
            dest: entry.track.source_path.clone(),
        };
        tracing::info!(target: "tunequeue::queue", track = %job.id, reference = %job.remote_ref, "Starting fetch");
        shared.pool.spawn(run_fetch(Arc::clone(shared), job, permit));
    }

    state.resort();
    shared.ready_tx.send_replace(state.has_ready());
}

/// Worker body: fetch, extract, publish, release the slot, re-run the hook.
async fn run_fetch(shared: Arc<Shared>, job: FetchJob, permit: OwnedSemaphorePermit) {
    let metadata = match fetch_one(&shared, &job).await {
        Ok(fetched) => {
            let extractor = Arc::clone(&shared.extractor);
            let dest = job.dest.clone();
            Some(
                tokio::task::spawn_blocking(move || extractor.extract_fetched(&dest, &fetched))
                    .await
                    .unwrap_or_default(),
            )
        }
        Err(e) => {
            tracing::warn!(target: "tunequeue::queue", track = %job.id, reference = %job.remote_ref, "Fetch failed: {}", e);
            None
        }
    };

    let mut state = shared.state.lock();
    match state.find_mut(job.id) {
        Some(entry) => apply_result(&mut entry.track, metadata),
        None => tracing::debug!(target: "tunequeue::queue", track = %job.id, "Fetch finished for a track no longer queued"),
    }
    drop(permit);
    update(&shared, &mut state);
}

fn apply_result(track: &mut Track, metadata: Option<TrackMetadata>) {
    match metadata {
        Some(metadata) => {
            track.merge_metadata(metadata);
            track.set_availability(Availability::Available);
            tracing::info!(target: "tunequeue::queue", track = %track.id(), name = %track.display_name(), "Track available");
        }
        None => track.set_availability(Availability::NotFound),
    }
}

/// Evict if needed, then fetch. A file already on disk counts as fetched.
async fn fetch_one(shared: &Arc<Shared>, job: &FetchJob) -> Result<FetchedMedia, FetchError> {
    if job.dest.is_file() {
        tracing::debug!(target: "tunequeue::queue", track = %job.id, "Already on disk, skipping fetch");
        return Ok(FetchedMedia::default());
    }

    let snapshot = shared.state.lock().membership();
    let cache = shared.cache.clone();
    let limit = shared.pool.size();
    let evicted = tokio::task::spawn_blocking(move || {
        let mut evicted = 0;
        while cache.should_evict_before_fetch(limit) {
            match cache.evict_one_candidate(&snapshot) {
                Some(_) => evicted += 1,
                None => {
                    tracing::warn!(target: "tunequeue::cache", "Cache full but every file is still needed");
                    break;
                }
            }
        }
        evicted
    })
    .await
    .unwrap_or(0);
    if evicted > 0 {
        tracing::debug!(target: "tunequeue::queue", track = %job.id, evicted, "Made room before fetch");
    }

    shared.fetcher.fetch(&job.remote_ref, &job.dest).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mocks::MockFetcher;
    use crate::test_utils::{StaticExtractor, local_track, remote_track, wait_until};
    use std::time::Duration;
    use tempfile::TempDir;

    fn queue_with(
        temp: &TempDir,
        fetcher: MockFetcher,
        max_concurrent_downloads: usize,
    ) -> MediaQueue {
        MediaQueue::new(
            QueueOptions {
                max_concurrent_downloads,
            },
            CacheDirectory::new(temp.path()).unwrap(),
            Arc::new(fetcher),
            Arc::new(StaticExtractor::default()),
        )
    }

    async fn dequeue(queue: &MediaQueue) -> QueueEntry {
        tokio::time::timeout(Duration::from_secs(5), queue.dequeue_ready())
            .await
            .expect("dequeue timed out")
    }

    #[tokio::test]
    async fn test_local_tracks_dequeue_in_arrival_order() {
        let temp = TempDir::new().unwrap();
        let queue = queue_with(&temp, MockFetcher::default(), 2);

        let a = queue.enqueue(QueueEntry::new(local_track("a"), true), false);
        let b = queue.enqueue(QueueEntry::new(local_track("b"), true), false);
        assert!(queue.is_ready());

        assert_eq!(dequeue(&queue).await.track.id(), a);
        assert_eq!(dequeue(&queue).await.track.id(), b);
        assert!(!queue.is_ready());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_front_remote_track_waits_for_fetch() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::with_delay(Duration::from_millis(100));
        let queue = queue_with(&temp, fetcher.clone(), 2);

        let ids: Vec<TrackId> = ["1", "2", "3"]
            .iter()
            .map(|n| queue.enqueue(QueueEntry::new(local_track(n), true), false))
            .collect();
        let remote = queue.enqueue(QueueEntry::new(remote_track(&temp, "4"), true), true);

        // Pinned at the front, so it is fetched right away
        assert_eq!(queue.count(Availability::Downloading), 1);

        let mut order = Vec::new();
        for _ in 0..4 {
            order.push(dequeue(&queue).await.track.id());
        }
        assert_eq!(order, vec![ids[0], ids[1], ids[2], remote]);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_dequeue_wakes_when_fetch_completes() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::with_delay(Duration::from_millis(50));
        let queue = queue_with(&temp, fetcher, 1);

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let id = queue.enqueue(QueueEntry::new(remote_track(&temp, "late"), true), false);

        let entry = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter never woke")
            .unwrap();
        assert_eq!(entry.track.id(), id);
        assert_eq!(entry.track.availability(), Availability::Available);
        assert!(entry.track.source_path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_fetches_bounded_by_pool() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::with_delay(Duration::from_millis(30));
        let queue = queue_with(&temp, fetcher.clone(), 2);

        for i in 0..6 {
            queue.enqueue(QueueEntry::new(remote_track(&temp, &format!("r{}", i)), true), false);
            assert!(queue.count(Availability::Downloading) <= 2);
        }

        for _ in 0..6 {
            let entry = dequeue(&queue).await;
            assert!(entry.track.availability().is_ready());
            assert!(queue.count(Availability::Downloading) <= 2);
        }
        assert!(fetcher.max_in_flight() <= 2);
        assert_eq!(fetcher.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_deep_tracks_not_fetched_until_in_window() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::with_delay(Duration::from_millis(20));
        let queue = queue_with(&temp, fetcher.clone(), 1);

        queue.enqueue(QueueEntry::new(local_track("a"), true), false);
        queue.enqueue(QueueEntry::new(local_track("b"), true), false);
        queue.enqueue(QueueEntry::new(remote_track(&temp, "deep"), true), false);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fetcher.calls().is_empty());

        dequeue(&queue).await;
        dequeue(&queue).await;
        // Now at the front; gets fetched and dequeued
        let entry = dequeue(&queue).await;
        assert_eq!(entry.track.title(), "deep");
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_marks_not_found_and_continues() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::default();
        fetcher.fail("bad");
        let queue = queue_with(&temp, fetcher.clone(), 1);

        queue.enqueue(QueueEntry::new(remote_track(&temp, "bad"), true), false);
        let good = queue.enqueue(QueueEntry::new(remote_track(&temp, "good"), true), false);

        // Failed entry leaves the window, so the next one still gets fetched
        let entry = dequeue(&queue).await;
        assert_eq!(entry.track.id(), good);
        assert!(wait_until(|| queue.count(Availability::NotFound) == 1).await);
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_ready());
    }

    #[tokio::test]
    async fn test_already_downloaded_is_not_refetched() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::default();
        let queue = queue_with(&temp, fetcher.clone(), 1);

        let track = remote_track(&temp, "cached");
        std::fs::write(&track.source_path, b"already here").unwrap();
        queue.enqueue(QueueEntry::new(track, true), false);

        let entry = dequeue(&queue).await;
        assert_eq!(entry.track.availability(), Availability::Available);
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_full_cache_evicts_exactly_one_before_fetch() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::default();
        let queue = queue_with(&temp, fetcher, 2);

        for i in 0..4 {
            std::fs::write(temp.path().join(format!("stale{}.mp3", i)), b"old").unwrap();
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(queue.cache().resident_count(), 4);

        queue.enqueue(QueueEntry::new(remote_track(&temp, "fresh"), true), false);
        let entry = dequeue(&queue).await;

        assert!(entry.track.source_path.exists());
        assert!(!temp.path().join("stale0.mp3").exists());
        for i in 1..4 {
            assert!(temp.path().join(format!("stale{}.mp3", i)).exists());
        }
        assert_eq!(queue.cache().resident_count(), 4);
    }

    #[tokio::test]
    async fn test_eviction_protects_queued_and_last_dequeued() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::default();
        let queue = queue_with(&temp, fetcher, 1);

        // Play one remote track so it becomes last_dequeued
        queue.enqueue(QueueEntry::new(remote_track(&temp, "played"), true), false);
        let played = dequeue(&queue).await;

        // A queued, already-fetched track occupies the second slot
        let queued = remote_track(&temp, "queued");
        std::fs::write(&queued.source_path, b"x").unwrap();
        queue.enqueue(QueueEntry::new(local_track("blocker"), true), false);
        queue.enqueue(QueueEntry::new(queued.clone(), true), false);
        assert_eq!(queue.cache().resident_count(), 2);

        let snapshot = queue.membership_snapshot();
        assert!(snapshot.protects(&played.track.remote_ref().unwrap().cache_stem()));
        assert!(snapshot.protects(&queued.remote_ref().unwrap().cache_stem()));
        assert!(queue.cache().evict_one_candidate(&snapshot).is_none());
        assert!(played.track.source_path.exists());
        assert!(queued.source_path.exists());
    }

    #[tokio::test]
    async fn test_removing_downloading_entry_keeps_bound() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::with_delay(Duration::from_millis(100));
        let queue = queue_with(&temp, fetcher.clone(), 1);

        queue.enqueue(QueueEntry::new(remote_track(&temp, "first"), true), false);
        queue.enqueue(QueueEntry::new(remote_track(&temp, "second"), true), false);
        assert_eq!(queue.in_flight(), 1);

        // Removing the in-flight entry must not start a second fetch yet
        let removed = queue.remove(0).unwrap();
        assert_eq!(removed.track.availability(), Availability::Downloading);
        assert_eq!(queue.count(Availability::Downloading), 0);
        assert_eq!(queue.in_flight(), 1);

        let entry = dequeue(&queue).await;
        assert_eq!(entry.track.title(), "second");
        assert_eq!(fetcher.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_dequeue_never_duplicates() {
        let temp = TempDir::new().unwrap();
        let queue = queue_with(&temp, MockFetcher::default(), 2);

        let mut waiters = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            waiters.push(tokio::spawn(async move { queue.dequeue_ready().await.track.id() }));
        }
        let mut expected = Vec::new();
        for i in 0..8 {
            expected.push(queue.enqueue(QueueEntry::new(local_track(&format!("t{}", i)), true), false));
        }

        let mut got = Vec::new();
        for waiter in waiters {
            got.push(
                tokio::time::timeout(Duration::from_secs(5), waiter)
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        got.sort();
        expected.sort();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_clear_drops_readiness() {
        let temp = TempDir::new().unwrap();
        let queue = queue_with(&temp, MockFetcher::default(), 2);
        queue.enqueue(QueueEntry::new(local_track("a"), true), false);
        assert!(queue.is_ready());
        assert_eq!(queue.clear(), 1);
        assert!(!queue.is_ready());
        assert!(queue.try_dequeue_ready().is_none());
    }

    #[tokio::test]
    async fn test_fetched_metadata_is_merged() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::default().with_captions("[00:01.00]Hello");
        let queue = MediaQueue::new(
            QueueOptions {
                max_concurrent_downloads: 1,
            },
            CacheDirectory::new(temp.path()).unwrap(),
            Arc::new(fetcher),
            Arc::new(crate::metadata::TagExtractor),
        );

        queue.enqueue(QueueEntry::new(remote_track(&temp, "lyrics"), true), false);
        let entry = dequeue(&queue).await;
        assert_eq!(entry.track.metadata.captions.len(), 1);
        assert_eq!(entry.track.metadata.title.as_deref(), Some("lyrics"));
    }

    #[tokio::test]
    async fn test_fetch_reported_captions_are_merged() {
        let temp = TempDir::new().unwrap();
        let side = TempDir::new().unwrap();
        let fetcher = MockFetcher::default()
            .with_captions("[00:01.00]One\n[00:02.00]Two")
            .with_caption_dir(side.path());
        let queue = MediaQueue::new(
            QueueOptions {
                max_concurrent_downloads: 1,
            },
            CacheDirectory::new(temp.path()).unwrap(),
            Arc::new(fetcher),
            Arc::new(crate::metadata::TagExtractor),
        );

        queue.enqueue(QueueEntry::new(remote_track(&temp, "elsewhere"), true), false);
        let entry = dequeue(&queue).await;
        let texts: Vec<&str> = entry
            .track
            .metadata
            .captions
            .iter()
            .map(|line| line.text.as_str())
            .collect();
        assert_eq!(texts, vec!["One", "Two"]);
    }

    #[tokio::test]
    async fn test_ready_front_entry_plays_next() {
        let temp = TempDir::new().unwrap();
        let queue = queue_with(&temp, MockFetcher::default(), 2);

        let a = queue.enqueue(QueueEntry::new(local_track("a"), true), false);
        queue.enqueue(QueueEntry::new(local_track("b"), true), false);
        let now = queue.enqueue(QueueEntry::new(local_track("now"), true), true);
        assert_eq!(queue.snapshot()[0].id, now);

        assert_eq!(dequeue(&queue).await.track.id(), now);
        assert_eq!(dequeue(&queue).await.track.id(), a);
    }
}

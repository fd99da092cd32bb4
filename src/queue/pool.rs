//! Bounded pool of fetch workers.
//!
//! The pool is a semaphore with one permit per worker slot. The queue's
//! update hook reserves a permit synchronously, under the queue lock, before
//! it marks a track `Downloading`; the permit travels into the spawned task
//! and is released when the worker has published its result. That keeps the
//! number of `Downloading` tracks at or below the pool size even when a
//! downloading entry is removed from the queue mid-fetch.

use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub(crate) struct FetchPool {
    permits: Arc<Semaphore>,
    size: usize,
    handle: Handle,
}

impl FetchPool {
    /// Create a pool bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            handle: Handle::current(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Fetches currently holding a worker slot.
    pub fn in_flight(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Reserve a worker slot without waiting.
    pub fn try_reserve(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.permits).try_acquire_owned().ok()
    }

    /// Run a worker on the pool's runtime.
    pub fn spawn<F>(&self, worker: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(worker);
    }
}

//! The ordered container behind [`MediaQueue`](super::MediaQueue).
//!
//! Layout: a pinned prefix (entries enqueued "at front", newest first)
//! followed by entries sorted by priority key. A ready pinned entry is
//! dequeued before anything behind it. Only the owning queue touches
//! this, always under its lock.

use crate::cache::CacheSnapshot;
use crate::model::{Availability, TrackId};

use super::QueueEntry;

#[derive(Debug)]
struct Slot {
    entry: QueueEntry,
    pinned: bool,
}

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    slots: Vec<Slot>,
    /// Cache stem of the most recently dequeued remote track
    last_dequeued: Option<String>,
}

impl QueueState {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.slots.iter().map(|slot| &slot.entry)
    }

    fn pinned_count(&self) -> usize {
        self.slots.iter().take_while(|slot| slot.pinned).count()
    }

    /// Insert by priority key (after equal keys), or at the absolute front.
    pub fn insert(&mut self, entry: QueueEntry, at_front: bool) {
        if at_front {
            self.slots.insert(0, Slot { entry, pinned: true });
            return;
        }

        let key = entry.key();
        let start = self.pinned_count();
        let offset = self.slots[start..]
            .iter()
            .position(|slot| slot.entry.key() > key)
            .unwrap_or(self.slots.len() - start);
        self.slots.insert(
            start + offset,
            Slot {
                entry,
                pinned: false,
            },
        );
    }

    /// Restore key order after availability changes. Stable, and the pinned
    /// prefix is left alone.
    pub fn resort(&mut self) {
        let start = self.pinned_count();
        self.slots[start..].sort_by_key(|slot| slot.entry.key());
    }

    /// Positions of the download window: the first `limit` entries in
    /// priority order, not counting entries whose fetch already failed.
    pub fn window(&self, limit: usize) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entry.track.availability() != Availability::NotFound)
            .take(limit)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut QueueEntry> {
        self.slots.get_mut(position).map(|slot| &mut slot.entry)
    }

    pub fn find_mut(&mut self, id: TrackId) -> Option<&mut QueueEntry> {
        self.slots
            .iter_mut()
            .map(|slot| &mut slot.entry)
            .find(|entry| entry.track.id() == id)
    }

    pub fn has_ready(&self) -> bool {
        self.entries().any(|entry| entry.track.availability().is_ready())
    }

    /// Position of the entry the next dequeue takes: the newest ready
    /// pinned entry, else the ready entry with the smallest key.
    fn next_ready(&self) -> Option<usize> {
        let pinned = self.pinned_count();
        let is_ready = |slot: &Slot| slot.entry.track.availability().is_ready();
        self.slots[..pinned].iter().position(is_ready).or_else(|| {
            self.slots[pinned..]
                .iter()
                .enumerate()
                .filter(|(_, slot)| is_ready(slot))
                .min_by_key(|(_, slot)| slot.entry.key())
                .map(|(idx, _)| pinned + idx)
        })
    }

    /// Remove and return the next ready entry.
    pub fn pop_ready(&mut self) -> Option<QueueEntry> {
        let position = self.next_ready()?;

        let entry = self.slots.remove(position).entry;
        if let Some(remote_ref) = entry.track.remote_ref() {
            self.last_dequeued = Some(remote_ref.cache_stem());
        }
        Some(entry)
    }

    pub fn remove(&mut self, position: usize) -> Option<QueueEntry> {
        (position < self.slots.len()).then(|| self.slots.remove(position).entry)
    }

    /// Drop up to `n` entries from the front, whatever their availability.
    pub fn drop_front(&mut self, n: usize) -> Vec<QueueEntry> {
        let n = n.min(self.slots.len());
        self.slots.drain(..n).map(|slot| slot.entry).collect()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.slots.len();
        self.slots.clear();
        count
    }

    /// Stems eviction must not touch.
    pub fn membership(&self) -> CacheSnapshot {
        CacheSnapshot {
            queued: self
                .entries()
                .filter_map(|entry| entry.track.remote_ref())
                .map(|r| r.cache_stem())
                .collect(),
            last_dequeued: self.last_dequeued.clone(),
        }
    }

    pub fn count(&self, availability: Availability) -> usize {
        self.entries()
            .filter(|entry| entry.track.availability() == availability)
            .count()
    }
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use crate::model::{RemoteRef, Track, TrackMetadata};
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Local,
        Remote(u8),
        Remove(usize),
        Resolve(usize, bool),
        Dequeue,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Local),
            (0u8..3).prop_map(Op::Remote),
            (0usize..8).prop_map(Op::Remove),
            ((0usize..8), any::<bool>()).prop_map(|(i, ok)| Op::Resolve(i, ok)),
            Just(Op::Dequeue),
        ]
    }

    proptest! {
        /// Every dequeue returns the newest ready pinned entry, else the
        /// ready entry with the smallest (rank, id) key, and never a
        /// pending one.
        #[test]
        fn dequeue_respects_priority_key(ops in prop::collection::vec(op(), 1..60)) {
            let mut state = QueueState::default();
            for op in ops {
                match op {
                    Op::Local => state.insert(
                        QueueEntry::new(Track::local_with_metadata("/m/a.mp3", TrackMetadata::default()), false),
                        false,
                    ),
                    Op::Remote(kind) => {
                        let mut track = Track::remote(RemoteRef::new("r"), None, None, "/c/r.mp3");
                        if kind >= 1 {
                            track.set_availability(Availability::Downloading);
                        }
                        state.insert(QueueEntry::new(track, false), kind == 2);
                    }
                    Op::Remove(i) => {
                        state.remove(i);
                    }
                    Op::Resolve(i, ok) => {
                        if let Some(entry) = state.get_mut(i)
                            && entry.track.availability() == Availability::Downloading
                        {
                            entry.track.set_availability(if ok {
                                Availability::Available
                            } else {
                                Availability::NotFound
                            });
                        }
                        state.resort();
                    }
                    Op::Dequeue => {
                        let ready = |slot: &&Slot| slot.entry.track.availability().is_ready();
                        let expected = state
                            .slots
                            .iter()
                            .take_while(|slot| slot.pinned)
                            .find(ready)
                            .map(|slot| slot.entry.key())
                            .or_else(|| {
                                state
                                    .slots
                                    .iter()
                                    .skip_while(|slot| slot.pinned)
                                    .filter(ready)
                                    .map(|slot| slot.entry.key())
                                    .min()
                            });
                        let got = state.pop_ready();
                        prop_assert_eq!(got.as_ref().map(|e| e.key()), expected);
                        if let Some(entry) = got {
                            prop_assert!(entry.track.availability().is_ready());
                        }
                    }
                }
            }
        }
    }
}

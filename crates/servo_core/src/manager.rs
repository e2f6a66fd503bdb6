//! # Item Manager
//!
//! The producer side of the dispatch loop.
//!
//! ## Contract
//!
//! - `dequeue_items` never blocks and returns items in queue order.
//! - `respond_item` tolerates items it does not know: it logs and drops them.
//!
//! [`QueueItemManager`] is the reference implementation. It enforces
//! at-most-once dispatch: an id cannot be enqueued while the same id is
//! pending or in flight.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{ServoError, ServoResult};
use crate::item::{ItemId, ItemStatus, ServoItem};

/// Supplies pending items and accepts completed ones.
pub trait ItemManager<T>: Send + Sync {
    /// Removes and returns up to `limit` pending items (`None` = all), in order.
    fn dequeue_items(&self, limit: Option<usize>) -> Vec<T>;

    /// Accepts a completed item.
    fn respond_item(&self, item: T);
}

/// Counters kept by a [`QueueItemManager`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Items accepted by `enqueue`.
    pub enqueued: u64,
    /// Items handed out by `dequeue_items`.
    pub dispatched: u64,
    /// Items returned through `respond_item`.
    pub responded: u64,
    /// Responses for ids that were not in flight.
    pub unknown_responses: u64,
    /// Completed items dropped from the archive to make room.
    pub evicted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dispatched: AtomicU64,
    responded: AtomicU64,
    unknown_responses: AtomicU64,
    evicted: AtomicU64,
}

struct QueueState<T> {
    pending: VecDeque<T>,
    pending_ids: HashSet<ItemId>,
    in_flight: HashSet<ItemId>,
}

/// FIFO item manager with in-flight tracking and a bounded completed archive.
pub struct QueueItemManager<T> {
    state: Mutex<QueueState<T>>,
    completed: Mutex<VecDeque<T>>,
    completed_capacity: usize,
    counters: Counters,
}

impl<T: ServoItem> QueueItemManager<T> {
    /// Creates a manager keeping at most `completed_capacity` finished items.
    #[must_use]
    pub fn new(completed_capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                pending_ids: HashSet::new(),
                in_flight: HashSet::new(),
            }),
            completed: Mutex::new(VecDeque::with_capacity(completed_capacity.min(4096))),
            completed_capacity,
            counters: Counters::default(),
        }
    }

    /// Appends an item to the pending queue.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateItem` if the id is already pending or in flight.
    pub fn enqueue(&self, mut item: T) -> ServoResult<()> {
        let id = item.id();
        let mut state = self.state.lock();
        if state.pending_ids.contains(&id) || state.in_flight.contains(&id) {
            return Err(ServoError::DuplicateItem(id));
        }
        item.set_status(ItemStatus::Pending);
        state.pending_ids.insert(id);
        state.pending.push_back(item);
        drop(state);

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(item = %id, "item enqueued");
        Ok(())
    }

    /// Removes and returns every archived completed item, oldest first.
    pub fn drain_completed(&self) -> Vec<T> {
        self.completed.lock().drain(..).collect()
    }

    /// Number of items waiting for dispatch.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of items dispatched but not yet responded.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Returns true if `id` is dispatched and awaiting a response.
    #[must_use]
    pub fn is_in_flight(&self, id: ItemId) -> bool {
        self.state.lock().in_flight.contains(&id)
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            responded: self.counters.responded.load(Ordering::Relaxed),
            unknown_responses: self.counters.unknown_responses.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }

    fn archive(&self, item: T) {
        if self.completed_capacity == 0 {
            return;
        }
        let mut completed = self.completed.lock();
        while completed.len() >= self.completed_capacity {
            completed.pop_front();
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
        }
        completed.push_back(item);
    }
}

impl<T: ServoItem> ItemManager<T> for QueueItemManager<T> {
    fn dequeue_items(&self, limit: Option<usize>) -> Vec<T> {
        let mut state = self.state.lock();
        let count = limit.map_or(state.pending.len(), |max| max.min(state.pending.len()));
        if count == 0 {
            return Vec::new();
        }

        let drained: Vec<T> = state.pending.drain(..count).collect();
        let mut batch = Vec::with_capacity(count);
        for mut item in drained {
            let id = item.id();
            state.pending_ids.remove(&id);
            state.in_flight.insert(id);
            item.set_status(ItemStatus::Dispatched);
            batch.push(item);
        }
        drop(state);

        self.counters
            .dispatched
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        batch
    }

    fn respond_item(&self, item: T) {
        let id = item.id();
        if !self.state.lock().in_flight.remove(&id) {
            self.counters.unknown_responses.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %ServoError::UnknownItem(id), "ignoring response");
            return;
        }

        self.counters.responded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(item = %id, status = ?item.status(), "item responded");
        self.archive(item);
    }
}

impl<T: ServoItem> Default for QueueItemManager<T> {
    fn default() -> Self {
        Self::new(1024)
    }
}

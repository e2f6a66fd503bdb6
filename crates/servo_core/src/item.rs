//! # Items
//!
//! A unit of work flowing through the dispatch loop.
//!
//! ## Lifecycle
//!
//! ```text
//! producer ──enqueue──> Pending ──dequeue──> Dispatched ──unit──> Succeeded / Failed
//!                                                                      │
//!                          ItemManager::respond_item <──respond────────┘
//! ```
//!
//! Items are moved by value through the loop. Identity is the [`ItemId`],
//! never the memory address.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    /// Creates an id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id source, shareable between producer threads.
#[derive(Debug)]
pub struct ItemIdGenerator {
    next: AtomicU64,
}

impl ItemIdGenerator {
    /// Creates a generator whose first id is `1`.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a generator whose first id is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Returns the next unused id.
    #[inline]
    pub fn next_id(&self) -> ItemId {
        ItemId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ItemIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion state of an item, written by whoever holds it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ItemStatus {
    /// Created, not yet handed out.
    #[default]
    Pending,
    /// Handed to a unit manager.
    Dispatched,
    /// The unit finished successfully.
    Succeeded,
    /// The unit (or the routing in front of it) failed.
    Failed(String),
}

impl ItemStatus {
    /// Returns true once a unit has produced a result.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

/// Contract every work item (Command, Order, ...) implements.
///
/// `Clone` is required because a respond event may have several listeners.
pub trait ServoItem: Clone + Send + Sync + 'static {
    /// Identity of the item.
    fn id(&self) -> ItemId;

    /// Routing key used by unit managers to pick an executor.
    fn kind(&self) -> &str;

    /// Current completion state.
    fn status(&self) -> &ItemStatus;

    /// Overwrites the completion state.
    fn set_status(&mut self, status: ItemStatus);
}

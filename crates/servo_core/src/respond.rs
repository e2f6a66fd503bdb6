//! # Respond Event
//!
//! Publish/subscribe channel a unit manager raises once per completed item.
//!
//! ```text
//! ┌──────────────┐  fire(item)  ┌──────────────┐
//! │ UnitManager  │─────────────>│ RespondEvent │──> listener 1
//! │  (workers)   │              │  (snapshot)  │──> listener 2
//! └──────────────┘              └──────────────┘
//! ```
//!
//! `fire` copies the listener list out of the lock before invoking anything,
//! so a listener may add or remove listeners while being called.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Receiver of completed items.
pub trait RespondListener<T>: Send + Sync {
    /// Called once per completed item.
    fn on_respond(&self, item: T);
}

impl<T, F> RespondListener<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn on_respond(&self, item: T) {
        self(item);
    }
}

/// Handle returned by [`RespondEvent::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Multi-listener respond event.
pub struct RespondEvent<T> {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn RespondListener<T>>)>>,
    next_id: AtomicU64,
}

impl<T: Clone> RespondEvent<T> {
    /// Creates an event with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribes a listener.
    pub fn add_listener(&self, listener: Arc<dyn RespondListener<T>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Unsubscribes a listener. Returns false if it was not subscribed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of active listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Delivers `item` to every listener subscribed at the time of the call.
    pub fn fire(&self, item: T) {
        let snapshot: Vec<Arc<dyn RespondListener<T>>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let Some((last, rest)) = snapshot.split_last() else {
            tracing::trace!("respond fired with no listeners");
            return;
        };
        for listener in rest {
            listener.on_respond(item.clone());
        }
        last.on_respond(item);
    }
}

impl<T: Clone> Default for RespondEvent<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for RespondEvent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RespondEvent")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

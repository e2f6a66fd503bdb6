//! # Unit Manager
//!
//! The executor side of the dispatch loop.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────── RegistryUnitManager ───────────────────────┐
//! execute(item) ─>│ Inline:      lookup(kind) ─> Unit::execute ─> RespondEvent::fire   │
//!                 │ Background:  channel ─> worker N ─> Unit::execute ─> fire         │
//!                 └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every item handed to `execute` is responded exactly once, including items
//! whose kind has no registered unit (they come back `Failed`). A unit that
//! panics fails its item; the worker keeps running.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{ServoError, ServoResult};
use crate::item::{ItemStatus, ServoItem};
use crate::respond::RespondEvent;

/// A stateless executor for one kind of item.
pub trait Unit<T>: Send + Sync {
    /// Runs the item, writing any result into it.
    ///
    /// # Errors
    ///
    /// Any error marks the item `Failed`; it is still responded.
    fn execute(&self, item: &mut T) -> ServoResult<()>;
}

impl<T, F> Unit<T> for F
where
    F: Fn(&mut T) -> ServoResult<()> + Send + Sync,
{
    fn execute(&self, item: &mut T) -> ServoResult<()> {
        self(item)
    }
}

/// Executes items and reports completion.
pub trait UnitManager<T>: Send + Sync {
    /// Routes the item to its executor. May return before the item has run.
    fn execute(&self, item: T);

    /// Event raised once per completed item.
    fn respond_event(&self) -> &RespondEvent<T>;
}

/// Where a [`RegistryUnitManager`] runs its units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// On the thread calling `execute`.
    Inline,
    /// On a pool of background threads.
    Background {
        /// Number of worker threads (at least one is spawned).
        workers: usize,
    },
}

impl ExecutionMode {
    /// `Inline` for zero workers, `Background` otherwise.
    #[must_use]
    pub const fn from_workers(workers: usize) -> Self {
        if workers == 0 {
            Self::Inline
        } else {
            Self::Background { workers }
        }
    }
}

/// Counters kept by a [`RegistryUnitManager`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnitStats {
    /// Items accepted by `execute`.
    pub accepted: u64,
    /// Items whose unit returned `Ok`.
    pub succeeded: u64,
    /// Items that failed (unit error, missing unit, stopped workers).
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

struct Shared<T> {
    units: RwLock<HashMap<String, Arc<dyn Unit<T>>>>,
    respond: RespondEvent<T>,
    counters: Counters,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

impl<T: ServoItem> Shared<T> {
    fn new() -> Self {
        Self {
            units: RwLock::new(HashMap::new()),
            respond: RespondEvent::new(),
            counters: Counters::default(),
        }
    }

    fn run(&self, mut item: T) {
        let unit = self.units.read().get(item.kind()).cloned();
        let outcome = match unit {
            Some(unit) => panic::catch_unwind(AssertUnwindSafe(|| unit.execute(&mut item)))
                .unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(item = %item.id(), kind = item.kind(), %message, "unit panicked");
                    Err(ServoError::UnitPanicked(message))
                }),
            None => Err(ServoError::NoUnit(item.kind().to_owned())),
        };
        self.complete(item, outcome);
    }

    fn complete(&self, mut item: T, outcome: ServoResult<()>) {
        match outcome {
            Ok(()) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                item.set_status(ItemStatus::Succeeded);
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(item = %item.id(), kind = item.kind(), error = %err, "unit failed");
                item.set_status(ItemStatus::Failed(err.to_string()));
            }
        }
        self.respond.fire(item);
    }
}

/// Unit manager backed by a kind → unit registry.
pub struct RegistryUnitManager<T: ServoItem> {
    shared: Arc<Shared<T>>,
    mode: ExecutionMode,
    sender: Mutex<Option<Sender<T>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: ServoItem> RegistryUnitManager<T> {
    /// Creates a manager in the given mode, spawning workers if needed.
    ///
    /// # Errors
    ///
    /// Returns `Io` if a worker thread cannot be spawned.
    pub fn new(mode: ExecutionMode) -> ServoResult<Self> {
        let shared = Arc::new(Shared::new());

        let (sender, workers) = match mode {
            ExecutionMode::Inline => (None, Vec::new()),
            ExecutionMode::Background { workers } => {
                let (sender, receiver) = unbounded::<T>();
                let mut handles = Vec::with_capacity(workers.max(1));
                for index in 0..workers.max(1) {
                    handles.push(spawn_worker(index, receiver.clone(), Arc::clone(&shared))?);
                }
                (Some(sender), handles)
            }
        };

        tracing::debug!(?mode, "unit manager created");
        Ok(Self {
            shared,
            mode,
            sender: Mutex::new(sender),
            workers: Mutex::new(workers),
        })
    }

    /// Creates a manager that runs units on the calling thread.
    #[must_use]
    pub fn inline() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            mode: ExecutionMode::Inline,
            sender: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Registers `unit` for `kind`, returning the unit it replaced.
    pub fn register(
        &self,
        kind: impl Into<String>,
        unit: Arc<dyn Unit<T>>,
    ) -> Option<Arc<dyn Unit<T>>> {
        self.shared.units.write().insert(kind.into(), unit)
    }

    /// Removes the unit for `kind`.
    pub fn unregister(&self, kind: &str) -> Option<Arc<dyn Unit<T>>> {
        self.shared.units.write().remove(kind)
    }

    /// Returns true if a unit is registered for `kind`.
    #[must_use]
    pub fn has_unit(&self, kind: &str) -> bool {
        self.shared.units.read().contains_key(kind)
    }

    /// Execution mode chosen at construction.
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> UnitStats {
        let counters = &self.shared.counters;
        UnitStats {
            accepted: counters.accepted.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting background work, lets workers drain, and joins them.
    ///
    /// Items executed afterwards are responded `Failed` immediately.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            // Reached from a worker when it drops the last handle to this manager.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("unit worker panicked");
            }
        }
    }
}

impl<T: ServoItem> UnitManager<T> for RegistryUnitManager<T> {
    fn execute(&self, item: T) {
        self.shared.counters.accepted.fetch_add(1, Ordering::Relaxed);

        if self.mode == ExecutionMode::Inline {
            self.shared.run(item);
            return;
        }

        let rejected = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(item).err().map(|err| err.into_inner()),
            None => Some(item),
        };
        if let Some(item) = rejected {
            self.shared.complete(item, Err(ServoError::WorkersStopped));
        }
    }

    fn respond_event(&self) -> &RespondEvent<T> {
        &self.shared.respond
    }
}

impl<T: ServoItem> Drop for RegistryUnitManager<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker<T: ServoItem>(
    index: usize,
    receiver: Receiver<T>,
    shared: Arc<Shared<T>>,
) -> ServoResult<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("servo-unit-{index}"))
        .spawn(move || {
            while let Ok(item) = receiver.recv() {
                shared.run(item);
            }
            tracing::trace!(worker = index, "unit worker exiting");
        })?;
    Ok(handle)
}

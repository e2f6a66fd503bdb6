//! # Dispatch Processor
//!
//! Ties one [`ItemManager`] to one [`UnitManager`] and moves items between
//! them once per tick.
//!
//! ## Tick
//!
//! ```text
//! tick()
//!  ├─ unbound?  ──> log (per policy), no-op
//!  ├─ ItemManager::dequeue_items(limit)
//!  └─ for item in batch (queue order) ──> UnitManager::execute(item)
//!
//! UnitManager respond event ──> forwarder ──> ItemManager::respond_item(item)
//! ```
//!
//! ## Threading
//!
//! The binding lives behind a `RwLock`. Every entry point clones the bound
//! `Arc`s and releases the lock before calling out, so a unit manager that
//! responds synchronously from inside `execute` re-enters safely.
//!
//! The listener registered on a unit manager holds a `Weak` to the processor
//! and the binding generation it was created for. Responses arriving through
//! a listener from an older binding are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::config::{ProcessorConfig, UnboundLogPolicy};
use crate::error::ServoError;
use crate::item::ServoItem;
use crate::manager::ItemManager;
use crate::respond::{ListenerId, RespondListener};
use crate::unit::UnitManager;

/// Anything driven by a scheduler once per scheduling quantum.
pub trait Tickable: Send + Sync {
    /// Advances one step.
    fn tick(&self);

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Whether a processor can currently move items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessorState {
    /// At least one manager is missing.
    Unbound,
    /// Both managers are set.
    Bound,
}

/// Counters kept by a [`DispatchProcessor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Ticks that ran against bound managers.
    pub ticks: u64,
    /// Ticks skipped because the processor was unbound.
    pub skipped_ticks: u64,
    /// Items handed to the unit manager.
    pub dispatched: u64,
    /// Responses forwarded to the item manager.
    pub responded: u64,
    /// Responses dropped (unbound or from a stale binding).
    pub dropped_responses: u64,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    dispatched: AtomicU64,
    responded: AtomicU64,
    dropped_responses: AtomicU64,
}

struct Binding<T> {
    item_manager: Option<Arc<dyn ItemManager<T>>>,
    unit_manager: Option<Arc<dyn UnitManager<T>>>,
    subscription: Option<ListenerId>,
    generation: u64,
}

struct Inner<T> {
    name: String,
    config: ProcessorConfig,
    binding: RwLock<Binding<T>>,
    counters: Counters,
}

/// Listener installed on the bound unit manager.
struct RespondForwarder<T> {
    processor: Weak<Inner<T>>,
    generation: u64,
}

impl<T: ServoItem> RespondListener<T> for RespondForwarder<T> {
    fn on_respond(&self, item: T) {
        if let Some(inner) = self.processor.upgrade() {
            inner.forward(item, Some(self.generation));
        }
    }
}

fn same_manager<T>(a: &Arc<dyn UnitManager<T>>, b: &Arc<dyn UnitManager<T>>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

impl<T: ServoItem> Inner<T> {
    fn bound_pair(&self) -> Option<(Arc<dyn ItemManager<T>>, Arc<dyn UnitManager<T>>)> {
        let binding = self.binding.read();
        match (&binding.item_manager, &binding.unit_manager) {
            (Some(items), Some(units)) => Some((Arc::clone(items), Arc::clone(units))),
            _ => None,
        }
    }

    fn report_unbound(&self, entry: &str) {
        let err = ServoError::Unbound;
        match self.config.unbound_log {
            UnboundLogPolicy::Warn => {
                tracing::warn!(processor = %self.name, entry, error = %err, "skipped");
            }
            UnboundLogPolicy::Debug => {
                tracing::debug!(processor = %self.name, entry, error = %err, "skipped");
            }
            UnboundLogPolicy::Silent => {}
        }
    }

    fn forward(&self, item: T, generation: Option<u64>) {
        let items = {
            let binding = self.binding.read();
            if generation.is_some_and(|g| g != binding.generation) {
                drop(binding);
                self.counters.dropped_responses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(processor = %self.name, item = %item.id(), "stale response dropped");
                return;
            }
            if binding.unit_manager.is_some() {
                binding.item_manager.clone()
            } else {
                None
            }
        };
        let Some(items) = items else {
            self.counters.dropped_responses.fetch_add(1, Ordering::Relaxed);
            self.report_unbound("respond");
            return;
        };

        tracing::trace!(processor = %self.name, item = %item.id(), "forwarding response");
        items.respond_item(item);
        self.counters.responded.fetch_add(1, Ordering::Relaxed);
    }

    /// Swaps the unit manager: unsubscribe from the old one, then subscribe to the new one.
    ///
    /// Returns the displaced manager. Callers drop it after releasing the
    /// binding lock: dropping the last handle to a manager may join worker
    /// threads that are waiting on `forward`.
    #[must_use]
    fn rebind_units(
        self: &Arc<Self>,
        binding: &mut Binding<T>,
        unit_manager: Option<Arc<dyn UnitManager<T>>>,
    ) -> Option<Arc<dyn UnitManager<T>>> {
        let unchanged = match (&binding.unit_manager, &unit_manager) {
            (Some(old), Some(new)) => same_manager(old, new),
            _ => false,
        };

        let displaced = binding.unit_manager.take();
        if let (Some(old), Some(id)) = (&displaced, binding.subscription.take()) {
            old.respond_event().remove_listener(id);
        }

        if !unchanged {
            binding.generation += 1;
        }

        if let Some(units) = &unit_manager {
            let forwarder = RespondForwarder {
                processor: Arc::downgrade(self),
                generation: binding.generation,
            };
            binding.subscription = Some(units.respond_event().add_listener(Arc::new(forwarder)));
        }
        binding.unit_manager = unit_manager;
        displaced
    }

    /// Unbinds both managers, handing them back to be dropped outside the lock.
    fn unbind(self: &Arc<Self>) -> Displaced<T> {
        let mut binding = self.binding.write();
        let items = binding.item_manager.take();
        let units = self.rebind_units(&mut binding, None);
        (items, units)
    }
}

type Displaced<T> = (Option<Arc<dyn ItemManager<T>>>, Option<Arc<dyn UnitManager<T>>>);

/// Coordinator moving items from an item manager to a unit manager.
pub struct DispatchProcessor<T: ServoItem> {
    inner: Arc<Inner<T>>,
}

impl<T: ServoItem> DispatchProcessor<T> {
    /// Creates an unbound processor.
    #[must_use]
    pub fn new(name: impl Into<String>, config: ProcessorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                binding: RwLock::new(Binding {
                    item_manager: None,
                    unit_manager: None,
                    subscription: None,
                    generation: 0,
                }),
                counters: Counters::default(),
            }),
        }
    }

    /// Creates an unbound processor with default configuration.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, ProcessorConfig::default())
    }

    /// Binds both managers in one step.
    ///
    /// The previous unit manager (if any) loses this processor's listener
    /// before the new one gains it.
    pub fn initialize(
        &self,
        item_manager: Arc<dyn ItemManager<T>>,
        unit_manager: Arc<dyn UnitManager<T>>,
    ) {
        let mut binding = self.inner.binding.write();
        let old_items = binding.item_manager.replace(item_manager);
        let old_units = self.inner.rebind_units(&mut binding, Some(unit_manager));
        drop(binding);
        drop((old_items, old_units));
        tracing::info!(processor = %self.inner.name, "processor bound");
    }

    /// Sets or clears the item manager.
    pub fn set_item_manager(&self, item_manager: Option<Arc<dyn ItemManager<T>>>) {
        let old = std::mem::replace(&mut self.inner.binding.write().item_manager, item_manager);
        drop(old);
    }

    /// Sets or clears the unit manager, moving the respond subscription.
    pub fn set_unit_manager(&self, unit_manager: Option<Arc<dyn UnitManager<T>>>) {
        let mut binding = self.inner.binding.write();
        let old = self.inner.rebind_units(&mut binding, unit_manager);
        drop(binding);
        drop(old);
    }

    /// Drops both managers and the respond subscription.
    pub fn clear(&self) {
        drop(self.inner.unbind());
        tracing::info!(processor = %self.inner.name, "processor unbound");
    }

    /// Current binding state.
    #[must_use]
    pub fn state(&self) -> ProcessorState {
        let binding = self.inner.binding.read();
        if binding.item_manager.is_some() && binding.unit_manager.is_some() {
            ProcessorState::Bound
        } else {
            ProcessorState::Unbound
        }
    }

    /// Processor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration the processor was built with.
    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.inner.config
    }

    /// Dispatches one batch of pending items.
    ///
    /// Unbound processors skip the tick; nothing is ever propagated.
    pub fn tick(&self) {
        let Some((items, units)) = self.inner.bound_pair() else {
            self.inner.counters.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            self.inner.report_unbound("tick");
            return;
        };
        self.inner.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let batch = items.dequeue_items(self.inner.config.batch_limit());
        if batch.is_empty() {
            return;
        }

        let count = batch.len() as u64;
        for item in batch {
            tracing::trace!(processor = %self.inner.name, item = %item.id(), kind = item.kind(), "dispatch");
            units.execute(item);
        }
        self.inner.counters.dispatched.fetch_add(count, Ordering::Relaxed);
    }

    /// Forwards a completed item to the bound item manager.
    ///
    /// Called by the respond listener; callable directly by hosts that
    /// collect completions themselves. Unbound processors drop the item.
    pub fn on_unit_respond(&self, item: T) {
        self.inner.forward(item, None);
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> ProcessorStats {
        let counters = &self.inner.counters;
        ProcessorStats {
            ticks: counters.ticks.load(Ordering::Relaxed),
            skipped_ticks: counters.skipped_ticks.load(Ordering::Relaxed),
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            responded: counters.responded.load(Ordering::Relaxed),
            dropped_responses: counters.dropped_responses.load(Ordering::Relaxed),
        }
    }
}

impl<T: ServoItem> Tickable for DispatchProcessor<T> {
    fn tick(&self) {
        DispatchProcessor::tick(self);
    }

    fn name(&self) -> &str {
        DispatchProcessor::name(self)
    }
}

impl<T: ServoItem> Drop for DispatchProcessor<T> {
    fn drop(&mut self) {
        drop(self.inner.unbind());
    }
}

impl<T: ServoItem> std::fmt::Debug for DispatchProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchProcessor")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

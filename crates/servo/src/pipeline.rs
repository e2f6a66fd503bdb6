//! # Servo Pipeline
//!
//! One item type wired end to end: a queue item manager, a registry unit
//! manager and the processor bound to both.

use std::sync::Arc;

use servo_core::{
    DispatchProcessor, ExecutionMode, ItemManager, ProcessorStats, QueueItemManager, QueueStats,
    RegistryUnitManager, ServoConfig, ServoItem, ServoResult, Tickable, Unit, UnitManager,
    UnitStats,
};

/// Snapshot of every counter in a pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Item manager counters.
    pub queue: QueueStats,
    /// Unit manager counters.
    pub units: UnitStats,
    /// Processor counters.
    pub processor: ProcessorStats,
}

/// A bound processor together with the managers it owns handles to.
pub struct ServoPipeline<T: ServoItem> {
    items: Arc<QueueItemManager<T>>,
    units: Arc<RegistryUnitManager<T>>,
    processor: Arc<DispatchProcessor<T>>,
}

impl<T: ServoItem> ServoPipeline<T> {
    /// Builds and binds a pipeline from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Io` if background workers cannot be spawned.
    pub fn from_config(name: &str, config: &ServoConfig) -> ServoResult<Self> {
        let mode = ExecutionMode::from_workers(config.units.workers);
        Self::with_mode(name, config, mode)
    }

    /// Builds and binds a pipeline with an explicit execution mode.
    ///
    /// # Errors
    ///
    /// Returns `Io` if background workers cannot be spawned.
    pub fn with_mode(name: &str, config: &ServoConfig, mode: ExecutionMode) -> ServoResult<Self> {
        let items = Arc::new(QueueItemManager::new(config.units.completed_capacity));
        let units = Arc::new(RegistryUnitManager::new(mode)?);
        let processor = Arc::new(DispatchProcessor::new(name, config.processor.clone()));

        let item_manager: Arc<dyn ItemManager<T>> = items.clone();
        let unit_manager: Arc<dyn UnitManager<T>> = units.clone();
        processor.initialize(item_manager, unit_manager);

        Ok(Self {
            items,
            units,
            processor,
        })
    }

    /// Registers a unit for `kind`.
    pub fn register(&self, kind: impl Into<String>, unit: Arc<dyn Unit<T>>) -> &Self {
        self.units.register(kind, unit);
        self
    }

    /// Queues an item for dispatch.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateItem` if the id is already pending or in flight.
    pub fn submit(&self, item: T) -> ServoResult<()> {
        self.items.enqueue(item)
    }

    /// Takes every completed item collected so far.
    pub fn take_completed(&self) -> Vec<T> {
        self.items.drain_completed()
    }

    /// Returns true when nothing is pending or in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.items.pending_count() == 0 && self.items.in_flight_count() == 0
    }

    /// The processor, for handing to a scheduler.
    #[must_use]
    pub fn processor(&self) -> Arc<DispatchProcessor<T>> {
        Arc::clone(&self.processor)
    }

    /// The processor as a scheduler entry.
    #[must_use]
    pub fn tickable(&self) -> Arc<dyn Tickable> {
        self.processor.clone()
    }

    /// The item manager.
    #[must_use]
    pub fn items(&self) -> &Arc<QueueItemManager<T>> {
        &self.items
    }

    /// The unit manager.
    #[must_use]
    pub fn units(&self) -> &Arc<RegistryUnitManager<T>> {
        &self.units
    }

    /// Snapshot of every counter.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            queue: self.items.stats(),
            units: self.units.stats(),
            processor: self.processor.stats(),
        }
    }
}

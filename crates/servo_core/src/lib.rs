//! # SERVO Core
//!
//! Host-agnostic dispatch loop: a processor pulls pending items from an
//! item manager on every tick, hands them to a unit manager, and forwards
//! completion notifications back to the item manager.
//!
//! ## Architecture
//!
//! ```text
//!            tick()                         execute(item)
//! ┌─────────────┐  dequeue  ┌───────────────────┐ ───────> ┌─────────────┐
//! │ ItemManager │ ────────> │ DispatchProcessor │          │ UnitManager │
//! │  (queue)    │ <──────── │                   │ <─────── │  (units)    │
//! └─────────────┘  respond  └───────────────────┘  respond └─────────────┘
//!                                                  event
//! ```
//!
//! ## Rules
//!
//! 1. **Never panic on missing wiring** - an unbound processor logs and no-ops
//! 2. **Queue order is dispatch order** - the processor never reorders or fans out
//! 3. **One subscription per binding** - rebinding unsubscribes before subscribing
//!
//! ## Example
//!
//! ```rust,ignore
//! use servo_core::{DispatchProcessor, QueueItemManager, RegistryUnitManager};
//!
//! let items = Arc::new(QueueItemManager::new(1024));
//! let units = Arc::new(RegistryUnitManager::inline());
//! units.register("move", Arc::new(MoveUnit));
//!
//! let processor = DispatchProcessor::with_defaults("commands");
//! processor.initialize(items.clone(), units.clone());
//!
//! items.enqueue(command)?;
//! processor.tick();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod item;
pub mod manager;
pub mod processor;
pub mod respond;
pub mod unit;

pub use config::{ProcessorConfig, SchedulerConfig, ServoConfig, UnboundLogPolicy, UnitsConfig};
pub use error::{ServoError, ServoResult};
pub use item::{ItemId, ItemIdGenerator, ItemStatus, ServoItem};
pub use manager::{ItemManager, QueueItemManager, QueueStats};
pub use processor::{DispatchProcessor, ProcessorState, ProcessorStats, Tickable};
pub use respond::{ListenerId, RespondEvent, RespondListener};
pub use unit::{ExecutionMode, RegistryUnitManager, Unit, UnitManager, UnitStats};

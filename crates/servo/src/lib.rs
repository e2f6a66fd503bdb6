//! # SERVO
//!
//! Command and order servos built on `servo_core`, plus the pieces a host
//! needs to run them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ServoScheduler                           │
//! │                     (fixed rate, own thread)                     │
//! │        tick()                                   tick()           │
//! │          │                                        │              │
//! │  ┌───────▼────────┐                      ┌────────▼───────┐      │
//! │  │ CommandServo   │                      │ OrderServo     │      │
//! │  │ queue ─ proc ─ │                      │ queue ─ proc ─ │      │
//! │  │        units   │                      │        units   │      │
//! │  └────────────────┘                      └────────────────┘      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `command` / `order`: item types and pipeline aliases
//! - `pipeline`: generic wiring of one item type
//! - `scheduler`: fixed-timestep driver
//! - `logging`: console + daily file logs

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod command;
pub mod error;
pub mod logging;
pub mod order;
pub mod pipeline;
pub mod scheduler;

pub use servo_core as core;

pub use command::{
    command_servo, Command, CommandManager, CommandServo, CommandServoProcessor,
    CommandUnitManager,
};
pub use error::{AppError, AppResult};
pub use logging::{init_logging, LoggingGuard};
pub use order::{order_servo, Order, OrderManager, OrderServo, OrderServoProcessor, OrderUnitManager};
pub use pipeline::{PipelineStats, ServoPipeline};
pub use scheduler::{SchedulerHandle, ServoScheduler, TickLoop, TickStats};

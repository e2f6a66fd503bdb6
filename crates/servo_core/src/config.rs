//! # Servo Configuration
//!
//! All tunables are loaded once at startup from a TOML file.
//!
//! ```toml
//! [processor]
//! max_items_per_tick = 256
//! unbounded_drain = false
//! unbound_log = "warn"
//!
//! [scheduler]
//! tick_rate = 60
//!
//! [units]
//! workers = 4
//! completed_capacity = 1024
//! ```
//!
//! Every section and field is optional; missing values take the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ServoError, ServoResult};

/// Default cap on items dispatched in one tick.
pub const DEFAULT_MAX_ITEMS_PER_TICK: usize = 256;

/// Default scheduler rate in Hz.
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Highest tick rate with a non-zero microsecond period.
pub const MAX_TICK_RATE: u32 = 1_000_000;

/// How a processor reports a tick or respond skipped because it is unbound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnboundLogPolicy {
    /// Log at `warn`.
    #[default]
    Warn,
    /// Log at `debug`.
    Debug,
    /// Do not log.
    Silent,
}

/// Configuration for a [`DispatchProcessor`](crate::DispatchProcessor).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Maximum items pulled from the item manager per tick.
    pub max_items_per_tick: usize,
    /// Ignore the cap and drain everything pending each tick.
    pub unbounded_drain: bool,
    /// Reporting of skipped calls while unbound.
    pub unbound_log: UnboundLogPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_items_per_tick: DEFAULT_MAX_ITEMS_PER_TICK,
            unbounded_drain: false,
            unbound_log: UnboundLogPolicy::Warn,
        }
    }
}

impl ProcessorConfig {
    /// Limit passed to [`ItemManager::dequeue_items`](crate::ItemManager::dequeue_items).
    #[inline]
    #[must_use]
    pub fn batch_limit(&self) -> Option<usize> {
        if self.unbounded_drain {
            None
        } else {
            Some(self.max_items_per_tick)
        }
    }

    /// Checks the values are usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the cap is zero and draining is bounded.
    pub fn validate(&self) -> ServoResult<()> {
        if !self.unbounded_drain && self.max_items_per_tick == 0 {
            return Err(ServoError::InvalidConfig(
                "processor.max_items_per_tick must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the fixed-rate scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Ticks per second.
    pub tick_rate: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
        }
    }
}

/// Configuration for the reference managers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitsConfig {
    /// Background worker threads; `0` runs units inline.
    pub workers: usize,
    /// Completed items kept by a queue item manager before eviction.
    pub completed_capacity: usize,
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            completed_capacity: 1024,
        }
    }
}

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// Processor section.
    pub processor: ProcessorConfig,
    /// Scheduler section.
    pub scheduler: SchedulerConfig,
    /// Units section.
    pub units: UnitsConfig,
}

impl ServoConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on malformed TOML or out-of-range values.
    pub fn from_toml_str(source: &str) -> ServoResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, `InvalidConfig` otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> ServoResult<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first bad value.
    pub fn validate(&self) -> ServoResult<()> {
        self.processor.validate()?;
        if self.scheduler.tick_rate == 0 {
            return Err(ServoError::InvalidConfig(
                "scheduler.tick_rate must be greater than zero".into(),
            ));
        }
        if self.scheduler.tick_rate > MAX_TICK_RATE {
            return Err(ServoError::InvalidConfig(format!(
                "scheduler.tick_rate must be at most {MAX_TICK_RATE}"
            )));
        }
        Ok(())
    }
}

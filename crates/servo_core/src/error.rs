//! # Servo Error Types
//!
//! All errors that can occur in the dispatch loop.

use thiserror::Error;

use crate::item::ItemId;

/// Errors that can occur in the servo system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServoError {
    /// The processor has no item manager or no unit manager bound.
    #[error("processor unbound: item manager or unit manager is not set")]
    Unbound,

    /// An item was responded that the item manager never dispatched.
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    /// An item with this id is already pending or in flight.
    #[error("duplicate item: {0} is already pending or in flight")]
    DuplicateItem(ItemId),

    /// No unit is registered for the item's kind.
    #[error("no unit registered for kind `{0}`")]
    NoUnit(String),

    /// A unit ran the item and reported failure.
    #[error("unit failed on item {id}: {reason}")]
    UnitFailed {
        /// The item that failed.
        id: ItemId,
        /// Reason reported by the unit.
        reason: String,
    },

    /// A unit panicked while running the item.
    #[error("unit panicked: {0}")]
    UnitPanicked(String),

    /// The background workers were shut down before the item could run.
    #[error("unit workers stopped")]
    WorkersStopped,

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ServoError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ServoError {
    fn from(err: toml::de::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Result type for servo operations.
pub type ServoResult<T> = Result<T, ServoError>;

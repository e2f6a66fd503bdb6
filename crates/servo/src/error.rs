//! # Application Error Types
//!
//! Errors surfaced by the runnable parts of the crate (logging, scheduler
//! thread, demo wiring). Dispatch-level failures stay inside `ServoError`.

use servo_core::ServoError;
use thiserror::Error;

/// Errors that can occur while setting up or running servos.
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from the dispatch engine.
    #[error(transparent)]
    Servo(#[from] ServoError),

    /// Filesystem or thread spawn failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A global logger was already installed.
    #[error("logging init failed: {0}")]
    Logging(String),
}

/// Result type for application operations.
pub type AppResult<T> = Result<T, AppError>;

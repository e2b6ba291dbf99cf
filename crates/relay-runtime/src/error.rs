//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use relay_core::UpdateError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An inbound payload was not a valid update.
    #[error(transparent)]
    Decode(#[from] UpdateError),

    /// The dispatch loop has stopped and no longer accepts updates.
    #[error("Update queue is closed")]
    QueueClosed,

    /// The update queue is at capacity.
    #[error("Update queue is full")]
    QueueFull,

    /// `run` was called while the dispatch loop was already running, or after it finished.
    #[error("Runtime is already running")]
    AlreadyRunning,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

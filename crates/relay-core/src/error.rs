//! Error types for the update model.

use thiserror::Error;

/// Errors that can occur while decoding an update payload.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The payload is not valid JSON or does not have the update shape.
    #[error("failed to decode update: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for update decoding.
pub type UpdateResult<T> = Result<T, UpdateError>;

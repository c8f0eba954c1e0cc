//! Error types for the embedded runtime.

use crate::outcome::ErrorKind;
use thiserror::Error;

/// Errors that can occur while managing the embedded runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The runtime failed to initialize or was used after shutdown.
    #[error("Runtime unavailable: {0}")]
    Unavailable(String),

    /// A process-wide runtime is already live.
    #[error("Runtime already initialized")]
    AlreadyInitialized,

    /// The runtime environment could not be resolved.
    #[error("Invalid runtime environment: {0}")]
    InvalidEnvironment(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Outcome category this error is reported as.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::RuntimeUnavailable
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

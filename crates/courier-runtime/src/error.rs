//! Runtime error types.

use thiserror::Error;

use courier_framework::{ConfigurationError, ServerError};

use crate::config::ConfigError;

/// Errors that can occur while hosting a dispatch server.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The server failed to set up, start or close.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The listen callback was dropped before reporting a result.
    #[error("listen callback dropped before reporting")]
    ListenAborted,

    /// Shutdown signal handlers could not be installed.
    #[error("Failed to install signal handler: {0}")]
    Signal(String),
}

impl From<ConfigurationError> for RuntimeError {
    fn from(err: ConfigurationError) -> Self {
        Self::Server(err.into())
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

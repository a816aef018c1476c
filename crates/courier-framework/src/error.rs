//! Error types for the Courier framework.

use thiserror::Error;

use courier_core::{ConnectionError, DecodeError, HandlerError};

use crate::server::ServerState;

/// Errors that can occur while resolving a handler argument.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// No resolver is bound at this position.
    #[error("no resolver bound for parameter {position}")]
    Unbound {
        /// Parameter position.
        position: usize,
    },

    /// The bound resolver does not produce the requested type.
    #[error("parameter {position} expects '{expected}' but is bound to {bound}")]
    BindingMismatch {
        /// Parameter position.
        position: usize,
        /// Expected type name.
        expected: &'static str,
        /// Description of the bound resolver.
        bound: String,
    },

    /// The payload could not be decoded or validated.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The extractor rejected the request with a client-facing error.
    #[error(transparent)]
    Rejected(#[from] HandlerError),

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

impl From<ExtractError> for HandlerError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Decode(e) => e.into(),
            ExtractError::Rejected(e) => e,
            ExtractError::Custom(msg) => HandlerError::bad_request(msg),
            other => HandlerError::internal(other.to_string()),
        }
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Fatal setup-time errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A handler is declared on a function that is not bound to its component.
    #[error("handler '{handler}' is not an instance method")]
    StaticHandler {
        /// `Component.method` of the handler.
        handler: String,
    },

    /// Two handlers resolve to the same routing pattern.
    #[error("routing pattern '{pattern}' is claimed by both '{first}' and '{second}'")]
    PatternCollision {
        /// The shared pattern.
        pattern: String,
        /// Handler registered first.
        first: String,
        /// Handler that collided with it.
        second: String,
    },

    /// No handler with this component and method is registered.
    #[error("no handler '{method}' registered on component '{component}'")]
    UnknownHandler {
        /// Component type name.
        component: &'static str,
        /// Method name.
        method: String,
    },
}

/// Result type for setup operations.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Errors raised by the dispatch server lifecycle.
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The operation is not valid in the server's current state.
    #[error("cannot {operation} while the server is {state:?}")]
    InvalidState {
        /// Current state.
        state: ServerState,
        /// Attempted operation.
        operation: &'static str,
    },
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

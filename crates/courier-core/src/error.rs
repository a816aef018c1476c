//! Unified error types for the Courier core.
//!
//! Framework-level errors (extraction, configuration, server state) are
//! defined in `courier-framework`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Connection Errors
// =============================================================================

/// Errors raised by the messaging runtime's connection lifecycle.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// The broker could not be reached.
    #[error("connection failed: {url} - {reason}")]
    ConnectFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The connection is closed.
    #[error("connection closed")]
    Closed,

    /// Registering subscriptions failed.
    #[error("failed to register subscriptions: {0}")]
    Register(String),

    /// Any other runtime failure.
    #[error("messaging runtime error: {0}")]
    Other(String),
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

// =============================================================================
// Decode Errors
// =============================================================================

/// Errors turning a delivery body into a typed payload.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The body is not a valid encoding of the message.
    #[error("malformed '{message}' payload: {reason}")]
    Malformed {
        /// Message name.
        message: String,
        /// Reason for failure.
        reason: String,
    },

    /// The body decoded but failed validation.
    #[error("invalid '{message}' payload: {reason}")]
    Invalid {
        /// Message name.
        message: String,
        /// Reason for failure.
        reason: String,
    },
}

impl DecodeError {
    /// Builds a validation failure for `message`.
    pub fn invalid(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Handler Errors
// =============================================================================

/// Classification of a handler failure reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
}

/// An error returned by a handler invocation.
///
/// Errors with an [`ErrorType`] are client-facing and get published to the
/// error exchange by the messaging runtime. Errors without one are only
/// logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct HandlerError {
    /// Client-facing classification, if any.
    pub error_type: Option<ErrorType>,
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl HandlerError {
    /// Creates an untyped error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: None,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a typed, client-facing error.
    pub fn typed(error_type: ErrorType, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: Some(error_type),
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::typed(ErrorType::Unauthorized, "UNAUTHORIZED", "Unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::typed(ErrorType::Forbidden, "FORBIDDEN", "Forbidden")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::typed(ErrorType::BadRequest, "BAD_REQUEST", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::typed(ErrorType::InternalServerError, "INTERNAL_SERVER_ERROR", message)
    }
}

impl From<DecodeError> for HandlerError {
    fn from(err: DecodeError) -> Self {
        Self::bad_request(err.to_string())
    }
}

/// Result type for handler invocations.
pub type HandlerResult<T> = Result<T, HandlerError>;

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors raised while dispatching one delivery.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// No handler is registered for the delivery's consumer tag.
    #[error("no handler registered for consumer tag '{tag}'")]
    NoHandler {
        /// The unmatched tag.
        tag: String,
    },

    /// The handler failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_becomes_bad_request() {
        let err: HandlerError = DecodeError::invalid("foo", "name must not be empty").into();
        assert_eq!(err.error_type, Some(ErrorType::BadRequest));
        assert!(err.message.contains("name must not be empty"));
    }

    #[test]
    fn test_handler_error_passes_through_dispatch_error() {
        let err: DispatchError = HandlerError::unauthorized().into();
        assert_eq!(err.to_string(), "UNAUTHORIZED: Unauthorized");
        assert!(matches!(err, DispatchError::Handler(e) if e.error_type == Some(ErrorType::Unauthorized)));
    }
}

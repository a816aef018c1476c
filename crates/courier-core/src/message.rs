//! Typed message payloads and their exchange metadata.
//!
//! Every payload that travels through the broker is a Rust type implementing
//! [`Message`]. The associated [`MessageMeta`] names the exchange the message
//! is published to and how queues bind to it.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_core::{ExchangeType, Message, MessageMeta};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Bar {
//!     msg: String,
//! }
//!
//! impl Message for Bar {
//!     const META: MessageMeta = MessageMeta::new("bar").exchange_type(ExchangeType::Direct);
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, ErrorType};

/// How an exchange routes messages to the queues bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    /// Exact routing-key match.
    Direct,
    /// Every bound queue receives every message.
    #[default]
    Fanout,
    /// Dot-separated routing keys matched against `*` / `#` patterns.
    Topic,
}

impl ExchangeType {
    /// Returns the lowercase AMQP name of this exchange type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Fanout => "fanout",
            Self::Topic => "topic",
        }
    }
}

impl std::fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static routing metadata of a message type.
///
/// The message name doubles as the exchange name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MessageMeta {
    /// Message (and exchange) name.
    pub name: &'static str,
    /// Exchange type used when declaring the exchange.
    pub exchange_type: ExchangeType,
    /// Routing key used when publishing without an explicit key.
    pub routing_key: Option<&'static str>,
}

impl MessageMeta {
    /// Creates metadata for a fanout message named `name`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            exchange_type: ExchangeType::Fanout,
            routing_key: None,
        }
    }

    /// Sets the exchange type.
    pub const fn exchange_type(mut self, exchange_type: ExchangeType) -> Self {
        self.exchange_type = exchange_type;
        self
    }

    /// Sets the default routing key.
    pub const fn routing_key(mut self, routing_key: &'static str) -> Self {
        self.routing_key = Some(routing_key);
        self
    }

    /// Name of the exchange this message is published to.
    pub fn exchange(&self) -> &'static str {
        self.name
    }

    /// Routing key used when the publisher does not supply one.
    pub fn default_routing_key(&self) -> &'static str {
        self.routing_key.unwrap_or(self.name)
    }
}

/// A payload type that can be published to and consumed from the broker.
///
/// Bodies are JSON on the wire. [`validate`](Message::validate) runs after
/// decoding unless consume-time validation is disabled.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Routing metadata for this message type.
    const META: MessageMeta;

    /// Checks the decoded value against the message's own rules.
    fn validate(&self) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// The managed exchange handler errors are reported to.
pub const ERROR_EXCHANGE: MessageMeta = MessageMeta::new("error").exchange_type(ExchangeType::Topic);

/// Body published to [`ERROR_EXCHANGE`] when a handler fails with a typed error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    /// Error classification.
    pub error_type: ErrorType,
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl Message for ErrorMessage {
    const META: MessageMeta = ERROR_EXCHANGE;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routing_key_falls_back_to_name() {
        let meta = MessageMeta::new("foo");
        assert_eq!(meta.default_routing_key(), "foo");
        assert_eq!(meta.exchange_type, ExchangeType::Fanout);

        let keyed = MessageMeta::new("bar")
            .exchange_type(ExchangeType::Direct)
            .routing_key("bar-key");
        assert_eq!(keyed.default_routing_key(), "bar-key");
        assert_eq!(keyed.exchange(), "bar");
    }

    #[test]
    fn test_error_message_wire_format() {
        let msg = ErrorMessage {
            error_type: ErrorType::Unauthorized,
            code: "UNAUTHORIZED".into(),
            message: "Unauthorized".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "errorType": "UNAUTHORIZED",
                "code": "UNAUTHORIZED",
                "message": "Unauthorized",
            })
        );
    }
}

//! What a handler invocation resolved to.

use serde_json::Value;

use crate::message::MessageMeta;

/// The single resolved result of a handler invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Outcome {
    /// The delivery was handled and nothing is sent back.
    #[default]
    Ack,
    /// The handler produced a message to publish.
    Reply {
        /// Type of the reply message.
        message: MessageMeta,
        /// Encoded reply body.
        body: Value,
        /// Routing key to publish under instead of the message's default.
        routing_key: Option<String>,
    },
}

impl Outcome {
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    /// The routing key a reply is published under.
    pub fn reply_routing_key(&self) -> Option<&str> {
        match self {
            Self::Ack => None,
            Self::Reply {
                message,
                routing_key,
                ..
            } => Some(
                routing_key
                    .as_deref()
                    .unwrap_or_else(|| message.default_routing_key()),
            ),
        }
    }

    /// Returns the reply message type and body, if any.
    pub fn reply(&self) -> Option<(&MessageMeta, &Value)> {
        match self {
            Self::Ack => None,
            Self::Reply { message, body, .. } => Some((message, body)),
        }
    }
}

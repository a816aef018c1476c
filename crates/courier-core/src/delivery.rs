//! Inbound broker deliveries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Header names understood by the dispatch layer.
pub mod headers {
    pub const SESSION_ID: &str = "x-session-id";
    pub const USER_ID: &str = "x-user-id";
    pub const CLIENT_TRACE_ID: &str = "x-client-trace-id";
    pub const CORRELATION_ID: &str = "x-correlation-id";
    pub const EVENT_TYPE: &str = "x-event-type";
    pub const CLIENT_VERSION: &str = "x-client-version";
    pub const JWT: &str = "jwt";

    /// Headers copied from a delivery onto messages published in reply to it.
    pub const PROPAGATED: [&str; 6] = [
        SESSION_ID,
        USER_ID,
        CLIENT_TRACE_ID,
        CORRELATION_ID,
        CLIENT_VERSION,
        JWT,
    ];
}

/// Message properties carried alongside the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    /// AMQP `correlation-id` property.
    pub correlation_id: Option<String>,
    /// AMQP `message-id` property.
    pub message_id: Option<String>,
    /// Application headers.
    pub headers: BTreeMap<String, String>,
}

/// One message received from the broker.
///
/// The `consumer_tag` identifies the subscription the message arrived on and
/// is the key the dispatch server routes by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Tag of the subscription this delivery was consumed through.
    pub consumer_tag: String,
    /// Broker-assigned sequence number.
    pub delivery_tag: u64,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Raw body bytes.
    pub body: Vec<u8>,
    /// Properties and headers.
    pub properties: Properties,
}

impl Delivery {
    /// Creates a delivery for `consumer_tag` carrying `body`.
    pub fn new(consumer_tag: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Sets the exchange and routing key.
    pub fn with_route(mut self, exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self.routing_key = routing_key.into();
        self
    }

    /// Adds an application header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the `correlation-id` property.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.properties.correlation_id = Some(correlation_id.into());
        self
    }

    /// Returns the value of an application header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.properties.headers.get(name).map(String::as_str)
    }

    /// Returns all application headers.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.properties.headers
    }
}

//! Seams to the external messaging runtime.
//!
//! The dispatch layer never talks to a broker directly. Everything it needs
//! (connection lifecycle, subscription registration, the consumer-tag rule,
//! payload decoding, trace derivation, queue administration) goes through
//! [`Broker`] and [`QueueAdmin`].
//!
//! # Example
//!
//! ```rust,ignore
//! #[async_trait]
//! impl Broker for MyBroker {
//!     fn service_name(&self) -> &str { "orders" }
//!
//!     async fn connect(&self, config: &ConnectionConfig) -> ConnectionResult<()> {
//!         self.client.open(&config.url).await.map_err(|e| ConnectionError::ConnectFailed {
//!             url: config.url.clone(),
//!             reason: e.to_string(),
//!         })
//!     }
//!     // ...
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::delivery::Delivery;
use crate::error::{ConnectionResult, DecodeError, DispatchError};
use crate::handler::HandlerMeta;
use crate::message::MessageMeta;
use crate::outcome::Outcome;
use crate::pattern::{RoutingPattern, default_consumer_tag};
use crate::trace::TraceContext;

// =============================================================================
// Subscriptions
// =============================================================================

/// Future returned by a dispatch callback.
pub type DispatchFuture = BoxFuture<'static, Result<Outcome, DispatchError>>;

/// Callback the messaging runtime invokes for every delivery on a subscription.
pub type DispatchCallback = Arc<dyn Fn(Delivery) -> DispatchFuture + Send + Sync>;

/// One consumer subscription handed to [`Broker::register`].
#[derive(Clone)]
pub struct Subscription {
    /// Consumer tag of the subscription.
    pub pattern: RoutingPattern,
    /// Binding metadata of the handler behind it.
    pub handler: HandlerMeta,
    /// Invoked with every delivery consumed on this subscription.
    pub callback: DispatchCallback,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Broker URL.
    pub url: String,
    /// Let the runtime reconnect on its own after a dropped connection.
    pub reconnect: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost".to_string(),
            reconnect: true,
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Broker
// =============================================================================

/// The messaging runtime as seen by the dispatch layer.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Name of the service, used as the consumer-tag prefix.
    fn service_name(&self) -> &str;

    /// Opens the connection.
    async fn connect(&self, config: &ConnectionConfig) -> ConnectionResult<()>;

    /// Closes the connection.
    async fn disconnect(&self) -> ConnectionResult<()>;

    fn is_disconnected(&self) -> bool;

    fn is_reconnecting(&self) -> bool {
        false
    }

    /// Declares the exchanges of `messages` and binds every subscription.
    async fn register(
        &self,
        messages: &[MessageMeta],
        subscriptions: Vec<Subscription>,
    ) -> ConnectionResult<()>;

    /// The consumer-tag rule.
    fn consumer_tag(&self, handler: &HandlerMeta) -> String {
        default_consumer_tag(self.service_name(), handler)
    }

    /// Decodes a delivery body for `message`.
    ///
    /// Validation is left to the caller; the default decodes JSON.
    fn decode(&self, delivery: &Delivery, message: &MessageMeta) -> Result<Value, DecodeError> {
        serde_json::from_slice(&delivery.body).map_err(|e| DecodeError::Malformed {
            message: message.name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Derives the trace context of a delivery.
    fn trace_context(&self, delivery: &Delivery) -> TraceContext {
        TraceContext::from_delivery(delivery)
    }
}

/// Queue administration used by test harnesses.
#[async_trait]
pub trait QueueAdmin: Send + Sync {
    /// Purges the queues backing `handlers`; with `also_delete` the queues
    /// and their bindings are removed as well.
    ///
    /// Without `allow_reconnect` a disconnected runtime fails instead of
    /// reconnecting first.
    async fn clear_queues(
        &self,
        handlers: &[HandlerMeta],
        also_delete: bool,
        allow_reconnect: bool,
    ) -> ConnectionResult<()>;
}

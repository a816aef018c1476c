//! # Courier Core
//!
//! The foundation of the Courier dispatch layer: the data model shared by
//! every crate and the seams behind which the external messaging runtime
//! lives.
//!
//! ## Data Model
//!
//! - **Messages**: typed payloads and their exchange metadata ([`Message`], [`MessageMeta`])
//! - **Deliveries**: inbound broker messages ([`Delivery`])
//! - **Trace context**: per-message observability metadata ([`TraceContext`])
//! - **Handler metadata**: binding configuration of one handler ([`HandlerMeta`])
//! - **Routing patterns**: the consumer tag that keys dispatch ([`RoutingPattern`])
//! - **Outcomes**: what a handler invocation resolved to ([`Outcome`])
//!
//! ## Messaging Runtime Seams
//!
//! The connection lifecycle, subscription registration, payload decoding and
//! queue administration are owned by a messaging runtime implementing
//! [`Broker`] and [`QueueAdmin`]. The dispatch layer only talks to those
//! traits:
//!
//! ```text
//! ┌──────────────┐  register(patterns)  ┌────────────────┐
//! │   Dispatch   │─────────────────────▶│     Broker     │
//! │    Server    │◀─────────────────────│ (external impl)│
//! └──────────────┘   callback(delivery) └────────────────┘
//! ```

pub mod broker;
pub mod delivery;
pub mod error;
pub mod handler;
pub mod message;
pub mod outcome;
pub mod pattern;
pub mod trace;

pub use broker::{
    Broker, ConnectionConfig, DispatchCallback, DispatchFuture, QueueAdmin, Subscription,
};
pub use delivery::{Delivery, Properties, headers};
pub use error::{
    ConnectionError, ConnectionResult, DecodeError, DispatchError, ErrorType, HandlerError,
    HandlerResult,
};
pub use handler::HandlerMeta;
pub use message::{ERROR_EXCHANGE, ErrorMessage, ExchangeType, Message, MessageMeta};
pub use outcome::Outcome;
pub use pattern::{RoutingPattern, default_consumer_tag};
pub use trace::TraceContext;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        Broker, Delivery, ExchangeType, HandlerError, HandlerMeta, Message, MessageMeta, Outcome,
        RoutingPattern, TraceContext,
    };
}

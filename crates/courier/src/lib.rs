//! # Courier
//!
//! Typed message handlers for AMQP-style brokers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ delivery ┌────────────────┐  pattern  ┌──────────────────────────────┐
//! │   Broker    │─────────▶│ DispatchServer │──────────▶│ guards ─▶ extractors ─▶ method│
//! │ (transport) │◀─────────│    (router)    │◀──────────│        Outcome / HandlerError │
//! └─────────────┘ settle   └────────────────┘           └──────────────────────────────┘
//! ```
//!
//! - **Components**: application types declaring their handler methods
//! - **Routing patterns**: the consumer tag each handler subscribes under
//! - **Extractors**: typed handler parameters (`Payload<M>`, `TraceContext`, ...)
//! - **Outcomes**: acknowledgement, reply or error, settled by the transport
//! - **Runtime**: configuration, logging, lifecycle and health
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! struct Pong;
//!
//! impl Pong {
//!     async fn on_ping(self: Arc<Self>, Payload(ping): Payload<Ping>) -> Reply<PongMsg> {
//!         Reply::new(PongMsg { count: ping.count + 1 })
//!     }
//! }
//!
//! impl Component for Pong {
//!     fn handlers(set: &mut HandlerSet<Self>) {
//!         set.handler("on_ping", Self::on_ping);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let broker = Arc::new(MemoryBroker::new(config.service_name()));
//!     let registry = ComponentRegistry::new().with(Arc::new(Pong));
//!
//!     MessagingModule::for_root(&config, &registry, broker)?
//!         .run_until_signal()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;
pub use courier_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - host entry points
    pub use courier_runtime::{
        CourierConfig, HealthIndicator, MessagingModule, load_config, load_config_from_file,
    };

    // Component declaration
    pub use courier_framework::{
        Component, ComponentRegistry, DispatchServer, HandlerSet, ServerOptions,
        TransportStrategy,
    };

    // Handler parameters and results
    pub use courier_framework::{
        Deferred, Extension, First, FromRequest, Guard, Headers, Payload, Reply, Request,
    };

    // Test support
    pub use courier_framework::testing::{HandlerSpy, SpyRegistry, TestDispatchServer};

    // Messages and broker
    pub use courier_core::{
        Broker, Delivery, ErrorType, ExchangeType, HandlerError, HandlerResult, Message,
        MessageMeta, Properties, TraceContext,
    };
    pub use courier_transport::MemoryBroker;
}

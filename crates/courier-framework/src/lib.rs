//! # Courier Framework
//!
//! The dispatch-and-binding layer between application components and the
//! messaging runtime.
//!
//! This layer provides:
//! - Component and handler declaration ([`Component`], [`HandlerSet`])
//! - Handler discovery over the component registry ([`HandlerDiscovery`])
//! - Routing-pattern derivation ([`PatternDeriver`])
//! - Per-parameter resolver binding ([`ArgumentBinder`])
//! - Axum-style handler functions with typed extractors ([`Handler`], [`FromRequest`])
//! - The dispatch server and its lifecycle ([`DispatchServer`])
//! - A spying test variant ([`testing::TestDispatchServer`])
//!
//! Setup-time data flow:
//!
//! ```text
//! ComponentRegistry ──▶ HandlerDiscovery ──▶ PatternDeriver ──▶ ArgumentBinder
//!                                                                     │
//!                            Broker::register(subscriptions) ◀── DispatchServer
//! ```

pub mod binder;
pub mod component;
pub mod context;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod pattern;
pub mod server;
pub mod testing;

#[cfg(test)]
mod test_util;

pub use binder::{ArgumentBinder, ParameterBinding, ParameterBindings};
pub use component::{Component, ComponentRegistry, HandlerOptions, HandlerSet};
pub use context::{Request, RequestContext};
pub use descriptor::{ComponentId, HandlerDescriptor, ParamShape};
pub use discovery::HandlerDiscovery;
pub use error::{
    ConfigurationError, ConfigurationResult, ExtractError, ExtractResult, ServerError,
    ServerResult,
};
pub use extractor::{Extension, FromRequest, Headers, Payload};
pub use handler::{
    BoxedGuard, BoxedInvoker, Deferred, First, Guard, GuardLayer, Handler, HandlerPipeline,
    HandlerService, InvocationHook, IntoOutcome, Reply, UnboundHandler,
};
pub use pattern::PatternDeriver;
pub use server::{DispatchServer, ListenCallback, ServerOptions, ServerState, TransportStrategy};

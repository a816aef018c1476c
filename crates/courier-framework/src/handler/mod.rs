//! Handler, outcome and service system for the Courier framework.
//!
//! - **Handler** ([`traits`]) – the [`Handler`] trait, implemented for async
//!   functions taking the component plus 0-16 [`FromRequest`](crate::FromRequest)
//!   parameters, similar to Axum's system
//! - **Outcome** ([`outcome`]) – [`IntoOutcome`], which adapts a handler's
//!   return value (plain value, deferred value or stream) into one [`Outcome`](courier_core::Outcome)
//! - **Service** ([`service`]) – the tower `Service` wrapping a handler and the
//!   [`GuardLayer`] stacked in front of it
//!
//! # Architecture
//!
//! ```text
//! GuardLayer            ← rejects the request before any argument is extracted
//!     HandlerService    ← extracts arguments, calls the handler, adapts the result
//! ```
//!
//! ```rust,ignore
//! impl Handlers {
//!     async fn handle_foo(self: Arc<Self>, Payload(foo): Payload<Foo>, trace: TraceContext) {
//!         info!(name = %foo.name, session = ?trace.session_id, "got foo");
//!     }
//!
//!     async fn handle_bar(self: Arc<Self>, Payload(bar): Payload<Bar>) -> Reply<Bar> {
//!         Reply::new(Bar { msg: format!("{}-foo", bar.msg) })
//!     }
//! }
//! ```

pub mod outcome;
pub mod service;
pub mod traits;

pub use outcome::{Deferred, First, IntoOutcome, Reply};
pub use service::{BoxedGuard, Guard, GuardLayer, GuardService, HandlerPipeline, HandlerService};
pub use traits::{BoxedInvoker, Handler, InvocationHook, UnboundHandler};

pub use tower::Layer;

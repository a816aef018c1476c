//! Test support.
//!
//! [`TestDispatchServer`] behaves exactly like [`DispatchServer`](crate::DispatchServer)
//! but records the arguments of every handler invocation in a [`HandlerSpy`]
//! keyed by routing pattern, and can purge or delete the queues of its
//! handlers between tests.
//!
//! ```rust,ignore
//! let spies = SpyRegistry::new();
//! let server = TestDispatchServer::new(&registry, broker.clone(), options, spies.clone())?;
//! server.start().await?;
//!
//! broker.publish(&Foo { name: "foo".into() }, None, Default::default()).await?;
//!
//! let spy = server.get_spy_for_handler::<Handlers>("handle_foo")?;
//! assert!(spy.wait_for_calls(1, Duration::from_secs(1)).await);
//! ```

mod server;
mod spy;

pub use server::TestDispatchServer;
pub use spy::{HandlerSpy, SpyRegistry};

//! The dispatch server.
//!
//! The [`DispatchServer`] is the transport strategy between the messaging
//! runtime and the application's handlers. Construction runs the whole setup
//! pass (discovery, pattern derivation, argument binding, pipeline
//! assembly) so configuration errors surface before any connection is made.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()──▶ Connecting ──▶ Listening ──close()──▶ Closing ──▶ Closed
//!                          │
//!                          └──connection error──▶ Failed
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = ComponentRegistry::new().with(Arc::new(Handlers::default()));
//! let server = DispatchServer::new(&registry, broker, ServerOptions::default())?;
//!
//! server.start().await?;
//! // ...
//! server.close().await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tracing::{Instrument, debug, debug_span, error, info};

use courier_core::{
    Broker, ConnectionConfig, Delivery, DispatchCallback, DispatchError, HandlerError,
    HandlerMeta, MessageMeta, Outcome, RoutingPattern, Subscription,
};

use crate::binder::{ArgumentBinder, ParameterBindings};
use crate::component::ComponentRegistry;
use crate::context::Request;
use crate::descriptor::HandlerDescriptor;
use crate::discovery::HandlerDiscovery;
use crate::error::{ConfigurationError, ServerError, ServerResult};
use crate::handler::InvocationHook;
use crate::handler::service::pipeline;
use crate::pattern::PatternDeriver;

// =============================================================================
// State and options
// =============================================================================

/// Lifecycle state of a [`DispatchServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Created,
    Connecting,
    Listening,
    Closing,
    Closed,
    Failed,
}

/// Settings the dispatch server needs from the host configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Broker connection settings.
    pub connection: ConnectionConfig,
    /// Skip payload validation at consume time.
    pub disable_consume_validation: bool,
}

/// Callback receiving the result of [`TransportStrategy::listen`].
pub type ListenCallback = Box<dyn FnOnce(ServerResult<()>) + Send>;

/// The lifecycle a host drives a transport through.
#[async_trait]
pub trait TransportStrategy: Send + Sync {
    /// Connects and registers every handler subscription.
    async fn start(&self) -> ServerResult<()>;

    /// Disconnects unless already disconnected. Closing twice is a no-op.
    async fn close(&self) -> ServerResult<()>;

    /// Callback-style [`start`](TransportStrategy::start).
    async fn listen(&self, callback: ListenCallback) {
        let result = self.start().await;
        callback(result);
    }
}

// =============================================================================
// Router
// =============================================================================

struct Route {
    pattern: RoutingPattern,
    descriptor: Arc<HandlerDescriptor>,
    bindings: ParameterBindings,
}

/// The read-only pattern → handler map consulted for every delivery.
struct Router {
    routes: HashMap<RoutingPattern, Route>,
    broker: Arc<dyn Broker>,
}

impl Router {
    async fn dispatch(&self, delivery: Delivery) -> Result<Outcome, DispatchError> {
        let Some(route) = self.routes.get(delivery.consumer_tag.as_str()) else {
            let tag = delivery.consumer_tag;
            error!(%tag, "no handler registered for consumer tag");
            return Err(DispatchError::NoHandler { tag });
        };

        let Some(pipeline) = route.descriptor.pipeline() else {
            return Err(HandlerError::internal(format!(
                "handler '{}' has no dispatch pipeline",
                route.descriptor.qualified_name()
            ))
            .into());
        };

        let span = debug_span!(
            "dispatch",
            pattern = %route.pattern,
            handler = %route.descriptor.meta().describe(),
            delivery_tag = delivery.delivery_tag,
        );
        let request = Arc::new(Request::new(
            delivery,
            route.descriptor.clone(),
            route.bindings.clone(),
            self.broker.clone(),
        ));

        async move {
            debug!("handling delivery");
            pipeline
                .clone()
                .oneshot(request)
                .await
                .map_err(DispatchError::from)
        }
        .instrument(span)
        .await
    }
}

// =============================================================================
// DispatchServer
// =============================================================================

/// Routes broker deliveries to the application's handlers.
pub struct DispatchServer {
    broker: Arc<dyn Broker>,
    options: ServerOptions,
    handlers: Vec<(RoutingPattern, Arc<HandlerDescriptor>)>,
    router: Arc<Router>,
    state: Mutex<ServerState>,
}

impl DispatchServer {
    /// Discovers and decorates every handler of `registry`.
    pub fn new(
        registry: &ComponentRegistry,
        broker: Arc<dyn Broker>,
        options: ServerOptions,
    ) -> ServerResult<Self> {
        Self::with_hooks(registry, broker, options, |_| None)
    }

    /// Like [`new`](DispatchServer::new), wrapping each handler with the
    /// invocation hook `hook_for` returns for its pattern.
    pub fn with_hooks<F>(
        registry: &ComponentRegistry,
        broker: Arc<dyn Broker>,
        options: ServerOptions,
        hook_for: F,
    ) -> ServerResult<Self>
    where
        F: Fn(&RoutingPattern) -> Option<InvocationHook>,
    {
        let descriptors = HandlerDiscovery::new(registry).discover();
        let deriver = PatternDeriver::new(broker.clone());
        let binder = ArgumentBinder::new(options.disable_consume_validation);

        let mut routes: HashMap<RoutingPattern, Route> = HashMap::with_capacity(descriptors.len());
        let mut handlers = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let pattern = deriver.pattern_for(&descriptor);
            debug!(%pattern, handler = %descriptor.qualified_name(), "decorating handler");

            let bindings = binder.bind(&descriptor, &pattern)?;

            if let Some(existing) = routes.get(&pattern) {
                let err = ConfigurationError::PatternCollision {
                    pattern: pattern.to_string(),
                    first: existing.descriptor.qualified_name(),
                    second: descriptor.qualified_name(),
                };
                error!("{err}");
                return Err(err.into());
            }

            let invoker = descriptor.invoker(hook_for(&pattern)).ok_or_else(|| {
                ConfigurationError::StaticHandler {
                    handler: descriptor.qualified_name(),
                }
            })?;
            descriptor.attach(pipeline(descriptor.guards.clone(), invoker));

            handlers.push((pattern.clone(), descriptor.clone()));
            routes.insert(
                pattern.clone(),
                Route {
                    pattern,
                    descriptor,
                    bindings,
                },
            );
        }

        let router = Arc::new(Router {
            routes,
            broker: broker.clone(),
        });

        Ok(Self {
            broker,
            options,
            handlers,
            router,
            state: Mutex::new(ServerState::Created),
        })
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock() = state;
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Every decorated handler with its routing pattern, in discovery order.
    pub fn handlers(&self) -> impl Iterator<Item = (&RoutingPattern, &Arc<HandlerDescriptor>)> {
        self.handlers.iter().map(|(p, d)| (p, d))
    }

    /// Binding metadata of every handler.
    pub fn handler_metas(&self) -> Vec<HandlerMeta> {
        self.handlers.iter().map(|(_, d)| d.meta().clone()).collect()
    }

    /// Consumed and reply message types of every handler, deduplicated.
    pub fn known_messages(&self) -> Vec<MessageMeta> {
        let mut known: Vec<MessageMeta> = Vec::new();
        for (_, descriptor) in &self.handlers {
            for meta in [descriptor.message(), descriptor.reply()].into_iter().flatten() {
                if !known.iter().any(|m| m.name == meta.name) {
                    known.push(meta);
                }
            }
        }
        known
    }

    /// Routes `delivery` to the handler registered for its consumer tag.
    pub async fn dispatch(&self, delivery: Delivery) -> Result<Outcome, DispatchError> {
        self.router.dispatch(delivery).await
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        self.handlers
            .iter()
            .map(|(pattern, descriptor)| {
                let router = self.router.clone();
                let callback: DispatchCallback = Arc::new(move |delivery: Delivery| {
                    let router = router.clone();
                    async move { router.dispatch(delivery).await }.boxed()
                });
                Subscription {
                    pattern: pattern.clone(),
                    handler: descriptor.meta().clone(),
                    callback,
                }
            })
            .collect()
    }

    /// Connects to the broker and registers every handler subscription.
    pub async fn start(&self) -> ServerResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                ServerState::Created | ServerState::Closed | ServerState::Failed => {
                    *state = ServerState::Connecting;
                }
                other => {
                    return Err(ServerError::InvalidState {
                        state: other,
                        operation: "start",
                    });
                }
            }
        }

        if let Err(e) = self.broker.connect(&self.options.connection).await {
            error!(url = %self.options.connection.url, "failed to connect: {e}");
            self.set_state(ServerState::Failed);
            return Err(e.into());
        }

        let known = self.known_messages();
        if let Err(e) = self.broker.register(&known, self.subscriptions()).await {
            error!("failed to register handlers: {e}");
            self.set_state(ServerState::Failed);
            return Err(e.into());
        }

        self.set_state(ServerState::Listening);
        info!(
            service = self.broker.service_name(),
            handlers = self.handlers.len(),
            "dispatch server listening"
        );
        Ok(())
    }

    /// Callback-style [`start`](DispatchServer::start).
    pub async fn listen<F>(&self, callback: F)
    where
        F: FnOnce(ServerResult<()>) + Send,
    {
        callback(self.start().await);
    }

    /// Disconnects unless the broker is already disconnected. Idempotent.
    ///
    /// The decision follows the broker's connection, not the server state,
    /// so a connection reopened after a close is closed again.
    pub async fn close(&self) -> ServerResult<()> {
        if self.broker.is_disconnected() {
            self.set_state(ServerState::Closed);
            return Ok(());
        }

        self.set_state(ServerState::Closing);
        if let Err(e) = self.broker.disconnect().await {
            self.set_state(ServerState::Failed);
            return Err(e.into());
        }
        info!("connection closed");

        self.set_state(ServerState::Closed);
        Ok(())
    }
}

#[async_trait]
impl TransportStrategy for DispatchServer {
    async fn start(&self) -> ServerResult<()> {
        DispatchServer::start(self).await
    }

    async fn close(&self) -> ServerResult<()> {
        DispatchServer::close(self).await
    }
}

impl fmt::Debug for DispatchServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchServer")
            .field("service", &self.broker.service_name())
            .field("state", &self.state())
            .field(
                "handlers",
                &self
                    .handlers
                    .iter()
                    .map(|(p, _)| p.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::component::{Component, HandlerSet};
    use crate::extractor::Payload;
    use crate::handler::Reply;
    use crate::test_util::StubBroker;
    use courier_core::{ErrorType, HandlerResult, Message, TraceContext, headers};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Foo {
        name: String,
    }

    impl Message for Foo {
        const META: MessageMeta = MessageMeta::new("foo");
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Bar {
        msg: String,
    }

    impl Message for Bar {
        const META: MessageMeta = MessageMeta::new("bar");
    }

    #[derive(Default)]
    struct Handlers {
        foos: Mutex<Vec<(Foo, TraceContext)>>,
        failures: AtomicUsize,
    }

    impl Handlers {
        async fn handle_foo(self: Arc<Self>, Payload(foo): Payload<Foo>, trace: TraceContext) {
            self.foos.lock().push((foo, trace));
        }

        async fn handle_bar(self: Arc<Self>, Payload(bar): Payload<Bar>) -> Reply<Bar> {
            Reply::new(Bar {
                msg: format!("{}-foo", bar.msg),
            })
        }

        async fn fail(self: Arc<Self>, _bar: Payload<Bar>) -> HandlerResult<()> {
            self.failures.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::bad_request("nope"))
        }
    }

    impl Component for Handlers {
        fn handlers(set: &mut HandlerSet<Self>) {
            set.handler("handle_foo", Self::handle_foo);
            set.handler("handle_bar", Self::handle_bar).binding_key("bar");
            set.handler("fail", Self::fail).binding_key("fail");
        }
    }

    struct Colliding;

    impl Colliding {
        async fn first(self: Arc<Self>, _foo: Payload<Foo>) {}

        async fn second(self: Arc<Self>, _foo: Payload<Foo>) {}
    }

    impl Component for Colliding {
        fn handlers(set: &mut HandlerSet<Self>) {
            set.handler("first", Self::first);
            set.handler("second", Self::second);
        }
    }

    struct Static;

    async fn unbound(_foo: Payload<Foo>) {}

    impl Component for Static {
        fn handlers(set: &mut HandlerSet<Self>) {
            set.function("unbound", unbound);
        }
    }

    fn setup(broker: StubBroker) -> (Arc<Handlers>, Arc<StubBroker>, DispatchServer) {
        let handlers = Arc::new(Handlers::default());
        let broker = Arc::new(broker);
        let registry = ComponentRegistry::new().with(handlers.clone());
        let server = DispatchServer::new(&registry, broker.clone(), ServerOptions::default())
            .unwrap();
        (handlers, broker, server)
    }

    fn json_delivery(tag: &str, value: serde_json::Value) -> Delivery {
        Delivery::new(tag, serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn test_patterns_are_unique_per_handler() {
        let (_, _, server) = setup(StubBroker::new("svc"));
        let patterns = server
            .handlers()
            .map(|(p, _)| p.to_string())
            .collect::<Vec<_>>();
        assert_eq!(patterns, vec!["svc.foo", "svc.bar[bar]", "svc.bar[fail]"]);
        assert!(server.handlers().all(|(_, d)| d.pipeline().is_some()));
        assert_eq!(server.known_messages(), vec![Foo::META, Bar::META]);
    }

    #[test]
    fn test_pattern_collision_fails_fast() {
        let registry = ComponentRegistry::new().with(Arc::new(Colliding));
        let err = DispatchServer::new(
            &registry,
            Arc::new(StubBroker::new("svc")),
            ServerOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Configuration(ConfigurationError::PatternCollision { pattern, .. })
                if pattern == "svc.foo"
        ));
    }

    #[test]
    fn test_static_handler_prevents_setup() {
        let registry = ComponentRegistry::new().with(Arc::new(Static));
        let err = DispatchServer::new(
            &registry,
            Arc::new(StubBroker::new("svc")),
            ServerOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Configuration(ConfigurationError::StaticHandler { .. })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_resolves_payload_and_trace() {
        let (handlers, _, server) = setup(StubBroker::new("svc"));

        let delivery = json_delivery("svc.foo", serde_json::json!({ "name": "foo_evt" }))
            .with_route("foo", "foo")
            .with_header(headers::SESSION_ID, "s-1")
            .with_header(headers::USER_ID, "u-1")
            .with_header(headers::CLIENT_TRACE_ID, "t-1")
            .with_header(headers::CORRELATION_ID, "c-1")
            .with_header(headers::EVENT_TYPE, "foo-event")
            .with_header(headers::CLIENT_VERSION, "1.0.0");

        assert_eq!(server.dispatch(delivery).await.unwrap(), Outcome::Ack);

        let foos = handlers.foos.lock();
        assert_eq!(foos.len(), 1);
        assert_eq!(foos[0].0, Foo { name: "foo_evt".into() });
        assert_eq!(
            foos[0].1,
            TraceContext {
                session_id: Some("s-1".into()),
                user_id: Some("u-1".into()),
                client_trace_id: Some("t-1".into()),
                correlation_id: Some("c-1".into()),
                event_type: Some("foo-event".into()),
                client_version: Some("1.0.0".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_adapts_reply_and_errors() {
        let (handlers, _, server) = setup(StubBroker::new("svc"));

        let outcome = server
            .dispatch(json_delivery("svc.bar[bar]", serde_json::json!({ "msg": "bar" })))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Reply {
                message: Bar::META,
                body: serde_json::json!({ "msg": "bar-foo" }),
                routing_key: None,
            }
        );

        let err = server
            .dispatch(json_delivery("svc.bar[fail]", serde_json::json!({ "msg": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Handler(e) if e.error_type == Some(ErrorType::BadRequest) && e.message == "nope"
        ));
        assert_eq!(handlers.failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tag_invokes_nothing() {
        let (handlers, _, server) = setup(StubBroker::new("svc"));

        let err = server
            .dispatch(json_delivery("svc.unknown", serde_json::json!({ "name": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoHandler { tag } if tag == "svc.unknown"));
        assert!(handlers.foos.lock().is_empty());
        assert_eq!(handlers.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (handlers, broker, server) = setup(StubBroker::new("svc"));
        assert_eq!(server.state(), ServerState::Created);

        server.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Listening);
        assert!(matches!(
            server.start().await,
            Err(ServerError::InvalidState { state: ServerState::Listening, .. })
        ));

        {
            let subscriptions = broker.subscriptions.lock();
            assert_eq!(subscriptions.len(), 3);
            assert_eq!(subscriptions[0].pattern.as_str(), "svc.foo");
            assert_eq!(*broker.messages.lock(), vec![Foo::META, Bar::META]);
        }

        let callback = broker.subscriptions.lock()[0].callback.clone();
        callback(json_delivery("svc.foo", serde_json::json!({ "name": "via-callback" })))
            .await
            .unwrap();
        assert_eq!(handlers.foos.lock()[0].0.name, "via-callback");

        server.close().await.unwrap();
        server.close().await.unwrap();
        assert_eq!(server.state(), ServerState::Closed);
        assert_eq!(broker.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_follows_broker_connection() {
        let (_, broker, server) = setup(StubBroker::new("svc"));
        server.start().await.unwrap();
        server.close().await.unwrap();
        assert_eq!(broker.disconnects.load(Ordering::SeqCst), 1);

        // Reopened behind the server's back.
        broker
            .connect(&ServerOptions::default().connection)
            .await
            .unwrap();
        assert_eq!(server.state(), ServerState::Closed);

        server.close().await.unwrap();
        assert!(broker.is_disconnected());
        assert_eq!(broker.disconnects.load(Ordering::SeqCst), 2);
        assert_eq!(server.state(), ServerState::Closed);
    }

    #[tokio::test]
    async fn test_connection_error_reaches_listen_callback() {
        let (_, broker, server) = setup(StubBroker::failing("svc"));

        let (tx, rx) = tokio::sync::oneshot::channel();
        server
            .listen(move |result| {
                let _ = tx.send(result);
            })
            .await;

        let result = rx.await.unwrap();
        assert!(matches!(result, Err(ServerError::Connection(_))));
        assert_eq!(server.state(), ServerState::Failed);
        assert!(broker.subscriptions.lock().is_empty());
    }
}

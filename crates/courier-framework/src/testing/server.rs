use std::any::TypeId;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use courier_core::{Broker, QueueAdmin};

use super::spy::{HandlerSpy, SpyRegistry};
use crate::component::ComponentRegistry;
use crate::descriptor::ComponentId;
use crate::error::{ConfigurationError, ConfigurationResult, ServerResult};
use crate::handler::InvocationHook;
use crate::server::{DispatchServer, ServerOptions, TransportStrategy};

/// A [`DispatchServer`] that spies on its handlers.
///
/// Every handler invocation records its extracted arguments in the spy of
/// the handler's routing pattern before the handler body runs.
pub struct TestDispatchServer {
    inner: DispatchServer,
    spies: SpyRegistry,
    admin: Arc<dyn QueueAdmin>,
}

impl TestDispatchServer {
    pub fn new<B>(
        registry: &ComponentRegistry,
        broker: Arc<B>,
        options: ServerOptions,
        spies: SpyRegistry,
    ) -> ServerResult<Self>
    where
        B: Broker + QueueAdmin,
    {
        let hooks = spies.clone();
        let inner = DispatchServer::with_hooks(registry, broker.clone(), options, |pattern| {
            let spies = hooks.clone();
            let pattern = pattern.clone();
            let hook: InvocationHook =
                Arc::new(move |args: &[Value]| spies.spy_for(&pattern).record(args));
            Some(hook)
        })?;

        Ok(Self {
            inner,
            spies,
            admin: broker,
        })
    }

    pub fn spies(&self) -> &SpyRegistry {
        &self.spies
    }

    /// The spy of handler `method` on component `C`.
    pub fn get_spy_for_handler<C: 'static>(&self, method: &str) -> ConfigurationResult<HandlerSpy> {
        self.inner
            .handlers()
            .find(|(_, d)| d.component().type_id == TypeId::of::<C>() && d.method() == method)
            .map(|(pattern, _)| self.spies.spy_for(pattern))
            .ok_or_else(|| ConfigurationError::UnknownHandler {
                component: ComponentId::of::<C>().name,
                method: method.to_string(),
            })
    }

    /// Purges the queues of every handler, or deletes them with `also_delete`.
    ///
    /// Without `allow_reconnect` a disconnected runtime fails instead of
    /// reconnecting.
    pub async fn clear_queues(&self, also_delete: bool, allow_reconnect: bool) -> ServerResult<()> {
        let handlers = self.inner.handler_metas();
        debug!(
            queues = handlers.len(),
            also_delete, allow_reconnect, "clearing handler queues"
        );
        self.admin
            .clear_queues(&handlers, also_delete, allow_reconnect)
            .await?;
        Ok(())
    }
}

impl Deref for TestDispatchServer {
    type Target = DispatchServer;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[async_trait]
impl TransportStrategy for TestDispatchServer {
    async fn start(&self) -> ServerResult<()> {
        self.inner.start().await
    }

    async fn close(&self) -> ServerResult<()> {
        self.inner.close().await
    }
}

impl std::fmt::Debug for TestDispatchServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDispatchServer")
            .field("inner", &self.inner)
            .field("spies", &self.spies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::component::{Component, HandlerSet};
    use crate::extractor::Payload;
    use crate::test_util::StubBroker;
    use courier_core::{Delivery, Message, MessageMeta, TraceContext, headers};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Foo {
        name: String,
    }

    impl Message for Foo {
        const META: MessageMeta = MessageMeta::new("foo");
    }

    struct Handlers;

    impl Handlers {
        async fn handle_foo(self: Arc<Self>, _foo: Payload<Foo>, _trace: TraceContext) {}

        async fn raw(self: Arc<Self>, _delivery: Delivery) {}
    }

    impl Component for Handlers {
        fn handlers(set: &mut HandlerSet<Self>) {
            set.handler("handle_foo", Self::handle_foo);
            set.handler("raw", Self::raw).binding_key("raw");
        }
    }

    fn setup() -> (Arc<StubBroker>, TestDispatchServer) {
        let broker = Arc::new(StubBroker::new("svc"));
        let registry = ComponentRegistry::new().with(Arc::new(Handlers));
        let server = TestDispatchServer::new(
            &registry,
            broker.clone(),
            ServerOptions::default(),
            SpyRegistry::new(),
        )
        .unwrap();
        (broker, server)
    }

    #[tokio::test]
    async fn test_spy_records_extracted_arguments() {
        let (_, server) = setup();
        let spy = server.get_spy_for_handler::<Handlers>("handle_foo").unwrap();
        assert_eq!(spy.call_count(), 0);

        let delivery = Delivery::new("svc.foo", br#"{"name":"foo_evt"}"#.to_vec())
            .with_header(headers::USER_ID, "u-1");
        server.dispatch(delivery).await.unwrap();

        let call = spy.last_call().unwrap();
        assert_eq!(call[0], json!({ "name": "foo_evt" }));
        assert_eq!(call[1]["userId"], json!("u-1"));
        assert!(spy.was_called_with(&[json!({ "name": "foo_evt" })]));
        assert_eq!(server.spies().get("svc.foo").unwrap().call_count(), 1);
    }

    #[test]
    fn test_unknown_handler_has_no_spy() {
        let (_, server) = setup();
        let err = server.get_spy_for_handler::<Handlers>("missing").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownHandler {
                component: "Handlers",
                method: "missing".into(),
            }
        );
        assert!(server.get_spy_for_handler::<Foo>("handle_foo").is_err());
    }

    #[tokio::test]
    async fn test_clear_queues_covers_every_handler() {
        let (broker, server) = setup();
        server.start().await.unwrap();
        server.clear_queues(true, false).await.unwrap();

        let cleared = broker.cleared.lock();
        assert_eq!(cleared.len(), 1);
        let (handlers, also_delete, allow_reconnect) = &cleared[0];
        assert_eq!(
            handlers.iter().map(|h| h.method).collect::<Vec<_>>(),
            vec!["handle_foo", "raw"]
        );
        assert!(*also_delete);
        assert!(!*allow_reconnect);
    }

    #[tokio::test]
    async fn test_close_after_reconnecting_clear() {
        let (broker, server) = setup();
        server.start().await.unwrap();
        server.close().await.unwrap();

        assert!(server.clear_queues(false, false).await.is_err());
        server.clear_queues(false, true).await.unwrap();
        assert!(!broker.is_disconnected());

        server.close().await.unwrap();
        assert!(broker.is_disconnected());
        assert_eq!(broker.disconnects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_servers_share_spies_through_registry() {
        let spies = SpyRegistry::new();
        let registry = ComponentRegistry::new().with(Arc::new(Handlers));
        let first = TestDispatchServer::new(
            &registry,
            Arc::new(StubBroker::new("svc")),
            ServerOptions::default(),
            spies.clone(),
        )
        .unwrap();
        let second = TestDispatchServer::new(
            &registry,
            Arc::new(StubBroker::new("svc")),
            ServerOptions::default(),
            spies.clone(),
        )
        .unwrap();

        first
            .dispatch(Delivery::new("svc.foo", br#"{"name":"a"}"#.to_vec()))
            .await
            .unwrap();
        second
            .dispatch(Delivery::new("svc.foo", br#"{"name":"b"}"#.to_vec()))
            .await
            .unwrap();

        let spy = second.get_spy_for_handler::<Handlers>("handle_foo").unwrap();
        assert_eq!(spy.call_count(), 2);
        assert_eq!(spy.call(0).unwrap()[0], json!({ "name": "a" }));
        let same = first.get_spy_for_handler::<Handlers>("handle_foo").unwrap();
        assert_eq!(same.call_count(), 2);
        assert_eq!(spies.len(), 1);
    }
}

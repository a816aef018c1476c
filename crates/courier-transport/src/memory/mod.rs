//! The in-process messaging runtime.
//!
//! [`MemoryBroker`] implements [`Broker`] and [`QueueAdmin`] without a
//! network: exchanges, queues and bindings live in memory and every
//! subscription gets its own consumer task.
//!
//! ```text
//! publish(msg) ──▶ exchange ──binding──▶ queue ──consumer task──▶ DispatchCallback
//!                                                                     │
//!                   reply / error exchange ◀──────────── settle(outcome)
//! ```
//!
//! After each delivery the broker settles the dispatch result: replies are
//! published to their message's exchange and typed handler errors to the
//! managed [`ERROR_EXCHANGE`], both carrying the propagated headers of the
//! original delivery.

mod queue;
mod topology;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use courier_core::{
    Broker, ConnectionConfig, ConnectionError, ConnectionResult, Delivery, DispatchError,
    ERROR_EXCHANGE, ErrorMessage, HandlerMeta, Message, MessageMeta, Outcome, Properties,
    QueueAdmin, RoutingPattern, Subscription, headers,
};

use queue::{Consumer, Queue, Settle, consume};
use topology::Topology;

pub use topology::topic_matches;

const SUPPORTED_SCHEMES: [&str; 3] = ["amqp://", "amqps://", "memory://"];

// ─── Broker state ─────────────────────────────────────────────────────────────

struct Connection {
    config: ConnectionConfig,
    token: CancellationToken,
}

struct Inner {
    service: String,
    /// Suffix of per-instance queues.
    instance: String,
    topology: Mutex<Topology>,
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    connection: Mutex<Option<Connection>>,
    last_config: Mutex<Option<ConnectionConfig>>,
    reconnecting: AtomicBool,
    sequence: AtomicU64,
}

impl Inner {
    fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    fn queue_name(&self, handler: &HandlerMeta, pattern: &RoutingPattern) -> String {
        if handler.per_instance {
            format!("{pattern}.{}", self.instance)
        } else {
            pattern.to_string()
        }
    }

    fn publish_raw(
        &self,
        message: &MessageMeta,
        routing_key: &str,
        body: Vec<u8>,
        mut properties: Properties,
    ) -> ConnectionResult<()> {
        if !self.is_connected() {
            return Err(ConnectionError::Closed);
        }

        properties
            .message_id
            .get_or_insert_with(|| Uuid::new_v4().to_string());

        let targets = {
            let mut topology = self.topology.lock();
            topology.declare(message.exchange(), message.exchange_type);
            topology.route(message.exchange(), routing_key)
        };

        if targets.is_empty() {
            debug!(exchange = message.exchange(), routing_key, "no queue bound, message dropped");
            return Ok(());
        }

        let queues = self.queues.lock();
        for name in targets {
            let Some(queue) = queues.get(&name) else {
                continue;
            };
            let delivery = Delivery {
                consumer_tag: String::new(),
                delivery_tag: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
                exchange: message.exchange().to_string(),
                routing_key: routing_key.to_string(),
                body: body.clone(),
                properties: properties.clone(),
            };
            trace!(queue = %name, exchange = message.exchange(), routing_key, "enqueued");
            queue.push(delivery);
        }
        Ok(())
    }

    fn settle(&self, delivery: Delivery, result: Result<Outcome, DispatchError>) {
        match result {
            Ok(Outcome::Ack) => {
                trace!(tag = %delivery.consumer_tag, delivery_tag = delivery.delivery_tag, "acked");
            }
            Ok(Outcome::Reply {
                message,
                body,
                routing_key,
            }) => {
                let routing_key = routing_key
                    .as_deref()
                    .unwrap_or_else(|| message.default_routing_key());
                let published = serde_json::to_vec(&body)
                    .map_err(|e| ConnectionError::Other(e.to_string()))
                    .and_then(|bytes| {
                        self.publish_raw(&message, routing_key, bytes, propagated(&delivery))
                    });
                if let Err(e) = published {
                    warn!(reply = message.name, "failed to publish reply: {e}");
                }
            }
            Err(DispatchError::Handler(err)) => {
                warn!(tag = %delivery.consumer_tag, error = %err, "handler failed");
                let Some(error_type) = err.error_type else {
                    return;
                };
                let body = ErrorMessage {
                    error_type,
                    code: err.code,
                    message: err.message,
                };
                let routing_key = if delivery.exchange.is_empty() {
                    delivery.routing_key.as_str()
                } else {
                    delivery.exchange.as_str()
                };
                let published = serde_json::to_vec(&body)
                    .map_err(|e| ConnectionError::Other(e.to_string()))
                    .and_then(|bytes| {
                        self.publish_raw(&ERROR_EXCHANGE, routing_key, bytes, propagated(&delivery))
                    });
                if let Err(e) = published {
                    warn!("failed to publish error message: {e}");
                }
            }
            Err(err) => {
                error!(tag = %delivery.consumer_tag, "delivery rejected: {err}");
            }
        }
    }
}

/// Properties of a message published in response to `delivery`.
fn propagated(delivery: &Delivery) -> Properties {
    let mut properties = Properties {
        correlation_id: delivery.properties.correlation_id.clone(),
        ..Default::default()
    };
    for name in headers::PROPAGATED {
        if let Some(value) = delivery.header(name) {
            properties
                .headers
                .insert(name.to_string(), value.to_string());
        }
    }
    properties
}

// ─── MemoryBroker ─────────────────────────────────────────────────────────────

/// An in-process [`Broker`].
///
/// Cloning is cheap and shares the same exchanges and queues.
///
/// # Example
///
/// ```rust,ignore
/// let broker = Arc::new(MemoryBroker::new("pingpong"));
/// let server = DispatchServer::new(&registry, broker.clone(), ServerOptions::default())?;
/// server.start().await?;
///
/// broker.publish(&Ping { count: 0 }, None, Properties::default()).await?;
/// ```
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                service: service.into(),
                instance: Uuid::new_v4().simple().to_string(),
                topology: Mutex::new(Topology::default()),
                queues: Mutex::new(HashMap::new()),
                connection: Mutex::new(None),
                last_config: Mutex::new(None),
                reconnecting: AtomicBool::new(false),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    /// Publishes `message` to its exchange.
    ///
    /// Without a `routing_key` the message's default routing key is used.
    pub async fn publish<M: Message>(
        &self,
        message: &M,
        routing_key: Option<&str>,
        properties: Properties,
    ) -> ConnectionResult<()> {
        let body =
            serde_json::to_vec(message).map_err(|e| ConnectionError::Other(e.to_string()))?;
        let routing_key = routing_key.unwrap_or(M::META.default_routing_key());
        self.inner
            .publish_raw(&M::META, routing_key, body, properties)
    }

    /// Publishes `message` in response to `original`, carrying its
    /// correlation id and propagated headers.
    pub async fn publish_reply<M: Message>(
        &self,
        original: &Delivery,
        message: &M,
        routing_key: Option<&str>,
    ) -> ConnectionResult<()> {
        self.publish(message, routing_key, propagated(original)).await
    }

    /// Marks the connection as reconnecting, as a network runtime does while
    /// it re-establishes a dropped connection.
    pub fn set_reconnecting(&self, reconnecting: bool) {
        self.inner.reconnecting.store(reconnecting, Ordering::SeqCst);
    }

    /// Number of pending messages in `queue`.
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.inner.queues.lock().get(queue).map(|q| q.len())
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.inner.queues.lock().contains_key(queue)
    }

    /// Names of all declared queues, sorted.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.queues.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn queue(&self, name: &str) -> Arc<Queue> {
        self.inner
            .queues
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Queue::new(name)))
            .clone()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("service", &self.inner.service)
            .field("connected", &self.inner.is_connected())
            .field("queues", &self.queue_names())
            .finish()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn service_name(&self) -> &str {
        &self.inner.service
    }

    async fn connect(&self, config: &ConnectionConfig) -> ConnectionResult<()> {
        if !SUPPORTED_SCHEMES.iter().any(|s| config.url.starts_with(s)) {
            return Err(ConnectionError::ConnectFailed {
                url: config.url.clone(),
                reason: "unsupported scheme".into(),
            });
        }

        let mut connection = self.inner.connection.lock();
        if connection.is_some() {
            return Ok(());
        }
        *connection = Some(Connection {
            config: config.clone(),
            token: CancellationToken::new(),
        });
        *self.inner.last_config.lock() = Some(config.clone());
        self.inner.reconnecting.store(false, Ordering::SeqCst);

        info!(url = %config.url, service = %self.inner.service, "connected to broker");
        Ok(())
    }

    async fn disconnect(&self) -> ConnectionResult<()> {
        let Some(connection) = self.inner.connection.lock().take() else {
            return Ok(());
        };
        connection.token.cancel();
        for queue in self.inner.queues.lock().values() {
            queue.detach();
        }
        info!(url = %connection.config.url, "disconnected from broker");
        Ok(())
    }

    fn is_disconnected(&self) -> bool {
        !self.inner.is_connected()
    }

    fn is_reconnecting(&self) -> bool {
        self.inner.reconnecting.load(Ordering::SeqCst)
    }

    async fn register(
        &self,
        messages: &[MessageMeta],
        subscriptions: Vec<Subscription>,
    ) -> ConnectionResult<()> {
        let parent = match self.inner.connection.lock().as_ref() {
            Some(connection) => connection.token.clone(),
            None => return Err(ConnectionError::Closed),
        };

        {
            let mut topology = self.inner.topology.lock();
            topology.declare(ERROR_EXCHANGE.exchange(), ERROR_EXCHANGE.exchange_type);
            for message in messages {
                topology.declare(message.exchange(), message.exchange_type);
            }
        }

        let settle: Settle = {
            let inner = self.inner.clone();
            Arc::new(
                move |delivery: Delivery, result: Result<Outcome, DispatchError>| {
                    inner.settle(delivery, result)
                },
            )
        };

        for subscription in subscriptions {
            let name = self.inner.queue_name(&subscription.handler, &subscription.pattern);
            let queue = self.queue(&name);

            match subscription.handler.message {
                Some(message) => {
                    let mut topology = self.inner.topology.lock();
                    topology.declare(message.exchange(), message.exchange_type);
                    for key in subscription.handler.effective_binding_keys() {
                        topology.bind(message.exchange(), &key, &name);
                    }
                }
                None => {
                    warn!(queue = %name, "handler has no message type, queue left unbound");
                }
            }

            debug!(
                queue = %name,
                tag = %subscription.pattern,
                prefetch = subscription.handler.prefetch,
                "subscribed"
            );

            let token = queue.attach(&parent);
            let consumer = Consumer {
                tag: subscription.pattern,
                handler: subscription.handler,
                callback: subscription.callback,
            };
            tokio::spawn(consume(queue, consumer, token, settle.clone()));
        }

        Ok(())
    }
}

#[async_trait]
impl QueueAdmin for MemoryBroker {
    async fn clear_queues(
        &self,
        handlers: &[HandlerMeta],
        also_delete: bool,
        allow_reconnect: bool,
    ) -> ConnectionResult<()> {
        if self.is_disconnected() {
            if !allow_reconnect {
                return Err(ConnectionError::Closed);
            }
            let config = self.inner.last_config.lock().clone().unwrap_or_default();
            self.connect(&config).await?;
        }

        for handler in handlers {
            let pattern = RoutingPattern::from(self.consumer_tag(handler));
            let name = self.inner.queue_name(handler, &pattern);

            if also_delete {
                let removed = self.inner.queues.lock().remove(&name);
                let unbound = self.inner.topology.lock().unbind_queue(&name);
                if let Some(queue) = removed {
                    queue.detach();
                    debug!(queue = %name, bindings = unbound, "queue deleted");
                }
            } else if let Some(queue) = self.inner.queues.lock().get(&name) {
                let purged = queue.purge();
                debug!(queue = %name, purged, "queue purged");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::FutureExt;
    use serde::{Deserialize, Serialize};
    use tokio::sync::mpsc;

    use super::*;
    use courier_core::{DispatchCallback, DispatchFuture, ErrorType, ExchangeType, HandlerError};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Bar {
        msg: String,
    }

    impl Message for Bar {
        const META: MessageMeta = MessageMeta::new("bar").exchange_type(ExchangeType::Direct);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct BarFoo {
        msg: String,
    }

    impl Message for BarFoo {
        const META: MessageMeta = MessageMeta::new("bar-foo");
    }

    fn handler(method: &'static str, message: MessageMeta, keys: &[&str]) -> HandlerMeta {
        let mut meta = HandlerMeta::new("Handlers", method);
        meta.message = Some(message);
        meta.binding_keys = keys.iter().map(|k| k.to_string()).collect();
        meta
    }

    /// A subscription whose callback forwards every delivery to a channel and
    /// resolves with `outcome`.
    fn recording(
        broker: &MemoryBroker,
        meta: HandlerMeta,
        outcome: Result<Outcome, DispatchError>,
    ) -> (Subscription, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: DispatchCallback = Arc::new(move |delivery: Delivery| -> DispatchFuture {
            let _ = tx.send(delivery);
            futures::future::ready(outcome.clone()).boxed()
        });
        let subscription = Subscription {
            pattern: RoutingPattern::from(broker.consumer_tag(&meta)),
            handler: meta,
            callback,
        };
        (subscription, rx)
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Option<Delivery> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    async fn connected(service: &str) -> MemoryBroker {
        let broker = MemoryBroker::new(service);
        broker
            .connect(&ConnectionConfig::new("memory://test"))
            .await
            .unwrap();
        broker
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let broker = MemoryBroker::new("svc");
        let err = broker
            .connect(&ConnectionConfig::new("http://localhost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectFailed { .. }));
        assert!(broker.is_disconnected());
        assert!(matches!(
            broker.publish(&Bar { msg: "x".into() }, None, Properties::default()).await,
            Err(ConnectionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_direct_routing_by_binding_key() {
        let broker = connected("svc").await;
        let (bar, mut bar_rx) = recording(
            &broker,
            handler("handle_bar", Bar::META, &["bar"]),
            Ok(Outcome::Ack),
        );
        let (other, mut other_rx) = recording(
            &broker,
            handler("handle_other", Bar::META, &["bar-foo"]),
            Ok(Outcome::Ack),
        );
        broker.register(&[Bar::META], vec![bar, other]).await.unwrap();

        broker
            .publish(&Bar { msg: "hi".into() }, Some("bar"), Properties::default())
            .await
            .unwrap();

        let delivery = recv(&mut bar_rx).await.unwrap();
        assert_eq!(delivery.consumer_tag, "svc.bar[bar]");
        assert_eq!(delivery.exchange, "bar");
        assert_eq!(delivery.routing_key, "bar");
        assert!(delivery.properties.message_id.is_some());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reply_carries_propagated_headers() {
        let broker = connected("svc").await;
        let reply = Outcome::Reply {
            message: BarFoo::META,
            body: serde_json::json!({ "msg": "bar-foo" }),
            routing_key: None,
        };
        let (source, _source_rx) =
            recording(&broker, handler("handle_bar", Bar::META, &["bar"]), Ok(reply));
        let (sink, mut sink_rx) =
            recording(&broker, handler("handle_bar_foo", BarFoo::META, &[]), Ok(Outcome::Ack));
        broker
            .register(&[Bar::META, BarFoo::META], vec![source, sink])
            .await
            .unwrap();

        let properties = Properties {
            correlation_id: Some("c-1".into()),
            headers: [
                (headers::USER_ID.to_string(), "u-1".to_string()),
                (headers::EVENT_TYPE.to_string(), "bar".to_string()),
            ]
            .into(),
            ..Default::default()
        };
        broker
            .publish(&Bar { msg: "bar".into() }, Some("bar"), properties)
            .await
            .unwrap();

        let delivery = recv(&mut sink_rx).await.unwrap();
        assert_eq!(delivery.consumer_tag, "svc.bar-foo");
        assert_eq!(delivery.body, br#"{"msg":"bar-foo"}"#);
        assert_eq!(delivery.properties.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(delivery.header(headers::USER_ID), Some("u-1"));
        assert_eq!(delivery.header(headers::EVENT_TYPE), None);
    }

    #[tokio::test]
    async fn test_per_instance_queues_are_suffixed() {
        let broker = connected("svc").await;
        let mut meta = handler("handle_bar_foo", BarFoo::META, &[]);
        meta.per_instance = true;
        let (sink, _rx) = recording(&broker, meta, Ok(Outcome::Ack));
        broker.register(&[BarFoo::META], vec![sink]).await.unwrap();

        let names = broker.queue_names();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("svc.bar-foo."));
    }

    #[tokio::test]
    async fn test_typed_handler_error_reaches_error_exchange() {
        let broker = connected("svc").await;
        let (failing, _rx) = recording(
            &broker,
            handler("handle_bar", Bar::META, &["bar"]),
            Err(HandlerError::unauthorized().into()),
        );
        let (errors, mut errors_rx) = recording(
            &broker,
            handler("handle_error", ERROR_EXCHANGE, &["#"]),
            Ok(Outcome::Ack),
        );
        broker
            .register(&[Bar::META, ERROR_EXCHANGE], vec![failing, errors])
            .await
            .unwrap();

        broker
            .publish(&Bar { msg: "x".into() }, Some("bar"), Properties::default())
            .await
            .unwrap();

        let delivery = recv(&mut errors_rx).await.unwrap();
        assert_eq!(delivery.exchange, "error");
        assert_eq!(delivery.routing_key, "bar");
        let body: ErrorMessage = serde_json::from_slice(&delivery.body).unwrap();
        assert_eq!(body.error_type, ErrorType::Unauthorized);
        assert_eq!(body.code, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_clear_queues_purges_or_deletes() {
        let broker = connected("svc").await;
        let meta = handler("handle_bar", Bar::META, &["bar"]);
        let queue = broker.consumer_tag(&meta);

        // Bind without a consumer so messages stay queued.
        broker.register(&[Bar::META], Vec::new()).await.unwrap();
        broker.queue(&queue);
        broker.inner.topology.lock().bind("bar", "bar", &queue);

        broker
            .publish(&Bar { msg: "x".into() }, Some("bar"), Properties::default())
            .await
            .unwrap();
        assert_eq!(broker.queue_depth(&queue), Some(1));

        broker.clear_queues(&[meta.clone()], false, false).await.unwrap();
        assert_eq!(broker.queue_depth(&queue), Some(0));

        broker
            .publish(&Bar { msg: "y".into() }, Some("bar"), Properties::default())
            .await
            .unwrap();
        assert_eq!(broker.queue_depth(&queue), Some(1));

        broker.clear_queues(&[meta.clone()], true, false).await.unwrap();
        assert!(!broker.has_queue(&queue));
        broker
            .publish(&Bar { msg: "z".into() }, Some("bar"), Properties::default())
            .await
            .unwrap();
        assert_eq!(broker.queue_depth(&queue), None);
    }

    #[tokio::test]
    async fn test_clear_queues_while_disconnected() {
        let broker = connected("svc").await;
        broker.disconnect().await.unwrap();
        assert!(broker.is_disconnected());

        let meta = handler("handle_bar", Bar::META, &["bar"]);
        assert!(matches!(
            broker.clear_queues(&[meta.clone()], false, false).await,
            Err(ConnectionError::Closed)
        ));

        broker.clear_queues(&[meta], false, true).await.unwrap();
        assert!(!broker.is_disconnected());
    }

    #[tokio::test]
    async fn test_disconnect_stops_consumers() {
        let broker = connected("svc").await;
        let (bar, mut rx) = recording(
            &broker,
            handler("handle_bar", Bar::META, &["bar"]),
            Ok(Outcome::Ack),
        );
        let queue = bar.pattern.to_string();
        broker.register(&[Bar::META], vec![bar]).await.unwrap();

        broker.disconnect().await.unwrap();
        broker.disconnect().await.unwrap();
        broker
            .connect(&ConnectionConfig::new("memory://test"))
            .await
            .unwrap();
        broker
            .publish(&Bar { msg: "x".into() }, Some("bar"), Properties::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(broker.queue_depth(&queue), Some(1));
    }
}

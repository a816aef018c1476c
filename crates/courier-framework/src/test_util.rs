use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use courier_core::{
    Broker, ConnectionConfig, ConnectionError, ConnectionResult, HandlerMeta, MessageMeta,
    QueueAdmin, Subscription,
};

/// A messaging runtime that records what the dispatch layer asks of it.
pub(crate) struct StubBroker {
    service: String,
    fail_connect: bool,
    connected: AtomicBool,
    pub(crate) disconnects: AtomicUsize,
    pub(crate) messages: Mutex<Vec<MessageMeta>>,
    pub(crate) subscriptions: Mutex<Vec<Subscription>>,
    pub(crate) cleared: Mutex<Vec<(Vec<HandlerMeta>, bool, bool)>>,
}

impl StubBroker {
    pub(crate) fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            fail_connect: false,
            connected: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
            messages: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(service: &str) -> Self {
        Self {
            fail_connect: true,
            ..Self::new(service)
        }
    }
}

#[async_trait]
impl Broker for StubBroker {
    fn service_name(&self) -> &str {
        &self.service
    }

    async fn connect(&self, config: &ConnectionConfig) -> ConnectionResult<()> {
        if self.fail_connect {
            return Err(ConnectionError::ConnectFailed {
                url: config.url.clone(),
                reason: "refused".into(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> ConnectionResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_disconnected(&self) -> bool {
        !self.connected.load(Ordering::SeqCst)
    }

    async fn register(
        &self,
        messages: &[MessageMeta],
        subscriptions: Vec<Subscription>,
    ) -> ConnectionResult<()> {
        self.messages.lock().extend_from_slice(messages);
        self.subscriptions.lock().extend(subscriptions);
        Ok(())
    }
}

#[async_trait]
impl QueueAdmin for StubBroker {
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
            self.connected.store(true, Ordering::SeqCst);
        }
        self.cleared
            .lock()
            .push((handlers.to_vec(), also_delete, allow_reconnect));
        Ok(())
    }
}

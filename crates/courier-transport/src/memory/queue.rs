//! FIFO queues and their consumers.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use courier_core::{Delivery, DispatchCallback, DispatchError, HandlerMeta, Outcome, RoutingPattern};

/// The consumer attached to a queue.
#[derive(Clone)]
pub(crate) struct Consumer {
    pub(crate) tag: RoutingPattern,
    pub(crate) handler: HandlerMeta,
    pub(crate) callback: DispatchCallback,
}

/// A named in-memory queue.
///
/// Messages survive consumer restarts; only purging or deleting the queue
/// drops them.
pub(crate) struct Queue {
    name: String,
    messages: Mutex<VecDeque<Delivery>>,
    ready: Notify,
    consumer: Mutex<Option<CancellationToken>>,
}

impl Queue {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            consumer: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn push(&self, delivery: Delivery) {
        self.messages.lock().push_back(delivery);
        self.ready.notify_one();
    }

    /// Puts a delivery that was popped but not dispatched back at the head.
    pub(crate) fn requeue(&self, delivery: Delivery) {
        self.messages.lock().push_front(delivery);
        self.ready.notify_one();
    }

    /// Waits for the next message. Cancel-safe.
    pub(crate) async fn pop(&self) -> Delivery {
        loop {
            if let Some(delivery) = self.messages.lock().pop_front() {
                return delivery;
            }
            self.ready.notified().await;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Drops every pending message and returns how many there were.
    pub(crate) fn purge(&self) -> usize {
        let mut messages = self.messages.lock();
        let count = messages.len();
        messages.clear();
        count
    }

    /// Replaces the running consumer, returning the token of the new one.
    pub(crate) fn attach(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        if let Some(previous) = self.consumer.lock().replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Stops the running consumer, if any.
    pub(crate) fn detach(&self) {
        if let Some(token) = self.consumer.lock().take() {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("pending", &self.len())
            .finish()
    }
}

/// Settles the result of one dispatched delivery.
pub(crate) type Settle = Arc<dyn Fn(Delivery, Result<Outcome, DispatchError>) + Send + Sync>;

/// Consumes `queue` until `token` is cancelled.
///
/// At most `prefetch` deliveries are in flight at once; with a prefetch of
/// one, deliveries are handled strictly in queue order.
pub(crate) async fn consume(
    queue: Arc<Queue>,
    consumer: Consumer,
    token: CancellationToken,
    settle: Settle,
) {
    let permits = Arc::new(Semaphore::new(usize::from(consumer.handler.prefetch.max(1))));
    debug!(queue = queue.name(), tag = %consumer.tag, "consumer started");

    loop {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let mut delivery = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            delivery = queue.pop() => delivery,
        };
        if token.is_cancelled() {
            queue.requeue(delivery);
            break;
        }
        delivery.consumer_tag = consumer.tag.to_string();
        trace!(queue = queue.name(), delivery_tag = delivery.delivery_tag, "delivering");

        let callback = consumer.callback.clone();
        let settle = settle.clone();
        tokio::spawn(async move {
            let result = callback(delivery.clone()).await;
            settle(delivery, result);
            drop(permit);
        });
    }

    debug!(queue = queue.name(), tag = %consumer.tag, "consumer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::FutureExt;

    use super::*;
    use courier_core::DispatchFuture;

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let queue = Queue::new("q");
        queue.push(Delivery::new("t", b"1".to_vec()));
        queue.push(Delivery::new("t", b"2".to_vec()));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().await.body, b"1");
        assert_eq!(queue.pop().await.body, b"2");
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(Queue::new("q"));
        let pusher = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            pusher.push(Delivery::new("t", b"late".to_vec()));
        });

        let delivery = tokio::time::timeout(Duration::from_secs(1), queue.pop())
            .await
            .unwrap();
        assert_eq!(delivery.body, b"late");
    }

    #[test]
    fn test_requeue_goes_to_head() {
        let queue = Queue::new("q");
        queue.push(Delivery::new("t", b"2".to_vec()));
        queue.requeue(Delivery::new("t", b"1".to_vec()));

        let order: Vec<_> = queue
            .messages
            .lock()
            .iter()
            .map(|d| d.body.clone())
            .collect();
        assert_eq!(order, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[tokio::test]
    async fn test_cancelled_consumer_leaves_messages_queued() {
        let queue = Arc::new(Queue::new("q"));
        queue.push(Delivery::new("t", b"1".to_vec()));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback: DispatchCallback = Arc::new(move |_delivery: Delivery| -> DispatchFuture {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(Outcome::Ack)).boxed()
        });
        let consumer = Consumer {
            tag: RoutingPattern::from("svc.foo"),
            handler: HandlerMeta::new("Handlers", "handle_foo"),
            callback,
        };
        let settle: Settle =
            Arc::new(|_delivery: Delivery, _result: Result<Outcome, DispatchError>| {});

        let parent = CancellationToken::new();
        let token = queue.attach(&parent);
        parent.cancel();

        let consumer = consume(queue.clone(), consumer, token, settle);
        tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_purge_and_attach() {
        let queue = Queue::new("q");
        queue.push(Delivery::default());
        assert_eq!(queue.purge(), 1);
        assert_eq!(queue.len(), 0);

        let parent = CancellationToken::new();
        let first = queue.attach(&parent);
        let second = queue.attach(&parent);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        queue.detach();
        assert!(second.is_cancelled());
    }
}

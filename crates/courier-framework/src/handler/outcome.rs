//! Adapting handler return values into a single [`Outcome`].
//!
//! A handler may return a plain value, a deferred value or a lazy stream of
//! values. Whatever it returns resolves to exactly one [`Outcome`]:
//!
//! | Return type | Resolves to |
//! |-------------|-------------|
//! | `()` | [`Outcome::Ack`] |
//! | [`Outcome`] | itself |
//! | [`Reply<M>`] | [`Outcome::Reply`] carrying the encoded message |
//! | `Option<T>` | `T`'s outcome, or `Ack` for `None` |
//! | `Result<T, E>` | `T`'s outcome, or the error converted into a [`HandlerError`] |
//! | [`Deferred<F>`] | the outcome of the awaited future |
//! | [`First<S>`] | the outcome of the stream's first item; `Ack` for an empty stream |

use futures::future::{self, BoxFuture};
use futures::{FutureExt, Stream, StreamExt};

use courier_core::{HandlerError, HandlerResult, Message, MessageMeta, Outcome};

/// A type that a handler can return.
pub trait IntoOutcome: Send + 'static {
    /// Message type this value replies with, if any.
    fn reply() -> Option<MessageMeta> {
        None
    }

    /// Resolves this value into the invocation's outcome.
    fn into_outcome(self) -> BoxFuture<'static, HandlerResult<Outcome>>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> BoxFuture<'static, HandlerResult<Outcome>> {
        future::ready(Ok(Outcome::Ack)).boxed()
    }
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> BoxFuture<'static, HandlerResult<Outcome>> {
        future::ready(Ok(self)).boxed()
    }
}

impl<T: IntoOutcome> IntoOutcome for Option<T> {
    fn reply() -> Option<MessageMeta> {
        T::reply()
    }

    fn into_outcome(self) -> BoxFuture<'static, HandlerResult<Outcome>> {
        match self {
            Some(t) => t.into_outcome(),
            None => future::ready(Ok(Outcome::Ack)).boxed(),
        }
    }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<HandlerError> + Send + 'static,
{
    fn reply() -> Option<MessageMeta> {
        T::reply()
    }

    fn into_outcome(self) -> BoxFuture<'static, HandlerResult<Outcome>> {
        match self {
            Ok(t) => t.into_outcome(),
            Err(e) => future::ready(Err(e.into())).boxed(),
        }
    }
}

// ============================================================================
// Reply
// ============================================================================

/// A message published in response to the handled delivery.
///
/// ```rust,ignore
/// async fn handle_ping(self: Arc<Self>, Payload(ping): Payload<Ping>) -> Reply<Pong> {
///     Reply::new(Pong { count: ping.count + 1 })
/// }
/// ```
///
/// A reply published to a direct or topic exchange can pick its own routing
/// key:
///
/// ```rust,ignore
/// Reply::new(BarFoo { msg }).with_routing_key("bar-foo")
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<M> {
    message: M,
    routing_key: Option<String>,
}

impl<M> Reply<M> {
    pub fn new(message: M) -> Self {
        Self {
            message,
            routing_key: None,
        }
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    pub fn into_inner(self) -> M {
        self.message
    }
}

impl<M: Message> IntoOutcome for Reply<M> {
    fn reply() -> Option<MessageMeta> {
        Some(M::META)
    }

    fn into_outcome(self) -> BoxFuture<'static, HandlerResult<Outcome>> {
        let routing_key = self.routing_key;
        let outcome = serde_json::to_value(&self.message)
            .map(|body| Outcome::Reply {
                message: M::META,
                body,
                routing_key,
            })
            .map_err(|e| {
                HandlerError::internal(format!("failed to encode '{}' reply: {e}", M::META.name))
            });
        future::ready(outcome).boxed()
    }
}

// ============================================================================
// Deferred and streamed results
// ============================================================================

/// A value that resolves later.
///
/// ```rust,ignore
/// async fn handle(self: Arc<Self>) -> Deferred<BoxFuture<'static, HandlerResult<()>>> {
///     Deferred(self.store.flush().boxed())
/// }
/// ```
pub struct Deferred<F>(pub F);

impl<F> IntoOutcome for Deferred<F>
where
    F: Future + Send + 'static,
    F::Output: IntoOutcome,
{
    fn reply() -> Option<MessageMeta> {
        <F::Output as IntoOutcome>::reply()
    }

    fn into_outcome(self) -> BoxFuture<'static, HandlerResult<Outcome>> {
        async move { self.0.await.into_outcome().await }.boxed()
    }
}

/// A lazy sequence of values of which only the first counts.
///
/// The stream is polled until it yields once and is then dropped without
/// being polled again. An item that is an error fails the invocation, so a
/// stream that errors before producing a value is a failure. A stream that
/// ends without yielding resolves to [`Outcome::Ack`].
pub struct First<S>(pub S);

impl<S> IntoOutcome for First<S>
where
    S: Stream + Send + 'static,
    S::Item: IntoOutcome,
{
    fn reply() -> Option<MessageMeta> {
        <S::Item as IntoOutcome>::reply()
    }

    fn into_outcome(self) -> BoxFuture<'static, HandlerResult<Outcome>> {
        async move {
            let mut stream = Box::pin(self.0);
            match stream.next().await {
                Some(item) => item.into_outcome().await,
                None => Ok(Outcome::Ack),
            }
        }
        .boxed()
    }
}

//! Tower services for handler invocation.
//!
//! [`HandlerService`] wraps a bound handler and implements
//! `tower::Service<Arc<Request>>`. Cross-cutting concerns are ordinary tower
//! [`Layer`]s stacked on top of it; the dispatch server stacks a
//! [`GuardLayer`] built from the handler's guards.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceBuilder};
use tracing::debug;

use courier_core::{HandlerError, HandlerResult, Outcome};

use super::traits::BoxedInvoker;
use crate::context::Request;

/// The composed, type-erased service a descriptor dispatches through.
pub type HandlerPipeline = BoxCloneSyncService<Arc<Request>, Outcome, HandlerError>;

// ============================================================================
// Guard
// ============================================================================

/// An authorization check run before a handler's arguments are extracted.
///
/// Returning `Ok(false)` rejects the delivery with [`HandlerError::forbidden`].
/// A guard can reject with a more specific error by returning it directly.
///
/// # Example
///
/// ```rust,ignore
/// struct JwtGuard;
///
/// #[async_trait]
/// impl Guard for JwtGuard {
///     async fn can_activate(&self, request: &Request) -> HandlerResult<bool> {
///         let token = request.header("jwt").ok_or_else(HandlerError::unauthorized)?;
///         let subject = verify(token).map_err(|_| HandlerError::unauthorized())?;
///         request.context().insert(subject);
///         Ok(true)
///     }
/// }
/// ```
#[async_trait]
pub trait Guard: Send + Sync + 'static {
    async fn can_activate(&self, request: &Request) -> HandlerResult<bool>;
}

/// Shared guard trait object.
pub type BoxedGuard = Arc<dyn Guard>;

/// A [`Layer`] that runs guards in order before the inner service.
#[derive(Clone)]
pub struct GuardLayer {
    guards: Arc<[BoxedGuard]>,
}

impl GuardLayer {
    pub fn new(guards: Arc<[BoxedGuard]>) -> Self {
        Self { guards }
    }
}

impl<S> Layer<S> for GuardLayer {
    type Service = GuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService {
            inner,
            guards: self.guards.clone(),
        }
    }
}

impl fmt::Debug for GuardLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardLayer")
            .field("guards", &self.guards.len())
            .finish()
    }
}

pub struct GuardService<S> {
    inner: S,
    guards: Arc<[BoxedGuard]>,
}

impl<S: Clone> Clone for GuardService<S> {
    fn clone(&self) -> Self {
        GuardService {
            inner: self.inner.clone(),
            guards: self.guards.clone(),
        }
    }
}

impl<S> Service<Arc<Request>> for GuardService<S>
where
    S: Service<Arc<Request>, Response = Outcome, Error = HandlerError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Outcome;
    type Error = HandlerError;
    type Future = BoxFuture<'static, HandlerResult<Outcome>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Arc<Request>) -> Self::Future {
        let guards = self.guards.clone();
        let mut inner = self.inner.clone();
        async move {
            for guard in guards.iter() {
                if !guard.can_activate(&request).await? {
                    debug!(handler = %request.descriptor().qualified_name(), "guard rejected delivery");
                    return Err(HandlerError::forbidden());
                }
            }
            inner.call(request).await
        }
        .boxed()
    }
}

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] that calls a single bound handler.
#[derive(Clone)]
pub struct HandlerService {
    invoker: BoxedInvoker,
}

impl HandlerService {
    pub fn new(invoker: BoxedInvoker) -> Self {
        Self { invoker }
    }
}

impl Service<Arc<Request>> for HandlerService {
    type Response = Outcome;
    type Error = HandlerError;
    type Future = BoxFuture<'static, HandlerResult<Outcome>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Arc<Request>) -> Self::Future {
        (self.invoker)(request)
    }
}

/// Stacks the guard layer on top of the handler and erases the result.
pub(crate) fn pipeline(guards: Arc<[BoxedGuard]>, invoker: BoxedInvoker) -> HandlerPipeline {
    let service = ServiceBuilder::new()
        .layer(GuardLayer::new(guards))
        .service(HandlerService::new(invoker));
    BoxCloneSyncService::new(service)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tower::ServiceExt;

    use super::*;
    use crate::binder::ParameterBindings;
    use crate::descriptor::HandlerDescriptor;
    use crate::test_util::StubBroker;
    use courier_core::{Delivery, ErrorType, HandlerMeta};

    struct Allow(bool);

    #[async_trait]
    impl Guard for Allow {
        async fn can_activate(&self, _request: &Request) -> HandlerResult<bool> {
            Ok(self.0)
        }
    }

    struct RequireJwt;

    #[async_trait]
    impl Guard for RequireJwt {
        async fn can_activate(&self, request: &Request) -> HandlerResult<bool> {
            request
                .header("jwt")
                .map(|_| true)
                .ok_or_else(HandlerError::unauthorized)
        }
    }

    fn counting_invoker(calls: Arc<AtomicUsize>) -> BoxedInvoker {
        Arc::new(move |_request: Arc<Request>| -> BoxFuture<'static, HandlerResult<Outcome>> {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(Outcome::Ack)).boxed()
        })
    }

    fn request(delivery: Delivery) -> Arc<Request> {
        let descriptor = HandlerDescriptor::stub(HandlerMeta::new("Handlers", "handle"), vec![], true);
        Arc::new(Request::new(
            delivery,
            Arc::new(descriptor),
            ParameterBindings::default(),
            Arc::new(StubBroker::new("svc")),
        ))
    }

    #[tokio::test]
    async fn test_guards_run_before_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let guards: Arc<[BoxedGuard]> = Arc::from(vec![Arc::new(Allow(true)) as BoxedGuard]);
        let svc = pipeline(guards, counting_invoker(calls.clone()));

        let outcome = svc.oneshot(request(Delivery::default())).await.unwrap();
        assert_eq!(outcome, Outcome::Ack);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejecting_guard_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let guards: Arc<[BoxedGuard]> = Arc::from(vec![
            Arc::new(RequireJwt) as BoxedGuard,
            Arc::new(Allow(false)) as BoxedGuard,
        ]);
        let svc = pipeline(guards, counting_invoker(calls.clone()));

        let err = svc
            .clone()
            .oneshot(request(Delivery::default()))
            .await
            .unwrap_err();
        assert_eq!(err.error_type, Some(ErrorType::Unauthorized));

        let err = svc
            .oneshot(request(Delivery::default().with_header("jwt", "token")))
            .await
            .unwrap_err();
        assert_eq!(err.error_type, Some(ErrorType::Forbidden));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

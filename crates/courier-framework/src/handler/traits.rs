//! Handler traits for the Courier framework.
//!
//! Handlers are plain async functions. The first parameter is the owning
//! component (`Arc<C>`, usually written as an `self: Arc<Self>` receiver);
//! every following parameter implements [`FromRequest`]. Blanket
//! implementations cover 0-16 extracted parameters.
//!
//! # Example
//!
//! ```rust,ignore
//! impl Handlers {
//!     // Payload only
//!     async fn handle_foo(self: Arc<Self>, foo: Payload<Foo>) {}
//!
//!     // Payload, raw delivery and trace context
//!     async fn handle_bar(
//!         self: Arc<Self>,
//!         bar: Payload<Bar>,
//!         delivery: Delivery,
//!         trace: TraceContext,
//!     ) -> HandlerResult<()> {
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use courier_core::{HandlerError, HandlerResult, MessageMeta, Outcome};

use super::outcome::IntoOutcome;
use crate::context::Request;
use crate::descriptor::ParamShape;
use crate::extractor::FromRequest;

/// Observes the snapshots of every extracted argument right before the
/// handler body runs.
pub type InvocationHook = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// A type-erased handler bound to its component instance.
pub type BoxedInvoker =
    Arc<dyn Fn(Arc<Request>) -> BoxFuture<'static, HandlerResult<Outcome>> + Send + Sync>;

// ============================================================================
// Handler Trait
// ============================================================================

/// A handler method of component `C`.
///
/// # Blanket Implementation
///
/// Implemented for async functions that:
/// - Take `Arc<C>` followed by 0-16 parameters implementing [`FromRequest`]
/// - Return a type implementing [`IntoOutcome`]
///
/// An argument that fails to extract fails the invocation with the
/// corresponding [`HandlerError`]; the handler body does not run.
pub trait Handler<C, T>: Clone + Send + Sync + 'static {
    /// Declared shapes of the extracted parameters, in order.
    fn shapes() -> Vec<ParamShape>;

    /// Message type the handler replies with, if any.
    fn reply() -> Option<MessageMeta>;

    /// Extracts the arguments, reports them to `hook` and runs the handler.
    fn call(
        self,
        component: Arc<C>,
        request: Arc<Request>,
        hook: Option<InvocationHook>,
    ) -> BoxFuture<'static, HandlerResult<Outcome>>;
}

/// A function declared as a handler without a component receiver.
///
/// Only its parameter shapes are known; such handlers are rejected when the
/// dispatch server is set up.
pub trait UnboundHandler<T>: Send + Sync + 'static {
    fn shapes() -> Vec<ParamShape>;
}

// ============================================================================
// Handler implementations for functions (Axum-style)
// ============================================================================

/// Generates [`Handler`] and [`UnboundHandler`] implementations for functions
/// with different arities.
macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
        impl<F, Fut, Res, C, $($ty,)*> Handler<C, ($($ty,)*)> for F
        where
            F: FnOnce(Arc<C>, $($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: IntoOutcome,
            C: Send + Sync + 'static,
            $( $ty: FromRequest, )*
        {
            fn shapes() -> Vec<ParamShape> {
                vec![$($ty::shape(),)*]
            }

            fn reply() -> Option<MessageMeta> {
                Res::reply()
            }

            fn call(
                self,
                component: Arc<C>,
                request: Arc<Request>,
                hook: Option<InvocationHook>,
            ) -> BoxFuture<'static, HandlerResult<Outcome>> {
                async move {
                    let mut position = 0usize;
                    $(
                        let $ty = $ty::from_request(&request, position).map_err(HandlerError::from)?;
                        position += 1;
                    )*

                    if let Some(hook) = hook {
                        hook(&[$($ty.snapshot(),)*]);
                    }

                    (self)(component, $($ty,)*).await.into_outcome().await
                }
                .boxed()
            }
        }

        #[allow(non_snake_case)]
        impl<F, Fut, $($ty,)*> UnboundHandler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Send + Sync + 'static,
            Fut: Future + Send + 'static,
            $( $ty: FromRequest, )*
        {
            fn shapes() -> Vec<ParamShape> {
                vec![$($ty::shape(),)*]
            }
        }
    };
}

// Generate implementations for 0-16 parameters
impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14);
impl_handler!(
    T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14, T15
);
impl_handler!(
    T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14, T15, T16
);

#[cfg(test)]
mod tests {
    use courier_core::{Delivery, TraceContext};

    use super::*;

    struct Wide;

    impl Wide {
        async fn none(self: Arc<Self>) {}

        #[allow(clippy::too_many_arguments)]
        async fn sixteen(
            self: Arc<Self>,
            _a1: TraceContext,
            _a2: Delivery,
            _a3: TraceContext,
            _a4: Delivery,
            _a5: TraceContext,
            _a6: Delivery,
            _a7: TraceContext,
            _a8: Delivery,
            _a9: TraceContext,
            _a10: Delivery,
            _a11: TraceContext,
            _a12: Delivery,
            _a13: TraceContext,
            _a14: Delivery,
            _a15: TraceContext,
            _a16: Delivery,
        ) {
        }
    }

    fn shapes_of<C, T, H: Handler<C, T>>(_handler: H) -> Vec<ParamShape> {
        H::shapes()
    }

    #[test]
    fn test_handlers_take_zero_to_sixteen_extractors() {
        assert!(shapes_of(Wide::none).is_empty());

        let shapes = shapes_of(Wide::sixteen);
        assert_eq!(shapes.len(), 16);
        assert!(matches!(shapes[0], ParamShape::TraceContext));
        assert!(matches!(shapes[15], ParamShape::RawDelivery));
    }
}

//! Per-delivery request state.
//!
//! One [`Request`] is created for every dispatched delivery and shared by the
//! guards, the extractors and the handler. It carries:
//!
//! - the inbound [`Delivery`]
//! - the [`HandlerDescriptor`] the delivery was routed to
//! - the handler's [`ParameterBindings`]
//! - the messaging runtime used for decoding
//! - a [`RequestContext`] for values guards hand to extractors

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use courier_core::{Broker, Delivery, HandlerMeta};

use crate::binder::{ParameterBinding, ParameterBindings};
use crate::descriptor::HandlerDescriptor;

// =============================================================================
// RequestContext
// =============================================================================

/// Typed extension storage scoped to one request.
///
/// A guard that authenticates the caller can stash the subject here, and a
/// custom extractor picks it up again.
///
/// ```rust,ignore
/// ctx.insert(Subject("user-1".into()));
/// let subject: Option<Subject> = ctx.get();
/// ```
#[derive(Default)]
pub struct RequestContext {
    extensions: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
        self.extensions
            .lock()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a clone of the stored value of type `T`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.extensions
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.lock().contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&self) -> Option<T> {
        self.extensions
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("extensions", &self.extensions.lock().len())
            .finish()
    }
}

// =============================================================================
// Request
// =============================================================================

/// Everything known about one dispatched delivery.
pub struct Request {
    delivery: Delivery,
    descriptor: Arc<HandlerDescriptor>,
    bindings: ParameterBindings,
    broker: Arc<dyn Broker>,
    context: RequestContext,
}

impl Request {
    pub fn new(
        delivery: Delivery,
        descriptor: Arc<HandlerDescriptor>,
        bindings: ParameterBindings,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            delivery,
            descriptor,
            bindings,
            broker,
            context: RequestContext::new(),
        }
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub fn descriptor(&self) -> &Arc<HandlerDescriptor> {
        &self.descriptor
    }

    pub fn handler(&self) -> &HandlerMeta {
        self.descriptor.meta()
    }

    /// The resolver bound to the parameter at `position`, if any.
    pub fn binding(&self, position: usize) -> Option<&ParameterBinding> {
        self.bindings.get(position)
    }

    pub fn broker(&self) -> &dyn Broker {
        self.broker.as_ref()
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Handler metadata declared under `key`.
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.descriptor.metadata(key)
    }

    /// Shorthand for a delivery header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.delivery.header(name)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("delivery", &self.delivery)
            .field("handler", &self.descriptor.qualified_name())
            .field("bindings", &self.bindings)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Subject(String);

    #[test]
    fn test_extensions_are_typed() {
        let ctx = RequestContext::new();
        assert!(!ctx.contains::<Subject>());

        ctx.insert(Subject("alice".into()));
        ctx.insert(42u32);

        assert_eq!(ctx.get::<Subject>(), Some(Subject("alice".into())));
        assert_eq!(ctx.get::<u32>(), Some(42));
        assert_eq!(ctx.get::<u64>(), None);

        ctx.insert(Subject("bob".into()));
        assert_eq!(ctx.remove::<Subject>(), Some(Subject("bob".into())));
        assert!(!ctx.contains::<Subject>());
    }
}

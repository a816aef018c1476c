//! Discovered handler descriptors.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use courier_core::{HandlerMeta, MessageMeta};

use crate::handler::{BoxedGuard, BoxedInvoker, HandlerPipeline, InvocationHook};

/// The declared shape of one handler parameter.
///
/// Every extractor reports its shape when the handler is declared; the
/// [`ArgumentBinder`](crate::ArgumentBinder) turns shapes into resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    /// A decoded message payload.
    Payload(MessageMeta),
    /// The untouched inbound delivery.
    RawDelivery,
    /// Trace metadata derived from the delivery headers.
    TraceContext,
    /// Resolved by the extractor itself.
    Custom(&'static str),
}

/// Identity of a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId {
    pub type_id: TypeId,
    pub name: &'static str,
}

impl ComponentId {
    pub fn of<C: 'static>() -> Self {
        let full = std::any::type_name::<C>();
        let base = full.split('<').next().unwrap_or(full);
        Self {
            type_id: TypeId::of::<C>(),
            name: base.rsplit("::").next().unwrap_or(base),
        }
    }
}

/// Produces the invoker of a bound handler, optionally wrapped with a hook
/// that observes the extracted arguments.
pub(crate) type InvokerFactory = Arc<dyn Fn(Option<InvocationHook>) -> BoxedInvoker + Send + Sync>;

/// One discovered message handler.
///
/// Identity fields are fixed at discovery. The dispatch pipeline is attached
/// exactly once while the server decorates its handlers.
pub struct HandlerDescriptor {
    pub(crate) component: ComponentId,
    pub(crate) meta: HandlerMeta,
    pub(crate) params: Vec<ParamShape>,
    pub(crate) metadata: HashMap<String, Value>,
    pub(crate) guards: Arc<[BoxedGuard]>,
    /// `None` for handlers declared with [`HandlerSet::function`](crate::HandlerSet::function).
    pub(crate) invoker: Option<InvokerFactory>,
    pipeline: OnceLock<HandlerPipeline>,
}

impl HandlerDescriptor {
    pub(crate) fn new(
        component: ComponentId,
        meta: HandlerMeta,
        params: Vec<ParamShape>,
        metadata: HashMap<String, Value>,
        guards: Arc<[BoxedGuard]>,
        invoker: Option<InvokerFactory>,
    ) -> Self {
        Self {
            component,
            meta,
            params,
            metadata,
            guards,
            invoker,
            pipeline: OnceLock::new(),
        }
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    pub fn method(&self) -> &'static str {
        self.meta.method
    }

    pub fn message(&self) -> Option<MessageMeta> {
        self.meta.message
    }

    pub fn reply(&self) -> Option<MessageMeta> {
        self.meta.reply
    }

    pub fn params(&self) -> &[ParamShape] {
        &self.params
    }

    /// Handler metadata attached with [`HandlerOptions::metadata`](crate::HandlerOptions::metadata).
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// `true` when the handler is not bound to a component instance.
    pub fn is_static(&self) -> bool {
        self.invoker.is_none()
    }

    /// `Component.method`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.meta.component, self.meta.method)
    }

    pub(crate) fn invoker(&self, hook: Option<InvocationHook>) -> Option<BoxedInvoker> {
        self.invoker.as_ref().map(|factory| factory(hook))
    }

    /// Attaches the dispatch pipeline. Returns `false` if one was already attached.
    pub(crate) fn attach(&self, pipeline: HandlerPipeline) -> bool {
        self.pipeline.set(pipeline).is_ok()
    }

    /// The dispatch pipeline, once the server has decorated this handler.
    pub fn pipeline(&self) -> Option<&HandlerPipeline> {
        self.pipeline.get()
    }
}

#[cfg(test)]
impl HandlerDescriptor {
    /// A descriptor whose invoker acknowledges every request, or a static one.
    pub(crate) fn stub(meta: HandlerMeta, params: Vec<ParamShape>, bound: bool) -> Self {
        use courier_core::{HandlerResult, Outcome};
        use futures::future::BoxFuture;

        let invoker = bound.then(|| {
            let factory: InvokerFactory = Arc::new(|_hook: Option<InvocationHook>| -> BoxedInvoker {
                Arc::new(
                    |_request: Arc<crate::Request>| -> BoxFuture<'static, HandlerResult<Outcome>> {
                        Box::pin(async { Ok(Outcome::Ack) })
                    },
                )
            });
            factory
        });

        struct Stub;
        Self::new(
            ComponentId::of::<Stub>(),
            meta,
            params,
            HashMap::new(),
            Arc::from(Vec::new()),
            invoker,
        )
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("component", &self.component.name)
            .field("meta", &self.meta)
            .field("params", &self.params)
            .field("guards", &self.guards.len())
            .field("is_static", &self.is_static())
            .field("attached", &self.pipeline.get().is_some())
            .finish()
    }
}

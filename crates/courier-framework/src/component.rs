//! Component and handler declaration.
//!
//! Application components declare their message handlers explicitly through
//! [`Component::handlers`]. Each declaration records the handler's binding
//! options and the shapes of its parameters at registration time.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Handlers {
//!     publisher: MemoryBroker,
//! }
//!
//! impl Component for Handlers {
//!     fn handlers(set: &mut HandlerSet<Self>) {
//!         set.handler("handle_foo", Self::handle_foo);
//!         set.handler("handle_bar", Self::handle_bar)
//!             .binding_key("bar")
//!             .prefetch(10);
//!     }
//! }
//!
//! let registry = ComponentRegistry::new().with(Arc::new(Handlers { publisher }));
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use courier_core::{HandlerMeta, HandlerResult, Message, Outcome};

use crate::context::Request;
use crate::descriptor::{ComponentId, HandlerDescriptor, InvokerFactory, ParamShape};
use crate::handler::{BoxedGuard, BoxedInvoker, Guard, Handler, InvocationHook, UnboundHandler};

// =============================================================================
// Component
// =============================================================================

/// An application component that may own message handlers.
pub trait Component: Send + Sync + Sized + 'static {
    /// Declares the component's handlers. Components without handlers keep
    /// the default, which declares nothing.
    fn handlers(_set: &mut HandlerSet<Self>) {}
}

// =============================================================================
// HandlerOptions
// =============================================================================

/// Binding options of one declared handler.
pub struct HandlerOptions {
    meta: HandlerMeta,
    metadata: HashMap<String, Value>,
    guards: Vec<BoxedGuard>,
}

impl HandlerOptions {
    /// Adds a binding key.
    pub fn binding_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.meta.binding_keys.push(key.into());
        self
    }

    /// Adds several binding keys.
    pub fn binding_keys<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.binding_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn prefetch(&mut self, prefetch: u16) -> &mut Self {
        self.meta.prefetch = prefetch;
        self
    }

    /// Gives every process its own queue for this handler.
    pub fn per_instance(&mut self) -> &mut Self {
        self.meta.per_instance = true;
        self
    }

    /// Sets the consumed message type explicitly.
    ///
    /// Needed for handlers that consume a message without decoding it, such
    /// as handlers taking only the raw [`Delivery`](courier_core::Delivery).
    pub fn message<M: Message>(&mut self) -> &mut Self {
        self.meta.message = Some(M::META);
        self
    }

    /// Attaches metadata readable by guards through
    /// [`Request::metadata`](crate::Request::metadata).
    pub fn metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Adds a guard that only applies to this handler.
    pub fn guard(&mut self, guard: impl Guard) -> &mut Self {
        self.guards.push(Arc::new(guard));
        self
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("meta", &self.meta)
            .field("metadata", &self.metadata)
            .field("guards", &self.guards.len())
            .finish()
    }
}

// =============================================================================
// HandlerSet
// =============================================================================

type ErasedCall<C> = Arc<
    dyn Fn(Arc<C>, Arc<Request>, Option<InvocationHook>) -> BoxFuture<'static, HandlerResult<Outcome>>
        + Send
        + Sync,
>;

struct HandlerEntry<C> {
    options: HandlerOptions,
    params: Vec<ParamShape>,
    call: Option<ErasedCall<C>>,
}

/// The handlers declared by component `C`.
pub struct HandlerSet<C> {
    guards: Vec<BoxedGuard>,
    entries: Vec<HandlerEntry<C>>,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Component> HandlerSet<C> {
    fn new() -> Self {
        Self {
            guards: Vec::new(),
            entries: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Adds a guard applied to every handler of this component.
    pub fn guard(&mut self, guard: impl Guard) -> &mut Self {
        self.guards.push(Arc::new(guard));
        self
    }

    /// Declares an instance-bound handler.
    ///
    /// The consumed message type is taken from the first payload parameter
    /// and the reply type from the return type.
    pub fn handler<H, T>(&mut self, method: &'static str, handler: H) -> &mut HandlerOptions
    where
        H: Handler<C, T>,
        T: 'static,
    {
        let call: ErasedCall<C> = Arc::new(
            move |component: Arc<C>,
                  request: Arc<Request>,
                  hook: Option<InvocationHook>|
                  -> BoxFuture<'static, HandlerResult<Outcome>> {
                handler.clone().call(component, request, hook)
            },
        );
        let mut meta = HandlerMeta::new(ComponentId::of::<C>().name, method);
        meta.reply = H::reply();
        self.push(meta, H::shapes(), Some(call))
    }

    /// Declares a handler on a function that has no component receiver.
    ///
    /// Such handlers cannot be dispatched to; the server refuses to start
    /// while one is registered.
    pub fn function<H, T>(&mut self, method: &'static str, _handler: H) -> &mut HandlerOptions
    where
        H: UnboundHandler<T>,
        T: 'static,
    {
        let meta = HandlerMeta::new(ComponentId::of::<C>().name, method);
        self.push(meta, H::shapes(), None)
    }

    fn push(
        &mut self,
        mut meta: HandlerMeta,
        params: Vec<ParamShape>,
        call: Option<ErasedCall<C>>,
    ) -> &mut HandlerOptions {
        meta.message = params.iter().find_map(|shape| match shape {
            ParamShape::Payload(message) => Some(*message),
            _ => None,
        });
        self.entries.push(HandlerEntry {
            options: HandlerOptions {
                meta,
                metadata: HashMap::new(),
                guards: Vec::new(),
            },
            params,
            call,
        });
        let last = self.entries.len() - 1;
        &mut self.entries[last].options
    }

    fn into_descriptors(self, instance: Arc<C>) -> Vec<HandlerDescriptor> {
        let component = ComponentId::of::<C>();
        let component_guards = self.guards;

        self.entries
            .into_iter()
            .map(|entry| {
                let guards: Arc<[BoxedGuard]> = component_guards
                    .iter()
                    .cloned()
                    .chain(entry.options.guards)
                    .collect();
                let invoker = entry.call.map(|call| bind(call, instance.clone()));
                HandlerDescriptor::new(
                    component,
                    entry.options.meta,
                    entry.params,
                    entry.options.metadata,
                    guards,
                    invoker,
                )
            })
            .collect()
    }
}

fn bind<C: Send + Sync + 'static>(call: ErasedCall<C>, instance: Arc<C>) -> InvokerFactory {
    Arc::new(move |hook: Option<InvocationHook>| -> BoxedInvoker {
        let call = call.clone();
        let instance = instance.clone();
        Arc::new(move |request: Arc<Request>| call(instance.clone(), request, hook.clone()))
    })
}

// =============================================================================
// ComponentRegistry
// =============================================================================

type Collector = Box<dyn Fn() -> Vec<HandlerDescriptor> + Send + Sync>;

pub(crate) struct RegisteredComponent {
    pub(crate) id: ComponentId,
    pub(crate) collect: Collector,
}

/// The live component instances of the application.
#[derive(Default)]
pub struct ComponentRegistry {
    components: Vec<RegisteredComponent>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component instance.
    pub fn register<C: Component>(&mut self, instance: Arc<C>) -> &mut Self {
        let collect: Collector = Box::new(move || {
            let mut set = HandlerSet::<C>::new();
            C::handlers(&mut set);
            set.into_descriptors(instance.clone())
        });
        self.components.push(RegisteredComponent {
            id: ComponentId::of::<C>(),
            collect,
        });
        self
    }

    /// Registers a component instance (builder pattern).
    pub fn with<C: Component>(mut self, instance: Arc<C>) -> Self {
        self.register(instance);
        self
    }

    /// Number of registered instances, duplicates included.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn contains<C: 'static>(&self) -> bool {
        self.components
            .iter()
            .any(|c| c.id.type_id == TypeId::of::<C>())
    }

    pub(crate) fn components(&self) -> &[RegisteredComponent] {
        &self.components
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.components.iter().map(|c| c.id.name))
            .finish()
    }
}

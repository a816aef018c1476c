//! Handler discovery over the component registry.

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::component::ComponentRegistry;
use crate::descriptor::HandlerDescriptor;

/// Produces the flat list of handlers declared by registered components.
#[derive(Debug, Clone, Copy)]
pub struct HandlerDiscovery<'a> {
    registry: &'a ComponentRegistry,
}

impl<'a> HandlerDiscovery<'a> {
    pub fn new(registry: &'a ComponentRegistry) -> Self {
        Self { registry }
    }

    /// Collects every handler once per component type.
    ///
    /// A component type registered several times contributes the handlers of
    /// its first instance only. An empty result is not an error.
    pub fn discover(&self) -> Vec<Arc<HandlerDescriptor>> {
        let mut seen: HashSet<TypeId> = HashSet::new();
        let mut handlers = Vec::new();

        for component in self.registry.components() {
            if !seen.insert(component.id.type_id) {
                continue;
            }

            let found = (component.collect)();
            if found.is_empty() {
                continue;
            }

            debug!(
                "registering handlers: {}( {} )",
                component.id.name,
                found
                    .iter()
                    .map(|d| d.meta().describe())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            handlers.extend(found.into_iter().map(Arc::new));
        }

        handlers
    }
}

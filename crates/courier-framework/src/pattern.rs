//! Routing-pattern derivation.

use std::sync::Arc;

use courier_core::{Broker, RoutingPattern};

use crate::descriptor::HandlerDescriptor;

/// Computes the routing pattern of a handler.
///
/// The tag rule itself belongs to the messaging runtime
/// ([`Broker::consumer_tag`]); the deriver only feeds it the handler's
/// message type and binding metadata. It holds no state and caches nothing.
#[derive(Clone)]
pub struct PatternDeriver {
    broker: Arc<dyn Broker>,
}

impl PatternDeriver {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub fn pattern_for(&self, descriptor: &HandlerDescriptor) -> RoutingPattern {
        RoutingPattern::from(self.broker.consumer_tag(descriptor.meta()))
    }
}

impl std::fmt::Debug for PatternDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternDeriver")
            .field("service", &self.broker.service_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::StubBroker;
    use courier_core::{HandlerMeta, MessageMeta};

    #[test]
    fn test_pattern_delegates_to_runtime_rule() {
        let deriver = PatternDeriver::new(Arc::new(StubBroker::new("svc")));

        let mut meta = HandlerMeta::new("Handlers", "handle_bar");
        meta.message = Some(MessageMeta::new("bar"));
        meta.binding_keys = vec!["bar".into()];
        let descriptor = HandlerDescriptor::stub(meta, vec![], true);

        let first = deriver.pattern_for(&descriptor);
        assert_eq!(first.as_str(), "svc.bar[bar]");
        assert_eq!(deriver.pattern_for(&descriptor), first);
    }
}

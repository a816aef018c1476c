//! Binding metadata of a single handler.

use crate::message::MessageMeta;

/// What the messaging runtime needs to know to subscribe one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerMeta {
    /// Name of the owning component type.
    pub component: &'static str,
    /// Handler method name.
    pub method: &'static str,
    /// Consumed message type, `None` for handlers without a payload.
    pub message: Option<MessageMeta>,
    /// Message type the handler replies with, if any.
    pub reply: Option<MessageMeta>,
    /// Explicit binding keys; empty means the message's default routing key.
    pub binding_keys: Vec<String>,
    /// Give each process its own queue instead of a shared one.
    pub per_instance: bool,
    /// Consumer prefetch count.
    pub prefetch: u16,
}

impl HandlerMeta {
    /// Default consumer prefetch.
    pub const DEFAULT_PREFETCH: u16 = 1;

    pub fn new(component: &'static str, method: &'static str) -> Self {
        Self {
            component,
            method,
            message: None,
            reply: None,
            binding_keys: Vec::new(),
            per_instance: false,
            prefetch: Self::DEFAULT_PREFETCH,
        }
    }

    /// Renders `method(message)`, or `method(n/a)` without a message type.
    pub fn describe(&self) -> String {
        format!(
            "{}({})",
            self.method,
            self.message.map(|m| m.name).unwrap_or("n/a")
        )
    }

    /// Binding keys the handler's queue is bound with.
    ///
    /// Fanout exchanges ignore keys, so the list is only meaningful for
    /// direct and topic exchanges.
    pub fn effective_binding_keys(&self) -> Vec<String> {
        if !self.binding_keys.is_empty() {
            return self.binding_keys.clone();
        }
        match self.message {
            Some(meta) => vec![meta.default_routing_key().to_owned()],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ExchangeType;

    #[test]
    fn test_describe() {
        let mut meta = HandlerMeta::new("Handlers", "handle_foo");
        assert_eq!(meta.describe(), "handle_foo(n/a)");

        meta.message = Some(MessageMeta::new("foo"));
        assert_eq!(meta.describe(), "handle_foo(foo)");
    }

    #[test]
    fn test_effective_binding_keys() {
        let mut meta = HandlerMeta::new("Handlers", "handle_bar");
        assert!(meta.effective_binding_keys().is_empty());

        meta.message = Some(
            MessageMeta::new("bar")
                .exchange_type(ExchangeType::Direct)
                .routing_key("bar"),
        );
        assert_eq!(meta.effective_binding_keys(), vec!["bar".to_string()]);

        meta.binding_keys = vec!["bar-foo".into()];
        assert_eq!(meta.effective_binding_keys(), vec!["bar-foo".to_string()]);
    }
}

//! Argument binding.
//!
//! The [`ArgumentBinder`] runs once per discovered handler before the server
//! accepts traffic. It walks the handler's declared [`ParamShape`]s in order
//! and records which resolver each position uses. Extractors read the
//! recorded binding at dispatch time instead of inspecting types again.

use std::fmt;
use std::sync::Arc;

use tracing::{error, trace};

use courier_core::{MessageMeta, RoutingPattern};

use crate::descriptor::{HandlerDescriptor, ParamShape};
use crate::error::{ConfigurationError, ConfigurationResult};

/// The resolver applied to one handler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterBinding {
    /// Decode the body into `message`, then validate it when `validate` is set.
    Payload { message: MessageMeta, validate: bool },
    /// Hand over the inbound delivery as is.
    RawDelivery,
    /// Derive the trace context from the delivery headers.
    TraceContext,
}

impl fmt::Display for ParameterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payload { message, .. } => write!(f, "payload '{}'", message.name),
            Self::RawDelivery => f.write_str("raw delivery"),
            Self::TraceContext => f.write_str("trace context"),
        }
    }
}

/// The bindings of every parameter of one handler, by position.
///
/// `None` marks a parameter resolved by its own extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterBindings(Arc<[Option<ParameterBinding>]>);

impl ParameterBindings {
    pub fn get(&self, position: usize) -> Option<&ParameterBinding> {
        self.0.get(position).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&ParameterBinding>> {
        self.0.iter().map(Option::as_ref)
    }
}

/// Attaches resolvers to handler parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgumentBinder {
    disable_consume_validation: bool,
}

impl ArgumentBinder {
    /// With `disable_consume_validation` payloads are decoded but never validated.
    pub fn new(disable_consume_validation: bool) -> Self {
        Self {
            disable_consume_validation,
        }
    }

    /// Computes the bindings of `descriptor`.
    ///
    /// Fails for handlers that are not bound to a component instance.
    pub fn bind(
        &self,
        descriptor: &HandlerDescriptor,
        pattern: &RoutingPattern,
    ) -> ConfigurationResult<ParameterBindings> {
        if descriptor.is_static() {
            let handler = descriptor.qualified_name();
            error!(%pattern, %handler, "message handler must be an instance method");
            return Err(ConfigurationError::StaticHandler { handler });
        }

        let bindings = descriptor
            .params()
            .iter()
            .enumerate()
            .map(|(position, shape)| {
                let binding = self.binding_for(shape);
                if let Some(binding) = &binding {
                    trace!(%pattern, position, %binding, "bound parameter");
                }
                binding
            })
            .collect::<Vec<_>>();

        Ok(ParameterBindings(bindings.into()))
    }

    fn binding_for(&self, shape: &ParamShape) -> Option<ParameterBinding> {
        match *shape {
            ParamShape::Payload(message) => Some(ParameterBinding::Payload {
                message,
                validate: !self.disable_consume_validation,
            }),
            ParamShape::RawDelivery => Some(ParameterBinding::RawDelivery),
            ParamShape::TraceContext => Some(ParameterBinding::TraceContext),
            ParamShape::Custom(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::HandlerMeta;

    const FOO: MessageMeta = MessageMeta::new("foo");

    fn descriptor(params: Vec<ParamShape>, bound: bool) -> HandlerDescriptor {
        HandlerDescriptor::stub(HandlerMeta::new("Handlers", "handle_foo"), params, bound)
    }

    #[test]
    fn test_bind_in_declaration_order() {
        let d = descriptor(
            vec![
                ParamShape::TraceContext,
                ParamShape::Custom("JwtSubject"),
                ParamShape::Payload(FOO),
                ParamShape::RawDelivery,
            ],
            true,
        );
        let bindings = ArgumentBinder::new(false)
            .bind(&d, &RoutingPattern::from("svc.foo"))
            .unwrap();

        assert_eq!(bindings.len(), 4);
        assert_eq!(bindings.get(0), Some(&ParameterBinding::TraceContext));
        assert_eq!(bindings.get(1), None);
        assert_eq!(
            bindings.get(2),
            Some(&ParameterBinding::Payload {
                message: FOO,
                validate: true
            })
        );
        assert_eq!(bindings.get(3), Some(&ParameterBinding::RawDelivery));
        assert_eq!(bindings.get(4), None);
    }

    #[test]
    fn test_disabled_validation() {
        let d = descriptor(vec![ParamShape::Payload(FOO)], true);
        let bindings = ArgumentBinder::new(true)
            .bind(&d, &RoutingPattern::from("svc.foo"))
            .unwrap();
        assert_eq!(
            bindings.get(0),
            Some(&ParameterBinding::Payload {
                message: FOO,
                validate: false
            })
        );
    }

    #[test]
    fn test_static_handler_is_rejected() {
        let d = descriptor(vec![ParamShape::Payload(FOO)], false);
        let err = ArgumentBinder::default()
            .bind(&d, &RoutingPattern::from("svc.foo"))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::StaticHandler { handler } if handler == "Handlers.handle_foo"
        ));
    }
}

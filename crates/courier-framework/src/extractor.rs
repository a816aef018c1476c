//! Extractor system for the Courier framework.
//!
//! This module provides the [`FromRequest`] trait, which defines how handler
//! parameters are resolved from a [`Request`].
//!
//! Built-in extractors:
//!
//! | Type | Shape | Resolves to |
//! |------|-------|-------------|
//! | [`Payload<M>`] | `Payload` | the decoded (and validated) body |
//! | [`Delivery`] | `RawDelivery` | the inbound delivery |
//! | [`TraceContext`] | `TraceContext` | header-derived trace metadata |
//! | [`Headers`] | `Custom` | all application headers |
//! | [`Extension<T>`] | `Custom` | a value a guard stored in the request context |
//! | `Option<T>` | shape of `T` | `None` when `T` fails to extract |

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use serde::Serialize;
use serde_json::Value;

use courier_core::{Delivery, DecodeError, Message, TraceContext};

use crate::binder::ParameterBinding;
use crate::context::Request;
use crate::descriptor::ParamShape;
use crate::error::{ExtractError, ExtractResult};

/// A type that can be resolved from a [`Request`] as a handler parameter.
///
/// [`shape`](FromRequest::shape) is reported once, when the handler is
/// declared. Shapes other than [`ParamShape::Custom`] get a resolver bound
/// by the [`ArgumentBinder`](crate::ArgumentBinder), which
/// [`from_request`](FromRequest::from_request) then looks up by position.
///
/// # Example
///
/// ```rust,ignore
/// struct JwtSubject(String);
///
/// impl FromRequest for JwtSubject {
///     fn from_request(request: &Request, _position: usize) -> ExtractResult<Self> {
///         request
///             .context()
///             .get::<Subject>()
///             .map(|s| JwtSubject(s.0))
///             .ok_or_else(|| HandlerError::unauthorized().into())
///     }
/// }
/// ```
pub trait FromRequest: Sized + Send + 'static {
    /// The declared shape of this parameter.
    fn shape() -> ParamShape {
        ParamShape::Custom(std::any::type_name::<Self>())
    }

    /// Resolves the parameter at `position`.
    fn from_request(request: &Request, position: usize) -> ExtractResult<Self>;

    /// A serializable view of the resolved value, recorded by test spies.
    fn snapshot(&self) -> Value {
        Value::Null
    }
}

fn snapshot_of<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn bound(request: &Request, position: usize) -> ExtractResult<&ParameterBinding> {
    request
        .binding(position)
        .ok_or(ExtractError::Unbound { position })
}

fn mismatch<T>(position: usize, binding: &ParameterBinding) -> ExtractError {
    ExtractError::BindingMismatch {
        position,
        expected: std::any::type_name::<T>(),
        bound: binding.to_string(),
    }
}

// =============================================================================
// Payload
// =============================================================================

/// The decoded message body.
///
/// ```rust,ignore
/// async fn handle_foo(self: Arc<Self>, Payload(foo): Payload<Foo>) { ... }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload<M>(pub M);

impl<M> Payload<M> {
    pub fn into_inner(self) -> M {
        self.0
    }
}

impl<M> Deref for Payload<M> {
    type Target = M;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<M> DerefMut for Payload<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<M: Message> FromRequest for Payload<M> {
    fn shape() -> ParamShape {
        ParamShape::Payload(M::META)
    }

    fn from_request(request: &Request, position: usize) -> ExtractResult<Self> {
        let binding = bound(request, position)?;
        let ParameterBinding::Payload { message, validate } = *binding else {
            return Err(mismatch::<Self>(position, binding));
        };
        if message != M::META {
            return Err(mismatch::<Self>(position, binding));
        }

        let value = request.broker().decode(request.delivery(), &message)?;
        let payload: M = serde_json::from_value(value).map_err(|e| DecodeError::Malformed {
            message: message.name.to_string(),
            reason: e.to_string(),
        })?;
        if validate {
            payload.validate()?;
        }
        Ok(Payload(payload))
    }

    fn snapshot(&self) -> Value {
        snapshot_of(&self.0)
    }
}

// =============================================================================
// Raw delivery and trace context
// =============================================================================

impl FromRequest for Delivery {
    fn shape() -> ParamShape {
        ParamShape::RawDelivery
    }

    fn from_request(request: &Request, position: usize) -> ExtractResult<Self> {
        match bound(request, position)? {
            ParameterBinding::RawDelivery => Ok(request.delivery().clone()),
            other => Err(mismatch::<Self>(position, other)),
        }
    }

    fn snapshot(&self) -> Value {
        snapshot_of(self)
    }
}

impl FromRequest for TraceContext {
    fn shape() -> ParamShape {
        ParamShape::TraceContext
    }

    fn from_request(request: &Request, position: usize) -> ExtractResult<Self> {
        match bound(request, position)? {
            ParameterBinding::TraceContext => {
                Ok(request.broker().trace_context(request.delivery()))
            }
            other => Err(mismatch::<Self>(position, other)),
        }
    }

    fn snapshot(&self) -> Value {
        snapshot_of(self)
    }
}

// =============================================================================
// Custom extractors
// =============================================================================

/// All application headers of the delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(pub BTreeMap<String, String>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl FromRequest for Headers {
    fn from_request(request: &Request, _position: usize) -> ExtractResult<Self> {
        Ok(Headers(request.delivery().headers().clone()))
    }

    fn snapshot(&self) -> Value {
        snapshot_of(&self.0)
    }
}

/// A value stored in the [`RequestContext`](crate::RequestContext), usually
/// by a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension<T>(pub T);

impl<T> Deref for Extension<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Clone + Send + Sync + 'static> FromRequest for Extension<T> {
    fn from_request(request: &Request, _position: usize) -> ExtractResult<Self> {
        request.context().get::<T>().map(Extension).ok_or_else(|| {
            ExtractError::custom(format!(
                "missing request extension '{}'",
                std::any::type_name::<T>()
            ))
        })
    }
}

/// Optional parameters never fail extraction.
impl<T: FromRequest> FromRequest for Option<T> {
    fn shape() -> ParamShape {
        T::shape()
    }

    fn from_request(request: &Request, position: usize) -> ExtractResult<Self> {
        Ok(T::from_request(request, position).ok())
    }

    fn snapshot(&self) -> Value {
        self.as_ref().map_or(Value::Null, T::snapshot)
    }
}

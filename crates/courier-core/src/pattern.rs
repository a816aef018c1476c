//! Routing patterns (consumer tags).

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::handler::HandlerMeta;

/// The string that binds a broker subscription to one handler.
///
/// It is the consumer tag the subscription is registered under and the key
/// the dispatch server looks handlers up by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingPattern(Arc<str>);

impl RoutingPattern {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(Arc::from(tag.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RoutingPattern {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RoutingPattern {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoutingPattern {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RoutingPattern {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

/// Default consumer-tag rule.
///
/// `{service}.{exchange}` for message handlers, `{service}.{component}.{method}`
/// for handlers without a message type, followed by `[key1,key2]` when
/// explicit binding keys are declared.
///
/// ```rust,ignore
/// assert_eq!(default_consumer_tag("svc", &meta), "svc.bar[bar-foo]");
/// ```
pub fn default_consumer_tag(service: &str, handler: &HandlerMeta) -> String {
    let mut tag = match handler.message {
        Some(meta) => format!("{service}.{}", meta.exchange()),
        None => format!("{service}.{}.{}", handler.component, handler.method),
    };
    if !handler.binding_keys.is_empty() {
        tag.push('[');
        tag.push_str(&handler.binding_keys.join(","));
        tag.push(']');
    }
    tag
}

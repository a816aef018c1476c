use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use courier_core::RoutingPattern;

use crate::handler::InvocationHook;

#[derive(Default)]
struct SpyInner {
    calls: Mutex<Vec<Vec<Value>>>,
    notify: Notify,
}

/// Records the arguments a handler was invoked with.
///
/// Arguments are stored as JSON snapshots of the extracted values, one entry
/// per call. Extractors without a serializable form record `null`.
#[derive(Clone, Default)]
pub struct HandlerSpy {
    inner: Arc<SpyInner>,
}

impl HandlerSpy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one invocation.
    pub fn record(&self, args: &[Value]) {
        self.inner.calls.lock().push(args.to_vec());
        self.inner.notify.notify_waiters();
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().len()
    }

    pub fn was_called(&self) -> bool {
        self.call_count() > 0
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<Vec<Value>> {
        self.inner.calls.lock().clone()
    }

    pub fn call(&self, index: usize) -> Option<Vec<Value>> {
        self.inner.calls.lock().get(index).cloned()
    }

    pub fn last_call(&self) -> Option<Vec<Value>> {
        self.inner.calls.lock().last().cloned()
    }

    /// `true` if some call's leading arguments equal `args`.
    pub fn was_called_with(&self, args: &[Value]) -> bool {
        self.inner
            .calls
            .lock()
            .iter()
            .any(|call| call.len() >= args.len() && call[..args.len()] == *args)
    }

    pub fn reset(&self) {
        self.inner.calls.lock().clear();
    }

    /// An invocation hook that records into this spy.
    pub fn hook(&self) -> InvocationHook {
        let spy = self.clone();
        Arc::new(move |args: &[Value]| spy.record(args))
    }

    /// Waits until at least `count` calls are recorded.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.inner.notify.notified();
                let mut notified = std::pin::pin!(notified);
                notified.as_mut().enable();
                if self.call_count() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl fmt::Debug for HandlerSpy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSpy")
            .field("calls", &self.call_count())
            .finish()
    }
}

/// Spies keyed by routing pattern.
///
/// Cloning shares the underlying map, so a test can keep a handle while the
/// server owns another.
#[derive(Clone, Default)]
pub struct SpyRegistry {
    spies: Arc<Mutex<HashMap<RoutingPattern, HandlerSpy>>>,
}

impl SpyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The spy for `pattern`, created on first use.
    pub fn spy_for(&self, pattern: &RoutingPattern) -> HandlerSpy {
        self.spies
            .lock()
            .entry(pattern.clone())
            .or_default()
            .clone()
    }

    pub fn get(&self, pattern: &str) -> Option<HandlerSpy> {
        self.spies.lock().get(pattern).cloned()
    }

    /// Forgets the recorded calls of every spy.
    pub fn reset_all(&self) {
        for spy in self.spies.lock().values() {
            spy.reset();
        }
    }

    /// Drops every spy.
    pub fn clear(&self) {
        self.spies.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.spies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spies.lock().is_empty()
    }
}

impl fmt::Debug for SpyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spies = self.spies.lock();
        f.debug_map()
            .entries(spies.iter().map(|(k, v)| (k.as_str(), v.call_count())))
            .finish()
    }
}

//! Exchanges, bindings and routing-key matching.

use std::collections::HashMap;

use courier_core::ExchangeType;

/// One queue binding on an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Binding {
    pub(crate) exchange: String,
    pub(crate) key: String,
    pub(crate) queue: String,
}

/// Declared exchanges and the bindings between them and queues.
#[derive(Debug, Default)]
pub(crate) struct Topology {
    exchanges: HashMap<String, ExchangeType>,
    bindings: Vec<Binding>,
}

impl Topology {
    /// Declares `name` unless it already exists. The first declaration wins.
    pub(crate) fn declare(&mut self, name: &str, kind: ExchangeType) -> ExchangeType {
        *self.exchanges.entry(name.to_string()).or_insert(kind)
    }

    pub(crate) fn exchange_type(&self, name: &str) -> Option<ExchangeType> {
        self.exchanges.get(name).copied()
    }

    pub(crate) fn bind(&mut self, exchange: &str, key: &str, queue: &str) {
        let binding = Binding {
            exchange: exchange.to_string(),
            key: key.to_string(),
            queue: queue.to_string(),
        };
        if !self.bindings.contains(&binding) {
            self.bindings.push(binding);
        }
    }

    /// Removes every binding of `queue`.
    pub(crate) fn unbind_queue(&mut self, queue: &str) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.queue != queue);
        before - self.bindings.len()
    }

    /// Names of the queues a message published to `exchange` with
    /// `routing_key` is delivered to, each at most once, in binding order.
    pub(crate) fn route(&self, exchange: &str, routing_key: &str) -> Vec<String> {
        let Some(kind) = self.exchange_type(exchange) else {
            return Vec::new();
        };

        let mut queues: Vec<String> = Vec::new();
        for binding in self.bindings.iter().filter(|b| b.exchange == exchange) {
            let matched = match kind {
                ExchangeType::Fanout => true,
                ExchangeType::Direct => binding.key == routing_key,
                ExchangeType::Topic => topic_matches(&binding.key, routing_key),
            };
            if matched && !queues.contains(&binding.queue) {
                queues.push(binding.queue.clone());
            }
        }
        queues
    }
}

/// AMQP topic matching: words are separated by `.`, `*` matches exactly one
/// word and `#` matches zero or more.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&first, tail)) if word == "*" || word == first => matches_words(rest, tail),
            _ => false,
        },
    }
}

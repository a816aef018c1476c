//! Broker health reporting.
//!
//! [`HealthIndicator`] turns the broker's connection flags into a report a
//! host health endpoint can serialize:
//!
//! | broker state   | result                                  |
//! |----------------|-----------------------------------------|
//! | connected      | `Ok(report)` with status `up`            |
//! | reconnecting   | `Err(report)` with message `Reconnecting`|
//! | disconnected   | `Err(report)` with message `Disconnected`|

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use courier_core::Broker;

/// Key reported when the host does not pick one.
pub const DEFAULT_HEALTH_KEY: &str = "courier";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Health of one indicator, keyed the way the host aggregates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub key: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthReport {
    fn up(key: &str) -> Self {
        Self {
            key: key.to_string(),
            status: HealthStatus::Up,
            message: None,
        }
    }

    fn down(key: &str, message: &str) -> Self {
        Self {
            key: key.to_string(),
            status: HealthStatus::Down,
            message: Some(message.to_string()),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {:?} ({message})", self.key, self.status),
            None => write!(f, "{}: {:?}", self.key, self.status),
        }
    }
}

/// Reports whether the broker connection is usable.
#[derive(Clone)]
pub struct HealthIndicator {
    broker: Arc<dyn Broker>,
}

impl HealthIndicator {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Checks the connection. A reconnecting broker is reported as down even
    /// though it also counts as disconnected.
    pub fn check(&self, key: &str) -> Result<HealthReport, HealthReport> {
        if self.broker.is_reconnecting() {
            return Err(HealthReport::down(key, "Reconnecting"));
        }
        if self.broker.is_disconnected() {
            return Err(HealthReport::down(key, "Disconnected"));
        }
        Ok(HealthReport::up(key))
    }
}

impl fmt::Debug for HealthIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthIndicator")
            .field("service", &self.broker.service_name())
            .finish()
    }
}

//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use courier_core::ConnectionConfig;
use courier_framework::ServerOptions;

/// Service name used when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "unknown-service";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Broker connection settings.
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Payload validation settings.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CourierConfig {
    /// The options the dispatch server is built with.
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            connection: ConnectionConfig {
                url: self.connection.url.clone(),
                reconnect: self.connection.reconnect,
            },
            disable_consume_validation: self.validation.disable_consume_validation,
        }
    }

    /// The configured service name, or [`DEFAULT_SERVICE_NAME`].
    pub fn service_name(&self) -> &str {
        self.connection
            .service_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_SERVICE_NAME)
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Broker URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// Prefix of every consumer tag and queue name.
    #[serde(default)]
    pub service_name: Option<String>,

    /// Let the runtime reconnect after a dropped connection.
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            service_name: None,
            reconnect: default_reconnect(),
        }
    }
}

fn default_url() -> String {
    "amqp://localhost".to_string()
}

fn default_reconnect() -> bool {
    true
}

/// Payload validation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Skip payload validation when consuming.
    #[serde(default)]
    pub disable_consume_validation: bool,
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base log level; `RUST_LOG` takes precedence when set.
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub span_events: SpanEventConfig,
    pub thread_ids: bool,
    /// Include file names and line numbers.
    pub file_location: bool,
    /// Log file used with [`LogOutput::File`].
    pub file_path: Option<PathBuf>,
    /// Daily log files kept before the oldest is removed.
    pub max_files: u32,
    /// Per-module levels, e.g. `courier_transport = "trace"`.
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            max_files: 5,
            filters: HashMap::new(),
        }
    }
}

//! Configuration module for the Courier runtime.
//!
//! Layered TOML and environment configuration for the broker connection,
//! payload validation and logging.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ConnectionSettings, CourierConfig, DEFAULT_SERVICE_NAME, LogFormat, LogLevel, LogOutput,
    LoggingConfig, SpanEventConfig, ValidationConfig,
};
pub use validation::validate_config;

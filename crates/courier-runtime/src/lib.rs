//! Courier Runtime - host integration for the Courier dispatch layer.
//!
//! This crate provides:
//! - Layered configuration loading (`CourierConfig`, `ConfigLoader`)
//! - Logging setup on `tracing-subscriber` (`LoggingBuilder`)
//! - Application lifecycle integration (`MessagingModule`)
//! - Broker health reporting (`HealthIndicator`)
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier_runtime::{MessagingModule, load_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let broker = Arc::new(MemoryBroker::new(config.service_name()));
//!     let module = MessagingModule::for_root(&config, &registry, broker)?;
//!
//!     // Listen until Ctrl+C, then close the connection
//!     module.run_until_signal().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod module;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, CourierConfig, LoggingConfig, load_config,
    load_config_from_file,
};
pub use error::{RuntimeError, RuntimeResult};
pub use health::{DEFAULT_HEALTH_KEY, HealthIndicator, HealthReport, HealthStatus};
pub use logging::{LoggingBuilder, SpanEvents};
pub use module::MessagingModule;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

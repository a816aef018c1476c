//! # Courier Transport
//!
//! Messaging runtime implementations for the Courier dispatch layer.
//!
//! This crate provides concrete implementations of the [`Broker`] and
//! [`QueueAdmin`] traits defined in `courier-core`. The dispatch server only
//! talks to those traits, so a network AMQP runtime can replace the memory
//! broker without touching application handlers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  courier-framework  │  (dispatch server, handlers)
//! ├─────────────────────┤
//! │  courier-core       │  (Broker / QueueAdmin traits)
//! ├─────────────────────┤
//! │  courier-transport  │  <- This crate (implementations)
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier_transport::MemoryBroker;
//!
//! let broker = Arc::new(MemoryBroker::new("my-service"));
//! broker.connect(&ConnectionConfig::new("memory://local")).await?;
//! broker.publish(&Foo { name: "foo".into() }, None, Properties::default()).await?;
//! ```
//!
//! [`Broker`]: courier_core::Broker
//! [`QueueAdmin`]: courier_core::QueueAdmin

pub mod memory;

pub use memory::{MemoryBroker, topic_matches};

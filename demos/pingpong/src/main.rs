//! Ping-Pong Example
//!
//! Two components bounce a counter back and forth through reply messages:
//!
//! ```text
//! Ping { count } ──▶ Ponger::on_ping ──Reply──▶ Pong { count }
//!       ▲                                            │
//!       └──────────Reply──── Pinger::on_pong ◀───────┘
//! ```
//!
//! The pinger stops replying after `ROUNDS` exchanges.
//!
//! # Usage
//!
//! ```bash
//! COURIER_LOGGING__LEVEL=debug cargo run --package pingpong
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use courier::core::headers;
use courier::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::info;

const ROUNDS: u32 = 5;

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ping {
    count: u32,
}

impl Message for Ping {
    const META: MessageMeta = MessageMeta::new("ping");
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Pong {
    count: u32,
}

impl Message for Pong {
    const META: MessageMeta = MessageMeta::new("pong");
}

// ============================================================================
// Components
// ============================================================================

struct Ponger;

impl Ponger {
    async fn on_ping(
        self: Arc<Self>,
        Payload(ping): Payload<Ping>,
        trace: TraceContext,
    ) -> Reply<Pong> {
        info!(count = ping.count, session = ?trace.session_id, "ping");
        Reply::new(Pong { count: ping.count })
    }
}

impl Component for Ponger {
    fn handlers(set: &mut HandlerSet<Self>) {
        set.handler("on_ping", Self::on_ping);
    }
}

struct Pinger {
    done: Arc<Notify>,
}

impl Pinger {
    async fn on_pong(self: Arc<Self>, Payload(pong): Payload<Pong>) -> Option<Reply<Ping>> {
        info!(count = pong.count, "pong");
        if pong.count + 1 >= ROUNDS {
            self.done.notify_one();
            return None;
        }
        Some(Reply::new(Ping {
            count: pong.count + 1,
        }))
    }
}

impl Component for Pinger {
    fn handlers(set: &mut HandlerSet<Self>) {
        set.handler("on_pong", Self::on_pong);
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config().context("loading configuration")?;

    let done = Arc::new(Notify::new());
    let broker = Arc::new(MemoryBroker::new(config.service_name()));
    let registry = ComponentRegistry::new()
        .with(Arc::new(Ponger))
        .with(Arc::new(Pinger { done: done.clone() }));

    let module = MessagingModule::for_root(&config, &registry, broker.clone())?;
    module.bootstrap().await?;

    let mut properties = Properties::default();
    properties
        .headers
        .insert(headers::SESSION_ID.to_string(), "pingpong".to_string());
    broker.publish(&Ping { count: 0 }, None, properties).await?;

    tokio::time::timeout(Duration::from_secs(5), done.notified())
        .await
        .context("rally did not finish")?;
    info!(rounds = ROUNDS, "rally finished");

    module.shutdown().await?;
    Ok(())
}

//! Application lifecycle integration.
//!
//! [`MessagingModule`] adapts a [`TransportStrategy`] to the host's
//! lifecycle hooks: bootstrap starts listening, shutdown closes the
//! connection.
//!
//! ```rust,ignore
//! let config = load_config()?;
//! let broker = Arc::new(MemoryBroker::new(config.service_name()));
//! let module = MessagingModule::for_root(&config, &registry, broker)?;
//!
//! module.run_until_signal().await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info};

use courier_core::Broker;
use courier_framework::{ComponentRegistry, DispatchServer, TransportStrategy};

use crate::config::CourierConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::health::HealthIndicator;
use crate::logging;

/// Drives a transport through the host lifecycle.
pub struct MessagingModule<T: TransportStrategy> {
    server: Arc<T>,
}

impl<T: TransportStrategy> Clone for MessagingModule<T> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
        }
    }
}

impl MessagingModule<DispatchServer> {
    /// Installs logging from `config` and builds a dispatch server for every
    /// handler in `registry`.
    pub fn for_root(
        config: &CourierConfig,
        registry: &ComponentRegistry,
        broker: Arc<dyn Broker>,
    ) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);
        let server = DispatchServer::new(registry, broker, config.server_options())?;
        Ok(Self::new(server))
    }

    /// A health indicator over the server's broker.
    pub fn health(&self) -> HealthIndicator {
        HealthIndicator::new(self.server.broker().clone())
    }
}

impl<T: TransportStrategy> MessagingModule<T> {
    pub fn new(server: T) -> Self {
        Self {
            server: Arc::new(server),
        }
    }

    pub fn server(&self) -> &Arc<T> {
        &self.server
    }

    /// Starts listening and waits for the listen callback. A failure here is
    /// fatal to host startup.
    pub async fn bootstrap(&self) -> RuntimeResult<()> {
        info!("connecting to broker");

        let (tx, rx) = oneshot::channel();
        self.server
            .listen(Box::new(move |result| {
                let _ = tx.send(result);
            }))
            .await;

        if let Err(e) = rx.await.map_err(|_| RuntimeError::ListenAborted)? {
            error!(error = %e, "failed to start messaging");
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn shutdown(&self) -> RuntimeResult<()> {
        info!("disconnecting from broker");
        self.server.close().await?;
        Ok(())
    }

    /// Bootstraps, waits for `shutdown`, then closes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.bootstrap().await?;
        shutdown.await;
        self.shutdown().await
    }

    /// Bootstraps and runs until Ctrl+C (or SIGTERM on unix).
    pub async fn run_until_signal(&self) -> RuntimeResult<()> {
        self.bootstrap().await?;
        info!("messaging is running, press Ctrl+C to stop");
        wait_for_shutdown().await?;
        self.shutdown().await
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(|e| RuntimeError::Signal(e.to_string()))?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(|e| RuntimeError::Signal(e.to_string()))?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .map_err(|e| RuntimeError::Signal(e.to_string()))?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use courier_core::ConnectionError;
    use courier_framework::ServerResult;

    use super::*;

    #[derive(Default)]
    struct CountingTransport {
        fail: bool,
        starts: AtomicUsize,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl TransportStrategy for CountingTransport {
        async fn start(&self) -> ServerResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConnectionError::Closed.into());
            }
            Ok(())
        }

        async fn close(&self) -> ServerResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_until_starts_and_closes() {
        let module = MessagingModule::new(CountingTransport::default());

        module.run_until(async {}).await.unwrap();

        assert_eq!(module.server().starts.load(Ordering::SeqCst), 1);
        assert_eq!(module.server().closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_fatal() {
        let module = MessagingModule::new(CountingTransport {
            fail: true,
            ..Default::default()
        });

        let err = module.run_until(async {}).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Server(_)));
        assert_eq!(module.server().closes.load(Ordering::SeqCst), 0);
    }
}

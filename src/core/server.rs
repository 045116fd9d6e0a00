//! Relay server service that coordinates the listener and operator shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use log::{info, warn};
use tokio::io::AsyncBufRead;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::constants::SHUTDOWN_NOTICE;
use crate::core::listener::Listener;
use crate::core::registry::{create_registry, SharedRegistry};
use crate::core::session::SessionOutcome;
use crate::core::shutdown::{ShutdownCoordinator, ShutdownSignal};
use crate::core::stats::{RelayStats, SharedStats};
use crate::error::{RelayError, Result};

/// A bound relay server, ready to run
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: SharedRegistry,
    stats: SharedStats,
    signal: ShutdownSignal,
    config: Arc<ServerConfig>,
}

impl RelayServer {
    /// Bind the listening endpoint. This is the only fatal failure.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let address = config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| RelayError::Bind(format!("{}: {}", address, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayError::Bind(e.to_string()))?;

        let registry = create_registry(config.max_clients, config.rate_limit_cooldown);
        info!(
            "Relay listening on {} (capacity {} clients)",
            local_addr,
            registry.capacity()
        );

        Ok(Self {
            listener,
            local_addr,
            registry,
            stats: Arc::new(RelayStats::new()),
            signal: ShutdownSignal::new(),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    pub fn stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Run until the operator stops the server and every session has ended.
    pub async fn run<R>(self, control: R) -> Result<Vec<SessionOutcome>>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let coordinator = ShutdownCoordinator::new(
            control,
            self.config.stop_keyword.clone(),
            SHUTDOWN_NOTICE,
            self.registry.clone(),
            self.signal.clone(),
        );
        let coordinator = tokio::spawn(coordinator.run());

        let listener = Listener::new(
            self.listener,
            self.registry.clone(),
            self.stats.clone(),
            self.config.clone(),
            self.signal.clone(),
        );
        let outcomes = listener.run().await;

        // The listener may have stopped on its own; release the coordinator
        self.signal.trigger();
        match coordinator.await {
            Ok(reason) => info!("Shutdown coordinator finished: {:?}", reason),
            Err(e) => warn!("Shutdown coordinator failed: {}", e),
        }

        info!("Relay stats: {}", self.stats.snapshot().to_json());
        outcomes
    }
}

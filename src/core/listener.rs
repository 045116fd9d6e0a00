//! Accept loop: admission control and session spawning

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::constants::{SERVER_FULL_NOTICE, SHUTDOWN_NOTICE};
use crate::core::connection::Connection;
use crate::core::registry::SharedRegistry;
use crate::core::session::{ClientSession, SessionOutcome};
use crate::core::shutdown::{notify_and_stop, ShutdownSignal};
use crate::core::stats::SharedStats;
use crate::core::worker_pool::SessionPool;
use crate::error::{RelayError, Result};

// Upper bound on flushing a closed session's queued frames
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Listener {
    listener: TcpListener,
    registry: SharedRegistry,
    stats: SharedStats,
    config: Arc<ServerConfig>,
    signal: ShutdownSignal,
    sessions: SessionPool<SessionOutcome>,
}

impl Listener {
    pub fn new(
        listener: TcpListener,
        registry: SharedRegistry,
        stats: SharedStats,
        config: Arc<ServerConfig>,
        signal: ShutdownSignal,
    ) -> Self {
        Self {
            listener,
            registry,
            stats,
            config,
            signal,
            sessions: SessionPool::new(),
        }
    }

    /// Accept until shutdown or a listener-level accept error, then join every session.
    pub async fn run(mut self) -> Result<Vec<SessionOutcome>> {
        let mut result = Ok(());

        while self.signal.is_running() {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = self.signal.wait() => break,
            };

            match accepted {
                Ok((stream, peer)) => self.handle_accept(stream, peer),
                Err(e) if is_connection_scoped(&e) => {
                    // Only this accept attempt is lost
                    warn!("Dropped connection during accept: {}", e);
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    result = Err(RelayError::Accept(e.to_string()));
                    // Sessions must be released or the join below never ends
                    if let Err(e) = notify_and_stop(&self.registry, &self.signal, SHUTDOWN_NOTICE) {
                        warn!("Shutdown notice could not be sent: {}", e);
                    }
                    break;
                }
            }
        }

        info!("Accept loop stopped");
        let outcomes = self.sessions.join_all().await;
        result.map(|_| outcomes)
    }

    fn handle_accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let (connection, writer) = Connection::spawn(peer, write_half);

        let admitted = match self.registry.try_admit(connection.clone()) {
            Ok(admitted) => admitted,
            Err(e) => {
                error!("Failed to admit client {}: {}", peer, e);
                false
            }
        };

        if !admitted {
            connection.send_text(SERVER_FULL_NOTICE);
            connection.close();
            self.stats.record_rejected_full();
            warn!("Server full. Rejected connection from {}", peer);
            return;
        }

        self.stats.record_admitted();
        info!("Client connected: {} ({})", peer, connection.id);

        let session = ClientSession::new(
            connection,
            read_half,
            self.registry.clone(),
            self.stats.clone(),
            self.config.clone(),
            self.signal.clone(),
        );

        self.sessions.spawn(async move {
            let outcome = session.run().await;
            if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
                warn!("Writer for {} did not drain in time", peer);
            }
            outcome
        });
        debug!("{} session workers running", self.sessions.active_count());
    }
}

/// Accept errors that concern one pending connection rather than the listener
fn is_connection_scoped(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

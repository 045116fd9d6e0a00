//! Per-connection worker driving the read / rate-check / relay cycle

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use tokio::io::AsyncRead;

use crate::config::ServerConfig;
use crate::constants::{DEFAULT_ACK_MESSAGE, RATE_LIMITED_NOTICE};
use crate::core::connection::Connection;
use crate::core::message::{FrameReader, Message};
use crate::core::registry::SharedRegistry;
use crate::core::shutdown::ShutdownSignal;
use crate::core::stats::SharedStats;
use crate::error::RelayError;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Peer closed its side of the stream
    PeerClosed,
    /// Peer sent the quit sentinel
    Sentinel,
    /// Receive or send failed
    TransportError,
    /// Server shutdown was signalled
    Shutdown,
}

enum SessionState {
    Reading,
    RateCheck(Message),
    Relaying(Message),
    Closing(SessionOutcome),
}

/// Drives one admitted connection until it closes
pub struct ClientSession<R> {
    connection: Connection,
    reader: FrameReader<R>,
    registry: SharedRegistry,
    stats: SharedStats,
    config: Arc<ServerConfig>,
    signal: ShutdownSignal,
}

impl<R: AsyncRead + Unpin> ClientSession<R> {
    pub fn new(
        connection: Connection,
        reader: R,
        registry: SharedRegistry,
        stats: SharedStats,
        config: Arc<ServerConfig>,
        signal: ShutdownSignal,
    ) -> Self {
        let reader = FrameReader::new(reader, config.max_message_size);
        Self {
            connection,
            reader,
            registry,
            stats,
            config,
            signal,
        }
    }

    pub async fn run(mut self) -> SessionOutcome {
        let mut state = SessionState::Reading;

        loop {
            state = match state {
                SessionState::Reading => self.read().await,
                SessionState::RateCheck(message) => self.rate_check(message),
                SessionState::Relaying(message) => self.relay(message),
                SessionState::Closing(outcome) => {
                    self.close(outcome);
                    return outcome;
                }
            };
        }
    }

    async fn read(&mut self) -> SessionState {
        if !self.signal.is_running() {
            return SessionState::Closing(SessionOutcome::Shutdown);
        }

        let received = tokio::select! {
            received = self.reader.next_message() => received,
            _ = self.signal.wait() => return SessionState::Closing(SessionOutcome::Shutdown),
        };

        match received {
            Ok(Some(message)) => SessionState::RateCheck(message),
            Ok(None) => SessionState::Closing(SessionOutcome::PeerClosed),
            Err(RelayError::ConnectionClosed) => {
                SessionState::Closing(SessionOutcome::PeerClosed)
            }
            Err(e) => {
                warn!("Receive from client {} failed: {}", self.connection.id, e);
                SessionState::Closing(SessionOutcome::TransportError)
            }
        }
    }

    fn rate_check(&mut self, message: Message) -> SessionState {
        match self
            .registry
            .allow_message(&self.connection.id, Instant::now())
        {
            Ok(true) => SessionState::Relaying(message),
            Ok(false) => {
                debug!("Throttled message from client {}", self.connection.id);
                self.stats.record_throttled();
                self.reply(RATE_LIMITED_NOTICE)
            }
            Err(e) => {
                warn!("Rate check for client {} failed: {}", self.connection.id, e);
                SessionState::Closing(SessionOutcome::TransportError)
            }
        }
    }

    fn relay(&mut self, message: Message) -> SessionState {
        info!("Received: {} (from {})", message.content, self.connection.peer);

        match self.registry.broadcast(&self.connection.id, &message.content) {
            Ok(report) => {
                self.stats.record_relayed();
                if report.failed > 0 {
                    self.stats.record_failed_deliveries(report.failed);
                }
                debug!(
                    "Broadcast message to {} clients from {}",
                    report.delivered, self.connection.id
                );
            }
            Err(e) => warn!("Broadcast from client {} failed: {}", self.connection.id, e),
        }

        if message.is_sentinel() {
            info!("Client {} requested to exit. Closing connection.", self.connection.id);
            return SessionState::Closing(SessionOutcome::Sentinel);
        }

        let ack = self
            .config
            .server_message
            .clone()
            .unwrap_or_else(|| DEFAULT_ACK_MESSAGE.to_string());
        self.reply(&ack)
    }

    // Send directly to this client; a dead writer ends the session
    fn reply(&self, text: &str) -> SessionState {
        if self.connection.send_text(text) {
            SessionState::Reading
        } else {
            SessionState::Closing(SessionOutcome::TransportError)
        }
    }

    fn close(&self, outcome: SessionOutcome) {
        self.connection.close();

        match self.registry.remove(&self.connection.id) {
            Ok(_) => info!(
                "Client {} disconnected ({:?}) after {:?}",
                self.connection.id,
                outcome,
                self.connection.connection_duration()
            ),
            Err(e) => warn!("Error unregistering client {}: {}", self.connection.id, e),
        }
        self.stats.record_session_closed();
    }
}

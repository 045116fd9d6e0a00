//! TCP connection management
//! Handles the outbound side of a client connection

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::message::encode_frame;

/// Stable identifier allocated once per accepted connection, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frames queued for the writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Cloneable handle to one client's outbound stream
#[derive(Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub connected_at: Instant,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    /// Create a connection handle with a fresh ID
    pub fn new(peer: SocketAddr, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            connected_at: Instant::now(),
            sender,
        }
    }

    /// Create a connection and spawn the task that owns its write half
    pub fn spawn<W>(peer: SocketAddr, writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Self::new(peer, tx);
        let handle = tokio::spawn(write_frames(connection.id, writer, rx));
        (connection, handle)
    }

    /// Queue a text frame; false once the writer has gone away
    pub fn send_text(&self, text: &str) -> bool {
        match self.sender.send(Outbound::Text(text.to_string())) {
            Ok(_) => true,
            Err(_) => {
                warn!("Failed to send message to client {}", self.id);
                false
            }
        }
    }

    /// Ask the writer to flush pending frames and shut the stream down
    pub fn close(&self) -> bool {
        self.sender.send(Outbound::Close).is_ok()
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

// Drain queued frames onto the socket until closed or the peer fails
async fn write_frames<W>(id: ConnectionId, mut writer: W, mut rx: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        match frame {
            Outbound::Text(text) => {
                if let Err(e) = writer.write_all(&encode_frame(&text)).await {
                    warn!("Write to client {} failed: {}", id, e);
                    return;
                }
            }
            Outbound::Close => break,
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of client {} stream failed: {}", id, e);
    }
    debug!("Writer for client {} finished", id);
}

//! Cooperative shutdown: the shared running flag and the operator loop

use std::collections::HashSet;

use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

use crate::core::connection::{Connection, ConnectionId};
use crate::core::registry::SharedRegistry;
use crate::error::Result;

/// Shared "running" flag.
///
/// Starts true and can only ever be flipped to false. Waiters are woken
/// when it flips, so blocking points can race against it.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(true);
        Self { tx, rx }
    }

    pub fn is_running(&self) -> bool {
        *self.rx.borrow()
    }

    /// Flip the flag to false. Returns whether this call did the flip.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|running| std::mem::replace(running, false))
    }

    /// Resolve once the flag is false
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so this only errors if it was dropped
        let _ = rx.wait_for(|running| !*running).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Notify every live client, force their connections closed, and flip the flag.
///
/// A client admitted between the first snapshot and the flag flip is caught
/// by a second pass after the flip. Returns how many clients were notified.
pub fn notify_and_stop(
    registry: &SharedRegistry,
    signal: &ShutdownSignal,
    notice: &str,
) -> Result<usize> {
    // Snapshot first so no network work happens under the registry lock
    let first_pass = registry.snapshot_for_shutdown();
    let mut notified_ids = HashSet::new();
    if let Ok(connections) = &first_pass {
        notify_all(connections, notice, &mut notified_ids);
    }

    // The flag flips even when the snapshot failed
    signal.trigger();

    let late_arrivals = registry.snapshot_for_shutdown().map(|connections| {
        connections
            .into_iter()
            .filter(|c| !notified_ids.contains(&c.id))
            .collect::<Vec<_>>()
    });
    if let Ok(connections) = &late_arrivals {
        if !connections.is_empty() {
            debug!("{} clients admitted during shutdown", connections.len());
        }
        notify_all(connections, notice, &mut notified_ids);
    }

    first_pass.and(late_arrivals).map(|_| notified_ids.len())
}

fn notify_all(connections: &[Connection], notice: &str, notified: &mut HashSet<ConnectionId>) {
    for connection in connections {
        if connection.send_text(notice) {
            notified.insert(connection.id);
        }
        connection.close();
    }
}

/// Operator-facing loop reading line commands from a control source
pub struct ShutdownCoordinator<R> {
    input: R,
    stop_keyword: String,
    notice: String,
    registry: SharedRegistry,
    signal: ShutdownSignal,
}

/// Why the coordinator returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    StopKeyword,
    InputClosed,
    /// Somebody else flipped the flag first
    External,
}

impl<R: AsyncBufRead + Unpin> ShutdownCoordinator<R> {
    pub fn new(
        input: R,
        stop_keyword: impl Into<String>,
        notice: impl Into<String>,
        registry: SharedRegistry,
        signal: ShutdownSignal,
    ) -> Self {
        Self {
            input,
            stop_keyword: stop_keyword.into(),
            notice: notice.into(),
            registry,
            signal,
        }
    }

    pub async fn run(mut self) -> ShutdownReason {
        let mut line = Vec::new();

        let reason = loop {
            if !self.signal.is_running() {
                break ShutdownReason::External;
            }

            line.clear();
            let read = tokio::select! {
                read = self.input.read_until(b'\n', &mut line) => read,
                _ = self.signal.wait() => break ShutdownReason::External,
            };

            match read {
                Ok(0) => {
                    info!("Control input closed, shutting down");
                    break ShutdownReason::InputClosed;
                }
                Ok(_) => {
                    // Operator consoles are not guaranteed to be UTF-8
                    let decoded = String::from_utf8_lossy(&line);
                    let command = decoded.trim();
                    if command == self.stop_keyword {
                        info!("Server requested to exit. Closing connections.");
                        break ShutdownReason::StopKeyword;
                    }
                    debug!("Ignoring operator input: {:?}", command);
                }
                Err(e) => {
                    warn!("Failed to read control input: {}", e);
                    break ShutdownReason::InputClosed;
                }
            }
        };

        if reason != ShutdownReason::External {
            match notify_and_stop(&self.registry, &self.signal, &self.notice) {
                Ok(count) => info!("Shutdown notice sent to {} clients", count),
                Err(e) => warn!("Shutdown notice could not be sent: {}", e),
            }
        }

        reason
    }
}

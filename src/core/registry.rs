//! Shared registry of live client connections
//!
//! Every read and write of the live set and of the per-client rate-limit
//! timestamps goes through one mutex, so admission, removal, throttling
//! decisions and broadcast iteration never observe a half-updated table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{trace, warn};

use crate::core::connection::{Connection, ConnectionId};
use crate::core::rate_limiter::MessageRateLimiter;
use crate::error::Result;

// State guarded by the registry lock
struct RegistryState {
    connections: HashMap<ConnectionId, Connection>,
    limiter: MessageRateLimiter,
}

/// Outcome of one broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Table of admitted connections bounded by a capacity ceiling
pub struct ClientRegistry {
    state: Mutex<RegistryState>,
    capacity: usize,
}

impl ClientRegistry {
    pub fn new(capacity: usize, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                connections: HashMap::new(),
                limiter: MessageRateLimiter::new(cooldown),
            }),
            capacity,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        Ok(self.state.lock()?)
    }

    /// Admit `connection` if a slot is free. Check and insert are one step.
    pub fn try_admit(&self, connection: Connection) -> Result<bool> {
        let mut state = self.lock()?;
        if state.connections.len() >= self.capacity {
            return Ok(false);
        }
        state.connections.insert(connection.id, connection);
        Ok(true)
    }

    /// Remove a connection and its rate-limit timestamp.
    ///
    /// Returns whether it was present; removing an absent ID is a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Result<bool> {
        let mut state = self.lock()?;
        state.limiter.forget(id);
        Ok(state.connections.remove(id).is_some())
    }

    /// Rate-limit decision for a live connection.
    ///
    /// Connections that are no longer registered are refused and never
    /// recorded, keeping the timestamp map a subset of the live set.
    pub fn allow_message(&self, id: &ConnectionId, now: Instant) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.connections.contains_key(id) {
            return Ok(false);
        }
        Ok(state.limiter.allow(*id, now))
    }

    /// Send `payload` to every live connection except `from`.
    ///
    /// A failed delivery is logged and does not stop the pass; the failing
    /// peer stays registered until its own session tears it down.
    pub fn broadcast(&self, from: &ConnectionId, payload: &str) -> Result<BroadcastReport> {
        let state = self.lock()?;
        let mut report = BroadcastReport::default();

        for (id, connection) in &state.connections {
            // Don't send the message back to its sender
            if id == from {
                continue;
            }
            if connection.send_text(payload) {
                trace!("Relayed message from {} to {}", from, id);
                report.delivered += 1;
            } else {
                warn!("Relay from {} to {} failed", from, id);
                report.failed += 1;
            }
        }

        Ok(report)
    }

    /// Copy of the live connections, for notifying them without the lock held
    pub fn snapshot_for_shutdown(&self) -> Result<Vec<Connection>> {
        let state = self.lock()?;
        Ok(state.connections.values().cloned().collect())
    }

    /// Get current clients count
    pub fn client_count(&self) -> Result<usize> {
        Ok(self.lock()?.connections.len())
    }

    pub fn contains(&self, id: &ConnectionId) -> Result<bool> {
        Ok(self.lock()?.connections.contains_key(id))
    }

    /// Number of clients with a recorded rate-limit timestamp
    pub fn tracked_rate_limits(&self) -> Result<usize> {
        Ok(self.lock()?.limiter.tracked_count())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// Thread-safe registry handle
pub type SharedRegistry = Arc<ClientRegistry>;

pub fn create_registry(capacity: usize, cooldown: Duration) -> SharedRegistry {
    Arc::new(ClientRegistry::new(capacity, cooldown))
}

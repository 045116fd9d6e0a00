//! Relay activity counters
//!
//! Lock-free counters bumped from sessions and the listener, with a
//! serializable snapshot for reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct RelayStats {
    admitted: AtomicU64,
    rejected_full: AtomicU64,
    relayed: AtomicU64,
    throttled: AtomicU64,
    failed_deliveries: AtomicU64,
    sessions_closed: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub admitted: u64,
    pub rejected_full: u64,
    pub relayed: u64,
    pub throttled: u64,
    pub failed_deliveries: u64,
    pub sessions_closed: u64,
    pub timestamp: DateTime<Utc>,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_full(&self) {
        self.rejected_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_deliveries(&self, count: usize) {
        self.failed_deliveries
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            failed_deliveries: self.failed_deliveries.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            timestamp: Utc::now(),
        }
    }
}

impl StatsSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub type SharedStats = Arc<RelayStats>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = RelayStats::new();
        stats.record_admitted();
        stats.record_admitted();
        stats.record_throttled();
        stats.record_failed_deliveries(3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.admitted, 2);
        assert_eq!(snapshot.throttled, 1);
        assert_eq!(snapshot.failed_deliveries, 3);
        assert_eq!(snapshot.relayed, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = RelayStats::new();
        stats.record_relayed();
        let json = stats.snapshot().to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["relayed"], 1);
        assert!(value["timestamp"].is_string());
    }
}

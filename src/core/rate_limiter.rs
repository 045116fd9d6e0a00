//! Rate limiting module to prevent message flooding

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::core::connection::ConnectionId;

/// Per-client cooldown limiter.
///
/// Holds no lock of its own: it lives inside the client registry and is
/// mutated under the registry's lock, together with the live set.
#[derive(Debug)]
pub struct MessageRateLimiter {
    last_accepted: HashMap<ConnectionId, Instant>,
    cooldown: Duration,
}

impl MessageRateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_accepted: HashMap::new(),
            cooldown,
        }
    }

    /// Decide whether `id` may send at `now`, recording `now` on allow.
    ///
    /// A throttled attempt leaves the stored timestamp untouched.
    pub fn allow(&mut self, id: ConnectionId, now: Instant) -> bool {
        match self.last_accepted.get(&id) {
            Some(&last) if now.saturating_duration_since(last) < self.cooldown => false,
            _ => {
                self.last_accepted.insert(id, now);
                true
            }
        }
    }

    /// Drop the timestamp of a departed client
    pub fn forget(&mut self, id: &ConnectionId) {
        self.last_accepted.remove(id);
    }

    pub fn last_accepted(&self, id: &ConnectionId) -> Option<Instant> {
        self.last_accepted.get(id).copied()
    }

    /// Get number of tracked clients
    pub fn tracked_count(&self) -> usize {
        self.last_accepted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_is_allowed_and_recorded() {
        let mut limiter = MessageRateLimiter::new(Duration::from_secs(5));
        let id = ConnectionId::new();
        let t0 = Instant::now();

        assert!(limiter.allow(id, t0));
        assert_eq!(limiter.last_accepted(&id), Some(t0));
    }

    #[test]
    fn test_cooldown_boundary() {
        let mut limiter = MessageRateLimiter::new(Duration::from_secs(5));
        let id = ConnectionId::new();
        let t0 = Instant::now();

        assert!(limiter.allow(id, t0));
        assert!(!limiter.allow(id, t0 + Duration::from_millis(4999)));
        // Exactly the cooldown is enough
        assert!(limiter.allow(id, t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_rejection_does_not_move_timestamp() {
        let mut limiter = MessageRateLimiter::new(Duration::from_secs(5));
        let id = ConnectionId::new();
        let t0 = Instant::now();

        assert!(limiter.allow(id, t0));
        assert!(!limiter.allow(id, t0 + Duration::from_secs(4)));
        assert_eq!(limiter.last_accepted(&id), Some(t0));
        // Measured from t0, not from the rejected attempt
        assert!(limiter.allow(id, t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_clients_are_independent() {
        let mut limiter = MessageRateLimiter::new(Duration::from_secs(5));
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let t0 = Instant::now();

        assert!(limiter.allow(a, t0));
        assert!(limiter.allow(b, t0 + Duration::from_secs(1)));
        assert!(!limiter.allow(a, t0 + Duration::from_secs(2)));
        assert_eq!(limiter.tracked_count(), 2);

        limiter.forget(&a);
        assert_eq!(limiter.tracked_count(), 1);
        assert!(limiter.allow(a, t0 + Duration::from_secs(2)));
    }
}

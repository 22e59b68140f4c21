//! Connection liveness tracking.
//!
//! The broker gateway has no application-level ping, so liveness is
//! inferred from frame arrival: any inbound frame counts as proof of
//! life, and a connection that stays silent past the idle timeout is
//! torn down and reconnected.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;

/// Tracks the time of the last inbound frame.
pub struct LivenessMonitor {
    idle_timeout_ms: u64,
    last_frame: RwLock<DateTime<Utc>>,
}

impl LivenessMonitor {
    pub fn new(idle_timeout_ms: u64) -> Self {
        Self {
            idle_timeout_ms,
            last_frame: RwLock::new(Utc::now()),
        }
    }

    /// Reset the clock (called on connection establishment).
    pub fn reset(&self) {
        *self.last_frame.write() = Utc::now();
    }

    /// Record an inbound frame of any kind.
    pub fn record_frame(&self) {
        *self.last_frame.write() = Utc::now();
    }

    /// Milliseconds since the last inbound frame.
    pub fn idle_ms(&self) -> i64 {
        (Utc::now() - *self.last_frame.read()).num_milliseconds()
    }

    pub fn is_idle(&self) -> bool {
        self.idle_ms() > self.idle_timeout_ms as i64
    }

    /// Wait until the next liveness check is due.
    pub async fn wait_for_check(&self) {
        tokio::time::sleep(Duration::from_millis(self.idle_timeout_ms / 2)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_fresh_monitor_is_live() {
        let monitor = LivenessMonitor::new(60_000);
        assert!(!monitor.is_idle());
        assert!(monitor.idle_ms() < 1_000);
    }

    #[test]
    fn test_stale_monitor_is_idle() {
        let monitor = LivenessMonitor::new(60_000);
        *monitor.last_frame.write() = Utc::now() - ChronoDuration::seconds(90);
        assert!(monitor.is_idle());

        monitor.record_frame();
        assert!(!monitor.is_idle());
    }
}

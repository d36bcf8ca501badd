//! Spacing for standalone outbound sends.
//!
//! Reminder notifications can fire in bursts when several come due in the
//! same tick; spacing them keeps the assistant clear of flood waits.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Enforces a minimum interval between sends.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,

    /// Earliest instant the next send may go out.
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Waits for the next free slot and claims it.
    ///
    /// Returns the duration waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut next = self.next_slot.lock().await;

        let now = Instant::now();
        let wait = next.map_or(Duration::ZERO, |slot| slot.saturating_duration_since(now));

        if !wait.is_zero() {
            debug!("Send throttled for {:?}", wait);
            tokio::time::sleep(wait).await;
        }

        *next = Some(Instant::now() + self.min_interval);
        wait
    }

    /// Pushes the next slot out by a server-imposed flood wait.
    pub async fn handle_flood_wait(&self, wait_seconds: u32) {
        warn!("Telegram asked to wait {} seconds", wait_seconds);
        let mut next = self.next_slot.lock().await;
        *next = Some(Instant::now() + Duration::from_secs(u64::from(wait_seconds)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_send_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        assert_eq!(limiter.wait_and_acquire().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_second_send_waits() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        limiter.wait_and_acquire().await;

        let waited = limiter.wait_and_acquire().await;
        assert!(waited > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_flood_wait_defers_next_slot() {
        let limiter = RateLimiter::new(Duration::from_millis(1));
        limiter.handle_flood_wait(30).await;
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), limiter.wait_and_acquire()).await;
        assert!(blocked.is_err());
    }
}

//! Reconnect backoff for the UVE streamer's subscription loop.
//!
//! Same exponential-with-jitter shape as the load balancer's retry
//! strategy, reimplemented locally since only the delay schedule is needed
//! here, not the full retry-strategy enum.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max,
            multiplier,
            attempt: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Next delay, with +/-20% jitter, capped at `max`.
    pub fn next_delay(&mut self) -> Duration {
        let base_ms = self.initial.as_millis() as f64 * self.multiplier.powi(self.attempt as i32);
        let capped_ms = base_ms.min(self.max.as_millis() as f64);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = rand::rng().random_range(0.8..1.2);
        Duration::from_millis((capped_ms * jitter) as u64)
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(30), 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_millis(500), 2.0);
        let d0 = backoff.next_delay();
        let d1 = backoff.next_delay();
        let d2 = backoff.next_delay();
        assert!(d0.as_millis() <= 120);
        assert!(d1.as_millis() > d0.as_millis() / 2);
        assert!(d2.as_millis() as f64 <= 500.0 * 1.2);
    }

    #[test]
    fn reset_restarts_schedule() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0);
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        let after_reset = backoff.next_delay();
        assert!(after_reset.as_millis() <= 120);
    }
}

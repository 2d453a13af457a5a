//! Fixed-delay issue pacing.
//!
//! `Pacer` spaces successive `wait()` calls by `interval / count`. The first
//! call returns immediately, so `count` calls span `interval * (count-1)/count`.
//!
//! This is a soft ceiling: the delay is applied between issues regardless of
//! how long the caller spent in between, so slow downstream work (in
//! sequential mode) stretches the batch rather than being compensated.

use std::sync::Arc;
use std::time::Duration;

use crate::pacing::clock::Clock;

/// Paces probe issue to at most `count` events per `interval`.
pub struct Pacer {
    spacing: Duration,
    issued: u64,
    clock: Arc<dyn Clock>,
}

impl Pacer {
    /// Create a pacer for `count` events per `interval`.
    ///
    /// A zero `count` is treated as one event per interval.
    pub fn new(count: u32, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            spacing: interval / count.max(1),
            issued: 0,
            clock,
        }
    }

    /// Delay applied between successive events.
    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Number of `wait()` calls that have returned.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Suspend until the next event may be issued.
    pub async fn wait(&mut self) {
        if self.issued > 0 && !self.spacing.is_zero() {
            self.clock.sleep(self.spacing).await;
        }
        self.issued += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::clock::ManualClock;

    #[tokio::test]
    async fn test_rate_spans_expected_window() {
        let clock = ManualClock::at_unix(0);
        let mut pacer = Pacer::new(600, Duration::from_secs(60), Arc::new(clock.clone()));
        assert_eq!(pacer.spacing(), Duration::from_millis(100));

        for _ in 0..600 {
            pacer.wait().await;
        }

        // T * (R-1) / R
        assert_eq!(clock.total_slept(), Duration::from_millis(59_900));
        assert_eq!(pacer.issued(), 600);
    }

    #[tokio::test]
    async fn test_first_wait_is_immediate() {
        let clock = ManualClock::at_unix(0);
        let mut pacer = Pacer::new(4, Duration::from_secs(2), Arc::new(clock.clone()));
        pacer.wait().await;
        assert!(clock.sleeps().is_empty());
        pacer.wait().await;
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(500)]);
    }

    #[tokio::test]
    async fn test_real_clock_within_tolerance() {
        let clock = Arc::new(crate::pacing::clock::SystemClock);
        let mut pacer = Pacer::new(5, Duration::from_millis(250), clock);
        let start = std::time::Instant::now();
        for _ in 0..5 {
            pacer.wait().await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(600), "elapsed {:?}", elapsed);
    }

    #[test]
    fn test_zero_count_does_not_divide_by_zero() {
        let pacer = Pacer::new(0, Duration::from_secs(10), Arc::new(ManualClock::at_unix(0)));
        assert_eq!(pacer.spacing(), Duration::from_secs(10));
    }
}

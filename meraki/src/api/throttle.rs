//! Client-side request pacing and counters
//!
//! The Dashboard API allows a fixed number of calls per second per
//! organization; spacing requests locally avoids most 429 responses.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RequestThrottle {
    interval: Duration,
    next_slot: Mutex<Instant>,
    stats: Mutex<RequestStats>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub throttled_requests: u64,
    pub last_request: Option<Instant>,
}

impl RequestThrottle {
    /// Zero disables pacing
    pub fn new(requests_per_second: u32) -> Self {
        let interval = if requests_per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / requests_per_second
        };

        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
            stats: Mutex::new(RequestStats::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the next request slot is free and reserves it
    pub async fn acquire(&self) {
        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.interval;
            slot - now
        };

        if !wait.is_zero() {
            tracing::debug!("Throttling request for {}ms", wait.as_millis());
            self.stats.lock().await.throttled_requests += 1;
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn record_request(&self, success: bool) {
        let mut stats = self.stats.lock().await;
        stats.total_requests += 1;
        if !success {
            stats.failed_requests += 1;
        }
        stats.last_request = Some(Instant::now());
    }

    pub async fn stats(&self) -> RequestStats {
        self.stats.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_follows_rate() {
        assert_eq!(RequestThrottle::new(10).interval(), Duration::from_millis(100));
        assert_eq!(RequestThrottle::new(0).interval(), Duration::ZERO);
    }

    #[tokio::test]
    async fn acquire_spaces_requests() {
        let throttle = RequestThrottle::new(20);
        let start = Instant::now();

        for _ in 0..3 {
            throttle.acquire().await;
        }

        // first slot is immediate, the next two wait 50ms each
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(throttle.stats().await.throttled_requests, 2);
    }

    #[tokio::test]
    async fn unthrottled_acquire_does_not_wait() {
        let throttle = RequestThrottle::new(0);
        let start = Instant::now();

        for _ in 0..10 {
            throttle.acquire().await;
        }

        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(throttle.stats().await.throttled_requests, 0);
    }

    #[tokio::test]
    async fn request_stats_are_recorded() {
        let throttle = RequestThrottle::new(0);

        throttle.record_request(true).await;
        throttle.record_request(false).await;

        let stats = throttle.stats().await;
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert!(stats.last_request.is_some());
    }
}

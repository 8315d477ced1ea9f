// SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{DiscogsError, Result};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::{sleep, Duration, Instant};

/// Rate limiter for Discogs API calls.
///
/// Discogs allows 60 authenticated requests per minute (~1/sec). A semaphore
/// bounds in-flight requests and a minimum interval spaces their starts.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    min_interval: Duration,
    last_request: Arc<tokio::sync::Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            min_interval,
            last_request: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// One request per second, one at a time.
    pub fn discogs_default() -> Self {
        Self::new(1, Duration::from_secs(1))
    }

    /// Wait until a request can be made. Hold the permit for the duration of
    /// the request.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| DiscogsError::RateLimiterClosed)?;

        let mut last = self.last_request.lock().await;
        if let Some(last_instant) = *last {
            let elapsed = last_instant.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::trace!(target: "discogs", "rate limiting: waiting {:?}", wait);
                sleep(wait).await;
            }
        }
        *last = Some(Instant::now());

        Ok(permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn enforces_minimum_interval() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100));
        let start = Instant::now();

        drop(limiter.acquire().await.expect("permit"));
        assert!(start.elapsed() < Duration::from_millis(50));

        drop(limiter.acquire().await.expect("permit"));
        assert!(
            start.elapsed() >= Duration::from_millis(100),
            "expected >= 100ms, got {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_does_not_wait() {
        let limiter = RateLimiter::new(2, Duration::ZERO);
        let start = Instant::now();
        for _ in 0..5 {
            drop(limiter.acquire().await.expect("permit"));
        }
        assert!(start.elapsed() < Duration::from_millis(1));
    }
}

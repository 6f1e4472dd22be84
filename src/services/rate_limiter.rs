use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration, Instant};
use parking_lot::Mutex;
use rand::Rng;
use tracing::warn;

/// Rate limiter to control API request frequency
///
/// Every provider client owns one, so requests to the same vendor are spaced
/// out while different vendors proceed independently. FinMind's anonymous
/// tier and the exchange's endpoints both block bursts from one address.
pub struct RateLimiter {
    /// Semaphore to limit concurrent requests
    semaphore: Arc<Semaphore>,
    /// Timestamp of the last granted request
    last_request: Arc<Mutex<Option<Instant>>>,
    /// Minimum delay between requests
    min_delay: Duration,
    /// Upper bound of the random delay added on top of `min_delay`
    jitter: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_concurrent` - Maximum number of concurrent API requests
    /// * `requests_per_minute` - Maximum requests per minute
    ///
    /// # Example
    /// ```
    /// use taiwatch::services::rate_limiter::RateLimiter;
    /// // Allow max 2 concurrent requests, 30 per minute
    /// let limiter = RateLimiter::new(2, 30);
    /// ```
    pub fn new(max_concurrent: usize, requests_per_minute: u32) -> Self {
        let min_delay_ms = 60_000 / requests_per_minute.max(1) as u64;
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            last_request: Arc::new(Mutex::new(None)),
            min_delay: Duration::from_millis(min_delay_ms),
            jitter: Duration::ZERO,
        }
    }

    /// Add a random extra delay of up to `jitter` between requests.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// No spacing at all; used by tests and offline fixtures.
    pub fn unlimited() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            last_request: Arc::new(Mutex::new(None)),
            min_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn next_spacing(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.min_delay;
        }
        let extra = rand::rng().random_range(0..=jitter_ms);
        self.min_delay + Duration::from_millis(extra)
    }

    /// Acquire permission to make a request
    ///
    /// This will wait until:
    /// 1. A semaphore permit is available (concurrent limit)
    /// 2. Enough time has passed since the last request (rate limit)
    ///
    /// Returns a guard that releases the permit when dropped.
    pub async fn acquire(&self) -> RateLimitGuard {
        // Wait for a semaphore permit
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!("Rate limiter semaphore closed; continuing without a permit");
                None
            }
        };

        let spacing = self.next_spacing();

        // Reserve the next slot under the lock, sleep outside of it
        let wait_time = {
            let mut last = self.last_request.lock();
            let now = Instant::now();
            let slot = match *last {
                Some(previous) if previous + spacing > now => previous + spacing,
                _ => now,
            };
            *last = Some(slot);
            slot.saturating_duration_since(now)
        };

        if !wait_time.is_zero() {
            sleep(wait_time).await;
        }

        RateLimitGuard { _permit: permit }
    }

    /// Get the current utilization (for monitoring)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Guard that holds a rate limit permit
/// The permit is automatically released when this is dropped
pub struct RateLimitGuard {
    _permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

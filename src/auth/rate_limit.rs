//! Fixed-window attempt counter for login and registration.

use moka::future::Cache;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct RateLimiter {
    attempts: Cache<String, Arc<AtomicU32>>,
    max_attempts: u32,
}

impl RateLimiter {
    /// Counters expire `window` after the first attempt in the window.
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self { attempts: Cache::builder().max_capacity(100_000).time_to_live(window).build(), max_attempts }
    }

    /// Records an attempt for `key`; false once the limit is exceeded.
    pub async fn check(&self, key: &str) -> bool {
        let counter = self.attempts.get_with(key.to_string(), async { Arc::new(AtomicU32::new(0)) }).await;
        counter.fetch_add(1, Ordering::Relaxed) < self.max_attempts
    }

    pub async fn reset(&self, key: &str) { self.attempts.invalidate(key).await; }
}

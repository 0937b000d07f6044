//! Per-client submission limiter

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::RwLock;
use std::time::Duration;
use reqdesk_common::{Error, Result};

/// Keyed limiter allowing `max_requests` submissions per `window` per client
///
/// Replenishes gradually (one cell every `window / max_requests`) with a burst
/// of `max_requests`.
pub struct SubmissionRateLimiter {
    quota: Quota,
    limiter: RwLock<DefaultKeyedRateLimiter<String>>,
}

impl SubmissionRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        let burst = NonZeroU32::new(max_requests)
            .ok_or_else(|| Error::Config("submission_limit.max_requests must be at least 1".to_string()))?;
        let quota = Quota::with_period(window / max_requests)
            .ok_or_else(|| Error::Config("submission_limit.window_secs must be positive".to_string()))?
            .allow_burst(burst);

        Ok(Self {
            quota,
            limiter: RwLock::new(RateLimiter::keyed(quota)),
        })
    }

    /// Record one submission for `client`
    ///
    /// Returns how long to wait when the client is over its quota.
    pub fn check(&self, client: &str) -> std::result::Result<(), Duration> {
        let limiter = self.limiter.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        limiter
            .check_key(&client.to_string())
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }

    /// Forget every client's history
    pub fn reset(&self) {
        let mut limiter = self.limiter.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *limiter = RateLimiter::keyed(self.quota);
    }

    /// Drop state for clients whose quota has fully replenished
    pub fn retain_recent(&self) {
        let limiter = self.limiter.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        limiter.retain_recent();
        limiter.shrink_to_fit();
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.limiter
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

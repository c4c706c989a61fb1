//! Per-source request throttling.
//!
//! Every HTTP adapter owns a [`SourceLimiter`] and awaits
//! [`acquire`](SourceLimiter::acquire) before each request, which spaces
//! requests from concurrent searches at the source's documented rate. A 429
//! response is surfaced as [`SourceError::RateLimited`]; the orchestrator
//! treats it like any other adapter failure.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::db::SourceError;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Governor-backed limiter allowing one request per `period`.
pub struct SourceLimiter {
    limiter: DirectLimiter,
    period: Duration,
}

impl SourceLimiter {
    /// A zero period falls back to one request per second.
    pub fn new(period: Duration) -> Self {
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self {
            limiter: DirectLimiter::direct(quota),
            period,
        }
    }

    /// Create a limiter allowing `n` requests per second.
    pub fn per_second(n: u32) -> Self {
        let ms = 1000 / n.max(1) as u64;
        Self::new(Duration::from_millis(ms))
    }

    /// Wait until the limiter allows a request.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl std::fmt::Debug for SourceLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLimiter")
            .field("period", &self.period)
            .finish()
    }
}

/// Map a 429 response to [`SourceError::RateLimited`], honouring Retry-After.
pub fn check_rate_limit_response(resp: &reqwest::Response) -> Result<(), SourceError> {
    if resp.status().as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        Err(SourceError::RateLimited { retry_after })
    } else {
        Ok(())
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
///
/// HTTP-dates are not resolved against the clock; they map to a flat 5s.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

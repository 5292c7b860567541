//! # Middleware Module
//!
//! Global rate limiting for the portal API.
//!
//! The limit comes from `PortalConfig::rate_limit` (`CEMS_RATE_LIMIT`).

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Fallback rate limit: 100 requests per second.
const DEFAULT_RPS: NonZeroU32 = NonZeroU32::MIN.saturating_add(99);

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a global rate limiter allowing `requests_per_second`.
///
/// Zero falls back to the default; callers disable limiting by not
/// installing the middleware at all.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

/// Reject with 429 once the global quota is spent.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if limiter.check().is_ok() {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Rate limit exceeded");
        Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_allows_first_request() {
        let limiter = create_rate_limiter(5);
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn limiter_exhausts_burst() {
        let limiter = create_rate_limiter(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn zero_uses_default() {
        let limiter = create_rate_limiter(0);
        for _ in 0..100 {
            assert!(limiter.check().is_ok());
        }
    }
}

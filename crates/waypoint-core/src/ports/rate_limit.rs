//! Rate limiting port.

use crate::domain::{RateLimitConfig, RateLimitDecision, RequestContext};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Rate limiter trait - abstraction over counter stores.
///
/// `check` runs on every request's hot path: it must not block on I/O and
/// must be safe to call concurrently for the same key.
pub trait RateLimiter: Send + Sync {
    /// Charge the request to its client key and decide whether it is admitted.
    fn check(&self, ctx: &RequestContext) -> RateLimitDecision;

    /// Configuration this limiter was built with.
    fn config(&self) -> &RateLimitConfig;

    /// Number of keys currently held in the registry, expired ones included.
    fn tracked_keys(&self) -> usize;
}

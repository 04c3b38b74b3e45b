//! # Waypoint Infrastructure
//!
//! Concrete implementations of the ports defined in `waypoint-core`.
//!
//! ## Feature Flags
//!
//! - `rate-limit` (default) - In-memory fixed-window rate limiter
//! - `minimal` - Clock implementations only

pub mod clock;

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

pub use clock::{ManualClock, SystemClock};

#[cfg(feature = "rate-limit")]
pub use rate_limit::{InMemoryRateLimiter, SweepHandle};

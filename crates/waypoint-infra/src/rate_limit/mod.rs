//! Rate limiting implementations.

mod memory;
mod sweeper;


pub use memory::InMemoryRateLimiter;
pub use sweeper::{DEFAULT_SWEEP_INTERVAL, SweepHandle};

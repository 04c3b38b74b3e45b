//! Domain entities and value types.

pub mod rate_limit;

pub use rate_limit::{
    CounterEntry, KeyExtractor, RateLimitConfig, RateLimitDecision, RateLimitHeaders,
    RateLimitProfile, RequestContext, default_client_key,
};

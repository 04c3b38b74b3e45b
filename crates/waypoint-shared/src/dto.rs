//! Data Transfer Objects - response types for the API.

use serde::{Deserialize, Serialize};

/// Health check payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Public view of one rate limit profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitProfileResponse {
    pub profile: String,
    pub window_ms: u64,
    pub max_requests: u32,
    /// Keys currently held by the limiter, including closed windows not yet swept.
    pub tracked_keys: usize,
}

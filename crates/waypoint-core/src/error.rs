//! Domain-level error types.

use thiserror::Error;

/// Configuration errors - raised while building limiter settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Rate limit window must be greater than zero")]
    ZeroWindow,

    #[error("Rate limit max_requests must be greater than zero")]
    ZeroMaxRequests,

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },

    #[error("Unknown rate limit profile: {0}")]
    UnknownProfile(String),
}

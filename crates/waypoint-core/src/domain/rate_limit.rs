//! Fixed-window rate limiting rules.
//!
//! Everything here is pure arithmetic over a single counter. Locking and
//! storage of counters live behind the [`RateLimiter`](crate::ports::RateLimiter) port.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ConfigError;

/// Window length shared by the built-in profiles.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Key used when a request carries neither an identity nor an IP header.
pub const UNKNOWN_CLIENT_KEY: &str = "ip:unknown";

/// What the limiter knows about an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Authenticated user id, if the request carried a valid session.
    pub user_id: Option<String>,
    /// Raw `x-forwarded-for` header value (comma-separated hop list).
    pub forwarded_for: Option<String>,
    /// Raw `x-real-ip` header value.
    pub real_ip: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_forwarded_for(mut self, forwarded_for: impl Into<String>) -> Self {
        self.forwarded_for = Some(forwarded_for.into());
        self
    }

    pub fn with_real_ip(mut self, real_ip: impl Into<String>) -> Self {
        self.real_ip = Some(real_ip.into());
        self
    }

    /// Client IP: the first `x-forwarded-for` hop, falling back to `x-real-ip`.
    pub fn client_ip(&self) -> Option<&str> {
        self.forwarded_for
            .as_deref()
            .and_then(|hops| hops.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or_else(|| {
                self.real_ip
                    .as_deref()
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
            })
    }
}

/// Default client key: `user:<id>` when authenticated, otherwise `ip:<addr>`.
///
/// Anonymous requests without any IP header all share [`UNKNOWN_CLIENT_KEY`].
pub fn default_client_key(ctx: &RequestContext) -> String {
    if let Some(user_id) = ctx.user_id.as_deref().filter(|id| !id.is_empty()) {
        return format!("user:{user_id}");
    }

    match ctx.client_ip() {
        Some(ip) => format!("ip:{ip}"),
        None => UNKNOWN_CLIENT_KEY.to_string(),
    }
}

/// Maps a request to the key its counter is stored under.
pub type KeyExtractor = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// Limiter configuration. Immutable once handed to a limiter.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Requests admitted per key per window.
    pub max_requests: u32,
    /// Message returned in the 429 body.
    pub message: String,
    pub key_extractor: KeyExtractor,
}

impl RateLimitConfig {
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_key_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        self.key_extractor = Arc::new(extractor);
        self
    }

    /// Derive the counter key for a request.
    pub fn client_key(&self, ctx: &RequestContext) -> String {
        (self.key_extractor)(ctx)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max_requests: 100,
            message: "Too many requests, please try again later.".to_string(),
            key_extractor: Arc::new(default_client_key),
        }
    }
}

impl fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("window_ms", &self.window_ms)
            .field("max_requests", &self.max_requests)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Pre-configured limiter profiles. They differ only in thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitProfile {
    /// Expensive endpoints such as itinerary generation.
    Strict,
    /// Normal write endpoints.
    Moderate,
    /// General traffic.
    Relaxed,
}

impl RateLimitProfile {
    pub const ALL: [RateLimitProfile; 3] = [Self::Strict, Self::Moderate, Self::Relaxed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Moderate => "moderate",
            Self::Relaxed => "relaxed",
        }
    }

    pub fn max_requests(&self) -> u32 {
        match self {
            Self::Strict => 10,
            Self::Moderate => 30,
            Self::Relaxed => 100,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        let message = match self {
            Self::Strict => "Too many generation requests, please wait a minute and try again.",
            Self::Moderate => "Too many requests, please slow down.",
            Self::Relaxed => "Too many requests, please try again later.",
        };

        RateLimitConfig::new(DEFAULT_WINDOW_MS, self.max_requests()).with_message(message)
    }
}

impl fmt::Display for RateLimitProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateLimitProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "moderate" => Ok(Self::Moderate),
            "relaxed" => Ok(Self::Relaxed),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

/// Per-key counter for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    /// Requests counted in this window, rejected ones included.
    pub count: u64,
    /// Epoch milliseconds at which the window closes.
    pub reset_at: u64,
}

impl CounterEntry {
    /// A fresh window whose first request is the one observed at `now`.
    pub fn open(now: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            reset_at: now.saturating_add(window_ms),
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.reset_at <= now
    }

    /// Count one request observed at `now` and report whether it is admitted.
    ///
    /// An expired window is replaced by a fresh one. Rejected requests still
    /// increment the count.
    pub fn observe(&mut self, now: u64, window_ms: u64, max_requests: u32) -> bool {
        if self.is_expired(now) {
            *self = Self::open(now, window_ms);
            return true;
        }

        self.count = self.count.saturating_add(1);
        self.count <= u64::from(max_requests)
    }

    pub fn headers(&self, max_requests: u32) -> RateLimitHeaders {
        let count = u32::try_from(self.count).unwrap_or(u32::MAX);
        RateLimitHeaders {
            limit: max_requests,
            remaining: max_requests.saturating_sub(count),
            reset: self.reset_at.div_ceil(1000),
        }
    }

    /// Whole seconds until the window closes, rounded up.
    pub fn retry_after_secs(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now).div_ceil(1000)
    }

    /// Build the decision for a request that produced this entry state.
    pub fn decision(
        &self,
        key: String,
        admitted: bool,
        now: u64,
        max_requests: u32,
    ) -> RateLimitDecision {
        RateLimitDecision {
            key,
            admitted,
            headers: self.headers(max_requests),
            retry_after: (!admitted).then(|| self.retry_after_secs(now)),
        }
    }
}

/// Values for the `X-RateLimit-*` response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    /// Window end in epoch seconds.
    pub reset: u64,
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Counter key the request was charged to.
    pub key: String,
    pub admitted: bool,
    pub headers: RateLimitHeaders,
    /// Seconds the client should wait; set only on rejection.
    pub retry_after: Option<u64>,
}

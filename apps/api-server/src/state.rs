//! Application state - shared across all handlers.

use std::sync::Arc;

use waypoint_core::domain::RateLimitProfile;
use waypoint_core::ports::{Clock, RateLimiter};
use waypoint_infra::{InMemoryRateLimiter, SweepHandle, SystemClock};

use crate::config::{AppConfig, RateLimitSettings};
use crate::middleware::rate_limit::RateLimitMiddleware;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiters: Limiters,
}

/// One limiter per profile. Each owns its own counter registry.
#[derive(Clone)]
pub struct Limiters {
    pub strict: Arc<dyn RateLimiter>,
    pub moderate: Arc<dyn RateLimiter>,
    pub relaxed: Arc<dyn RateLimiter>,
}

impl Limiters {
    pub fn get(&self, profile: RateLimitProfile) -> &Arc<dyn RateLimiter> {
        match profile {
            RateLimitProfile::Strict => &self.strict,
            RateLimitProfile::Moderate => &self.moderate,
            RateLimitProfile::Relaxed => &self.relaxed,
        }
    }

    /// Middleware factory enforcing `profile` on whatever it wraps.
    pub fn middleware(&self, profile: RateLimitProfile) -> RateLimitMiddleware {
        RateLimitMiddleware::new(self.get(profile).clone())
    }
}

/// Background sweep tasks for the profile limiters.
pub struct Sweepers(Vec<SweepHandle>);

impl Sweepers {
    pub async fn stop(self) {
        for handle in self.0 {
            handle.stop().await;
        }
        tracing::info!("Rate limit sweepers stopped");
    }
}

impl AppState {
    /// Build the limiters and start their sweepers. Must run inside the runtime.
    pub fn new(config: &AppConfig) -> (Self, Sweepers) {
        let limiters = build_limiters(&config.rate_limits, Arc::new(SystemClock));

        let sweepers: Vec<SweepHandle> = limiters
            .iter()
            .map(|limiter| limiter.spawn_sweeper(config.sweep_interval))
            .collect();

        tracing::info!(
            strict = config.rate_limits.strict.max_requests,
            moderate = config.rate_limits.moderate.max_requests,
            relaxed = config.rate_limits.relaxed.max_requests,
            "Application state initialized"
        );

        (Self::from_limiters(limiters), Sweepers(sweepers))
    }

    /// State without background sweepers, on an injected clock.
    #[cfg(test)]
    pub fn with_clock(settings: &RateLimitSettings, clock: Arc<dyn Clock>) -> Self {
        Self::from_limiters(build_limiters(settings, clock))
    }

    fn from_limiters(limiters: [InMemoryRateLimiter; 3]) -> Self {
        let [strict, moderate, relaxed] = limiters.map(|l| Arc::new(l) as Arc<dyn RateLimiter>);

        Self {
            limiters: Limiters {
                strict,
                moderate,
                relaxed,
            },
        }
    }
}

fn build_limiters(settings: &RateLimitSettings, clock: Arc<dyn Clock>) -> [InMemoryRateLimiter; 3] {
    RateLimitProfile::ALL
        .map(|profile| InMemoryRateLimiter::with_clock(settings.get(profile).clone(), clock.clone()))
}

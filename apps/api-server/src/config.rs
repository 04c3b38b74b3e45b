//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use waypoint_core::ConfigError;
use waypoint_core::domain::{RateLimitConfig, RateLimitProfile};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Interval between sweeps of expired rate limit counters.
    pub sweep_interval: Duration,
    pub rate_limits: RateLimitSettings,
}

/// Configuration for each limiter profile.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub strict: RateLimitConfig,
    pub moderate: RateLimitConfig,
    pub relaxed: RateLimitConfig,
}

impl RateLimitSettings {
    pub fn get(&self, profile: RateLimitProfile) -> &RateLimitConfig {
        match profile {
            RateLimitProfile::Strict => &self.strict,
            RateLimitProfile::Moderate => &self.moderate,
            RateLimitProfile::Relaxed => &self.relaxed,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            strict: RateLimitProfile::Strict.config(),
            moderate: RateLimitProfile::Moderate.config(),
            relaxed: RateLimitProfile::Relaxed.config(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sweep_interval_ms: u64 = parse_var(&lookup, "RATE_LIMIT_SWEEP_INTERVAL_MS", 60_000)?;
        if sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                var: "RATE_LIMIT_SWEEP_INTERVAL_MS".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_var(&lookup, "PORT", 8080)?,
            sweep_interval: Duration::from_millis(sweep_interval_ms),
            rate_limits: RateLimitSettings {
                strict: profile_config(&lookup, RateLimitProfile::Strict)?,
                moderate: profile_config(&lookup, RateLimitProfile::Moderate)?,
                relaxed: profile_config(&lookup, RateLimitProfile::Relaxed)?,
            },
        })
    }
}

/// Apply `RATE_LIMIT_<PROFILE>_{WINDOW_MS,MAX_REQUESTS}` overrides to a profile.
fn profile_config<F>(lookup: &F, profile: RateLimitProfile) -> Result<RateLimitConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = format!("RATE_LIMIT_{}", profile.as_str().to_uppercase());
    let mut config = profile.config();

    config.window_ms = parse_var(lookup, &format!("{prefix}_WINDOW_MS"), config.window_ms)?;
    config.max_requests =
        parse_var(lookup, &format!("{prefix}_MAX_REQUESTS"), config.max_requests)?;
    config.validate()?;

    Ok(config)
}

fn parse_var<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value,
        }),
    }
}

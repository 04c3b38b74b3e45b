//! In-memory fixed-window rate limiter backed by a sharded map.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use waypoint_core::domain::{CounterEntry, RateLimitConfig, RateLimitDecision, RequestContext};
use waypoint_core::ports::{Clock, RateLimiter};

use super::sweeper::{self, SweepHandle};
use crate::clock::SystemClock;

/// In-memory rate limiter using per-key fixed windows.
///
/// Each instance owns its registry, so two limiters never share counters
/// even for the same client key. Limits are per-process, not distributed
/// across instances.
///
/// Cloning is cheap and clones share the registry.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    inner: Arc<LimiterInner>,
}

pub(super) struct LimiterInner {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    counters: DashMap<String, CounterEntry>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                config,
                clock,
                counters: DashMap::new(),
            }),
        }
    }

    /// Remove every counter whose window has closed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Start the background sweep for this limiter.
    ///
    /// The task ends when the returned handle is stopped or dropped, or once
    /// every clone of this limiter has been dropped.
    pub fn spawn_sweeper(&self, period: Duration) -> SweepHandle {
        tracing::info!(
            period_ms = period.as_millis() as u64,
            window_ms = self.inner.config.window_ms,
            max_requests = self.inner.config.max_requests,
            "Starting rate limit sweeper"
        );
        sweeper::spawn(Arc::downgrade(&self.inner), period)
    }

    /// Snapshot of the stored counter for `key`, expired or not.
    pub fn counter(&self, key: &str) -> Option<CounterEntry> {
        self.inner.counters.get(key).map(|entry| *entry)
    }

    /// Drop all counters.
    pub fn clear(&self) {
        self.inner.counters.clear();
    }
}

impl LimiterInner {
    fn check(&self, ctx: &RequestContext) -> RateLimitDecision {
        let key = self.config.client_key(ctx);
        let now = self.clock.now_millis();
        let window_ms = self.config.window_ms;
        let max_requests = self.config.max_requests;

        // The entry guard holds the shard lock for the whole read-modify-write.
        let (entry, admitted) = match self.counters.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let admitted = entry.observe(now, window_ms, max_requests);
                (*entry, admitted)
            }
            Entry::Vacant(vacant) => {
                let entry = CounterEntry::open(now, window_ms);
                vacant.insert(entry);
                (entry, true)
            }
        };

        if entry.count == 1 {
            tracing::trace!(key = %key, reset_at = entry.reset_at, "Opened rate limit window");
        }
        if !admitted {
            tracing::debug!(
                key = %key,
                count = entry.count,
                limit = max_requests,
                "Rate limit exceeded"
            );
        }

        entry.decision(key, admitted, now, max_requests)
    }

    pub(super) fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let mut removed = 0;

        self.counters.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    pub(super) fn len(&self) -> usize {
        self.counters.len()
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn check(&self, ctx: &RequestContext) -> RateLimitDecision {
        self.inner.check(ctx)
    }

    fn config(&self) -> &RateLimitConfig {
        &self.inner.config
    }

    fn tracked_keys(&self) -> usize {
        self.inner.len()
    }
}

//! Background removal of expired rate limit counters.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::memory::LimiterInner;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(60_000);

/// Handle to a running sweep task.
///
/// Dropping the handle stops the task at its next wakeup; [`SweepHandle::stop`]
/// stops it and waits for it to finish.
#[must_use = "dropping the handle stops the sweeper"]
pub struct SweepHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Rate limit sweeper task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub(super) fn spawn(limiter: Weak<LimiterInner>, period: Duration) -> SweepHandle {
    let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                // Fires on an explicit stop and when the handle is dropped.
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    let Some(limiter) = limiter.upgrade() else {
                        break;
                    };

                    let removed = limiter.sweep();
                    tracing::debug!(
                        removed,
                        remaining = limiter.len(),
                        "Swept expired rate limit counters"
                    );
                }
            }
        }

        tracing::info!("Rate limit sweeper stopped");
    });

    SweepHandle { shutdown, task }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use waypoint_core::domain::{RateLimitConfig, RequestContext};
    use waypoint_core::ports::RateLimiter;

    use crate::clock::ManualClock;
    use crate::rate_limit::InMemoryRateLimiter;

    use super::*;

    fn setup() -> (InMemoryRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter =
            InMemoryRateLimiter::with_clock(RateLimitConfig::new(1_000, 10), clock.clone());
        (limiter, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries_on_tick() {
        let (limiter, clock) = setup();
        limiter.check(&RequestContext::anonymous().with_real_ip("1.1.1.1"));
        clock.set(2_000);
        limiter.check(&RequestContext::anonymous().with_real_ip("2.2.2.2"));

        let handle = limiter.spawn_sweeper(DEFAULT_SWEEP_INTERVAL);

        // Nothing happens before the first interval elapses.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(limiter.tracked_keys(), 2);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.counter("ip:2.2.2.2").is_some());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_task() {
        let (limiter, _clock) = setup();
        let handle = limiter.spawn_sweeper(Duration::from_millis(100));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_ends_task() {
        let (limiter, clock) = setup();
        limiter.check(&RequestContext::anonymous());
        clock.set(5_000);

        drop(limiter.spawn_sweeper(Duration::from_millis(100)));
        tokio::time::sleep(Duration::from_secs(1)).await;

        // The sweeper never ran, so the expired entry is still stored.
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_exits_when_limiter_dropped() {
        let (limiter, _clock) = setup();
        let handle = limiter.spawn_sweeper(Duration::from_millis(100));

        drop(limiter);
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(handle.is_finished());
    }
}

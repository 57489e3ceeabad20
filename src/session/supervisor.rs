use super::SessionReaper;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Periodic task that reclaims sessions whose devices went silent
pub struct LivenessSupervisor {
    reaper: SessionReaper,
    interval: Duration,
}

impl LivenessSupervisor {
    /// A zero `interval` falls back to [`DEFAULT_SWEEP_INTERVAL`]
    pub fn new(reaper: SessionReaper, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            warn!("Zero sweep interval, using {:?}", DEFAULT_SWEEP_INTERVAL);
            DEFAULT_SWEEP_INTERVAL
        } else {
            interval
        };

        Self { reaper, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tick until `shutdown` is cancelled.
    ///
    /// Handlers still registered at shutdown are left to their own cancellation.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Liveness supervisor started (interval {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let reclaimed = self.sweep().await;
                    if reclaimed > 0 {
                        info!("Liveness sweep reclaimed {} session(s)", reclaimed);
                    }
                }
            }
        }

        info!("Liveness supervisor stopped");
    }

    /// One pass over a registry snapshot; returns the number of sessions reclaimed
    pub async fn sweep(&self) -> usize {
        let snapshot = self.reaper.registry().snapshot();
        debug!("Liveness sweep over {} session(s)", snapshot.len());

        let mut reclaimed = 0;
        for (device_id, handler) in snapshot {
            if handler.is_active() {
                continue;
            }

            info!(
                "Device {} (session {}) is inactive, reclaiming",
                device_id,
                handler.session_id()
            );
            if self.reaper.reclaim(&device_id, &handler).await {
                reclaimed += 1;
            }
        }

        reclaimed
    }
}

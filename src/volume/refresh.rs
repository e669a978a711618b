//! # Refresh Scheduler
//!
//! Background task that runs [`Registry::refresh_until`] on a fixed interval.
//! The first sweep happens one full interval after start; Mount already
//! fetches anything missing, so there is nothing to do immediately.

use super::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

/// Handle to the running refresh task
#[derive(Debug)]
pub struct RefreshScheduler {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl RefreshScheduler {
    /// Start sweeping every `interval`, pausing `throttle` between backend calls
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(registry: Arc<Registry>, interval: Duration, throttle: Duration) -> Self {
        // tokio intervals reject a zero period
        let interval = interval.max(Duration::from_millis(1));
        let span = info_span!("refresh_scheduler", interval_secs = interval.as_secs());
        let (stop, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(
            async move {
                info!("Secret refresh scheduled");
                let mut ticker = interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => break,
                        _ = ticker.tick() => {}
                    }
                    registry.refresh_until(throttle, stop_rx.clone()).await;
                }
                info!("Secret refresh stopped");
            }
            .instrument(span),
        );

        Self { handle, stop }
    }

    /// Stop the task once the backend call and file write in progress finish
    ///
    /// Waits at most `grace`, then aborts. A file write that has started is
    /// completed even then.
    pub async fn shutdown(self, grace: Duration) {
        if self.stop.send(true).is_err() {
            debug!("Refresh task already stopped");
        }
        let mut handle = self.handle;
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            warn!(grace_secs = grace.as_secs(), "Refresh sweep still running, aborting");
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

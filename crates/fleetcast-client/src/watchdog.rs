//! Liveness watchdog: fires every `wsTimeout/2`; if no frame or
//! successful HTTP response has been observed within `wsTimeout`, the
//! client initiates reconnection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};

/// Tracks the most recent activity timestamp and periodically checks it
/// against `timeout`, waking a [`Notify`] when the client has gone stale.
pub struct LivenessWatchdog {
    last_activity: Mutex<Instant>,
    timeout: Duration,
}

impl LivenessWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
            timeout,
        }
    }

    /// Refresh the activity clock. Called on every received frame and
    /// every successful HTTP response.
    pub async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    pub async fn last_activity(&self) -> Instant {
        *self.last_activity.lock().await
    }

    pub async fn is_stale(&self) -> bool {
        self.last_activity().await.elapsed() > self.timeout
    }

    /// Run the periodic check forever, notifying `on_stale` each time a
    /// staleness window is observed. Intended to run as a detached task
    /// alongside the client's own event loop; the caller reacts to
    /// `on_stale` by tearing down the channel and starting reconnect.
    pub async fn run(self: Arc<Self>, on_stale: Arc<Notify>) {
        let mut ticker = tokio::time::interval(self.timeout / 2);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            if self.is_stale().await {
                on_stale.notify_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fresh_watchdog_is_not_stale() {
        let watchdog = LivenessWatchdog::new(Duration::from_secs(10));
        assert!(!watchdog.is_stale().await);
    }

    #[tokio::test(start_paused = true)]
    async fn goes_stale_after_timeout_with_no_touch() {
        let watchdog = LivenessWatchdog::new(Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(watchdog.is_stale().await);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_resets_staleness() {
        let watchdog = LivenessWatchdog::new(Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(80)).await;
        watchdog.touch().await;
        tokio::time::advance(Duration::from_millis(80)).await;
        assert!(!watchdog.is_stale().await);
    }

    #[tokio::test(start_paused = true)]
    async fn run_notifies_on_stale_tick() {
        let watchdog = Arc::new(LivenessWatchdog::new(Duration::from_millis(100)));
        let notify = Arc::new(Notify::new());
        tokio::spawn(watchdog.clone().run(notify.clone()));

        tokio::time::advance(Duration::from_millis(200)).await;
        notify.notified().await;
    }
}

//! Polling fallback: when the streaming channel can't be opened, a
//! 2-second ticker polls the status endpoint instead, treating each
//! successful response as a synthetic `status` event, and attempts to
//! re-open the streaming channel on every tick until it succeeds.

use std::future::Future;
use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Drives the poll/reconnect-attempt loop. `poll` is called once per tick
/// and should perform the status request and any event emission /
/// watchdog touch as a side effect; `try_reconnect` attempts to re-open the
/// streaming channel and returns `true` on success, at which point the
/// ticker stops.
pub async fn run<PollFn, PollFut, ReconnectFn, ReconnectFut>(
    mut poll: PollFn,
    mut try_reconnect: ReconnectFn,
) where
    PollFn: FnMut() -> PollFut,
    PollFut: Future<Output = ()>,
    ReconnectFn: FnMut() -> ReconnectFut,
    ReconnectFut: Future<Output = bool>,
{
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        poll().await;
        if try_reconnect().await {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn stops_once_reconnect_succeeds() {
        let polls = Arc::new(AtomicU32::new(0));
        let attempts = Arc::new(AtomicU32::new(0));

        let polls_clone = polls.clone();
        let attempts_clone = attempts.clone();

        let task = tokio::spawn(async move {
            run(
                || {
                    polls_clone.fetch_add(1, Ordering::SeqCst);
                    async {}
                },
                || {
                    let n = attempts_clone.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { n >= 3 }
                },
            )
            .await;
        });

        tokio::time::advance(POLL_INTERVAL * 3).await;
        task.await.unwrap();

        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}

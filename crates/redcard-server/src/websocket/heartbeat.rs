//! Heartbeat ping/pong liveness monitoring.

use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The peer stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Number of consecutive silent ticks tolerated before timing out.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Watch `connection`'s alive flag, calling `ping` each `interval`.
///
/// A tick with no activity since the previous tick counts as a miss;
/// [`max_missed`] consecutive misses end the loop with `TimedOut`.
pub async fn run_heartbeat<F>(
    connection: &ClientConnection,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
    mut ping: F,
) -> HeartbeatResult
where
    F: FnMut(),
{
    let mut ticker = time::interval(interval);
    let _ = ticker.tick().await;
    let limit = max_missed(interval, timeout);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= limit {
                        return HeartbeatResult::TimedOut;
                    }
                }
                ping();
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

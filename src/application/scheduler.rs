//! Poll Scheduler
//!
//! Self-rescheduling loop: run one pass, then wait a fixed delay measured from the end of the
//! pass. When a pass reports nothing to poll the loop parks until woken.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::ports::clock::Ticker;

/// What one pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReport {
    /// Visited this many open positions
    Completed { visited: usize, sold: usize },
    /// No open positions
    Idle,
    /// Another pass was already running
    Busy,
}

#[derive(Clone)]
pub struct PollScheduler {
    ticker: Arc<dyn Ticker>,
    delay: Duration,
    wake: Arc<Notify>,
}

impl PollScheduler {
    pub fn new(ticker: Arc<dyn Ticker>, delay: Duration) -> Self {
        Self {
            ticker,
            delay,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Resume a parked loop. A wake sent while no loop is parked is kept for the next park.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Drive `pass` until `cancel` fires. A pass in flight always runs to completion.
    pub async fn run<F, Fut>(&self, cancel: CancellationToken, mut pass: F) -> usize
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PassReport>,
    {
        let mut passes = 0usize;

        while !cancel.is_cancelled() {
            let report = pass().await;
            passes += 1;

            match report {
                PassReport::Idle => {
                    tracing::debug!("No open positions, polling parked");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.wake.notified() => tracing::debug!("Polling resumed"),
                    }
                }
                PassReport::Completed { .. } | PassReport::Busy => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.ticker.wait(self.delay) => {}
                    }
                }
            }
        }

        tracing::info!("Polling stopped after {} passes", passes);
        passes
    }
}

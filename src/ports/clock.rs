use std::time::Duration;

use async_trait::async_trait;

/// Source of delays for the polling loop
#[async_trait]
pub trait Ticker: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// Wall-clock ticker backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTicker;

#[async_trait]
impl Ticker for TokioTicker {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

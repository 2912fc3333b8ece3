use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Subscription failed: {0}")]
    SubscribeFailed(String),
    #[error("Event channel closed")]
    ChannelClosed,
}

/// One log notification: the transaction signature and its execution error, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvent {
    pub signature: String,
    pub error: Option<String>,
}

impl FeedEvent {
    pub fn ok(signature: impl Into<String>) -> Self {
        Self { signature: signature.into(), error: None }
    }
}

/// Live log subscription filtered to transactions mentioning one address
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// Push events into `sink` until `cancel` fires or the sink closes.
    /// Implementations unsubscribe before returning.
    async fn run(
        &self,
        address: &str,
        sink: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Result<(), FeedError>;
}

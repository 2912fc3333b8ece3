//! Logs Feed
//!
//! `logsSubscribe` over the RPC websocket, filtered to transactions that mention one address.
//! Reconnects with capped exponential backoff until cancelled.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::commitment_config::CommitmentConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ports::feed::{EventFeed, FeedError, FeedEvent};

/// Reconnection delay base (exponential backoff)
const RECONNECT_BASE_DELAY_MS: u64 = 500;
/// Maximum reconnection delay
const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct LogsFeedConfig {
    pub ws_url: String,
    pub commitment: CommitmentConfig,
    /// Auto-reconnect on disconnect
    pub auto_reconnect: bool,
    /// Maximum reconnection attempts (0 = unlimited)
    pub max_reconnect_attempts: u32,
}

impl Default for LogsFeedConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.mainnet-beta.solana.com".to_string(),
            commitment: CommitmentConfig::confirmed(),
            auto_reconnect: true,
            max_reconnect_attempts: 0,
        }
    }
}

/// Why one connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Cancelled,
    SinkClosed,
    /// Server closed the stream after `delivered` events
    Disconnected { delivered: usize },
}

#[derive(Debug, Clone)]
pub struct LogsFeed {
    config: LogsFeedConfig,
}

impl LogsFeed {
    pub fn new(config: LogsFeedConfig) -> Self {
        Self { config }
    }

    async fn connect_and_stream(
        &self,
        address: &str,
        sink: &mpsc::Sender<FeedEvent>,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, FeedError> {
        let client = PubsubClient::new(&self.config.ws_url)
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

        let (mut stream, unsubscribe) = client
            .logs_subscribe(
                RpcTransactionLogsFilter::Mentions(vec![address.to_string()]),
                RpcTransactionLogsConfig {
                    commitment: Some(self.config.commitment),
                },
            )
            .await
            .map_err(|e| FeedError::SubscribeFailed(e.to_string()))?;

        info!("Subscribed to logs mentioning {}", address);

        let mut delivered = 0usize;
        let end = loop {
            tokio::select! {
                _ = cancel.cancelled() => break StreamEnd::Cancelled,
                item = stream.next() => match item {
                    Some(response) => {
                        let event = FeedEvent {
                            signature: response.value.signature,
                            error: response.value.err.map(|e| format!("{:?}", e)),
                        };
                        if sink.send(event).await.is_err() {
                            break StreamEnd::SinkClosed;
                        }
                        delivered += 1;
                    }
                    None => break StreamEnd::Disconnected { delivered },
                }
            }
        };

        unsubscribe().await;
        drop(stream);
        if let Err(e) = client.shutdown().await {
            debug!("Websocket shutdown error: {}", e);
        }
        info!("Unsubscribed from logs mentioning {}", address);
        Ok(end)
    }

    fn backoff(attempt: u32) -> Duration {
        let base = std::cmp::min(
            RECONNECT_BASE_DELAY_MS * 2u64.pow(attempt.min(10)),
            MAX_RECONNECT_DELAY_MS,
        );
        let jitter = rand::thread_rng().gen_range(0..=base / 4);
        Duration::from_millis(base + jitter)
    }
}

/// Only a connection that carried events earns a fresh reconnect budget
fn attempts_after_disconnect(attempts: u32, delivered: usize) -> u32 {
    if delivered > 0 {
        0
    } else {
        attempts
    }
}

#[async_trait]
impl EventFeed for LogsFeed {
    async fn run(
        &self,
        address: &str,
        sink: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Result<(), FeedError> {
        let mut reconnect_attempts = 0u32;

        loop {
            match self.connect_and_stream(address, &sink, &cancel).await {
                Ok(StreamEnd::Cancelled) => return Ok(()),
                Ok(StreamEnd::SinkClosed) => return Err(FeedError::ChannelClosed),
                Ok(StreamEnd::Disconnected { delivered }) => {
                    warn!("Logs stream for {} closed by server after {} events", address, delivered);
                    reconnect_attempts = attempts_after_disconnect(reconnect_attempts, delivered);
                }
                Err(e) => error!("Logs subscription error: {}", e),
            }

            if !self.config.auto_reconnect {
                return Err(FeedError::ConnectionFailed("Auto-reconnect disabled".into()));
            }
            if self.config.max_reconnect_attempts > 0
                && reconnect_attempts >= self.config.max_reconnect_attempts
            {
                return Err(FeedError::ConnectionFailed(format!(
                    "Max reconnect attempts ({}) exceeded",
                    self.config.max_reconnect_attempts
                )));
            }

            reconnect_attempts += 1;
            let delay = Self::backoff(reconnect_attempts);
            info!("Reconnecting logs feed in {:?} (attempt {})", delay, reconnect_attempts);

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogsFeedConfig::default();
        assert!(config.auto_reconnect);
        assert_eq!(config.max_reconnect_attempts, 0);
        assert_eq!(config.commitment, CommitmentConfig::confirmed());
    }

    #[test]
    fn test_backoff_is_capped() {
        for attempt in 0..20 {
            let delay = LogsFeed::backoff(attempt);
            assert!(delay.as_millis() as u64 <= MAX_RECONNECT_DELAY_MS + MAX_RECONNECT_DELAY_MS / 4);
            assert!(delay.as_millis() as u64 >= RECONNECT_BASE_DELAY_MS);
        }
    }

    #[test]
    fn test_empty_disconnects_exhaust_the_budget() {
        let mut attempts = 0;
        for _ in 0..3 {
            attempts = attempts_after_disconnect(attempts, 0) + 1;
        }
        assert_eq!(attempts, 3);
        assert_eq!(attempts_after_disconnect(attempts, 12), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_connect_returns_ok() {
        // Unroutable endpoint: the connect fails, then cancellation ends the backoff wait
        let feed = LogsFeed::new(LogsFeedConfig {
            ws_url: "ws://127.0.0.1:1".to_string(),
            ..Default::default()
        });
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = feed.run("11111111111111111111111111111111", tx, cancel).await;
        assert!(result.is_ok());
    }
}

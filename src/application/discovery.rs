//! Discovery Monitor
//!
//! Watches the pool fee collector for new pools and hands each new asset to the buy path.
//! Live mode runs until cancelled or until the open-position cap is reached. One-shot mode
//! replays a single transaction or asset address.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::domain::known_programs::{
    is_address, is_signature, NATIVE_MINT, RAYDIUM_FEE_COLLECTOR, RAYDIUM_POOL_AUTHORITY,
};
use crate::domain::Position;
use crate::ports::chain::{ChainError, ChainPort, ParsedTransaction};
use crate::ports::feed::{EventFeed, FeedEvent};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Not a transaction signature or asset address: {0}")]
    InvalidInput(String),
    #[error("No transaction found for {0}")]
    NotFound(String),
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Candidate rejected: {0}")]
    Admission(String),
}

/// A newly created pool's asset and where it was seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub signature: String,
    pub creator: String,
    pub asset_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    Live,
    Replay,
}

/// Receiver of discovered candidates
#[async_trait]
pub trait CandidateSink: Send + Sync {
    async fn admit(&self, candidate: Candidate, origin: CandidateOrigin) -> Result<Option<Position>, DiscoveryError>;

    async fn open_count(&self) -> usize;
}

/// One-shot input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayTarget {
    Signature(String),
    Asset(String),
}

impl ReplayTarget {
    pub fn parse(input: &str) -> Result<Self, DiscoveryError> {
        let input = input.trim();
        if is_address(input) {
            Ok(ReplayTarget::Asset(input.to_string()))
        } else if is_signature(input) {
            Ok(ReplayTarget::Signature(input.to_string()))
        } else {
            Err(DiscoveryError::InvalidInput(input.to_string()))
        }
    }
}

/// Find the pool's non-native mint among balances owned by the pool authority
pub fn extract_candidate(tx: &ParsedTransaction, pool_authority: &str, native_mint: &str) -> Option<Candidate> {
    if tx.error.is_some() {
        return None;
    }
    let entry = tx.post_token_balances.iter().find(|b| {
        b.owner.as_deref() == Some(pool_authority) && b.mint != native_mint
    })?;

    Some(Candidate {
        signature: tx.signature.clone(),
        creator: tx.signer.clone().unwrap_or_default(),
        asset_address: entry.mint.clone(),
    })
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub fee_collector: String,
    pub pool_authority: String,
    pub native_mint: String,
    pub max_open_positions: usize,
    pub cap_check_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            fee_collector: RAYDIUM_FEE_COLLECTOR.to_string(),
            pool_authority: RAYDIUM_POOL_AUTHORITY.to_string(),
            native_mint: NATIVE_MINT.to_string(),
            max_open_positions: 3,
            cap_check_interval: Duration::from_secs(20),
            channel_capacity: 256,
        }
    }
}

/// Why the live loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    Cancelled,
    CapReached,
    FeedClosed,
    /// The monitor task panicked
    Failed,
}

/// Handle to a running live subscription
pub struct LiveSubscription {
    token: CancellationToken,
    task: JoinHandle<MonitorExit>,
}

impl LiveSubscription {
    /// Unsubscribe and stop the cap timer
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the loop to end. A crashed loop still releases the feed.
    pub async fn join(self) -> MonitorExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::error!("Live discovery task failed: {}", e);
                self.token.cancel();
                MonitorExit::Failed
            }
        }
    }
}

pub struct DiscoveryMonitor {
    chain: Arc<dyn ChainPort>,
    feed: Arc<dyn EventFeed>,
    sink: Arc<dyn CandidateSink>,
    config: DiscoveryConfig,
}

impl DiscoveryMonitor {
    pub fn new(
        chain: Arc<dyn ChainPort>,
        feed: Arc<dyn EventFeed>,
        sink: Arc<dyn CandidateSink>,
        config: DiscoveryConfig,
    ) -> Self {
        Self { chain, feed, sink, config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    async fn cap_reached(&self, max_open: usize) -> bool {
        self.sink.open_count().await >= max_open
    }

    /// Subscribe to the fee collector and process events until cancelled or capped.
    /// `parent` cancels the subscription together with everything else it owns.
    pub fn start_live_monitoring(self: &Arc<Self>, max_open: usize, parent: &CancellationToken) -> LiveSubscription {
        let token = parent.child_token();
        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity);

        let feed_task = {
            let feed = self.feed.clone();
            let address = self.config.fee_collector.clone();
            let token = token.clone();
            tokio::spawn(async move {
                if let Err(e) = feed.run(&address, tx, token).await {
                    tracing::warn!("Event feed ended with error: {}", e);
                }
            })
        };

        let monitor = self.clone();
        let loop_token = token.clone();
        let task = tokio::spawn(async move {
            let mut cap_timer = tokio::time::interval(monitor.config.cap_check_interval);
            cap_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                "Live discovery started on {} (cap {})",
                monitor.config.fee_collector,
                max_open
            );

            let exit = loop {
                if monitor.cap_reached(max_open).await {
                    tracing::info!("Open position cap of {} reached, stopping discovery", max_open);
                    break MonitorExit::CapReached;
                }
                tokio::select! {
                    _ = loop_token.cancelled() => break MonitorExit::Cancelled,
                    _ = cap_timer.tick() => {}
                    event = rx.recv() => match event {
                        Some(event) => monitor.handle_event(event, max_open).await,
                        None => {
                            tracing::warn!("Event feed closed");
                            break MonitorExit::FeedClosed;
                        }
                    },
                }
            };

            loop_token.cancel();
            if let Err(e) = feed_task.await {
                tracing::warn!("Feed task failed: {}", e);
            }
            tracing::info!("Live discovery stopped: {:?}", exit);
            exit
        });

        LiveSubscription { token, task }
    }

    /// One live event. Every failure is logged and contained.
    async fn handle_event(&self, event: FeedEvent, max_open: usize) {
        if event.error.is_some() {
            tracing::debug!("Skipping failed transaction {}", event.signature);
            return;
        }

        let tx = match self.chain.parsed_transaction(&event.signature).await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", event.signature, e);
                return;
            }
        };
        let Some(candidate) = extract_candidate(&tx, &self.config.pool_authority, &self.config.native_mint) else {
            return;
        };

        if self.cap_reached(max_open).await {
            tracing::info!("Cap reached, ignoring {}", candidate.asset_address);
            return;
        }

        tracing::info!("New pool {} in {}", candidate.asset_address, candidate.signature);
        if let Err(e) = self.sink.admit(candidate, CandidateOrigin::Live).await {
            tracing::warn!("Failed to admit candidate from {}: {}", event.signature, e);
        }
    }

    /// Replay one transaction signature or asset address
    pub async fn process_one(&self, input: &str) -> Result<Option<Position>, DiscoveryError> {
        let target = ReplayTarget::parse(input)?;

        if self.cap_reached(self.config.max_open_positions).await {
            tracing::info!("Open position cap of {} reached, not replaying {}", self.config.max_open_positions, input);
            return Ok(None);
        }

        let candidate = match target {
            ReplayTarget::Signature(signature) => {
                let tx = self.fetch(&signature).await?;
                match extract_candidate(&tx, &self.config.pool_authority, &self.config.native_mint) {
                    Some(candidate) => candidate,
                    None => {
                        tracing::info!("{} does not create a pool", signature);
                        return Ok(None);
                    }
                }
            }
            ReplayTarget::Asset(asset_address) => {
                let signature = self
                    .chain
                    .latest_signature_for(&asset_address)
                    .await?
                    .ok_or_else(|| DiscoveryError::NotFound(asset_address.clone()))?;
                let creator = match self.chain.parsed_transaction(&signature).await {
                    Ok(tx) => tx.signer.unwrap_or_default(),
                    Err(e) => {
                        tracing::debug!("Signer of {} unavailable: {}", signature, e);
                        String::new()
                    }
                };
                Candidate { signature, creator, asset_address }
            }
        };

        self.sink.admit(candidate, CandidateOrigin::Replay).await
    }

    async fn fetch(&self, signature: &str) -> Result<ParsedTransaction, DiscoveryError> {
        match self.chain.parsed_transaction(signature).await {
            Ok(tx) => Ok(tx),
            Err(ChainError::NotFound(_)) => Err(DiscoveryError::NotFound(signature.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

//! Lifecycle Orchestrator
//!
//! Owns the position ledger and drives every asset through discovery, buy, price polling and
//! sell. All state changes go through address-keyed ledger operations and are persisted after
//! each transition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::domain::{
    merge_history, HistoryFilter, Position, PositionBook, PositionError, PriceInfo,
    SellDecisionEngine,
};
use crate::ports::metadata::MetadataProvider;
use crate::ports::store::{Collection, LedgerStore};

use super::discovery::{Candidate, CandidateOrigin, CandidateSink, DiscoveryError};
use super::executor::{ExecutorError, TradeExecutor, TradeOutcome};
use super::price_tracker::PriceTracker;
use super::scheduler::{PassReport, PollScheduler};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No wallet key material configured")]
    MissingKeyMaterial,
    #[error("Unknown position: {0}")]
    NotFound(String),
    #[error("Position {0} is still in trade")]
    PositionOpen(String),
    #[error("Position {0} is not in trade")]
    NotOpen(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error(transparent)]
    Position(#[from] PositionError),
}

impl From<ExecutorError> for OrchestratorError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::MissingKeyMaterial => OrchestratorError::MissingKeyMaterial,
            ExecutorError::Transient(msg) => OrchestratorError::Execution(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_open_positions: usize,
    pub poll_delay: Duration,
    /// Samples below this percent of the initial price are ignored
    pub dust_floor_pct: f64,
    /// Minimum price move, in price units, that is written back to the position
    pub price_update_tolerance: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_open_positions: 3,
            poll_delay: Duration::from_secs(5),
            dust_floor_pct: 2.0,
            price_update_tolerance: 0.01,
        }
    }
}

/// Status snapshot of the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    pub pending: usize,
    pub open: usize,
    pub sold: usize,
    pub ready_to_sell: usize,
    pub max_open_positions: usize,
    pub wallet: Option<String>,
    pub is_shut_down: bool,
}

pub struct LifecycleOrchestrator {
    book: RwLock<PositionBook>,
    tracker: PriceTracker,
    decisions: SellDecisionEngine,
    executor: TradeExecutor,
    metadata: Arc<dyn MetadataProvider>,
    store: Arc<dyn LedgerStore>,
    scheduler: PollScheduler,
    config: OrchestratorConfig,
    /// Held for the length of a polling pass or a manual sell
    pass_guard: Mutex<()>,
    shutdown: CancellationToken,
}

impl LifecycleOrchestrator {
    pub fn new(
        tracker: PriceTracker,
        decisions: SellDecisionEngine,
        executor: TradeExecutor,
        metadata: Arc<dyn MetadataProvider>,
        store: Arc<dyn LedgerStore>,
        scheduler: PollScheduler,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            book: RwLock::new(PositionBook::new()),
            tracker,
            decisions,
            executor,
            metadata,
            store,
            scheduler,
            config,
            pass_guard: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn executor(&self) -> &TradeExecutor {
        &self.executor
    }

    pub fn tracker(&self) -> &PriceTracker {
        &self.tracker
    }

    /// Parent of every task token; cancelling it stops polling and discovery together
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Shutting down lifecycle orchestrator");
            self.shutdown.cancel();
        }
    }

    pub async fn position(&self, address: &str) -> Option<Position> {
        self.book.read().await.get(address).cloned()
    }

    pub async fn open_positions(&self) -> usize {
        self.book.read().await.open_count()
    }

    /// Load persisted collections into the ledger. Returns the number of records held.
    pub async fn restore(&self) -> usize {
        let mut loaded = Vec::new();
        for collection in [Collection::TradeQueue, Collection::Confirmed, Collection::Sold] {
            match self.store.read(collection) {
                Ok(records) => loaded.extend(records),
                Err(e) => tracing::warn!("Skipping {} on restore: {}", collection.name(), e),
            }
        }

        let (total, seeds) = {
            let mut book = self.book.write().await;
            for position in loaded {
                let address = position.asset_address.clone();
                if let Err(e) = book.upsert(position) {
                    tracing::warn!("Conflicting record for {} on restore: {}", address, e);
                }
            }
            let seeds: Vec<(String, f64)> = book
                .open()
                .into_iter()
                .filter_map(|p| p.price.as_ref().map(|s| (p.asset_address.clone(), s.initial_price)))
                .collect();
            (book.len(), seeds)
        };

        for (address, initial_price) in &seeds {
            self.tracker.history().seed(address, *initial_price).await;
        }

        let open = self.open_positions().await;
        tracing::info!("Restored {} positions ({} in trade)", total, open);
        if open > 0 {
            self.scheduler.wake();
        }
        total
    }

    /// Create or revisit the record for a discovered asset and run its buy
    pub async fn admit_candidate(
        &self,
        candidate: Candidate,
        origin: CandidateOrigin,
    ) -> Result<Option<Position>, OrchestratorError> {
        let address = candidate.asset_address.clone();
        {
            let mut book = self.book.write().await;
            match book.get(&address).cloned() {
                Some(_) if origin == CandidateOrigin::Live => {
                    tracing::debug!("Ignoring known asset {}", address);
                    return Ok(None);
                }
                Some(existing) if !existing.is_pending() => {
                    tracing::info!("{} is already tracked", address);
                    return Ok(Some(existing));
                }
                Some(_) => tracing::info!("Retrying pending buy of {}", address),
                None => {
                    book.insert_new(Position::discovered(
                        &address,
                        &candidate.signature,
                        &candidate.creator,
                    ));
                }
            }
        }
        self.persist().await;

        self.execute_buy(&address).await
    }

    async fn execute_buy(&self, address: &str) -> Result<Option<Position>, OrchestratorError> {
        let outcome = match self.executor.buy(address).await {
            Ok(outcome) => outcome,
            Err(ExecutorError::MissingKeyMaterial) => return Err(OrchestratorError::MissingKeyMaterial),
            Err(e) => {
                tracing::warn!("Buy of {} failed: {}", address, e);
                return Ok(self.position(address).await);
            }
        };

        match outcome {
            TradeOutcome::Confirmed(receipt) => {
                self.book.write().await.update(address, |p| p.confirm_buy(&receipt));
                tracing::info!(
                    "Bought {} in {} at {} bps",
                    address,
                    receipt.signature,
                    receipt.slippage_bps
                );
                self.persist().await;
                self.scheduler.wake();
                self.enrich(address).await;
            }
            TradeOutcome::Aborted(reason) => {
                tracing::warn!("Buy of {} aborted: {}", address, reason);
            }
        }

        Ok(self.position(address).await)
    }

    async fn enrich(&self, address: &str) {
        let metadata = match self.metadata.lookup(address).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Metadata for {} unavailable: {}", address, e);
                return;
            }
        };

        let label = metadata.display_label(address);
        self.book
            .write()
            .await
            .update(address, |p| p.enrich(Some(label), metadata.icon_uri));
        self.persist().await;
    }

    /// Sample and evaluate every open position once. Assets are processed one at a time.
    pub async fn poll_pass(&self) -> PassReport {
        let Ok(_pass) = self.pass_guard.try_lock() else {
            tracing::debug!("Polling pass already running");
            return PassReport::Busy;
        };

        let addresses = self.book.read().await.open_addresses();
        if addresses.is_empty() {
            return PassReport::Idle;
        }

        let mut sold = 0;
        for address in &addresses {
            if self.poll_one(address).await {
                sold += 1;
            }
        }

        tracing::debug!("Polled {} positions, sold {}", addresses.len(), sold);
        PassReport::Completed {
            visited: addresses.len(),
            sold,
        }
    }

    /// Returns true when the asset was sold
    async fn poll_one(&self, address: &str) -> bool {
        let Some(position) = self.position(address).await.filter(|p| p.is_open()) else {
            return false;
        };

        let info = self.tracker.sample(address).await;
        let Some(history) = info.history.filter(|_| info.has_liquidity) else {
            tracing::debug!("No liquidity for {}", address);
            return false;
        };
        if history.change_percent < self.config.dust_floor_pct {
            tracing::debug!("{} at {:.2}% of initial, skipping", address, history.change_percent);
            return false;
        }

        if self.should_write_price(&position, &info) {
            let written = self.book.write().await.update(address, |p| {
                p.record_price(info.price, Some(history.initial_price), Utc::now())
                    .map(|_| ())
            });
            match written {
                Some(Ok(())) => self.persist().await,
                Some(Err(e)) => {
                    tracing::warn!("Price update for {} rejected: {}", address, e);
                    return false;
                }
                None => return false,
            }
        }

        let signal = self.decisions.decide(address, &info).await;
        if signal.is_sell() {
            tracing::info!("{:?} for {} at {:.2}%", signal, address, history.change_percent);
        }
        if !self.decisions.ready_to_sell(address).await {
            return false;
        }

        match self.dispatch_sell(address).await {
            Ok(outcome) => outcome.is_confirmed(),
            Err(e) => {
                tracing::warn!("Sell of {} failed: {}", address, e);
                false
            }
        }
    }

    fn should_write_price(&self, position: &Position, info: &PriceInfo) -> bool {
        match position.price.as_ref() {
            Some(snapshot) => (info.price - snapshot.current_price).abs() >= self.config.price_update_tolerance,
            None => true,
        }
    }

    async fn dispatch_sell(&self, address: &str) -> Result<TradeOutcome, OrchestratorError> {
        let outcome = self.executor.sell(address).await?;

        match &outcome {
            TradeOutcome::Confirmed(receipt) => {
                let result = self.book.write().await.update(address, |p| p.confirm_sell(receipt));
                if let Some(Err(e)) = result {
                    tracing::warn!("Sell of {} confirmed but not recorded: {}", address, e);
                }
                self.decisions.consume(address).await;
                self.tracker.history().forget(address).await;
                tracing::info!("Sold {} in {}", address, receipt.signature);
                self.persist().await;
            }
            TradeOutcome::Aborted(reason) => {
                tracing::warn!("Sell of {} aborted: {}", address, reason);
            }
        }

        Ok(outcome)
    }

    /// Run polling passes until the shutdown token fires
    pub async fn run_polling(&self) -> usize {
        let cancel = self.shutdown.child_token();
        tracing::info!("Polling open positions every {:?}", self.scheduler.delay());
        self.scheduler.run(cancel, || self.poll_pass()).await
    }

    /// Sell an open position now, bypassing the decision engine
    pub async fn sell_now(&self, address: &str) -> Result<TradeOutcome, OrchestratorError> {
        let _pass = self.pass_guard.lock().await;
        match self.position(address).await {
            None => return Err(OrchestratorError::NotFound(address.to_string())),
            Some(p) if !p.is_open() => return Err(OrchestratorError::NotOpen(address.to_string())),
            Some(_) => {}
        }
        tracing::info!("Manual sell of {}", address);
        self.dispatch_sell(address).await
    }

    /// Drop a pending or sold record. History keeps it.
    pub async fn remove(&self, address: &str) -> Result<Position, OrchestratorError> {
        let removed = {
            let mut book = self.book.write().await;
            match book.get(address) {
                None => return Err(OrchestratorError::NotFound(address.to_string())),
                Some(p) if p.is_open() => return Err(OrchestratorError::PositionOpen(address.to_string())),
                Some(_) => {}
            }
            book.remove(address)
        };
        let removed = removed.ok_or_else(|| OrchestratorError::NotFound(address.to_string()))?;

        self.decisions.consume(address).await;
        self.tracker.history().forget(address).await;
        tracing::info!("Removed {}", address);
        self.persist().await;
        Ok(removed)
    }

    /// Drop every record that is not in trade
    pub async fn prune_inactive(&self) -> Vec<Position> {
        let pruned = self.book.write().await.retain_open();
        for position in &pruned {
            self.decisions.consume(&position.asset_address).await;
            self.tracker.history().forget(&position.asset_address).await;
        }
        if !pruned.is_empty() {
            tracing::info!("Pruned {} inactive positions", pruned.len());
            self.persist().await;
        }
        pruned
    }

    pub async fn history(&self, filter: HistoryFilter) -> Vec<Position> {
        self.book.read().await.filtered(filter)
    }

    pub async fn wallet_balance(&self) -> Result<u64, OrchestratorError> {
        Ok(self.executor.sol_balance().await?)
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let (pending, open, sold) = {
            let book = self.book.read().await;
            (book.pending().len(), book.open_count(), book.sold().len())
        };
        OrchestratorStatus {
            pending,
            open,
            sold,
            ready_to_sell: self.decisions.readiness().len().await,
            max_open_positions: self.config.max_open_positions,
            wallet: self.executor.wallet_pubkey().map(|k| k.to_string()),
            is_shut_down: self.shutdown.is_cancelled(),
        }
    }

    /// Snapshot every collection. Failures are logged and never surface.
    async fn persist(&self) {
        let (all, confirmed, sold) = {
            let book = self.book.read().await;
            (
                book.snapshot(),
                book.confirmed_snapshot(),
                book.filtered(HistoryFilter::Sold),
            )
        };

        let writes = [
            (Collection::TradeQueue, &all),
            (Collection::Confirmed, &confirmed),
            (Collection::Sold, &sold),
        ];
        for (collection, records) in writes {
            if let Err(e) = self.store.write(collection, records) {
                tracing::warn!("Failed to persist {}: {}", collection.name(), e);
            }
        }

        match self.store.read(Collection::History) {
            Ok(existing) => {
                let merged = merge_history(existing, &all);
                if let Err(e) = self.store.write(Collection::History, &merged) {
                    tracing::warn!("Failed to persist history: {}", e);
                }
            }
            Err(e) => tracing::warn!("History unreadable, not rewritten: {}", e),
        }
    }
}

#[async_trait]
impl CandidateSink for LifecycleOrchestrator {
    async fn admit(&self, candidate: Candidate, origin: CandidateOrigin) -> Result<Option<Position>, DiscoveryError> {
        self.admit_candidate(candidate, origin)
            .await
            .map_err(|e| DiscoveryError::Admission(e.to_string()))
    }

    async fn open_count(&self) -> usize {
        self.open_positions().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::solana::WalletManager;
    use crate::application::executor::{AbortReason, ExecutorConfig};
    use crate::application::price_tracker::PriceTrackerConfig;
    use crate::domain::known_programs::{NATIVE_MINT, USDC_MINT};
    use crate::domain::{PriceHistoryStore, SellReadiness, SellThresholds};
    use crate::ports::mocks::{
        ManualTicker, MemoryLedgerStore, MockChain, MockQuoteProvider, QuoteScript, StaticMetadata,
    };
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    const MINT: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

    struct Harness {
        orchestrator: LifecycleOrchestrator,
        quotes: Arc<MockQuoteProvider>,
        chain: Arc<MockChain>,
        store: Arc<MemoryLedgerStore>,
    }

    fn mint_key() -> Pubkey {
        Pubkey::from_str(MINT).unwrap()
    }

    /// Routed buy, and a price probe returning `stable_out` micro-USDC
    fn quotes(stable_out: u64) -> MockQuoteProvider {
        MockQuoteProvider::new()
            .with_quote(NATIVE_MINT, MINT, None, QuoteScript::Routed { in_amount: 100_000_000, out_amount: 5_000 })
            .with_quote(MINT, USDC_MINT, None, QuoteScript::Routed { in_amount: 5_000, out_amount: stable_out })
            .with_quote(MINT, NATIVE_MINT, None, QuoteScript::Routed { in_amount: 5_000, out_amount: 90_000_000 })
    }

    fn harness(quotes: MockQuoteProvider, chain: MockChain, store: MemoryLedgerStore, wallet: bool) -> Harness {
        let quotes = Arc::new(quotes);
        let chain = Arc::new(chain);
        let store = Arc::new(store);
        let wallet = wallet.then(WalletManager::new_random);

        let tracker = PriceTracker::new(quotes.clone(), PriceHistoryStore::new(), PriceTrackerConfig::default());
        let decisions = SellDecisionEngine::new(SellThresholds::default(), SellReadiness::new());
        let executor = TradeExecutor::new(quotes.clone(), chain.clone(), wallet, ExecutorConfig {
            status_poll_delay: Duration::ZERO,
            ..Default::default()
        });
        let scheduler = PollScheduler::new(Arc::new(ManualTicker::new()), Duration::from_secs(5));
        let orchestrator = LifecycleOrchestrator::new(
            tracker,
            decisions,
            executor,
            Arc::new(StaticMetadata::new().with_entry(MINT, Some("Bonk Two"), Some("BONK2"), Some("https://img/b.png"))),
            store.clone(),
            scheduler,
            OrchestratorConfig::default(),
        );

        Harness { orchestrator, quotes, chain, store }
    }

    fn candidate() -> Candidate {
        Candidate {
            signature: "disc-sig".to_string(),
            creator: "creator".to_string(),
            asset_address: MINT.to_string(),
        }
    }

    async fn bought(h: &Harness) -> Position {
        h.orchestrator
            .admit_candidate(candidate(), CandidateOrigin::Live)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_admit_buys_and_enriches() {
        let h = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), true);
        let position = bought(&h).await;

        assert!(position.is_open());
        assert_eq!(position.label, "Bonk Two");
        assert_eq!(position.icon_ref.as_deref(), Some("https://img/b.png"));
        assert_eq!(h.chain.sent_count(), 1);

        assert_eq!(h.store.collection(Collection::TradeQueue).len(), 1);
        assert_eq!(h.store.collection(Collection::Confirmed).len(), 1);
        assert_eq!(h.store.collection(Collection::History).len(), 1);
    }

    #[tokio::test]
    async fn test_aborted_buy_stays_pending() {
        let h = harness(MockQuoteProvider::new(), MockChain::new(), MemoryLedgerStore::new(), true);
        let position = bought(&h).await;

        assert!(position.is_pending());
        assert_eq!(position.label, "9xQe");
        assert_eq!(h.chain.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_wallet_is_fatal() {
        let h = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), false);
        let result = h.orchestrator.admit_candidate(candidate(), CandidateOrigin::Replay).await;
        assert!(matches!(result, Err(OrchestratorError::MissingKeyMaterial)));
    }

    #[tokio::test]
    async fn test_live_duplicate_ignored_replay_retries_pending() {
        let h = harness(MockQuoteProvider::new(), MockChain::new(), MemoryLedgerStore::new(), true);
        bought(&h).await;

        // Live duplicate: no second buy attempt
        let calls = h.quotes.quote_calls().len();
        assert!(h.orchestrator.admit_candidate(candidate(), CandidateOrigin::Live).await.unwrap().is_none());
        assert_eq!(h.quotes.quote_calls().len(), calls);

        // Manual replay of a pending record retries
        h.quotes.set_quote(NATIVE_MINT, MINT, None, QuoteScript::Routed { in_amount: 1, out_amount: 5_000 });
        let position = h
            .orchestrator
            .admit_candidate(candidate(), CandidateOrigin::Replay)
            .await
            .unwrap()
            .unwrap();
        assert!(position.is_open());
        assert_eq!(h.orchestrator.history(HistoryFilter::All).await.len(), 1);
    }

    #[tokio::test]
    async fn test_poll_idle_without_open_positions() {
        let h = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), true);
        assert_eq!(h.orchestrator.poll_pass().await, PassReport::Idle);
    }

    #[tokio::test]
    async fn test_take_profit_sells_and_freezes() {
        let h = harness(
            quotes(10_000_000),
            MockChain::new().with_token_balance(mint_key(), 5_000, 6),
            MemoryLedgerStore::new(),
            true,
        );
        bought(&h).await;

        assert_eq!(h.orchestrator.poll_pass().await, PassReport::Completed { visited: 1, sold: 0 });
        h.quotes.set_quote(MINT, USDC_MINT, None, QuoteScript::Routed { in_amount: 5_000, out_amount: 25_000_000 });
        assert_eq!(h.orchestrator.poll_pass().await, PassReport::Completed { visited: 1, sold: 1 });

        let position = h.orchestrator.position(MINT).await.unwrap();
        assert!(position.is_sold());
        let snapshot = position.price.unwrap();
        assert_eq!(snapshot.frozen_price, Some(snapshot.current_price));
        assert!((snapshot.frozen_percent.unwrap() - 250.0).abs() < 1e-6);
        assert_eq!(h.store.collection(Collection::Sold).len(), 1);

        // Sold assets are no longer polled
        assert_eq!(h.orchestrator.poll_pass().await, PassReport::Idle);
    }

    #[tokio::test]
    async fn test_failed_sell_keeps_marker() {
        let h = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), true);
        bought(&h).await;
        h.orchestrator.poll_pass().await;

        // Stop-loss fires but there is no balance to sell
        h.quotes.set_quote(MINT, USDC_MINT, None, QuoteScript::Routed { in_amount: 5_000, out_amount: 4_000_000 });
        h.orchestrator.poll_pass().await;
        assert!(h.orchestrator.position(MINT).await.unwrap().is_open());
        assert_eq!(h.orchestrator.status().await.ready_to_sell, 1);

        // Marker survives a recovered price; the next tick sells once funds arrive
        h.chain.set_token_balance(mint_key(), 5_000, 6);
        h.quotes.set_quote(MINT, USDC_MINT, None, QuoteScript::Routed { in_amount: 5_000, out_amount: 10_000_000 });
        assert_eq!(h.orchestrator.poll_pass().await, PassReport::Completed { visited: 1, sold: 1 });
        assert_eq!(h.orchestrator.status().await.ready_to_sell, 0);
    }

    #[tokio::test]
    async fn test_dust_sample_skipped() {
        let h = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), true);
        bought(&h).await;
        h.orchestrator.poll_pass().await;

        h.quotes.set_quote(MINT, USDC_MINT, None, QuoteScript::Routed { in_amount: 5_000, out_amount: 100_000 });
        h.orchestrator.poll_pass().await;

        let position = h.orchestrator.position(MINT).await.unwrap();
        assert!((position.price.unwrap().current_price - 10.0).abs() < 1e-9);
        assert_eq!(h.orchestrator.status().await.ready_to_sell, 0);
    }

    #[tokio::test]
    async fn test_small_moves_not_written() {
        let h = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), true);
        bought(&h).await;
        h.orchestrator.poll_pass().await;
        let writes = h.store.writes();

        // 10.0 -> 10.005
        h.quotes.set_quote(MINT, USDC_MINT, None, QuoteScript::Routed { in_amount: 5_000, out_amount: 10_005_000 });
        h.orchestrator.poll_pass().await;
        assert_eq!(h.store.writes(), writes);
        let position = h.orchestrator.position(MINT).await.unwrap();
        assert!((position.price.unwrap().current_price - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sell_now_and_admin_ops() {
        let h = harness(
            quotes(10_000_000),
            MockChain::new().with_token_balance(mint_key(), 5_000, 6),
            MemoryLedgerStore::new(),
            true,
        );
        bought(&h).await;

        assert!(matches!(h.orchestrator.remove(MINT).await, Err(OrchestratorError::PositionOpen(_))));
        assert!(h.orchestrator.prune_inactive().await.is_empty());

        let outcome = h.orchestrator.sell_now(MINT).await.unwrap();
        assert!(outcome.is_confirmed());
        assert!(matches!(h.orchestrator.sell_now(MINT).await, Err(OrchestratorError::NotOpen(_))));
        assert_eq!(h.orchestrator.history(HistoryFilter::Sold).await.len(), 1);

        let removed = h.orchestrator.remove(MINT).await.unwrap();
        assert!(removed.is_sold());
        assert!(h.orchestrator.history(HistoryFilter::All).await.is_empty());
        // History outlives removal
        assert_eq!(h.store.collection(Collection::History).len(), 1);
        assert!(matches!(h.orchestrator.remove(MINT).await, Err(OrchestratorError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sell_without_balance_aborts() {
        let h = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), true);
        bought(&h).await;
        let outcome = h.orchestrator.sell_now(MINT).await.unwrap();
        assert_eq!(outcome, TradeOutcome::Aborted(AbortReason::NoBalance));
        assert!(h.orchestrator.position(MINT).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn test_persist_failure_is_not_fatal() {
        let h = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), true);
        h.store.set_fail_writes(true);
        let position = bought(&h).await;
        assert!(position.is_open());
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_restore_seeds_history() {
        let source = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), true);
        bought(&source).await;
        source.orchestrator.poll_pass().await;
        let saved = source.store.collection(Collection::TradeQueue);

        let h = harness(
            quotes(30_000_000),
            MockChain::new(),
            MemoryLedgerStore::new().with_collection(Collection::TradeQueue, saved),
            true,
        );
        assert_eq!(h.orchestrator.restore().await, 1);
        assert_eq!(h.orchestrator.open_positions().await, 1);

        // The restored initial price anchors the first new sample
        h.orchestrator.poll_pass().await;
        let view = h.orchestrator.tracker().history().view(MINT).await.unwrap();
        assert!((view.initial_price - 10.0).abs() < 1e-9);
        assert!((view.change_percent - 300.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_shutdown_stops_polling() {
        let h = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), true);
        h.orchestrator.shutdown();
        assert_eq!(h.orchestrator.run_polling().await, 0);
        assert!(h.orchestrator.status().await.is_shut_down);
    }

    #[tokio::test]
    async fn test_wallet_balance() {
        let chain = MockChain::new().with_sol_balance(1_500_000_000);
        let h = harness(quotes(10_000_000), chain, MemoryLedgerStore::new(), true);
        assert_eq!(h.orchestrator.wallet_balance().await.unwrap(), 1_500_000_000);

        let keyless = harness(quotes(10_000_000), MockChain::new(), MemoryLedgerStore::new(), false);
        assert!(keyless.orchestrator.wallet_balance().await.is_err());
    }
}

//! Lifecycle Integration Tests
//!
//! Drive discovery, buy, polling and sell end to end against the in-memory port fakes:
//! 1. Ledger upsert and state-machine laws
//! 2. Sell thresholds and frozen prices
//! 3. Slippage escalation through the executor
//! 4. Cap enforcement, subscription teardown and dedup in live discovery
//! 5. Restore from disk and persistence failures
//!
//! All tests are deterministic (no real network calls) and use mock data.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tempfile::TempDir;

use pool_sniper::adapters::persistence::JsonLedgerStore;
use pool_sniper::adapters::solana::WalletManager;
use pool_sniper::application::{
    CandidateOrigin, DiscoveryConfig, DiscoveryMonitor, ExecutorConfig, LifecycleOrchestrator,
    MonitorExit, OrchestratorConfig, OrchestratorError, PassReport, PollScheduler, PriceTracker,
    PriceTrackerConfig, TradeExecutor, TradeOutcome,
};
use pool_sniper::domain::known_programs::{NATIVE_MINT, RAYDIUM_POOL_AUTHORITY, USDC_MINT};
use pool_sniper::domain::{
    should_sell, HistoryFilter, HistoryView, Position, PositionBook, PriceHistoryStore, PriceInfo,
    SellDecisionEngine, SellReadiness, SellThresholds, TradeReceipt, UpsertOutcome,
};
use pool_sniper::ports::mocks::{
    ManualTicker, MemoryLedgerStore, MockChain, MockFeed, MockQuoteProvider, QuoteScript,
    StaticMetadata,
};
use pool_sniper::ports::{Collection, FeedEvent, LedgerStore, ParsedTransaction, TokenBalanceEntry};

// ============================================================================
// Test Fixtures
// ============================================================================

const MINT_A: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
const MINT_B: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
const SIG: &str = "5h6xBEauJ3PK6SWCZ1PGjBvj8vDdWG3KpwATGy1ARAXFSDwt8GFXM7W5Ncn16wmqokgpiKRLuS83KUxyZyv2sUYv";

fn key(mint: &str) -> Pubkey {
    Pubkey::from_str(mint).unwrap()
}

/// Routed buy and sell for `mint`, price probe answering `stable_out` micro-USDC
fn script_asset(quotes: &MockQuoteProvider, mint: &str, stable_out: u64) {
    quotes.set_quote(NATIVE_MINT, mint, None, QuoteScript::Routed { in_amount: 100_000_000, out_amount: 5_000 });
    quotes.set_quote(mint, USDC_MINT, None, QuoteScript::Routed { in_amount: 5_000, out_amount: stable_out });
    quotes.set_quote(mint, NATIVE_MINT, None, QuoteScript::Routed { in_amount: 5_000, out_amount: 90_000_000 });
}

fn pool_tx(signature: &str, mint: &str) -> ParsedTransaction {
    ParsedTransaction {
        signature: signature.to_string(),
        signer: Some("CreatorWallet".to_string()),
        post_token_balances: vec![
            TokenBalanceEntry {
                owner: Some(RAYDIUM_POOL_AUTHORITY.to_string()),
                mint: NATIVE_MINT.to_string(),
                ui_amount: Some(25.0),
            },
            TokenBalanceEntry {
                owner: Some(RAYDIUM_POOL_AUTHORITY.to_string()),
                mint: mint.to_string(),
                ui_amount: Some(1_000_000.0),
            },
        ],
        error: None,
    }
}

struct Harness {
    orchestrator: Arc<LifecycleOrchestrator>,
    quotes: Arc<MockQuoteProvider>,
    chain: Arc<MockChain>,
}

impl Harness {
    fn new(quotes: MockQuoteProvider, chain: MockChain, store: Arc<dyn LedgerStore>, max_open: usize) -> Self {
        let quotes = Arc::new(quotes);
        let chain = Arc::new(chain);

        let executor = TradeExecutor::new(
            quotes.clone(),
            chain.clone(),
            Some(WalletManager::new_random()),
            ExecutorConfig {
                status_poll_delay: Duration::ZERO,
                ..Default::default()
            },
        );
        let orchestrator = LifecycleOrchestrator::new(
            PriceTracker::new(quotes.clone(), PriceHistoryStore::new(), PriceTrackerConfig::default()),
            SellDecisionEngine::new(SellThresholds::default(), SellReadiness::new()),
            executor,
            Arc::new(StaticMetadata::new().with_entry(MINT_A, Some("Alpha"), Some("ALP"), None)),
            store,
            PollScheduler::new(Arc::new(ManualTicker::new()), Duration::from_secs(5)),
            OrchestratorConfig {
                max_open_positions: max_open,
                ..Default::default()
            },
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            quotes,
            chain,
        }
    }

    fn discovery(&self, events: Vec<FeedEvent>, max_open: usize) -> (Arc<DiscoveryMonitor>, Arc<MockFeed>) {
        let feed = Arc::new(MockFeed::new(events));
        let monitor = DiscoveryMonitor::new(
            self.chain.clone(),
            feed.clone(),
            self.orchestrator.clone(),
            DiscoveryConfig {
                max_open_positions: max_open,
                ..Default::default()
            },
        );
        (Arc::new(monitor), feed)
    }

    fn swaps_for(&self, mint: &str) -> usize {
        self.quotes
            .quote_calls()
            .iter()
            .filter(|q| q.input_mint == NATIVE_MINT && q.output_mint == mint && q.amount == 10_000_000)
            .count()
    }
}

fn receipt(signature: &str) -> TradeReceipt {
    TradeReceipt {
        signature: signature.to_string(),
        confirmed_at: "2024.05.01 12:00:00".to_string(),
        slippage_bps: 50,
    }
}

// ============================================================================
// Ledger laws
// ============================================================================

#[test]
fn test_idempotent_upsert() {
    let mut position = Position::discovered(MINT_A, "sig", "creator");
    position.confirm_buy(&receipt("buy"));

    let mut book = PositionBook::new();
    assert_eq!(book.upsert(position.clone()).unwrap(), UpsertOutcome::Inserted);
    let once = book.snapshot();

    assert_eq!(book.upsert(position).unwrap(), UpsertOutcome::Unchanged);
    assert_eq!(book.snapshot(), once);
    assert_eq!(book.len(), 1);
}

#[tokio::test]
async fn test_no_sold_without_confirmed_buy() {
    // Buy never routes: the record stays pending and cannot be sold
    let h = Harness::new(MockQuoteProvider::new(), MockChain::new(), Arc::new(MemoryLedgerStore::new()), 3);
    let candidate = pool_sniper::application::Candidate {
        signature: "disc".to_string(),
        creator: "creator".to_string(),
        asset_address: MINT_A.to_string(),
    };
    let position = h
        .orchestrator
        .admit_candidate(candidate, CandidateOrigin::Replay)
        .await
        .unwrap()
        .unwrap();
    assert!(position.is_pending());

    assert!(matches!(h.orchestrator.sell_now(MINT_A).await, Err(OrchestratorError::NotOpen(_))));
    assert_eq!(h.orchestrator.poll_pass().await, PassReport::Idle);

    for p in h.orchestrator.history(HistoryFilter::All).await {
        assert!(!p.is_sold() || p.is_buy_confirmed());
    }
}

// ============================================================================
// Sell thresholds and frozen prices
// ============================================================================

fn observation(initial: f64, change_percent: f64) -> PriceInfo {
    let current = initial * change_percent / 100.0;
    PriceInfo {
        has_liquidity: true,
        price: current,
        history: Some(HistoryView {
            initial_price: initial,
            current_price: current,
            change_percent,
        }),
        buy_impact_pct: None,
        sell_impact_pct: None,
    }
}

#[test]
fn test_threshold_correctness() {
    let thresholds = SellThresholds {
        take_profit_pct: 100.0,
        stop_loss_pct: 50.0,
    };
    assert!(should_sell(&observation(1.0, 201.0), &thresholds));
    assert!(!should_sell(&observation(1.0, 150.0), &thresholds));
    assert!(should_sell(&observation(1.0, 49.0), &thresholds));
    assert!(!should_sell(&observation(1.0, 51.0), &thresholds));
    assert!(!should_sell(&PriceInfo::no_liquidity(), &thresholds));
}

#[tokio::test]
async fn test_frozen_price_after_sell() {
    let quotes = MockQuoteProvider::new();
    script_asset(&quotes, MINT_A, 10_000_000);
    let h = Harness::new(
        quotes,
        MockChain::new().with_token_balance(key(MINT_A), 5_000, 6),
        Arc::new(MemoryLedgerStore::new()),
        3,
    );
    h.chain.add_transaction(pool_tx(SIG, MINT_A));
    let (monitor, _) = h.discovery(vec![], 3);
    assert!(monitor.process_one(SIG).await.unwrap().unwrap().is_open());

    h.orchestrator.poll_pass().await;
    script_asset(&h.quotes, MINT_A, 30_000_000);
    assert_eq!(h.orchestrator.poll_pass().await, PassReport::Completed { visited: 1, sold: 1 });

    let sold = h.orchestrator.position(MINT_A).await.unwrap();
    let frozen = sold.price.clone().unwrap();
    assert!(sold.is_sold());
    assert_eq!(frozen.frozen_price, Some(frozen.current_price));

    // Later ticks leave the sold record untouched
    script_asset(&h.quotes, MINT_A, 90_000_000);
    h.orchestrator.poll_pass().await;
    h.orchestrator.poll_pass().await;
    assert_eq!(h.orchestrator.position(MINT_A).await.unwrap().price, Some(frozen));
}

// ============================================================================
// Slippage escalation
// ============================================================================

#[tokio::test]
async fn test_route_escalation_buys_once_at_high_tier() {
    let quotes = MockQuoteProvider::new()
        .with_quote(NATIVE_MINT, MINT_A, Some(50), QuoteScript::EmptyRoute)
        .with_quote(NATIVE_MINT, MINT_A, Some(100), QuoteScript::EmptyRoute)
        .with_quote(NATIVE_MINT, MINT_A, Some(300), QuoteScript::Routed { in_amount: 10_000_000, out_amount: 5_000 });
    let h = Harness::new(quotes, MockChain::new(), Arc::new(MemoryLedgerStore::new()), 3);

    let outcome = h.orchestrator.executor().buy(MINT_A).await.unwrap();
    let TradeOutcome::Confirmed(receipt) = outcome else {
        panic!("expected a confirmed buy, got {:?}", outcome);
    };
    assert_eq!(receipt.slippage_bps, 300);
    assert_eq!(h.chain.sent_count(), 1);
    assert_eq!(h.quotes.swap_calls().len(), 1);

    let tiers: Vec<u16> = h.quotes.quote_calls().iter().map(|q| q.slippage_bps).collect();
    assert_eq!(tiers, vec![50, 100, 300]);
}

// ============================================================================
// Live discovery
// ============================================================================

#[tokio::test]
async fn test_cap_blocks_second_candidate_and_tears_down() {
    let quotes = MockQuoteProvider::new();
    script_asset(&quotes, MINT_A, 10_000_000);
    script_asset(&quotes, MINT_B, 10_000_000);
    let chain = MockChain::new()
        .with_transaction(pool_tx("tx-a", MINT_A))
        .with_transaction(pool_tx("tx-b", MINT_B));
    let h = Harness::new(quotes, chain, Arc::new(MemoryLedgerStore::new()), 1);

    // One position already open
    let (replay, _) = h.discovery(vec![], 1);
    h.chain.add_transaction(pool_tx(SIG, MINT_A));
    replay.process_one(SIG).await.unwrap();
    assert_eq!(h.orchestrator.open_positions().await, 1);

    let (monitor, feed) = h.discovery(vec![FeedEvent::ok("tx-b")], 1);
    let subscription = monitor.start_live_monitoring(1, h.orchestrator.shutdown_token());
    assert_eq!(subscription.join().await, MonitorExit::CapReached);

    assert_eq!(h.swaps_for(MINT_B), 0);
    assert!(h.orchestrator.position(MINT_B).await.is_none());
    assert_eq!(feed.subscribed(), 1);
    assert_eq!(feed.unsubscribed(), 1);
    // Polling is a separate task and is not cancelled
    assert!(!h.orchestrator.shutdown_token().is_cancelled());
}

#[tokio::test]
async fn test_cap_reached_mid_stream() {
    let quotes = MockQuoteProvider::new();
    script_asset(&quotes, MINT_A, 10_000_000);
    script_asset(&quotes, MINT_B, 10_000_000);
    let chain = MockChain::new()
        .with_transaction(pool_tx("tx-a", MINT_A))
        .with_transaction(pool_tx("tx-b", MINT_B));
    let h = Harness::new(quotes, chain, Arc::new(MemoryLedgerStore::new()), 1);

    let (monitor, feed) = h.discovery(vec![FeedEvent::ok("tx-a"), FeedEvent::ok("tx-b")], 1);
    let subscription = monitor.start_live_monitoring(1, h.orchestrator.shutdown_token());
    assert_eq!(subscription.join().await, MonitorExit::CapReached);

    assert_eq!(h.swaps_for(MINT_A), 1);
    assert_eq!(h.swaps_for(MINT_B), 0);
    assert_eq!(feed.unsubscribed(), 1);
}

#[tokio::test]
async fn test_duplicate_events_create_one_record() {
    let quotes = MockQuoteProvider::new();
    script_asset(&quotes, MINT_A, 10_000_000);
    script_asset(&quotes, MINT_B, 10_000_000);
    let chain = MockChain::new()
        .with_transaction(pool_tx("tx-a1", MINT_A))
        .with_transaction(pool_tx("tx-a2", MINT_A))
        .with_transaction(pool_tx("tx-b", MINT_B));
    let h = Harness::new(quotes, chain, Arc::new(MemoryLedgerStore::new()), 2);

    let events = vec![FeedEvent::ok("tx-a1"), FeedEvent::ok("tx-a2"), FeedEvent::ok("tx-b")];
    let (monitor, _) = h.discovery(events, 2);
    let subscription = monitor.start_live_monitoring(2, h.orchestrator.shutdown_token());
    assert_eq!(subscription.join().await, MonitorExit::CapReached);

    let all = h.orchestrator.history(HistoryFilter::All).await;
    assert_eq!(all.len(), 2);
    assert_eq!(all.iter().filter(|p| p.asset_address == MINT_A).count(), 1);
    assert_eq!(h.swaps_for(MINT_A), 1);
    assert_eq!(h.chain.sent_count(), 2);
}

#[tokio::test]
async fn test_shutdown_cancels_discovery_and_polling() {
    let h = Harness::new(MockQuoteProvider::new(), MockChain::new(), Arc::new(MemoryLedgerStore::new()), 3);
    let (monitor, feed) = h.discovery(vec![], 3);

    let subscription = monitor.start_live_monitoring(3, h.orchestrator.shutdown_token());
    let polling = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_polling().await })
    };

    h.orchestrator.shutdown();
    assert_eq!(subscription.join().await, MonitorExit::Cancelled);
    polling.await.unwrap();
    assert_eq!(feed.unsubscribed(), 1);
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_restore_from_disk() {
    let dir = TempDir::new().unwrap();
    let quotes = MockQuoteProvider::new();
    script_asset(&quotes, MINT_A, 10_000_000);

    let first = Harness::new(quotes, MockChain::new(), Arc::new(JsonLedgerStore::new(dir.path())), 3);
    first.chain.add_transaction(pool_tx(SIG, MINT_A));
    let (monitor, _) = first.discovery(vec![], 3);
    let bought = monitor.process_one(SIG).await.unwrap().unwrap();
    assert!(bought.is_open());
    assert_eq!(bought.label, "Alpha");
    first.orchestrator.poll_pass().await;

    for collection in Collection::ALL {
        assert!(dir.path().join(format!("{}.json", collection.name())).exists());
    }

    let quotes = MockQuoteProvider::new();
    script_asset(&quotes, MINT_A, 10_000_000);
    let second = Harness::new(quotes, MockChain::new(), Arc::new(JsonLedgerStore::new(dir.path())), 3);
    assert_eq!(second.orchestrator.restore().await, 1);

    let restored = second.orchestrator.position(MINT_A).await.unwrap();
    assert!(restored.is_open());
    assert_eq!(restored.label, "Alpha");
    let seeded = second.orchestrator.tracker().history().view(MINT_A).await.unwrap();
    assert!((seeded.initial_price - 10.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_persistence_failure_does_not_stop_trading() {
    let quotes = MockQuoteProvider::new();
    script_asset(&quotes, MINT_A, 10_000_000);
    let store = Arc::new(MemoryLedgerStore::new());
    store.set_fail_writes(true);
    let h = Harness::new(
        quotes,
        MockChain::new().with_token_balance(key(MINT_A), 5_000, 6),
        store.clone(),
        3,
    );

    h.chain.add_transaction(pool_tx(SIG, MINT_A));
    let (monitor, _) = h.discovery(vec![], 3);
    assert!(monitor.process_one(SIG).await.unwrap().unwrap().is_open());

    assert!(h.orchestrator.sell_now(MINT_A).await.unwrap().is_confirmed());
    assert!(h.orchestrator.position(MINT_A).await.unwrap().is_sold());
    assert_eq!(store.writes(), 0);
    assert!(store.collection(Collection::TradeQueue).is_empty());
}

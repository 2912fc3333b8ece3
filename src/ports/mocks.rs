//! In-memory port fakes for unit and integration tests.
//!
//! Every fake records what it was asked to do, so tests can assert on call sequences
//! without network access.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{v0, Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::ports::quotes::{QuoteRequest, QuoteResponse, RoutePlanStep, SwapInfo, SwapRequest, SwapResponse};
use crate::domain::Position;
use crate::ports::chain::{
    BlockhashWindow, ChainError, ChainPort, ConfirmationLevel, ParsedTransaction, WalletTokenBalance,
};
use crate::ports::clock::Ticker;
use crate::ports::execution::{ExecutionError, QuoteProvider};
use crate::ports::feed::{EventFeed, FeedError, FeedEvent};
use crate::ports::metadata::{AssetMetadata, MetadataError, MetadataProvider};
use crate::ports::store::{Collection, LedgerStore, PersistError};

/// Poison-tolerant lock; a panicking test thread must not cascade
fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Stand-in program id for the fake swap instruction
pub const FAKE_SWAP_PROGRAM: Pubkey = Pubkey::new_from_array([7u8; 32]);

/// Scripted answer for one quote
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteScript {
    /// Route found, with these base-unit amounts
    Routed { in_amount: u64, out_amount: u64 },
    /// 200 response with an empty route plan
    EmptyRoute,
    /// Aggregator says there is no route
    NoRoute,
    /// Transport or server failure
    Failure(String),
}

type QuoteKey = (String, String, Option<u16>);

/// Quote provider fake. Answers are keyed by (input, output, slippage); a `None` slippage
/// key matches any tier not scripted explicitly. Unscripted pairs answer `NoRoute`.
#[derive(Debug, Default)]
pub struct MockQuoteProvider {
    quotes: Mutex<HashMap<QuoteKey, QuoteScript>>,
    quote_calls: Mutex<Vec<QuoteRequest>>,
    swap_calls: Mutex<Vec<SwapRequest>>,
    /// Swap builds that come back without a transaction before one succeeds
    empty_swaps: AtomicUsize,
    /// Ignore `asLegacyTransaction` and always answer with a v0 message
    force_v0: AtomicBool,
}

impl MockQuoteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(self, input: &str, output: &str, slippage_bps: Option<u16>, script: QuoteScript) -> Self {
        self.set_quote(input, output, slippage_bps, script);
        self
    }

    pub fn set_quote(&self, input: &str, output: &str, slippage_bps: Option<u16>, script: QuoteScript) {
        guard(&self.quotes).insert((input.to_string(), output.to_string(), slippage_bps), script);
    }

    pub fn with_empty_swaps(self, count: usize) -> Self {
        self.empty_swaps.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_forced_v0(self) -> Self {
        self.force_v0.store(true, Ordering::SeqCst);
        self
    }

    pub fn quote_calls(&self) -> Vec<QuoteRequest> {
        guard(&self.quote_calls).clone()
    }

    pub fn swap_calls(&self) -> Vec<SwapRequest> {
        guard(&self.swap_calls).clone()
    }

    fn script_for(&self, request: &QuoteRequest) -> Option<QuoteScript> {
        let quotes = guard(&self.quotes);
        let exact = (request.input_mint.clone(), request.output_mint.clone(), Some(request.slippage_bps));
        let any = (request.input_mint.clone(), request.output_mint.clone(), None);
        quotes.get(&exact).or_else(|| quotes.get(&any)).cloned()
    }

    fn response(request: &QuoteRequest, in_amount: u64, out_amount: u64, routed: bool) -> QuoteResponse {
        let route_plan = if routed {
            vec![RoutePlanStep {
                swap_info: SwapInfo::venue("Raydium"),
                rest: HashMap::from([("percent".to_string(), serde_json::json!(100))]),
            }]
        } else {
            Vec::new()
        };

        QuoteResponse {
            input_mint: request.input_mint.clone(),
            output_mint: request.output_mint.clone(),
            in_amount: in_amount.to_string(),
            out_amount: out_amount.to_string(),
            slippage_bps: request.slippage_bps,
            price_impact_pct: "0.01".to_string(),
            route_plan,
            rest: HashMap::from([("otherAmountThreshold".to_string(), serde_json::json!(out_amount.to_string()))]),
        }
    }

    /// Unsigned swap for `payer`: one instruction against the fake program
    fn swap_transaction_for(payer: &Pubkey, legacy: bool) -> Result<VersionedTransaction, ExecutionError> {
        let ix = Instruction::new_with_bytes(
            FAKE_SWAP_PROGRAM,
            &[1, 2, 3],
            vec![
                AccountMeta::new(*payer, true),
                AccountMeta::new(Pubkey::new_unique(), false),
                AccountMeta::new_readonly(Pubkey::new_unique(), false),
            ],
        );
        let message = if legacy {
            VersionedMessage::Legacy(Message::new_with_blockhash(&[ix], Some(payer), &Hash::default()))
        } else {
            let compiled = v0::Message::try_compile(payer, &[ix], &[], Hash::default())
                .map_err(|e| ExecutionError::InvalidTransaction(e.to_string()))?;
            VersionedMessage::V0(compiled)
        };
        let signatures = vec![Signature::default(); message.header().num_required_signatures as usize];
        Ok(VersionedTransaction { signatures, message })
    }
}

#[async_trait]
impl QuoteProvider for MockQuoteProvider {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, ExecutionError> {
        guard(&self.quote_calls).push(request.clone());
        match self.script_for(request) {
            Some(QuoteScript::Routed { in_amount, out_amount }) => {
                Ok(Self::response(request, in_amount, out_amount, true))
            }
            Some(QuoteScript::EmptyRoute) => Ok(Self::response(request, request.amount, 0, false)),
            Some(QuoteScript::Failure(msg)) => Err(ExecutionError::ApiError(msg)),
            Some(QuoteScript::NoRoute) | None => {
                Err(ExecutionError::NoRoute("COULD_NOT_FIND_ANY_ROUTE".to_string()))
            }
        }
    }

    async fn swap_transaction(&self, request: &SwapRequest) -> Result<SwapResponse, ExecutionError> {
        guard(&self.swap_calls).push(request.clone());

        let remaining = self.empty_swaps.load(Ordering::SeqCst);
        if remaining > 0 {
            self.empty_swaps.store(remaining - 1, Ordering::SeqCst);
            return Ok(SwapResponse::default());
        }

        let payer: Pubkey = request
            .user_public_key
            .parse()
            .map_err(|_| ExecutionError::InvalidParameters("userPublicKey".to_string()))?;
        let legacy = request.as_legacy_transaction && !self.force_v0.load(Ordering::SeqCst);
        let tx = Self::swap_transaction_for(&payer, legacy)?;

        Ok(SwapResponse {
            swap_transaction: SwapResponse::encode_transaction(&tx)?,
            last_valid_block_height: 1_000,
            prioritization_fee_lamports: 5_000,
        })
    }
}

/// How `confirm_transaction` answers
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmScript {
    Landed,
    ExecutionError(String),
    Expired,
    RpcFailure(String),
}

/// Chain fake: records submissions, answers from configured state
#[derive(Debug)]
pub struct MockChain {
    blockhash: Hash,
    sent: Mutex<Vec<VersionedTransaction>>,
    confirm: Mutex<ConfirmScript>,
    statuses: Mutex<VecDeque<Option<ConfirmationLevel>>>,
    default_status: Mutex<Option<ConfirmationLevel>>,
    existing_accounts: Mutex<HashSet<Pubkey>>,
    token_balances: Mutex<HashMap<Pubkey, WalletTokenBalance>>,
    sol_balance: AtomicU64,
    transactions: Mutex<HashMap<String, ParsedTransaction>>,
    latest_signatures: Mutex<HashMap<String, String>>,
    fail_sends: AtomicBool,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            blockhash: Hash::new_unique(),
            sent: Mutex::new(Vec::new()),
            confirm: Mutex::new(ConfirmScript::Landed),
            statuses: Mutex::new(VecDeque::new()),
            default_status: Mutex::new(Some(ConfirmationLevel::Confirmed)),
            existing_accounts: Mutex::new(HashSet::new()),
            token_balances: Mutex::new(HashMap::new()),
            sol_balance: AtomicU64::new(0),
            transactions: Mutex::new(HashMap::new()),
            latest_signatures: Mutex::new(HashMap::new()),
            fail_sends: AtomicBool::new(false),
        }
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn with_account(self, address: Pubkey) -> Self {
        guard(&self.existing_accounts).insert(address);
        self
    }

    pub fn with_token_balance(self, mint: Pubkey, amount: u64, decimals: u8) -> Self {
        self.set_token_balance(mint, amount, decimals);
        self
    }

    pub fn set_token_balance(&self, mint: Pubkey, amount: u64, decimals: u8) {
        guard(&self.token_balances).insert(
            mint,
            WalletTokenBalance {
                amount,
                ui_amount: amount as f64 / 10f64.powi(decimals as i32),
                decimals,
            },
        );
    }

    pub fn with_sol_balance(self, lamports: u64) -> Self {
        self.sol_balance.store(lamports, Ordering::SeqCst);
        self
    }

    pub fn with_confirm(self, script: ConfirmScript) -> Self {
        self.set_confirm(script);
        self
    }

    pub fn set_confirm(&self, script: ConfirmScript) {
        *guard(&self.confirm) = script;
    }

    /// Status used once the scripted queue is drained
    pub fn with_default_status(self, status: Option<ConfirmationLevel>) -> Self {
        *guard(&self.default_status) = status;
        self
    }

    /// Answers for successive status queries
    pub fn with_statuses(self, statuses: Vec<Option<ConfirmationLevel>>) -> Self {
        guard(&self.statuses).extend(statuses);
        self
    }

    pub fn with_transaction(self, tx: ParsedTransaction) -> Self {
        self.add_transaction(tx);
        self
    }

    pub fn add_transaction(&self, tx: ParsedTransaction) {
        guard(&self.transactions).insert(tx.signature.clone(), tx);
    }

    pub fn with_latest_signature(self, address: &str, signature: &str) -> Self {
        guard(&self.latest_signatures).insert(address.to_string(), signature.to_string());
        self
    }

    pub fn with_failing_sends(self) -> Self {
        self.fail_sends.store(true, Ordering::SeqCst);
        self
    }

    pub fn sent(&self) -> Vec<VersionedTransaction> {
        guard(&self.sent).clone()
    }

    pub fn sent_count(&self) -> usize {
        guard(&self.sent).len()
    }
}

#[async_trait]
impl ChainPort for MockChain {
    async fn latest_blockhash(&self) -> Result<BlockhashWindow, ChainError> {
        Ok(BlockhashWindow {
            blockhash: self.blockhash,
            last_valid_block_height: 1_150,
        })
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, ChainError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChainError::RpcError("send refused".to_string()));
        }
        guard(&self.sent).push(transaction.clone());
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }

    async fn confirm_transaction(&self, _signature: &Signature, _window: &BlockhashWindow) -> Result<(), ChainError> {
        match guard(&self.confirm).clone() {
            ConfirmScript::Landed => Ok(()),
            ConfirmScript::ExecutionError(msg) => Err(ChainError::TransactionError(msg)),
            ConfirmScript::Expired => Err(ChainError::ConfirmationTimeout),
            ConfirmScript::RpcFailure(msg) => Err(ChainError::RpcError(msg)),
        }
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<Option<ConfirmationLevel>, ChainError> {
        let scripted = guard(&self.statuses).pop_front();
        Ok(scripted.unwrap_or(*guard(&self.default_status)))
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError> {
        Ok(guard(&self.existing_accounts).contains(address))
    }

    async fn token_balance(&self, _owner: &Pubkey, mint: &Pubkey) -> Result<Option<WalletTokenBalance>, ChainError> {
        Ok(guard(&self.token_balances).get(mint).copied())
    }

    async fn sol_balance(&self, _owner: &Pubkey) -> Result<u64, ChainError> {
        Ok(self.sol_balance.load(Ordering::SeqCst))
    }

    async fn parsed_transaction(&self, signature: &str) -> Result<ParsedTransaction, ChainError> {
        guard(&self.transactions)
            .get(signature)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(signature.to_string()))
    }

    async fn latest_signature_for(&self, address: &str) -> Result<Option<String>, ChainError> {
        Ok(guard(&self.latest_signatures).get(address).cloned())
    }
}

/// Feed fake: pushes the scripted events, then idles until cancelled
#[derive(Debug, Default)]
pub struct MockFeed {
    events: Mutex<Vec<FeedEvent>>,
    subscribed: AtomicUsize,
    unsubscribed: AtomicUsize,
}

impl MockFeed {
    pub fn new(events: Vec<FeedEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Default::default()
        }
    }

    pub fn subscribed(&self) -> usize {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn unsubscribed(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventFeed for MockFeed {
    async fn run(
        &self,
        _address: &str,
        sink: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Result<(), FeedError> {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        let events = std::mem::take(&mut *guard(&self.events));
        let result = self.pump(events, &sink, &cancel).await;
        self.unsubscribed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

impl MockFeed {
    async fn pump(
        &self,
        events: Vec<FeedEvent>,
        sink: &mpsc::Sender<FeedEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), FeedError> {
        for event in events {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                sent = sink.send(event) => {
                    if sent.is_err() {
                        return Err(FeedError::ChannelClosed);
                    }
                }
            }
        }
        cancel.cancelled().await;
        Ok(())
    }
}

/// Metadata fake with a fixed table; unknown addresses resolve empty
#[derive(Debug, Default)]
pub struct StaticMetadata {
    entries: HashMap<String, AssetMetadata>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, address: &str, name: Option<&str>, symbol: Option<&str>, icon: Option<&str>) -> Self {
        self.entries.insert(
            address.to_string(),
            AssetMetadata {
                name: name.map(str::to_string),
                symbol: symbol.map(str::to_string),
                icon_uri: icon.map(str::to_string),
            },
        );
        self
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadata {
    async fn lookup(&self, address: &str) -> Result<AssetMetadata, MetadataError> {
        Ok(self.entries.get(address).cloned().unwrap_or_default())
    }
}

/// Ledger store kept in memory
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    collections: Mutex<HashMap<Collection, Vec<Position>>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(self, collection: Collection, records: Vec<Position>) -> Self {
        guard(&self.collections).insert(collection, records);
        self
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn collection(&self, collection: Collection) -> Vec<Position> {
        guard(&self.collections).get(&collection).cloned().unwrap_or_default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn write(&self, collection: Collection, records: &[Position]) -> Result<(), PersistError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistError::WriteError("disk full".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        guard(&self.collections).insert(collection, records.to_vec());
        Ok(())
    }

    fn read(&self, collection: Collection) -> Result<Vec<Position>, PersistError> {
        Ok(self.collection(collection))
    }
}

/// Ticker released by hand: each `advance` lets one pending `wait` return
#[derive(Debug)]
pub struct ManualTicker {
    permits: Semaphore,
    waits: Mutex<Vec<Duration>>,
}

impl Default for ManualTicker {
    fn default() -> Self {
        Self {
            permits: Semaphore::new(0),
            waits: Mutex::new(Vec::new()),
        }
    }
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ticks: usize) {
        self.permits.add_permits(ticks);
    }

    /// Delays requested so far, including the one currently blocked
    pub fn requested(&self) -> Vec<Duration> {
        guard(&self.waits).clone()
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn wait(&self, delay: Duration) {
        guard(&self.waits).push(delay);
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SOL: &str = "So11111111111111111111111111111111111111112";

    #[tokio::test]
    async fn test_quote_script_lookup_prefers_exact_tier() {
        let quotes = MockQuoteProvider::new()
            .with_quote(SOL, "mint", None, QuoteScript::EmptyRoute)
            .with_quote(SOL, "mint", Some(300), QuoteScript::Routed { in_amount: 10, out_amount: 20 });

        let empty = quotes.quote(&QuoteRequest::new(SOL, "mint", 10, 50)).await.unwrap();
        assert!(!empty.has_route());

        let routed = quotes.quote(&QuoteRequest::new(SOL, "mint", 10, 300)).await.unwrap();
        assert!(routed.has_route());
        assert_eq!(routed.output_amount(), 20);

        let missing = quotes.quote(&QuoteRequest::new("mint", SOL, 10, 50)).await;
        assert!(missing.unwrap_err().is_no_route());
        assert_eq!(quotes.quote_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_swap_honours_legacy_flag() {
        let payer = Pubkey::new_unique();
        let quotes = MockQuoteProvider::new();

        let legacy = SwapRequest::new(payer.to_string(), serde_json::json!({})).with_legacy_transaction(true);
        let tx = quotes.swap_transaction(&legacy).await.unwrap().decode_transaction().unwrap();
        assert!(matches!(tx.message, VersionedMessage::Legacy(_)));

        let v0 = SwapRequest::new(payer.to_string(), serde_json::json!({}));
        let tx = quotes.swap_transaction(&v0).await.unwrap().decode_transaction().unwrap();
        assert!(matches!(tx.message, VersionedMessage::V0(_)));
        assert_eq!(tx.message.static_account_keys()[0], payer);
    }

    #[tokio::test]
    async fn test_manual_ticker_blocks_until_advanced() {
        let ticker = Arc::new(ManualTicker::new());
        let waiter = {
            let ticker = ticker.clone();
            tokio::spawn(async move { ticker.wait(Duration::from_secs(5)).await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        ticker.advance(1);
        waiter.await.unwrap();
        assert_eq!(ticker.requested(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn test_feed_unsubscribes_on_cancel() {
        let feed = Arc::new(MockFeed::new(vec![FeedEvent::ok("sig1")]));
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let handle = {
            let feed = feed.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { feed.run("addr", tx, cancel).await })
        };

        assert_eq!(rx.recv().await.unwrap().signature, "sig1");
        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(feed.subscribed(), 1);
        assert_eq!(feed.unsubscribed(), 1);
    }
}

//! Trade Executor
//!
//! Buys and sells through the aggregator: slippage escalation, swap build, blockhash stamping,
//! signing, submission and two-step confirmation. Aborts never touch position state.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::ports::quotes::{QuoteRequest, QuoteResponse, SwapRequest, SwapResponse};
use crate::adapters::solana::WalletManager;
use crate::domain::known_programs::{parse_pubkey, NATIVE_MINT};
use crate::domain::position::confirmation_stamp;
use crate::domain::TradeReceipt;
use crate::ports::chain::{BlockhashWindow, ChainError, ChainPort};
use crate::ports::execution::QuoteProvider;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("No wallet key material configured")]
    MissingKeyMaterial,
    #[error("Transient failure: {0}")]
    Transient(String),
}

impl From<ChainError> for ExecutorError {
    fn from(e: ChainError) -> Self {
        ExecutorError::Transient(e.to_string())
    }
}

/// Why a trade attempt stopped without a confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// No tier produced a route
    NoRoute,
    /// Nothing to sell
    NoBalance,
    InvalidAsset(String),
    SwapBuildFailed(String),
    /// Reverted on chain
    ExecutionFailed(String),
    /// Blockhash window closed before the transaction landed
    ConfirmationTimeout,
    /// Landed without error but never reached confirmed/finalized
    Unconfirmed,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::NoRoute => write!(f, "no route at any slippage tier"),
            AbortReason::NoBalance => write!(f, "no balance to sell"),
            AbortReason::InvalidAsset(a) => write!(f, "invalid asset address {}", a),
            AbortReason::SwapBuildFailed(e) => write!(f, "swap build failed: {}", e),
            AbortReason::ExecutionFailed(e) => write!(f, "execution failed: {}", e),
            AbortReason::ConfirmationTimeout => write!(f, "confirmation timed out"),
            AbortReason::Unconfirmed => write!(f, "status never reached confirmed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeOutcome {
    Confirmed(TradeReceipt),
    Aborted(AbortReason),
}

impl TradeOutcome {
    pub fn receipt(&self) -> Option<&TradeReceipt> {
        match self {
            TradeOutcome::Confirmed(r) => Some(r),
            TradeOutcome::Aborted(_) => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, TradeOutcome::Confirmed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    /// native -> asset
    Buy,
    /// asset -> native
    Sell,
}

impl TradeDirection {
    fn mints<'a>(&self, native: &'a str, asset: &'a str) -> (&'a str, &'a str) {
        match self {
            TradeDirection::Buy => (native, asset),
            TradeDirection::Sell => (asset, native),
        }
    }
}

/// First routed quote and the tier that produced it
#[derive(Debug, Clone)]
pub struct EscalatedQuote {
    pub quote: QuoteResponse,
    pub slippage_bps: u16,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub native_mint: String,
    /// Low, medium, high
    pub slippage_tiers_bps: Vec<u16>,
    pub buy_amount_lamports: u64,
    pub priority_level: String,
    pub max_priority_fee_lamports: u64,
    pub dynamic_compute_units: bool,
    /// Swap-build requests per trade before giving up
    pub swap_build_attempts: u32,
    /// Follow-up status queries after the confirm call returns
    pub status_poll_attempts: u32,
    pub status_poll_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            native_mint: NATIVE_MINT.to_string(),
            slippage_tiers_bps: vec![50, 100, 300],
            buy_amount_lamports: 10_000_000,
            priority_level: "veryHigh".to_string(),
            max_priority_fee_lamports: 10_000_000,
            dynamic_compute_units: true,
            swap_build_attempts: 3,
            status_poll_attempts: 5,
            status_poll_delay: Duration::from_secs(2),
        }
    }
}

pub struct TradeExecutor {
    quotes: Arc<dyn QuoteProvider>,
    chain: Arc<dyn ChainPort>,
    wallet: Option<WalletManager>,
    config: ExecutorConfig,
    /// One signer, one trade at a time
    trade_lock: Mutex<()>,
}

impl TradeExecutor {
    pub fn new(
        quotes: Arc<dyn QuoteProvider>,
        chain: Arc<dyn ChainPort>,
        wallet: Option<WalletManager>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            quotes,
            chain,
            wallet,
            config,
            trade_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn wallet_pubkey(&self) -> Option<Pubkey> {
        self.wallet.as_ref().map(|w| w.pubkey())
    }

    fn wallet(&self) -> Result<&WalletManager, ExecutorError> {
        self.wallet.as_ref().ok_or(ExecutorError::MissingKeyMaterial)
    }

    /// Walk the tiers in order and return the first quote with a non-empty route.
    /// Failures at one tier fall through to the next.
    pub async fn quote_with_escalation(
        &self,
        direction: TradeDirection,
        mint: &str,
        amount: u64,
        tiers: &[u16],
        legacy: bool,
    ) -> Option<EscalatedQuote> {
        let (input, output) = direction.mints(&self.config.native_mint, mint);

        for &slippage_bps in tiers {
            let request = QuoteRequest::new(input, output, amount, slippage_bps).with_legacy_transaction(legacy);
            match self.quotes.quote(&request).await {
                Ok(quote) if quote.has_route() => {
                    tracing::debug!(
                        "{:?} {} routed at {} bps via {:?}",
                        direction,
                        mint,
                        slippage_bps,
                        quote.venues()
                    );
                    return Some(EscalatedQuote { quote, slippage_bps });
                }
                Ok(_) => tracing::debug!("{:?} {}: empty route at {} bps", direction, mint, slippage_bps),
                Err(e) if e.is_no_route() => {
                    tracing::debug!("{:?} {}: no route at {} bps", direction, mint, slippage_bps)
                }
                Err(e) => tracing::warn!("{:?} {}: quote failed at {} bps: {}", direction, mint, slippage_bps, e),
            }
        }
        None
    }

    pub async fn buy(&self, mint: &str) -> Result<TradeOutcome, ExecutorError> {
        let wallet = self.wallet()?;
        let Some(mint_key) = parse_pubkey(mint) else {
            return Ok(TradeOutcome::Aborted(AbortReason::InvalidAsset(mint.to_string())));
        };
        let _guard = self.trade_lock.lock().await;

        let owner = wallet.pubkey();
        let ata = get_associated_token_address(&owner, &mint_key);
        let create_ata = !self.chain.account_exists(&ata).await?;
        let prelude = create_ata.then(|| {
            create_associated_token_account_idempotent(&owner, &owner, &mint_key, &spl_token::id())
        });
        if create_ata {
            tracing::debug!("Token account {} missing, creating it with the buy", ata);
        }

        let outcome = self
            .execute(wallet, TradeDirection::Buy, mint, self.config.buy_amount_lamports, prelude)
            .await?;
        if let TradeOutcome::Confirmed(receipt) = &outcome {
            tracing::info!("Bought {} at {} bps: {}", mint, receipt.slippage_bps, receipt.signature);
        }
        Ok(outcome)
    }

    pub async fn sell(&self, mint: &str) -> Result<TradeOutcome, ExecutorError> {
        let wallet = self.wallet()?;
        let Some(mint_key) = parse_pubkey(mint) else {
            return Ok(TradeOutcome::Aborted(AbortReason::InvalidAsset(mint.to_string())));
        };
        let _guard = self.trade_lock.lock().await;

        let balance = self.chain.token_balance(&wallet.pubkey(), &mint_key).await?;
        let amount = match balance {
            Some(b) if b.amount > 0 => b.amount,
            _ => {
                tracing::info!("Nothing to sell for {}", mint);
                return Ok(TradeOutcome::Aborted(AbortReason::NoBalance));
            }
        };

        let outcome = self.execute(wallet, TradeDirection::Sell, mint, amount, None).await?;
        if let TradeOutcome::Confirmed(receipt) = &outcome {
            tracing::info!("Sold {} ({} units) at {} bps: {}", mint, amount, receipt.slippage_bps, receipt.signature);
        }
        Ok(outcome)
    }

    pub async fn sol_balance(&self) -> Result<u64, ExecutorError> {
        let wallet = self.wallet()?;
        Ok(self.chain.sol_balance(&wallet.pubkey()).await?)
    }

    async fn execute(
        &self,
        wallet: &WalletManager,
        direction: TradeDirection,
        mint: &str,
        amount: u64,
        prelude: Option<Instruction>,
    ) -> Result<TradeOutcome, ExecutorError> {
        // A prelude instruction needs a message we can recompile
        let legacy = prelude.is_some();

        let Some(escalated) = self
            .quote_with_escalation(direction, mint, amount, &self.config.slippage_tiers_bps, legacy)
            .await
        else {
            return Ok(TradeOutcome::Aborted(AbortReason::NoRoute));
        };

        let swap = match self.build_swap(wallet, &escalated.quote, legacy).await {
            Ok(swap) => swap,
            Err(reason) => return Ok(TradeOutcome::Aborted(reason)),
        };
        let unsigned = match swap.decode_transaction() {
            Ok(tx) => tx,
            Err(e) => return Ok(TradeOutcome::Aborted(AbortReason::SwapBuildFailed(e.to_string()))),
        };

        let window = self.chain.latest_blockhash().await?;
        let owner = wallet.pubkey();
        let message = match (unsigned.message, prelude) {
            (VersionedMessage::Legacy(message), Some(ix)) => {
                match prepend_instruction(&message, ix, &owner, &window.blockhash) {
                    Some(message) => VersionedMessage::Legacy(message),
                    None => {
                        return Ok(TradeOutcome::Aborted(AbortReason::SwapBuildFailed(
                            "malformed legacy message".to_string(),
                        )))
                    }
                }
            }
            (mut message, prelude) => {
                if prelude.is_some() {
                    tracing::debug!("Swap for {} came back versioned, sending without account prelude", mint);
                }
                message.set_recent_blockhash(window.blockhash);
                message
            }
        };

        let signed = match wallet.sign_message(message) {
            Ok(tx) => tx,
            Err(e) => return Ok(TradeOutcome::Aborted(AbortReason::ExecutionFailed(e.to_string()))),
        };

        let signature = self.chain.send_transaction(&signed).await?;
        tracing::debug!("Submitted {:?} {}: {}", direction, mint, signature);

        if let Some(reason) = self.confirm(&signature, &window).await {
            tracing::warn!("{:?} {} not confirmed: {}", direction, mint, reason);
            return Ok(TradeOutcome::Aborted(reason));
        }

        Ok(TradeOutcome::Confirmed(TradeReceipt {
            signature: signature.to_string(),
            confirmed_at: confirmation_stamp(),
            slippage_bps: escalated.slippage_bps,
        }))
    }

    /// Each attempt is a fresh POST; an answer without a transaction counts as a failure
    async fn build_swap(
        &self,
        wallet: &WalletManager,
        quote: &QuoteResponse,
        legacy: bool,
    ) -> Result<SwapResponse, AbortReason> {
        let quote_json = serde_json::to_value(quote)
            .map_err(|e| AbortReason::SwapBuildFailed(e.to_string()))?;
        let request = SwapRequest::new(wallet.public_key(), quote_json)
            .with_priority_fee(self.config.priority_level.clone(), self.config.max_priority_fee_lamports)
            .with_dynamic_compute_limit(self.config.dynamic_compute_units)
            .with_legacy_transaction(legacy);

        let attempts = self.config.swap_build_attempts.max(1);
        let mut last_error = String::from("no swap transaction returned");
        for attempt in 1..=attempts {
            match self.quotes.swap_transaction(&request).await {
                Ok(swap) if swap.has_transaction() => return Ok(swap),
                Ok(_) => {
                    tracing::warn!("Swap build returned no transaction (attempt {}/{})", attempt, attempts);
                    last_error = "no swap transaction returned".to_string();
                }
                Err(e) => {
                    tracing::warn!("Swap build failed (attempt {}/{}): {}", attempt, attempts, e);
                    last_error = e.to_string();
                }
            }
        }
        Err(AbortReason::SwapBuildFailed(last_error))
    }

    /// Submit-and-wait, then a bounded status follow-up. None means confirmed.
    async fn confirm(&self, signature: &Signature, window: &BlockhashWindow) -> Option<AbortReason> {
        match self.chain.confirm_transaction(signature, window).await {
            Ok(()) => {}
            Err(ChainError::TransactionError(e)) => return Some(AbortReason::ExecutionFailed(e)),
            Err(ChainError::ConfirmationTimeout) => return Some(AbortReason::ConfirmationTimeout),
            Err(e) => {
                tracing::warn!("Confirmation of {} failed: {}", signature, e);
                return Some(AbortReason::Unconfirmed);
            }
        }

        for attempt in 0..self.config.status_poll_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.status_poll_delay).await;
            }
            match self.chain.signature_status(signature).await {
                Ok(Some(level)) if level.is_settled() => return None,
                Ok(level) => tracing::debug!("Status of {}: {:?}", signature, level),
                Err(e) => tracing::warn!("Status query for {} failed: {}", signature, e),
            }
        }
        Some(AbortReason::Unconfirmed)
    }
}

/// Recompile a legacy message with `first` in front of its instructions.
/// Returns None if an index in the message points outside its account keys.
pub fn prepend_instruction(message: &Message, first: Instruction, payer: &Pubkey, blockhash: &Hash) -> Option<Message> {
    let mut instructions = Vec::with_capacity(message.instructions.len() + 1);
    instructions.push(first);
    instructions.extend(decompile(message)?);
    Some(Message::new_with_blockhash(&instructions, Some(payer), blockhash))
}

fn decompile(message: &Message) -> Option<Vec<Instruction>> {
    let keys = &message.account_keys;
    let header = &message.header;
    let signed = header.num_required_signatures as usize;
    let writable_signed = signed.saturating_sub(header.num_readonly_signed_accounts as usize);
    let writable_unsigned_end = keys.len().saturating_sub(header.num_readonly_unsigned_accounts as usize);

    let meta = |index: u8| -> Option<AccountMeta> {
        let i = index as usize;
        let pubkey = *keys.get(i)?;
        let is_signer = i < signed;
        let is_writable = if is_signer { i < writable_signed } else { i < writable_unsigned_end };
        Some(AccountMeta { pubkey, is_signer, is_writable })
    };

    message
        .instructions
        .iter()
        .map(|compiled| {
            let program_id = *keys.get(compiled.program_id_index as usize)?;
            let accounts = compiled.accounts.iter().map(|&i| meta(i)).collect::<Option<Vec<_>>>()?;
            Some(Instruction {
                program_id,
                accounts,
                data: compiled.data.clone(),
            })
        })
        .collect()
}

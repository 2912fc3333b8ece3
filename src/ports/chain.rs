//! Chain Port
//!
//! Everything the engine needs from a Solana RPC node: blockhashes, submission, confirmation,
//! balances and parsed transaction lookup.

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    RpcError(String),
    #[error("Transaction failed: {0}")]
    TransactionError(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Timeout waiting for confirmation")]
    ConfirmationTimeout,
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Blockhash plus the last block height at which transactions using it are valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashWindow {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfirmationLevel {
    Processed,
    Confirmed,
    Finalized,
}

impl ConfirmationLevel {
    /// "confirmed" or "finalized"
    pub fn is_settled(&self) -> bool {
        *self >= ConfirmationLevel::Confirmed
    }
}

/// Post-transaction SPL balance as reported in the transaction meta
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalanceEntry {
    pub owner: Option<String>,
    pub mint: String,
    pub ui_amount: Option<f64>,
}

/// The parts of a fetched transaction the discovery path reads
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTransaction {
    pub signature: String,
    /// First account key, the fee payer
    pub signer: Option<String>,
    pub post_token_balances: Vec<TokenBalanceEntry>,
    /// Execution error, None if the transaction succeeded
    pub error: Option<String>,
}

/// Wallet's holding of one mint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletTokenBalance {
    /// Raw base units
    pub amount: u64,
    pub ui_amount: f64,
    pub decimals: u8,
}

#[async_trait]
pub trait ChainPort: Send + Sync {
    async fn latest_blockhash(&self) -> Result<BlockhashWindow, ChainError>;

    /// Submit without preflight, with a bounded node-side resubmission count
    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, ChainError>;

    /// Wait until the signature lands or the blockhash window closes.
    /// An on-chain execution error is reported as `TransactionError`.
    async fn confirm_transaction(
        &self,
        signature: &Signature,
        window: &BlockhashWindow,
    ) -> Result<(), ChainError>;

    /// One status query with history search; None if the node does not know the signature
    async fn signature_status(&self, signature: &Signature) -> Result<Option<ConfirmationLevel>, ChainError>;

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError>;

    /// Balance of the owner's associated token account, None if the account is missing
    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<WalletTokenBalance>, ChainError>;

    async fn sol_balance(&self, owner: &Pubkey) -> Result<u64, ChainError>;

    async fn parsed_transaction(&self, signature: &str) -> Result<ParsedTransaction, ChainError>;

    /// Most recent signature referencing the address
    async fn latest_signature_for(&self, address: &str) -> Result<Option<String>, ChainError>;
}

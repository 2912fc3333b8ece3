//! Ports Layer - Trait definitions for external dependencies
//!
//! Following hexagonal architecture, these traits abstract:
//! - Swap quotes and swap building (Jupiter)
//! - Chain access: blockhashes, submission, confirmation, balances
//! - The live log feed used for pool discovery
//! - Asset metadata lookup
//! - Durable ledger collections
//! - Delays for the polling loop

pub mod chain;
pub mod clock;
pub mod execution;
pub mod feed;
pub mod metadata;
#[cfg(any(test, feature = "test_utils"))]
pub mod mocks;
pub mod quotes;
pub mod store;

pub use chain::{
    BlockhashWindow, ChainError, ChainPort, ConfirmationLevel, ParsedTransaction, TokenBalanceEntry,
    WalletTokenBalance,
};
pub use clock::{Ticker, TokioTicker};
pub use execution::{ExecutionError, QuoteProvider};
pub use feed::{EventFeed, FeedError, FeedEvent};
pub use metadata::{AssetMetadata, MetadataError, MetadataProvider};
pub use quotes::{QuoteRequest, QuoteResponse, SwapRequest, SwapResponse};
pub use store::{Collection, LedgerStore, PersistError};

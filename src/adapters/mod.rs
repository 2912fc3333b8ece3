//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Jupiter: quote and swap-build API client
//! - Solana: RPC client, log subscription and wallet management
//! - Token metadata: DAS / explorer lookups with a TTL cache
//! - Persistence: JSON ledger collections on disk
//! - CLI: command-line argument definitions

pub mod cli;
pub mod jupiter;
pub mod persistence;
pub mod solana;
pub mod token_metadata;

pub use cli::CliApp;
pub use jupiter::JupiterClient;
pub use persistence::JsonLedgerStore;
pub use solana::{LogsFeed, SolanaClient, WalletManager};
pub use token_metadata::{MetadataCache, TokenMetadataClient};

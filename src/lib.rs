//! Pool Sniper - token lifecycle engine for new Solana liquidity pools
//!
//! Discovers assets from pool-creation transactions, buys them through Jupiter, polls their
//! price and sells on take-profit or stop-loss.
//!
//! # Modules
//!
//! - `domain`: Positions, the ledger, price history and the sell predicate
//! - `ports`: Trait abstractions (QuoteProvider, ChainPort, EventFeed, MetadataProvider, LedgerStore)
//! - `adapters`: External implementations (Jupiter, Solana, token metadata, JSON store, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Discovery, price tracking, execution and the lifecycle orchestrator

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod config;
pub mod application;

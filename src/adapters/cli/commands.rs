//! CLI Commands
//!
//! Argument definitions for the pool sniper binary.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::HistoryFilter;

/// Pool Sniper - buys newly created Solana pools and sells on take-profit or stop-loss
#[derive(Parser, Debug)]
#[command(
    name = "pool-sniper",
    version = env!("CARGO_PKG_VERSION"),
    about = "Token lifecycle engine for newly created Solana liquidity pools",
    long_about = "Pool Sniper watches the pool fee collector for new pools, buys each new asset \
                  through Jupiter, polls its price and sells on take-profit or stop-loss."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Restore the ledger, poll open positions and watch for new pools
    Run(RunCmd),

    /// Process one transaction signature or asset address, then keep polling
    Replay(ReplayCmd),

    /// Show wallet balance and position counts
    Status(ConfigArg),

    /// List tracked positions
    History(HistoryCmd),

    /// Sell an open position now
    Sell(MintCmd),

    /// Remove a pending or sold position
    Remove(MintCmd),

    /// Remove every position that is not in trade
    Prune(ConfigArg),

    /// Sample the current price of an asset
    Quote(MintCmd),
}

/// Shared config path argument
#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/mainnet.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunCmd {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Do not subscribe to new pools; only poll restored and replayed positions
    #[arg(long)]
    pub no_monitor: bool,

    /// Replay a transaction signature or asset address before monitoring (repeatable)
    #[arg(long, value_name = "TX_OR_MINT")]
    pub replay: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ReplayCmd {
    /// Transaction signature or asset address
    #[arg(value_name = "TX_OR_MINT")]
    pub input: String,

    #[command(flatten)]
    pub config: ConfigArg,
}

#[derive(Args, Debug)]
pub struct HistoryCmd {
    /// all, in-trade or sold
    #[arg(short, long, value_name = "FILTER", default_value = "all")]
    pub filter: HistoryFilter,

    #[command(flatten)]
    pub config: ConfigArg,
}

#[derive(Args, Debug)]
pub struct MintCmd {
    /// Asset mint address
    #[arg(value_name = "MINT")]
    pub mint: String,

    #[command(flatten)]
    pub config: ConfigArg,
}

impl Command {
    pub fn config_path(&self) -> &PathBuf {
        match self {
            Command::Run(cmd) => &cmd.config.config,
            Command::Replay(cmd) => &cmd.config.config,
            Command::Status(cmd) | Command::Prune(cmd) => &cmd.config,
            Command::History(cmd) => &cmd.config.config,
            Command::Sell(cmd) | Command::Remove(cmd) | Command::Quote(cmd) => &cmd.config.config,
        }
    }

    /// Commands that sign transactions need key material up front
    pub fn needs_wallet(&self) -> bool {
        matches!(self, Command::Run(_) | Command::Replay(_) | Command::Sell(_))
    }
}

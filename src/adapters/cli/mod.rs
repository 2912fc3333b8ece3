//! CLI Adapter
//!
//! Command-line interface for the pool sniper.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{CliApp, Command, ConfigArg, HistoryCmd, MintCmd, ReplayCmd, RunCmd};

/// Parse the process arguments
pub fn init() -> CliApp {
    use clap::Parser;
    CliApp::parse()
}

//! Domain Layer - Core lifecycle logic for the pool sniper
//!
//! Pure types and rules with no I/O:
//! - `position`: one record per discovered asset and its state machine
//! - `ledger`: the authoritative position table and its derived views
//! - `price_history`: bounded per-asset sample windows
//! - `sell_decision`: take-profit / stop-loss predicate and readiness markers
//! - `known_programs`: mainnet addresses and decimal scales

pub mod position;
pub mod ledger;
pub mod price_history;
pub mod sell_decision;
pub mod known_programs;

pub use position::{
    BuyState, SellState, Position, PositionError, PositionStatus, PriceSnapshot, TradeReceipt,
};
pub use ledger::{merge_history, HistoryFilter, PositionBook, UpsertOutcome};
pub use price_history::{HistoryView, PriceHistory, PriceHistoryStore, MAX_SAMPLES};
pub use sell_decision::{
    should_sell, PriceInfo, SellDecisionEngine, SellReadiness, SellSignal, SellThresholds,
};

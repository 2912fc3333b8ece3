//! Application Layer - use cases wired from ports
//!
//! - `discovery`: live pool monitor and one-shot replay
//! - `price_tracker`: two-leg quote probe into the price history
//! - `executor`: buy/sell with slippage escalation and confirmation
//! - `scheduler`: self-rescheduling polling loop
//! - `orchestrator`: the position lifecycle

pub mod discovery;
pub mod executor;
pub mod orchestrator;
pub mod price_tracker;
pub mod scheduler;

pub use discovery::{
    extract_candidate, Candidate, CandidateOrigin, CandidateSink, DiscoveryConfig, DiscoveryError,
    DiscoveryMonitor, LiveSubscription, MonitorExit, ReplayTarget,
};
pub use executor::{
    AbortReason, EscalatedQuote, ExecutorConfig, ExecutorError, TradeDirection, TradeExecutor,
    TradeOutcome,
};
pub use orchestrator::{LifecycleOrchestrator, OrchestratorConfig, OrchestratorError, OrchestratorStatus};
pub use price_tracker::{normalized_price, PriceTracker, PriceTrackerConfig};
pub use scheduler::{PassReport, PollScheduler};

use async_trait::async_trait;
use thiserror::Error;

use super::quotes::{QuoteRequest, QuoteResponse, SwapRequest, SwapResponse};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("API request failed: {0}")]
    ApiError(String),
    #[error("No route found: {0}")]
    NoRoute(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Transaction signing failed: {0}")]
    SigningError(String),
    #[error("Invalid swap transaction: {0}")]
    InvalidTransaction(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl ExecutionError {
    /// The aggregator has no path at this size and slippage
    pub fn is_no_route(&self) -> bool {
        matches!(self, ExecutionError::NoRoute(_))
    }
}

/// Swap aggregator: price quotes and unsigned swap transactions
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, ExecutionError>;

    async fn swap_transaction(&self, request: &SwapRequest) -> Result<SwapResponse, ExecutionError>;
}

//! Aggregator quote and swap-build shapes
//!
//! Quotes type only the fields the engine reads. Everything else rides in `rest` so a
//! quote can be handed back to the swap builder unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::transaction::VersionedTransaction;

use super::execution::ExecutionError;

pub type Passthrough = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Base units of the input mint
    pub amount: u64,
    pub slippage_bps: u16,
    #[serde(default)]
    pub as_legacy_transaction: bool,
}

impl QuoteRequest {
    pub fn new(input_mint: impl Into<String>, output_mint: impl Into<String>, amount: u64, slippage_bps: u16) -> Self {
        Self {
            input_mint: input_mint.into(),
            output_mint: output_mint.into(),
            amount,
            slippage_bps,
            as_legacy_transaction: false,
        }
    }

    pub fn with_legacy_transaction(mut self, legacy: bool) -> Self {
        self.as_legacy_transaction = legacy;
        self
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("inputMint", self.input_mint.clone()),
            ("outputMint", self.output_mint.clone()),
            ("amount", self.amount.to_string()),
            ("slippageBps", self.slippage_bps.to_string()),
        ];
        if self.as_legacy_transaction {
            pairs.push(("asLegacyTransaction", "true".to_string()));
        }
        pairs
    }
}

/// Aggregator answer for one (pair, size, slippage). Amounts arrive as decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: String,
    pub out_amount: String,
    pub slippage_bps: u16,
    #[serde(default)]
    pub price_impact_pct: String,
    /// Empty when the aggregator found no path
    #[serde(default)]
    pub route_plan: Vec<RoutePlanStep>,
    #[serde(flatten)]
    pub rest: Passthrough,
}

impl QuoteResponse {
    pub fn output_amount(&self) -> u64 {
        self.out_amount.parse().unwrap_or(0)
    }

    /// Percent; unparsable impact reads as none
    pub fn price_impact(&self) -> f64 {
        self.price_impact_pct.parse().unwrap_or(0.0)
    }

    pub fn has_route(&self) -> bool {
        !self.route_plan.is_empty()
    }

    pub fn venues(&self) -> Vec<&str> {
        self.route_plan.iter().map(|s| s.swap_info.label.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlanStep {
    pub swap_info: SwapInfo,
    #[serde(flatten)]
    pub rest: Passthrough,
}

/// One venue hop; the label names the DEX
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub rest: Passthrough,
}

impl SwapInfo {
    pub fn venue(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            rest: Passthrough::new(),
        }
    }
}

/// Request parameters for building a swap transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    /// User's public key (wallet address)
    pub user_public_key: String,
    /// The full quote response from /quote endpoint
    pub quote_response: serde_json::Value,
    /// Wrap SOL before and unwrap after the swap
    pub wrap_and_unwrap_sol: bool,
    /// Let the API size the compute budget
    pub dynamic_compute_unit_limit: bool,
    /// Let the API tighten slippage from simulation
    pub dynamic_slippage: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritization_fee_lamports: Option<PrioritizationFee>,
    #[serde(default)]
    pub as_legacy_transaction: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizationFee {
    pub priority_level_with_max_lamports: PriorityLevelWithMaxLamports,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityLevelWithMaxLamports {
    pub max_lamports: u64,
    /// "medium", "high" or "veryHigh"
    pub priority_level: String,
}

impl SwapRequest {
    pub fn new(user_public_key: String, quote_response: serde_json::Value) -> Self {
        Self {
            user_public_key,
            quote_response,
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            dynamic_slippage: true,
            prioritization_fee_lamports: None,
            as_legacy_transaction: false,
        }
    }

    /// Cap the priority fee the API may attach
    pub fn with_priority_fee(mut self, priority_level: impl Into<String>, max_lamports: u64) -> Self {
        self.prioritization_fee_lamports = Some(PrioritizationFee {
            priority_level_with_max_lamports: PriorityLevelWithMaxLamports {
                max_lamports,
                priority_level: priority_level.into(),
            },
        });
        self
    }

    pub fn with_dynamic_compute_limit(mut self, enabled: bool) -> Self {
        self.dynamic_compute_unit_limit = enabled;
        self
    }

    pub fn with_legacy_transaction(mut self, legacy: bool) -> Self {
        self.as_legacy_transaction = legacy;
        self
    }
}

/// Response from Jupiter swap API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    /// Base64 encoded serialized transaction ready to sign and send
    #[serde(default)]
    pub swap_transaction: String,
    /// Last valid block height for this transaction
    #[serde(default)]
    pub last_valid_block_height: u64,
    #[serde(default)]
    pub prioritization_fee_lamports: u64,
}

impl SwapResponse {
    /// The API occasionally answers 200 without a transaction
    pub fn has_transaction(&self) -> bool {
        !self.swap_transaction.trim().is_empty()
    }

    /// Get the transaction bytes from base64
    pub fn transaction_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.decode(self.swap_transaction.trim())
    }

    /// Decode the unsigned transaction
    pub fn decode_transaction(&self) -> Result<VersionedTransaction, ExecutionError> {
        let bytes = self
            .transaction_bytes()
            .map_err(|e| ExecutionError::InvalidTransaction(format!("base64: {}", e)))?;
        bincode::deserialize(&bytes)
            .map_err(|e| ExecutionError::InvalidTransaction(format!("bincode: {}", e)))
    }

    /// Encode a transaction the way the API does; used by fakes and tooling
    pub fn encode_transaction(transaction: &VersionedTransaction) -> Result<String, ExecutionError> {
        use base64::Engine;
        let bytes = bincode::serialize(transaction)
            .map_err(|e| ExecutionError::InvalidTransaction(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

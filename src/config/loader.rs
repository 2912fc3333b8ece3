//! Configuration Loader
//!
//! Loads the TOML config, applies environment overrides and validates the result.

use serde::Deserialize;
use solana_sdk::commitment_config::CommitmentConfig;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::adapters::jupiter::JupiterConfig;
use crate::adapters::solana::LogsFeedConfig;
use crate::adapters::token_metadata::TokenMetadataConfig;
use crate::application::{DiscoveryConfig, ExecutorConfig, OrchestratorConfig, PriceTrackerConfig};
use crate::domain::known_programs::{NATIVE_MINT, RAYDIUM_FEE_COLLECTOR, RAYDIUM_POOL_AUTHORITY, USDC_MINT};
use crate::domain::SellThresholds;

/// Main configuration structure matching config/mainnet.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub solana: SolanaSection,
    #[serde(default)]
    pub jupiter: JupiterSection,
    #[serde(default)]
    pub trading: TradingSection,
    #[serde(default)]
    pub price: PriceSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub metadata: MetadataSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Solana RPC configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct SolanaSection {
    /// HTTP RPC endpoint
    pub rpc_url: String,
    /// Websocket endpoint for the log subscription
    pub ws_url: String,
    /// Commitment level: "processed", "confirmed", "finalized"
    #[serde(default = "default_commitment")]
    pub commitment: String,
    /// Wallet keypair path (NEVER commit this file!)
    #[serde(default)]
    pub keypair_path: String,
    /// Keypair bytes as a JSON array, only ever taken from WALLET_PRIVATE_KEY
    #[serde(skip)]
    pub private_key: Option<String>,
}

impl SolanaSection {
    pub fn commitment_config(&self) -> CommitmentConfig {
        match self.commitment.as_str() {
            "processed" => CommitmentConfig::processed(),
            "finalized" => CommitmentConfig::finalized(),
            _ => CommitmentConfig::confirmed(),
        }
    }

    /// Keypair path with `~` and env vars expanded
    pub fn expanded_keypair_path(&self) -> String {
        expand(&self.keypair_path)
    }
}

/// Jupiter API configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JupiterSection {
    pub api_url: String,
    /// Optional API key for higher rate limits
    pub api_key: Option<String>,
    /// Low, medium, high
    pub slippage_tiers_bps: Vec<u16>,
    /// Priority fee mode: "auto", "high", "veryHigh"
    pub priority_level: String,
    pub max_priority_fee_lamports: u64,
    pub dynamic_compute_units: bool,
    pub swap_build_attempts: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for JupiterSection {
    fn default() -> Self {
        let executor = ExecutorConfig::default();
        let client = JupiterConfig::default();
        Self {
            api_url: client.api_base_url,
            api_key: None,
            slippage_tiers_bps: executor.slippage_tiers_bps,
            priority_level: executor.priority_level,
            max_priority_fee_lamports: executor.max_priority_fee_lamports,
            dynamic_compute_units: executor.dynamic_compute_units,
            swap_build_attempts: executor.swap_build_attempts,
            timeout_secs: client.timeout.as_secs(),
            max_retries: client.max_retries,
        }
    }
}

/// Trading configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingSection {
    /// Native input of every buy, in lamports
    pub buy_amount_lamports: u64,
    pub max_open_positions: usize,
    /// Gain over initial price, in percent
    pub take_profit_pct: f64,
    /// Loss from initial price, in percent
    pub stop_loss_pct: f64,
    pub poll_delay_secs: u64,
    pub cap_check_secs: u64,
    pub dust_floor_pct: f64,
    pub price_update_tolerance: f64,
}

impl Default for TradingSection {
    fn default() -> Self {
        let thresholds = SellThresholds::default();
        Self {
            buy_amount_lamports: ExecutorConfig::default().buy_amount_lamports,
            max_open_positions: 3,
            take_profit_pct: thresholds.take_profit_pct,
            stop_loss_pct: thresholds.stop_loss_pct,
            poll_delay_secs: 5,
            cap_check_secs: 20,
            dust_floor_pct: 2.0,
            price_update_tolerance: 0.01,
        }
    }
}

/// Price probe configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PriceSection {
    pub probe_lamports: u64,
    pub probe_slippage_bps: u16,
    pub stable_mint: String,
    pub native_mint: String,
}

impl Default for PriceSection {
    fn default() -> Self {
        Self {
            probe_lamports: 100_000_000,
            probe_slippage_bps: 50,
            stable_mint: USDC_MINT.to_string(),
            native_mint: NATIVE_MINT.to_string(),
        }
    }
}

/// Pool discovery configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub fee_collector: String,
    pub pool_authority: String,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            fee_collector: RAYDIUM_FEE_COLLECTOR.to_string(),
            pool_authority: RAYDIUM_POOL_AUTHORITY.to_string(),
        }
    }
}

/// Metadata lookup configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataSection {
    /// DAS endpoint; built from HELIUS_API_KEY when unset
    pub helius_url: Option<String>,
    pub solscan_url: Option<String>,
    pub cache_ttl_secs: u64,
}

impl Default for MetadataSection {
    fn default() -> Self {
        Self {
            helius_url: None,
            solscan_url: TokenMetadataConfig::default().explorer_url,
            cache_ttl_secs: 600,
        }
    }
}

/// Ledger storage configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub data_dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

impl StorageSection {
    pub fn expanded_data_dir(&self) -> String {
        expand(&self.data_dir)
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn expand(path: &str) -> String {
    shellexpand::full(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Load configuration from a TOML file, with environment overrides applied
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Environment values take precedence over the file
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SOLANA_RPC_URL") {
            self.solana.rpc_url = url;
        }
        if let Some(url) = lookup("SOLANA_WS_URL") {
            self.solana.ws_url = url;
        }
        if let Some(path) = lookup("SOLANA_KEYPAIR_PATH") {
            self.solana.keypair_path = path;
        }
        if let Some(key) = lookup("WALLET_PRIVATE_KEY") {
            self.solana.private_key = Some(key);
        }
        if let Some(key) = lookup("JUPITER_API_KEY") {
            self.jupiter.api_key = Some(key);
        }
        if let Some(key) = lookup("HELIUS_API_KEY") {
            self.metadata.helius_url = TokenMetadataConfig::with_helius_key(&key).helius_url;
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.solana.rpc_url.is_empty() {
            return invalid("rpc_url cannot be empty".to_string());
        }
        if self.solana.ws_url.is_empty() {
            return invalid("ws_url cannot be empty".to_string());
        }
        if !matches!(self.solana.commitment.as_str(), "processed" | "confirmed" | "finalized") {
            return invalid(format!("unknown commitment: {}", self.solana.commitment));
        }
        if self.jupiter.api_url.is_empty() {
            return invalid("jupiter api_url cannot be empty".to_string());
        }

        let tiers = &self.jupiter.slippage_tiers_bps;
        if tiers.len() != 3 {
            return invalid(format!("slippage_tiers_bps needs exactly 3 tiers, got {}", tiers.len()));
        }
        if tiers.windows(2).any(|w| w[0] >= w[1]) {
            return invalid(format!("slippage_tiers_bps must be strictly increasing, got {:?}", tiers));
        }
        if self.jupiter.swap_build_attempts == 0 {
            return invalid("swap_build_attempts must be > 0".to_string());
        }

        if self.trading.take_profit_pct <= 0.0 {
            return invalid(format!("take_profit_pct must be > 0, got {}", self.trading.take_profit_pct));
        }
        if self.trading.stop_loss_pct <= 0.0 || self.trading.stop_loss_pct >= 100.0 {
            return invalid(format!("stop_loss_pct must be 0-100 exclusive, got {}", self.trading.stop_loss_pct));
        }
        if self.trading.max_open_positions == 0 {
            return invalid("max_open_positions must be > 0".to_string());
        }
        if self.trading.buy_amount_lamports == 0 {
            return invalid("buy_amount_lamports must be > 0".to_string());
        }
        if self.trading.poll_delay_secs == 0 {
            return invalid("poll_delay_secs must be > 0".to_string());
        }
        if self.trading.cap_check_secs == 0 {
            return invalid("cap_check_secs must be > 0".to_string());
        }
        if self.price.probe_lamports == 0 {
            return invalid("probe_lamports must be > 0".to_string());
        }
        if self.trading.dust_floor_pct < 0.0 || self.trading.price_update_tolerance < 0.0 {
            return invalid("dust_floor_pct and price_update_tolerance cannot be negative".to_string());
        }

        if self.discovery.fee_collector.is_empty() || self.discovery.pool_authority.is_empty() {
            return invalid("discovery addresses cannot be empty".to_string());
        }
        if self.storage.data_dir.is_empty() {
            return invalid("data_dir cannot be empty".to_string());
        }

        Ok(())
    }

    pub fn thresholds(&self) -> SellThresholds {
        SellThresholds {
            take_profit_pct: self.trading.take_profit_pct,
            stop_loss_pct: self.trading.stop_loss_pct,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata.cache_ttl_secs)
    }
}

impl From<&Config> for ExecutorConfig {
    fn from(config: &Config) -> Self {
        ExecutorConfig {
            native_mint: config.price.native_mint.clone(),
            slippage_tiers_bps: config.jupiter.slippage_tiers_bps.clone(),
            buy_amount_lamports: config.trading.buy_amount_lamports,
            priority_level: config.jupiter.priority_level.clone(),
            max_priority_fee_lamports: config.jupiter.max_priority_fee_lamports,
            dynamic_compute_units: config.jupiter.dynamic_compute_units,
            swap_build_attempts: config.jupiter.swap_build_attempts,
            ..Default::default()
        }
    }
}

impl From<&Config> for PriceTrackerConfig {
    fn from(config: &Config) -> Self {
        PriceTrackerConfig {
            native_mint: config.price.native_mint.clone(),
            stable_mint: config.price.stable_mint.clone(),
            probe_lamports: config.price.probe_lamports,
            probe_slippage_bps: config.price.probe_slippage_bps,
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        OrchestratorConfig {
            max_open_positions: config.trading.max_open_positions,
            poll_delay: Duration::from_secs(config.trading.poll_delay_secs),
            dust_floor_pct: config.trading.dust_floor_pct,
            price_update_tolerance: config.trading.price_update_tolerance,
        }
    }
}

impl From<&Config> for DiscoveryConfig {
    fn from(config: &Config) -> Self {
        DiscoveryConfig {
            fee_collector: config.discovery.fee_collector.clone(),
            pool_authority: config.discovery.pool_authority.clone(),
            native_mint: config.price.native_mint.clone(),
            max_open_positions: config.trading.max_open_positions,
            cap_check_interval: Duration::from_secs(config.trading.cap_check_secs),
            ..Default::default()
        }
    }
}

impl From<&Config> for JupiterConfig {
    fn from(config: &Config) -> Self {
        JupiterConfig {
            api_base_url: config.jupiter.api_url.clone(),
            api_key: config.jupiter.api_key.clone(),
            timeout: Duration::from_secs(config.jupiter.timeout_secs),
            max_retries: config.jupiter.max_retries,
        }
    }
}

impl From<&Config> for TokenMetadataConfig {
    fn from(config: &Config) -> Self {
        TokenMetadataConfig {
            helius_url: config.metadata.helius_url.clone(),
            explorer_url: config.metadata.solscan_url.clone(),
            ..Default::default()
        }
    }
}

impl From<&Config> for LogsFeedConfig {
    fn from(config: &Config) -> Self {
        LogsFeedConfig {
            ws_url: config.solana.ws_url.clone(),
            commitment: CommitmentConfig::confirmed(),
            ..Default::default()
        }
    }
}

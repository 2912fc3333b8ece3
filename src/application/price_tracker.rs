//! Price Tracker
//!
//! Converts a two-leg quote probe into a per-unit price and feeds the bounded history store.

use std::sync::Arc;

use chrono::Utc;

use crate::ports::quotes::{QuoteRequest, QuoteResponse};
use crate::domain::known_programs::{
    NATIVE_DECIMAL_SCALE, NATIVE_MINT, PRICE_NORMALIZATION, STABLE_DECIMAL_SCALE, USDC_MINT,
};
use crate::domain::{PriceHistoryStore, PriceInfo};
use crate::ports::execution::QuoteProvider;

#[derive(Debug, Clone)]
pub struct PriceTrackerConfig {
    pub native_mint: String,
    pub stable_mint: String,
    /// Native-currency input of the first leg, in lamports
    pub probe_lamports: u64,
    pub probe_slippage_bps: u16,
}

impl Default for PriceTrackerConfig {
    fn default() -> Self {
        Self {
            native_mint: NATIVE_MINT.to_string(),
            stable_mint: USDC_MINT.to_string(),
            probe_lamports: 100_000_000,
            probe_slippage_bps: 50,
        }
    }
}

/// Per-unit price from the probe input and the stable output of the second leg
pub fn normalized_price(stable_out: u64, probe_lamports: u64) -> f64 {
    if probe_lamports == 0 {
        return 0.0;
    }
    let stable = stable_out as f64 / STABLE_DECIMAL_SCALE;
    let native = probe_lamports as f64 / NATIVE_DECIMAL_SCALE;
    stable / native * PRICE_NORMALIZATION
}

#[derive(Clone)]
pub struct PriceTracker {
    quotes: Arc<dyn QuoteProvider>,
    history: PriceHistoryStore,
    config: PriceTrackerConfig,
}

impl PriceTracker {
    pub fn new(quotes: Arc<dyn QuoteProvider>, history: PriceHistoryStore, config: PriceTrackerConfig) -> Self {
        Self { quotes, history, config }
    }

    pub fn history(&self) -> &PriceHistoryStore {
        &self.history
    }

    pub fn config(&self) -> &PriceTrackerConfig {
        &self.config
    }

    /// Sample one asset. Any failed or empty leg yields `PriceInfo::no_liquidity()`.
    pub async fn sample(&self, address: &str) -> PriceInfo {
        let Some(buy_leg) = self
            .leg(&self.config.native_mint, address, self.config.probe_lamports)
            .await
        else {
            return PriceInfo::no_liquidity();
        };

        let Some(sell_leg) = self
            .leg(address, &self.config.stable_mint, buy_leg.output_amount())
            .await
        else {
            return PriceInfo::no_liquidity();
        };

        let price = normalized_price(sell_leg.output_amount(), self.config.probe_lamports);
        let Some(history) = self.history.record(address, price, Utc::now()).await else {
            return PriceInfo::no_liquidity();
        };

        tracing::debug!(
            "Sampled {}: price {:.6} ({:.2}% of initial)",
            address,
            price,
            history.change_percent
        );

        PriceInfo {
            has_liquidity: true,
            price,
            history: Some(history),
            buy_impact_pct: Some(buy_leg.price_impact()),
            sell_impact_pct: Some(sell_leg.price_impact()),
        }
    }

    async fn leg(&self, input: &str, output: &str, amount: u64) -> Option<QuoteResponse> {
        if amount == 0 {
            return None;
        }
        let request = QuoteRequest::new(input, output, amount, self.config.probe_slippage_bps);
        match self.quotes.quote(&request).await {
            Ok(quote) if quote.has_route() && quote.output_amount() > 0 => Some(quote),
            Ok(_) => {
                tracing::debug!("No usable route {} -> {} for {}", input, output, amount);
                None
            }
            Err(e) => {
                tracing::debug!("Quote {} -> {} failed: {}", input, output, e);
                None
            }
        }
    }
}

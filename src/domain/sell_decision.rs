//! Sell decision
//!
//! `should_sell` is a pure predicate over one price observation. The readiness marker set
//! records positive decisions until a sell consumes them.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::price_history::HistoryView;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellThresholds {
    /// Gain over initial price, in percent, that triggers take-profit
    pub take_profit_pct: f64,
    /// Loss from initial price, in percent, that triggers stop-loss
    pub stop_loss_pct: f64,
}

impl Default for SellThresholds {
    fn default() -> Self {
        Self {
            take_profit_pct: 100.0,
            stop_loss_pct: 50.0,
        }
    }
}

/// One price observation as produced by the price tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceInfo {
    pub has_liquidity: bool,
    pub price: f64,
    pub history: Option<HistoryView>,
    pub buy_impact_pct: Option<f64>,
    pub sell_impact_pct: Option<f64>,
}

impl PriceInfo {
    pub fn no_liquidity() -> Self {
        Self {
            has_liquidity: false,
            price: 0.0,
            history: None,
            buy_impact_pct: None,
            sell_impact_pct: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellSignal {
    TakeProfit,
    StopLoss,
    Hold,
    NoLiquidity,
}

impl SellSignal {
    pub fn is_sell(&self) -> bool {
        matches!(self, SellSignal::TakeProfit | SellSignal::StopLoss)
    }
}

pub fn evaluate(info: &PriceInfo, thresholds: &SellThresholds) -> SellSignal {
    let history = match info.history {
        Some(h) if info.has_liquidity && info.price > 0.0 => h,
        _ => return SellSignal::NoLiquidity,
    };

    if history.change_percent >= 100.0 + thresholds.take_profit_pct
        && history.current_price > history.initial_price
    {
        return SellSignal::TakeProfit;
    }
    if history.change_percent <= 100.0 - thresholds.stop_loss_pct
        && history.current_price < history.initial_price
    {
        return SellSignal::StopLoss;
    }
    SellSignal::Hold
}

pub fn should_sell(info: &PriceInfo, thresholds: &SellThresholds) -> bool {
    evaluate(info, thresholds).is_sell()
}

/// Addresses whose thresholds were satisfied and which still await a successful sell
#[derive(Debug, Clone, Default)]
pub struct SellReadiness {
    marked: Arc<RwLock<HashSet<String>>>,
}

impl SellReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark(&self, address: &str) {
        self.marked.write().await.insert(address.to_string());
    }

    pub async fn is_marked(&self, address: &str) -> bool {
        self.marked.read().await.contains(address)
    }

    /// Consume the marker. Returns false if it was not set.
    pub async fn clear(&self, address: &str) -> bool {
        self.marked.write().await.remove(address)
    }

    pub async fn len(&self) -> usize {
        self.marked.read().await.len()
    }
}

/// Decision engine: the pure predicate plus the marker it feeds
#[derive(Debug, Clone, Default)]
pub struct SellDecisionEngine {
    thresholds: SellThresholds,
    readiness: SellReadiness,
}

impl SellDecisionEngine {
    pub fn new(thresholds: SellThresholds, readiness: SellReadiness) -> Self {
        Self { thresholds, readiness }
    }

    pub fn thresholds(&self) -> &SellThresholds {
        &self.thresholds
    }

    pub fn readiness(&self) -> &SellReadiness {
        &self.readiness
    }

    /// Evaluate and mark on a positive decision
    pub async fn decide(&self, address: &str, info: &PriceInfo) -> SellSignal {
        let signal = evaluate(info, &self.thresholds);
        if signal.is_sell() {
            self.readiness.mark(address).await;
        }
        signal
    }

    /// Whether the asset should be dispatched to the executor
    pub async fn ready_to_sell(&self, address: &str) -> bool {
        self.readiness.is_marked(address).await
    }

    pub async fn consume(&self, address: &str) -> bool {
        self.readiness.clear(address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(initial: f64, current: f64) -> PriceInfo {
        PriceInfo {
            has_liquidity: true,
            price: current,
            history: Some(HistoryView {
                initial_price: initial,
                current_price: current,
                change_percent: current / initial * 100.0,
            }),
            buy_impact_pct: None,
            sell_impact_pct: None,
        }
    }

    fn with_change(initial: f64, current: f64, change: f64) -> PriceInfo {
        let mut i = info(initial, current);
        if let Some(h) = i.history.as_mut() {
            h.change_percent = change;
        }
        i
    }

    #[test]
    fn test_take_profit_threshold() {
        let t = SellThresholds { take_profit_pct: 100.0, stop_loss_pct: 50.0 };
        assert!(should_sell(&with_change(1.0, 2.01, 201.0), &t));
        assert!(!should_sell(&with_change(1.0, 1.5, 150.0), &t));
        assert_eq!(evaluate(&with_change(1.0, 2.01, 201.0), &t), SellSignal::TakeProfit);
    }

    #[test]
    fn test_stop_loss_threshold() {
        let t = SellThresholds { take_profit_pct: 100.0, stop_loss_pct: 50.0 };
        assert!(should_sell(&with_change(1.0, 0.49, 49.0), &t));
        assert!(!should_sell(&with_change(1.0, 0.51, 51.0), &t));
        assert_eq!(evaluate(&with_change(1.0, 0.49, 49.0), &t), SellSignal::StopLoss);
    }

    #[test]
    fn test_requires_price_direction() {
        let t = SellThresholds::default();
        // Percent says take-profit but price did not actually rise
        assert!(!should_sell(&with_change(1.0, 1.0, 250.0), &t));
        assert!(!should_sell(&with_change(1.0, 1.0, 10.0), &t));
    }

    #[test]
    fn test_missing_inputs_never_sell() {
        let t = SellThresholds::default();
        assert_eq!(evaluate(&PriceInfo::no_liquidity(), &t), SellSignal::NoLiquidity);

        let mut no_history = info(1.0, 5.0);
        no_history.history = None;
        assert!(!should_sell(&no_history, &t));

        let mut zero_price = info(1.0, 5.0);
        zero_price.price = 0.0;
        assert!(!should_sell(&zero_price, &t));
    }

    #[tokio::test]
    async fn test_marker_latches_until_consumed() {
        let engine = SellDecisionEngine::new(SellThresholds::default(), SellReadiness::new());

        assert_eq!(engine.decide("A", &info(1.0, 3.0)).await, SellSignal::TakeProfit);
        assert!(engine.ready_to_sell("A").await);

        assert_eq!(engine.decide("A", &info(1.0, 1.2)).await, SellSignal::Hold);
        assert!(engine.ready_to_sell("A").await);

        assert!(engine.consume("A").await);
        assert!(!engine.consume("A").await);
        assert!(!engine.ready_to_sell("A").await);
    }
}

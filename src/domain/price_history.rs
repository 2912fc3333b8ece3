//! Per-asset price history
//!
//! Diagnostic side channel for the price tracker. The authoritative current price lives on the
//! position; this store only remembers the seed price and a bounded window of samples.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::position::change_percent;

/// Samples kept per asset before the oldest is evicted
pub const MAX_SAMPLES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSample {
    pub at: DateTime<Utc>,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct PriceHistory {
    pub initial_price: f64,
    pub current_price: f64,
    samples: VecDeque<PriceSample>,
}

impl PriceHistory {
    fn seeded(price: f64) -> Self {
        Self {
            initial_price: price,
            current_price: price,
            samples: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    pub fn change_percent(&self) -> f64 {
        change_percent(self.initial_price, self.current_price)
    }

    pub fn samples(&self) -> impl Iterator<Item = &PriceSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn push(&mut self, sample: PriceSample) {
        self.current_price = sample.price;
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
}

/// Read-only view handed to the sell decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryView {
    pub initial_price: f64,
    pub current_price: f64,
    pub change_percent: f64,
}

impl From<&PriceHistory> for HistoryView {
    fn from(history: &PriceHistory) -> Self {
        Self {
            initial_price: history.initial_price,
            current_price: history.current_price,
            change_percent: history.change_percent(),
        }
    }
}

/// Shared, injectable history map scoped to one engine instance
#[derive(Debug, Clone, Default)]
pub struct PriceHistoryStore {
    inner: Arc<RwLock<HashMap<String, PriceHistory>>>,
}

impl PriceHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample. The first strictly positive sample seeds the initial price.
    /// Non-positive prices are ignored and return None.
    pub async fn record(&self, address: &str, price: f64, at: DateTime<Utc>) -> Option<HistoryView> {
        if !(price.is_finite() && price > 0.0) {
            return None;
        }
        let mut map = self.inner.write().await;
        let history = map
            .entry(address.to_string())
            .or_insert_with(|| PriceHistory::seeded(price));
        history.push(PriceSample { at, price });
        Some(HistoryView::from(&*history))
    }

    /// Seed a known initial price (restored positions). Existing history wins.
    pub async fn seed(&self, address: &str, initial_price: f64) {
        if initial_price <= 0.0 {
            return;
        }
        self.inner
            .write()
            .await
            .entry(address.to_string())
            .or_insert_with(|| PriceHistory::seeded(initial_price));
    }

    pub async fn view(&self, address: &str) -> Option<HistoryView> {
        self.inner.read().await.get(address).map(HistoryView::from)
    }

    pub async fn get(&self, address: &str) -> Option<PriceHistory> {
        self.inner.read().await.get(address).cloned()
    }

    pub async fn forget(&self, address: &str) {
        self.inner.write().await.remove(address);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

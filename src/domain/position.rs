use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format used for buy/sell confirmation stamps (local time)
pub const CONFIRMED_AT_FORMAT: &str = "%Y.%m.%d %H:%M:%S";

/// Characters of the address used as a placeholder label
const DEFAULT_LABEL_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuyState {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellState {
    Open,
    Sold,
}

/// Derived lifecycle status, one per projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Pending,
    Open,
    Sold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub initial_price: f64,
    pub current_price: f64,
    pub change_percent: f64,
    pub last_sampled_at: Option<DateTime<Utc>>,
    pub frozen_price: Option<f64>,
    pub frozen_percent: Option<f64>,
}

impl PriceSnapshot {
    fn seeded(price: f64, at: DateTime<Utc>) -> Self {
        Self {
            initial_price: price,
            current_price: price,
            change_percent: 100.0,
            last_sampled_at: Some(at),
            frozen_price: None,
            frozen_percent: None,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_price.is_some()
    }
}

/// Percent of initial price, 100 meaning unchanged
pub fn change_percent(initial: f64, current: f64) -> f64 {
    if initial > 0.0 {
        current / initial * 100.0
    } else {
        0.0
    }
}

/// Local wall-clock stamp in the ledger's confirmation format
pub fn confirmation_stamp() -> String {
    Local::now().format(CONFIRMED_AT_FORMAT).to_string()
}

/// Result of a confirmed on-chain trade, as recorded on the position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeReceipt {
    pub signature: String,
    pub confirmed_at: String,
    pub slippage_bps: u16,
}

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("Position {0} has no confirmed buy")]
    NotBought(String),
    #[error("Position {0} is already sold")]
    AlreadySold(String),
    #[error("Invalid price: {0}")]
    InvalidPrice(f64),
    #[error("Cannot merge {incoming} into {existing}")]
    AddressMismatch { existing: String, incoming: String },
}

/// One discovered asset and everything the engine knows about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub asset_address: String,
    pub discovery_signature: String,
    pub creator_address: String,
    pub label: String,
    #[serde(default)]
    pub icon_ref: Option<String>,
    pub buy_state: BuyState,
    #[serde(default)]
    pub buy_confirmed_at: Option<String>,
    #[serde(default)]
    pub buy_signature: Option<String>,
    pub sell_state: SellState,
    #[serde(default)]
    pub sell_confirmed_at: Option<String>,
    #[serde(default)]
    pub sell_signature: Option<String>,
    #[serde(default)]
    pub price: Option<PriceSnapshot>,
}

impl Position {
    /// Fresh record for a newly seen asset: pending buy, open, no price
    pub fn discovered(
        asset_address: impl Into<String>,
        discovery_signature: impl Into<String>,
        creator_address: impl Into<String>,
    ) -> Self {
        let asset_address = asset_address.into();
        let label = default_label(&asset_address);
        Self {
            asset_address,
            discovery_signature: discovery_signature.into(),
            creator_address: creator_address.into(),
            label,
            icon_ref: None,
            buy_state: BuyState::Pending,
            buy_confirmed_at: None,
            buy_signature: None,
            sell_state: SellState::Open,
            sell_confirmed_at: None,
            sell_signature: None,
            price: None,
        }
    }

    pub fn status(&self) -> PositionStatus {
        match (self.buy_state, self.sell_state) {
            (BuyState::Pending, _) => PositionStatus::Pending,
            (BuyState::Confirmed, SellState::Open) => PositionStatus::Open,
            (BuyState::Confirmed, SellState::Sold) => PositionStatus::Sold,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == PositionStatus::Pending
    }

    /// Eligible for polling
    pub fn is_open(&self) -> bool {
        self.status() == PositionStatus::Open
    }

    pub fn is_sold(&self) -> bool {
        self.status() == PositionStatus::Sold
    }

    pub fn is_buy_confirmed(&self) -> bool {
        self.buy_state == BuyState::Confirmed
    }

    /// Pending -> Confirmed/Open. Repeating it is a no-op.
    pub fn confirm_buy(&mut self, receipt: &TradeReceipt) {
        if self.is_buy_confirmed() {
            return;
        }
        self.buy_state = BuyState::Confirmed;
        self.buy_confirmed_at = Some(receipt.confirmed_at.clone());
        self.buy_signature = Some(receipt.signature.clone());
    }

    /// Apply a live sample. Returns the resulting snapshot.
    ///
    /// The first sample seeds `initial_price` unless `known_initial` carries one from the
    /// price tracker's history; after that the initial price never moves.
    pub fn record_price(
        &mut self,
        price: f64,
        known_initial: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<&PriceSnapshot, PositionError> {
        if !self.is_buy_confirmed() {
            return Err(PositionError::NotBought(self.asset_address.clone()));
        }
        if self.sell_state == SellState::Sold {
            return Err(PositionError::AlreadySold(self.asset_address.clone()));
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(PositionError::InvalidPrice(price));
        }

        let snapshot = match self.price.take() {
            Some(mut snapshot) => {
                snapshot.current_price = price;
                snapshot.change_percent = change_percent(snapshot.initial_price, price);
                snapshot.last_sampled_at = Some(at);
                snapshot
            }
            None => {
                let mut snapshot = PriceSnapshot::seeded(known_initial.unwrap_or(price), at);
                snapshot.current_price = price;
                snapshot.change_percent = change_percent(snapshot.initial_price, price);
                snapshot
            }
        };
        let snapshot = self.price.insert(snapshot);
        Ok(&*snapshot)
    }

    /// Confirmed/Open -> Confirmed/Sold, freezing the last live sample
    pub fn confirm_sell(&mut self, receipt: &TradeReceipt) -> Result<(), PositionError> {
        if !self.is_buy_confirmed() {
            return Err(PositionError::NotBought(self.asset_address.clone()));
        }
        if self.sell_state == SellState::Sold {
            return Err(PositionError::AlreadySold(self.asset_address.clone()));
        }

        self.sell_state = SellState::Sold;
        self.sell_confirmed_at = Some(receipt.confirmed_at.clone());
        self.sell_signature = Some(receipt.signature.clone());
        if let Some(snapshot) = self.price.as_mut() {
            snapshot.frozen_price = Some(snapshot.current_price);
            snapshot.frozen_percent = Some(snapshot.change_percent);
        }
        Ok(())
    }

    /// Best-effort display metadata; never touches lifecycle state
    pub fn enrich(&mut self, label: Option<String>, icon_ref: Option<String>) {
        if let Some(label) = label.filter(|l| !l.trim().is_empty()) {
            self.label = label;
        }
        if icon_ref.is_some() {
            self.icon_ref = icon_ref;
        }
    }

    pub fn has_default_label(&self) -> bool {
        self.label == default_label(&self.asset_address)
    }

    /// Address-keyed upsert merge.
    ///
    /// State only moves forward: confirmation flags are OR-ed, stamps keep the first value
    /// seen, the initial price of an existing snapshot wins, and a frozen snapshot is never
    /// replaced. Merging a position into itself changes nothing.
    pub fn merge(&mut self, incoming: &Position) -> Result<(), PositionError> {
        if self.asset_address != incoming.asset_address {
            return Err(PositionError::AddressMismatch {
                existing: self.asset_address.clone(),
                incoming: incoming.asset_address.clone(),
            });
        }

        if self.discovery_signature.is_empty() {
            self.discovery_signature = incoming.discovery_signature.clone();
        }
        if self.creator_address.is_empty() {
            self.creator_address = incoming.creator_address.clone();
        }
        if self.has_default_label() && !incoming.has_default_label() {
            self.label = incoming.label.clone();
        }
        if self.icon_ref.is_none() {
            self.icon_ref = incoming.icon_ref.clone();
        }

        if incoming.buy_state == BuyState::Confirmed {
            self.buy_state = BuyState::Confirmed;
        }
        self.buy_confirmed_at = self.buy_confirmed_at.take().or_else(|| incoming.buy_confirmed_at.clone());
        self.buy_signature = self.buy_signature.take().or_else(|| incoming.buy_signature.clone());

        // A sold record without a confirmed buy cannot exist; only accept Sold once bought
        if incoming.sell_state == SellState::Sold && self.buy_state == BuyState::Confirmed {
            self.sell_state = SellState::Sold;
        }
        self.sell_confirmed_at = self.sell_confirmed_at.take().or_else(|| incoming.sell_confirmed_at.clone());
        self.sell_signature = self.sell_signature.take().or_else(|| incoming.sell_signature.clone());

        self.price = merge_snapshot(self.price.take(), incoming.price.as_ref());
        if self.sell_state == SellState::Sold {
            if let Some(snapshot) = self.price.as_mut() {
                snapshot.frozen_price.get_or_insert(snapshot.current_price);
                snapshot.frozen_percent.get_or_insert(snapshot.change_percent);
            }
        }
        Ok(())
    }
}

fn merge_snapshot(existing: Option<PriceSnapshot>, incoming: Option<&PriceSnapshot>) -> Option<PriceSnapshot> {
    match (existing, incoming) {
        (None, None) => None,
        (Some(existing), None) => Some(existing),
        (None, Some(incoming)) => Some(incoming.clone()),
        (Some(existing), Some(_)) if existing.is_frozen() => Some(existing),
        (Some(existing), Some(incoming)) => {
            let newer = match (existing.last_sampled_at, incoming.last_sampled_at) {
                (Some(a), Some(b)) => b > a,
                (None, Some(_)) => true,
                _ => false,
            };
            let source = if newer || incoming.is_frozen() { incoming } else { &existing };
            Some(PriceSnapshot {
                initial_price: existing.initial_price,
                current_price: source.current_price,
                change_percent: change_percent(existing.initial_price, source.current_price),
                last_sampled_at: source.last_sampled_at,
                frozen_price: source.frozen_price,
                frozen_percent: source.frozen_percent,
            })
        }
    }
}

/// First four characters of the address
pub fn default_label(address: &str) -> String {
    address.chars().take(DEFAULT_LABEL_LEN).collect()
}

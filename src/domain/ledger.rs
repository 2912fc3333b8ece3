//! Position Ledger
//!
//! The one authoritative table of positions, keyed by asset address. Pending, open and sold
//! are read-only views derived from each record's state, so they can never drift apart.

use std::collections::HashMap;

use super::position::{Position, PositionError, PositionStatus};

/// Result of an address-keyed upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Operator-facing history filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryFilter {
    #[default]
    All,
    InTrade,
    Sold,
}

impl HistoryFilter {
    pub fn matches(&self, position: &Position) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::InTrade => position.is_open(),
            HistoryFilter::Sold => position.is_sold(),
        }
    }
}

impl std::str::FromStr for HistoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(HistoryFilter::All),
            "in-trade" | "intrade" | "open" => Ok(HistoryFilter::InTrade),
            "sold" => Ok(HistoryFilter::Sold),
            other => Err(format!("unknown history filter: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    positions: HashMap<String, Position>,
    /// Insertion order, oldest first
    order: Vec<String>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: impl IntoIterator<Item = Position>) -> Self {
        let mut book = Self::new();
        for position in positions {
            // Same-address inputs are merged; a mismatch cannot happen here
            let _ = book.upsert(position);
        }
        book
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.positions.contains_key(address)
    }

    pub fn get(&self, address: &str) -> Option<&Position> {
        self.positions.get(address)
    }

    /// Insert only if the address is new. Returns false for a duplicate.
    pub fn insert_new(&mut self, position: Position) -> bool {
        if self.positions.contains_key(&position.asset_address) {
            return false;
        }
        self.order.push(position.asset_address.clone());
        self.positions.insert(position.asset_address.clone(), position);
        true
    }

    /// Merge a record into the table, never duplicating an address
    pub fn upsert(&mut self, position: Position) -> Result<UpsertOutcome, PositionError> {
        match self.positions.get_mut(&position.asset_address) {
            Some(existing) => {
                let before = existing.clone();
                existing.merge(&position)?;
                if *existing == before {
                    Ok(UpsertOutcome::Unchanged)
                } else {
                    Ok(UpsertOutcome::Updated)
                }
            }
            None => {
                self.insert_new(position);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Mutate one record in place
    pub fn update<R>(&mut self, address: &str, f: impl FnOnce(&mut Position) -> R) -> Option<R> {
        self.positions.get_mut(address).map(f)
    }

    pub fn remove(&mut self, address: &str) -> Option<Position> {
        let removed = self.positions.remove(address)?;
        self.order.retain(|a| a != address);
        Some(removed)
    }

    /// Drop everything that is not currently in trade
    pub fn retain_open(&mut self) -> Vec<Position> {
        let doomed: Vec<String> = self
            .iter()
            .filter(|p| !p.is_open())
            .map(|p| p.asset_address.clone())
            .collect();
        doomed.iter().filter_map(|a| self.remove(a)).collect()
    }

    /// Stable iteration in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.order.iter().filter_map(|a| self.positions.get(a))
    }

    pub fn view(&self, status: PositionStatus) -> Vec<&Position> {
        self.iter().filter(|p| p.status() == status).collect()
    }

    pub fn pending(&self) -> Vec<&Position> {
        self.view(PositionStatus::Pending)
    }

    pub fn open(&self) -> Vec<&Position> {
        self.view(PositionStatus::Open)
    }

    pub fn sold(&self) -> Vec<&Position> {
        self.view(PositionStatus::Sold)
    }

    pub fn open_count(&self) -> usize {
        self.iter().filter(|p| p.is_open()).count()
    }

    pub fn open_addresses(&self) -> Vec<String> {
        self.open().into_iter().map(|p| p.asset_address.clone()).collect()
    }

    /// Newest first, matching the persisted collections
    pub fn snapshot(&self) -> Vec<Position> {
        self.filtered(HistoryFilter::All)
    }

    /// Records whose buy has been confirmed, open or sold
    pub fn confirmed_snapshot(&self) -> Vec<Position> {
        self.order
            .iter()
            .rev()
            .filter_map(|a| self.positions.get(a))
            .filter(|p| p.is_buy_confirmed())
            .cloned()
            .collect()
    }

    pub fn filtered(&self, filter: HistoryFilter) -> Vec<Position> {
        self.order
            .iter()
            .rev()
            .filter_map(|a| self.positions.get(a))
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }
}

/// Fold the live table into the long-lived history collection.
///
/// History outlives administrative removal: entries missing from `current` are kept. Known
/// addresses are merged in place, new ones go to the front.
pub fn merge_history(existing: Vec<Position>, current: &[Position]) -> Vec<Position> {
    let mut merged = existing;
    let mut fresh = Vec::new();

    for position in current {
        match merged.iter_mut().find(|h| h.asset_address == position.asset_address) {
            Some(entry) => {
                let _ = entry.merge(position);
            }
            None => fresh.push(position.clone()),
        }
    }

    fresh.extend(merged);
    fresh
}

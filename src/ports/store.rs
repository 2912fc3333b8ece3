use thiserror::Error;

use crate::domain::Position;

#[derive(Error, Debug, Clone)]
pub enum PersistError {
    #[error("Failed to serialize collection: {0}")]
    SerializationError(String),

    #[error("Failed to write collection file: {0}")]
    WriteError(String),

    #[error("Failed to read collection file: {0}")]
    ReadError(String),

    #[error("Collection file is corrupted: {0}")]
    CorruptedFile(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),
}

/// Durable collections the ledger is projected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Every known position
    TradeQueue,
    /// Positions whose buy confirmed, open or sold
    Confirmed,
    /// Sold positions
    Sold,
    /// Append-mostly history that survives administrative removal
    History,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::TradeQueue,
        Collection::Confirmed,
        Collection::Sold,
        Collection::History,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::TradeQueue => "trade_queue",
            Collection::Confirmed => "confirmed",
            Collection::Sold => "sold",
            Collection::History => "history",
        }
    }
}

/// Full-snapshot store: a write replaces the collection, a read returns the last write or empty
pub trait LedgerStore: Send + Sync {
    fn write(&self, collection: Collection, records: &[Position]) -> Result<(), PersistError>;

    fn read(&self, collection: Collection) -> Result<Vec<Position>, PersistError>;
}

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Position;
use crate::ports::store::{Collection, LedgerStore, PersistError};

/// File-backed ledger store. Each write replaces the whole collection file.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    data_dir: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_for(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(format!("{}.json", collection.name()))
    }
}

impl LedgerStore for JsonLedgerStore {
    fn write(&self, collection: Collection, records: &[Position]) -> Result<(), PersistError> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| PersistError::DirectoryError(e.to_string()))?;

        let content = serde_json::to_string_pretty(records)
            .map_err(|e| PersistError::SerializationError(e.to_string()))?;

        // Write-then-rename so a crash never leaves a half-written collection
        let path = self.path_for(collection);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| PersistError::WriteError(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| PersistError::WriteError(e.to_string()))?;

        tracing::debug!(
            "Saved {} ({} records) to {}",
            collection.name(),
            records.len(),
            path.display()
        );
        Ok(())
    }

    fn read(&self, collection: Collection) -> Result<Vec<Position>, PersistError> {
        let path = self.path_for(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content =
            fs::read_to_string(&path).map_err(|e| PersistError::ReadError(e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<Position> = serde_json::from_str(&content)
            .map_err(|e| PersistError::CorruptedFile(format!("{}: {}", path.display(), e)))?;

        tracing::info!("Loaded {} {} records", records.len(), collection.name());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeReceipt;
    use tempfile::tempdir;

    fn open_position(addr: &str) -> Position {
        let mut p = Position::discovered(addr, "disc", "creator");
        p.confirm_buy(&TradeReceipt {
            signature: "buy".to_string(),
            confirmed_at: "2024.05.01 12:00:00".to_string(),
            slippage_bps: 50,
        });
        p
    }

    #[test]
    fn test_read_missing_collection_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonLedgerStore::new(dir.path());
        assert!(store.read(Collection::Sold).unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let store = JsonLedgerStore::new(dir.path().join("nested"));
        let records = vec![open_position("mintA"), Position::discovered("mintB", "d", "c")];

        store.write(Collection::TradeQueue, &records).unwrap();
        let loaded = store.read(Collection::TradeQueue).unwrap();

        assert_eq!(loaded, records);
        assert!(store.path_for(Collection::TradeQueue).ends_with("trade_queue.json"));
        assert!(!store.path_for(Collection::TradeQueue).with_extension("json.tmp").exists());
    }

    #[test]
    fn test_write_replaces_collection() {
        let dir = tempdir().unwrap();
        let store = JsonLedgerStore::new(dir.path());

        store.write(Collection::Confirmed, &[open_position("mintA")]).unwrap();
        store.write(Collection::Confirmed, &[]).unwrap();
        assert!(store.read(Collection::Confirmed).unwrap().is_empty());
    }

    #[test]
    fn test_persisted_field_names() {
        let dir = tempdir().unwrap();
        let store = JsonLedgerStore::new(dir.path());
        store.write(Collection::History, &[open_position("mintA")]).unwrap();

        let raw = fs::read_to_string(store.path_for(Collection::History)).unwrap();
        assert!(raw.contains("\"assetAddress\""));
        assert!(raw.contains("\"buyConfirmedAt\""));
    }

    #[test]
    fn test_corrupted_file() {
        let dir = tempdir().unwrap();
        let store = JsonLedgerStore::new(dir.path());
        fs::write(store.path_for(Collection::Sold), "{not json").unwrap();

        assert!(matches!(
            store.read(Collection::Sold),
            Err(PersistError::CorruptedFile(_))
        ));
    }
}

//! Persistence Adapter
//!
//! One pretty-printed JSON file per ledger collection under the data directory.

mod json_store;

pub use json_store::JsonLedgerStore;

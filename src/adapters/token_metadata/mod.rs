//! Token Metadata Adapter
//!
//! Display metadata (name, symbol, icon) for newly bought assets:
//! - DAS `getAsset` with the fungible display options
//! - explorer token-meta endpoint as fallback
//! - TTL cache in front of both, negative results included

mod cache;
mod client;
mod types;

pub use cache::MetadataCache;
pub use client::{TokenMetadataClient, TokenMetadataConfig};

//! Token Metadata Types
//!
//! Wire shapes for the DAS `getAsset` call and the explorer token-meta endpoint.

use serde::Deserialize;

use crate::ports::metadata::AssetMetadata;

/// JSON-RPC envelope for `getAsset`
#[derive(Debug, Clone, Deserialize)]
pub struct AssetResponse {
    #[serde(default)]
    pub result: Option<AssetResult>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetResult {
    #[serde(default)]
    pub content: Option<AssetContent>,
    #[serde(default)]
    pub token_info: Option<TokenInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetContent {
    #[serde(default)]
    pub metadata: Option<ContentMetadata>,
    #[serde(default)]
    pub links: Option<ContentLinks>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentLinks {
    #[serde(default)]
    pub image: Option<String>,
}

/// Fungible-token block, present when `showFungible` is set
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl AssetResult {
    /// content.metadata first, token_info when the name is missing
    pub fn into_metadata(self) -> AssetMetadata {
        let content = self.content.unwrap_or_default();
        let meta = content.metadata.unwrap_or_default();
        let links = content.links.unwrap_or_default();

        let mut name = non_empty(meta.name);
        let mut symbol = non_empty(meta.symbol);
        if name.is_none() {
            if let Some(info) = self.token_info {
                name = non_empty(info.name);
                symbol = non_empty(info.symbol).or(symbol);
            }
        }

        AssetMetadata {
            name,
            symbol,
            icon_uri: non_empty(links.image).or_else(|| non_empty(meta.image)),
        }
    }
}

/// Explorer `token/meta` response
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerTokenResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<ExplorerTokenData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExplorerTokenData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl ExplorerTokenData {
    pub fn into_metadata(self) -> AssetMetadata {
        AssetMetadata {
            name: non_empty(self.name),
            symbol: non_empty(self.symbol),
            icon_uri: non_empty(self.icon),
        }
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters of the address used when no name or symbol is known
const FALLBACK_LABEL_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("Rate limited, try again later")]
    RateLimited,
}

/// Display metadata for an asset; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub icon_uri: Option<String>,
}

impl AssetMetadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.symbol.is_none() && self.icon_uri.is_none()
    }

    /// name, then symbol, then the first eight characters of the address
    pub fn display_label(&self, address: &str) -> String {
        self.name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.symbol.as_deref().filter(|s| !s.trim().is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| address.chars().take(FALLBACK_LABEL_LEN).collect())
    }
}

/// Best-effort metadata lookup. Unknown assets resolve to empty metadata, not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<AssetMetadata, MetadataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_label_precedence() {
        let addr = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
        let mut meta = AssetMetadata::default();
        assert_eq!(meta.display_label(addr), "9xQeWvG8");

        meta.symbol = Some("SRM".to_string());
        assert_eq!(meta.display_label(addr), "SRM");

        meta.name = Some("Serum".to_string());
        assert_eq!(meta.display_label(addr), "Serum");

        meta.name = Some("".to_string());
        assert_eq!(meta.display_label(addr), "SRM");
    }
}

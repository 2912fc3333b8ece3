//! Display metadata over HTTP.
//!
//! Sources are tried in order, DAS `getAsset` first and the explorer token-meta endpoint
//! second. A source that errors is logged and skipped; unknown assets resolve empty.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::types::{AssetResponse, ExplorerTokenResponse};
use crate::ports::metadata::{AssetMetadata, MetadataError, MetadataProvider};

const HELIUS_MAINNET: &str = "https://mainnet.helius-rpc.com";

#[derive(Debug, Clone)]
pub struct TokenMetadataConfig {
    /// DAS-capable RPC endpoint, api key included in the URL
    pub helius_url: Option<String>,
    /// Queried as `{url}/token/meta?token=`
    pub explorer_url: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for TokenMetadataConfig {
    fn default() -> Self {
        Self {
            helius_url: None,
            explorer_url: Some("https://api.solscan.io".to_string()),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl TokenMetadataConfig {
    pub fn with_helius_key(api_key: &str) -> Self {
        Self {
            helius_url: Some(format!("{}/?api-key={}", HELIUS_MAINNET, api_key)),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Das,
    Explorer,
}

#[derive(Debug, Clone)]
pub struct TokenMetadataClient {
    config: TokenMetadataConfig,
    http: Client,
}

impl TokenMetadataClient {
    pub fn with_config(config: TokenMetadataConfig) -> Result<Self, MetadataError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MetadataError::HttpError(e.to_string()))?;

        Ok(Self { config, http })
    }

    fn sources(&self) -> Vec<Source> {
        let mut sources = Vec::with_capacity(2);
        if self.config.helius_url.is_some() {
            sources.push(Source::Das);
        }
        if self.config.explorer_url.is_some() {
            sources.push(Source::Explorer);
        }
        sources
    }

    async fn fetch(&self, source: Source, mint: &str) -> Result<Option<AssetMetadata>, MetadataError> {
        match source {
            Source::Das => self.fetch_asset(mint).await,
            Source::Explorer => self.fetch_explorer(mint).await,
        }
    }

    async fn fetch_asset(&self, mint: &str) -> Result<Option<AssetMetadata>, MetadataError> {
        let Some(url) = self.config.helius_url.as_deref() else {
            return Ok(None);
        };
        let body = json!({
            "jsonrpc": "2.0",
            "id": "pool-sniper-metadata",
            "method": "getAsset",
            "params": { "id": mint, "displayOptions": { "showFungible": true } }
        });

        let Some(response) = self.send::<AssetResponse>(self.http.post(url).json(&body)).await? else {
            return Ok(None);
        };
        if let Some(err) = response.error {
            tracing::debug!("getAsset for {} returned {}: {}", mint, err.code, err.message);
        }
        Ok(response.result.map(|r| r.into_metadata()).filter(|m| !m.is_empty()))
    }

    async fn fetch_explorer(&self, mint: &str) -> Result<Option<AssetMetadata>, MetadataError> {
        let Some(base) = self.config.explorer_url.as_deref() else {
            return Ok(None);
        };
        let url = format!("{}/token/meta", base.trim_end_matches('/'));

        let request = self.http.get(url).query(&[("token", mint)]);
        let Some(response) = self.send::<ExplorerTokenResponse>(request).await? else {
            return Ok(None);
        };
        if !response.success {
            return Ok(None);
        }
        Ok(response.data.map(|d| d.into_metadata()).filter(|m| !m.is_empty()))
    }

    /// Retries throttling, 5xx and transport errors. Other non-success answers read as "nothing known".
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>, MetadataError> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = MetadataError::HttpError("no attempt made".to_string());

        for attempt in 0..attempts {
            let pending = request
                .try_clone()
                .ok_or_else(|| MetadataError::HttpError("request body is not reusable".to_string()))?;

            last_error = match pending.send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => MetadataError::RateLimited,
                Ok(response) if response.status().is_server_error() => {
                    MetadataError::HttpError(format!("Server error: {}", response.status()))
                }
                Ok(response) => return Self::decode(response).await,
                Err(e) => MetadataError::HttpError(e.to_string()),
            };

            if attempt + 1 < attempts {
                let delay = self.backoff(attempt);
                tracing::debug!("Metadata lookup failed ({}), retrying in {:?}", last_error, delay);
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<Option<T>, MetadataError> {
        if !response.status().is_success() {
            return Ok(None);
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| MetadataError::ParseError(e.to_string()))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.retry_base_delay_ms.saturating_mul(1 << attempt.min(6)))
    }
}

#[async_trait]
impl MetadataProvider for TokenMetadataClient {
    async fn lookup(&self, address: &str) -> Result<AssetMetadata, MetadataError> {
        let mut last_error = None;
        let mut answered = false;

        for source in self.sources() {
            match self.fetch(source, address).await {
                Ok(Some(meta)) => return Ok(meta),
                Ok(None) => answered = true,
                Err(e) => {
                    tracing::warn!("{:?} metadata lookup failed for {}: {}", source, address, e);
                    last_error = Some(e);
                }
            }
        }

        // Only an outage of every source is an error
        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(AssetMetadata::default()),
        }
    }
}

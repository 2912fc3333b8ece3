//! Jupiter HTTP client: `/quote` and `/swap`.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{header::RETRY_AFTER, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::ports::execution::{ExecutionError, QuoteProvider};
use crate::ports::quotes::{QuoteRequest, QuoteResponse, SwapRequest, SwapResponse};

/// Error codes Jupiter returns when no path exists
const NO_ROUTE_MARKERS: &[&str] = &[
    "COULD_NOT_FIND_ANY_ROUTE",
    "NO_ROUTES_FOUND",
    "TOKEN_NOT_TRADABLE",
    "No routes found",
];

const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub api_base_url: String,
    /// Sent as `x-api-key` when present
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// Total attempts per call, including the first
    pub max_retries: u32,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.jup.ag/swap/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JupiterClient {
    config: JupiterConfig,
    http: Client,
}

/// What to do with one HTTP answer
enum Disposition {
    Done(Response),
    Throttled(Option<Duration>),
    Retry(ExecutionError),
}

impl JupiterClient {
    pub fn with_config(config: JupiterConfig) -> Result<Self, ExecutionError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExecutionError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    /// Send with retries on throttling, server errors and transport failures.
    /// Client errors are final and classified.
    async fn send<T: DeserializeOwned>(&self, op: &str, request: RequestBuilder) -> Result<T, ExecutionError> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = ExecutionError::ApiError(format!("{}: no attempt made", op));

        for attempt in 0..attempts {
            let pending = request
                .try_clone()
                .ok_or_else(|| ExecutionError::ApiError(format!("{}: request body is not reusable", op)))?;

            let disposition = match pending.send().await {
                Ok(response) => Self::disposition(response),
                Err(e) => Disposition::Retry(ExecutionError::ApiError(format!("{}: {}", op, e))),
            };

            let (error, delay) = match disposition {
                Disposition::Done(response) => return Self::decode(response).await,
                Disposition::Throttled(hint) => (ExecutionError::RateLimited, throttle_delay(attempt, hint)),
                Disposition::Retry(error) => (error, retry_delay(attempt)),
            };
            if attempt + 1 < attempts {
                tracing::warn!(
                    "Jupiter {} failed ({}), retrying in {:?} ({}/{})",
                    op,
                    error,
                    delay,
                    attempt + 1,
                    attempts
                );
                tokio::time::sleep(delay).await;
            }
            last_error = error;
        }

        Err(last_error)
    }

    fn disposition(response: Response) -> Disposition {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Disposition::Throttled(retry_after);
        }
        if status.is_server_error() {
            return Disposition::Retry(ExecutionError::ApiError(format!("Server error: {}", status)));
        }
        Disposition::Done(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ExecutionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, body));
        }
        response
            .json()
            .await
            .map_err(|e| ExecutionError::ApiError(format!("Failed to parse response: {}", e)))
    }
}

/// 429: the server hint when present, else doubling from 1s. Capped.
fn throttle_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    let delay = retry_after.unwrap_or_else(|| Duration::from_secs(1).saturating_mul(2u32.saturating_pow(attempt)));
    delay.min(MAX_BACKOFF)
}

/// Server and transport failures: linear from 500ms, with up to 25% jitter
fn retry_delay(attempt: u32) -> Duration {
    let base = BASE_BACKOFF.saturating_mul(attempt.saturating_add(1)).min(MAX_BACKOFF);
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
    base + Duration::from_millis(jitter_ms)
}

/// Map a non-success body to the error taxonomy
fn classify_error(status: StatusCode, body: String) -> ExecutionError {
    if NO_ROUTE_MARKERS.iter().any(|m| body.contains(m)) {
        return ExecutionError::NoRoute(body);
    }
    ExecutionError::ApiError(format!("API error {}: {}", status, body))
}

#[async_trait]
impl QuoteProvider for JupiterClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, ExecutionError> {
        let builder = self.http.get(self.endpoint("quote")).query(&request.query_pairs());
        self.send("quote", self.authorized(builder)).await
    }

    async fn swap_transaction(&self, request: &SwapRequest) -> Result<SwapResponse, ExecutionError> {
        let builder = self.http.post(self.endpoint("swap")).json(request);
        self.send("swap", self.authorized(builder)).await
    }
}

//! HTTP client for the event ingestion service.
//!
//! A batch is a write, so retries use at-most-once semantics: the client
//! mints one idempotency key per batch and re-sends under the same key, so
//! a retry after an ambiguous failure cannot double-count synthetic events.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use questlab_domain::{IngestReceipt, SimulatedEvent};

use crate::application::error::ServiceError;
use crate::infrastructure::retry::{calculate_delay, RetryConfig};
use crate::ports::outbound::IngestionPort;

/// Default ingestion service base URL.
pub const DEFAULT_INGEST_API_BASE_URL: &str = "http://localhost:8081";

const API_KEY_HEADER: &str = "x-api-key";
const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Client for the ingestion service's batch endpoint.
#[derive(Clone)]
pub struct IngestionHttpClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
}

impl IngestionHttpClient {
    pub fn new(base_url: &str, api_key: &str, retry: RetryConfig) -> Self {
        Self::with_timeout(base_url, api_key, retry, 30)
    }

    /// Create client with custom timeout (for testing).
    pub fn with_timeout(base_url: &str, api_key: &str, retry: RetryConfig, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry,
        }
    }

    /// Create client from `QUESTLAB_INGEST_API_URL` / `QUESTLAB_API_KEY`,
    /// falling back to defaults if not set.
    pub fn from_env() -> Self {
        let base_url = std::env::var("QUESTLAB_INGEST_API_URL")
            .unwrap_or_else(|_| DEFAULT_INGEST_API_BASE_URL.to_string());
        let api_key = std::env::var("QUESTLAB_API_KEY").unwrap_or_default();
        Self::new(&base_url, &api_key, RetryConfig::default())
    }

    async fn submit(
        &self,
        idempotency_key: &str,
        events: &[SimulatedEvent],
    ) -> Result<IngestReceipt, ServiceError> {
        let response = self
            .client
            .post(format!("{}/v1/events/batch", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
            .json(&json!({ "events": events }))
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .map_err(|e| ServiceError::Transport(e.to_string()))?;
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<IngestReceipt>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl IngestionPort for IngestionHttpClient {
    async fn ingest_batch(
        &self,
        events: Vec<SimulatedEvent>,
    ) -> Result<IngestReceipt, ServiceError> {
        let idempotency_key = Uuid::new_v4().to_string();
        let mut last_error = None;

        for attempt in 0..=self.retry.max_retries {
            match self.submit(&idempotency_key, &events).await {
                Ok(receipt) => {
                    if attempt > 0 {
                        tracing::info!(
                            attempt = attempt + 1,
                            idempotency_key = %idempotency_key,
                            "batch ingest succeeded after retry"
                        );
                    }
                    return Ok(receipt);
                }
                Err(e) => {
                    let retryable = e.is_retryable();

                    if attempt < self.retry.max_retries && retryable {
                        let delay = calculate_delay(&self.retry, attempt + 1);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_retries = self.retry.max_retries,
                            delay_ms = delay,
                            idempotency_key = %idempotency_key,
                            error = %e,
                            "batch ingest failed, retrying under the same key..."
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    } else if !retryable {
                        return Err(e);
                    }

                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ServiceError::Transport("unknown error".to_string())))
    }
}

//! Resilient quest API wrapper with exponential backoff retry
//!
//! Wraps any `QuestApiPort` implementation with retry logic for the
//! idempotent reads (quest listing, progress fetch). Writes (start quest,
//! complete step) pass through untouched: the decorator cannot know whether
//! the remote applied them, so retrying is left to the operator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use questlab_domain::{Quest, QuestId, QuestProgress, StepCompletion, UserId};

use crate::application::error::ServiceError;
use crate::ports::outbound::QuestApiPort;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt)
    pub max_retries: u32,
    /// Base delay in milliseconds before first retry
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) for randomizing delays to prevent thundering herd
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter_factor: 0.2,
        }
    }
}

/// Delay for a given attempt number using exponential backoff with jitter.
pub(crate) fn calculate_delay(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.base_delay_ms;
    let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let capped = exponential.min(config.max_delay_ms);

    let jitter_range = (capped as f64 * config.jitter_factor) as i64;
    if jitter_range > 0 {
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        (capped as i64 + jitter).max(0) as u64
    } else {
        capped
    }
}

/// Wrapper that adds retry logic to the quest service's idempotent reads.
pub struct ResilientQuestApi {
    inner: Arc<dyn QuestApiPort>,
    config: RetryConfig,
}

impl ResilientQuestApi {
    pub fn new(inner: Arc<dyn QuestApiPort>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn execute_with_retry<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, ServiceError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            attempt = attempt + 1,
                            operation = operation_name,
                            "quest API read succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let retryable = e.is_retryable();

                    if attempt < self.config.max_retries && retryable {
                        let delay = calculate_delay(&self.config, attempt + 1);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_retries = self.config.max_retries,
                            delay_ms = delay,
                            error = %e,
                            operation = operation_name,
                            "quest API read failed, retrying..."
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    } else if !retryable {
                        tracing::error!(
                            error = %e,
                            operation = operation_name,
                            "quest API read failed with non-retryable error"
                        );
                        return Err(e);
                    }

                    last_error = Some(e);
                }
            }
        }

        let error =
            last_error.unwrap_or_else(|| ServiceError::Transport("unknown error".to_string()));
        tracing::error!(
            attempts = self.config.max_retries + 1,
            error = %error,
            operation = operation_name,
            "quest API read failed after all retry attempts"
        );
        Err(error)
    }
}

#[async_trait]
impl QuestApiPort for ResilientQuestApi {
    async fn list_active_quests(&self) -> Result<Vec<Quest>, ServiceError> {
        let inner = Arc::clone(&self.inner);
        self.execute_with_retry("list_active_quests", || {
            let inner = Arc::clone(&inner);
            async move { inner.list_active_quests().await }
        })
        .await
    }

    async fn list_available_quests(&self, user_id: &UserId) -> Result<Vec<Quest>, ServiceError> {
        let inner = Arc::clone(&self.inner);
        self.execute_with_retry("list_available_quests", || {
            let inner = Arc::clone(&inner);
            let user_id = user_id.clone();
            async move { inner.list_available_quests(&user_id).await }
        })
        .await
    }

    async fn start_quest(
        &self,
        quest_id: &QuestId,
        user_id: &UserId,
    ) -> Result<QuestProgress, ServiceError> {
        // Write: single attempt.
        self.inner.start_quest(quest_id, user_id).await
    }

    async fn get_user_progress(
        &self,
        quest_id: &QuestId,
        user_id: &UserId,
    ) -> Result<QuestProgress, ServiceError> {
        let inner = Arc::clone(&self.inner);
        self.execute_with_retry("get_user_progress", || {
            let inner = Arc::clone(&inner);
            let quest_id = quest_id.clone();
            let user_id = user_id.clone();
            async move { inner.get_user_progress(&quest_id, &user_id).await }
        })
        .await
    }

    async fn complete_step(
        &self,
        quest_id: &QuestId,
        user_id: &UserId,
        step_index: usize,
    ) -> Result<StepCompletion, ServiceError> {
        // Write: single attempt.
        self.inner.complete_step(quest_id, user_id, step_index).await
    }
}

//! HTTP client for the quest service.
//!
//! Responses are parsed into typed domain structs right here at the
//! boundary; a payload that does not match the expected schema becomes
//! `ServiceError::InvalidResponse` instead of propagating into session
//! state.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;

use questlab_domain::{Quest, QuestId, QuestProgress, StepCompletion, UserId};

use crate::application::error::ServiceError;
use crate::ports::outbound::QuestApiPort;

/// Default quest service base URL.
pub const DEFAULT_QUEST_API_BASE_URL: &str = "http://localhost:8080";

/// Header carrying the hosting application's API key. The client only
/// forwards it; credential management is out of scope.
const API_KEY_HEADER: &str = "x-api-key";

/// Client for the quest service REST API.
#[derive(Clone)]
pub struct QuestApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl QuestApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self::with_timeout(base_url, api_key, 30)
    }

    /// Create client with custom timeout (for testing).
    pub fn with_timeout(base_url: &str, api_key: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Create client from `QUESTLAB_QUEST_API_URL` / `QUESTLAB_API_KEY`,
    /// falling back to defaults if not set.
    pub fn from_env() -> Self {
        let base_url = std::env::var("QUESTLAB_QUEST_API_URL")
            .unwrap_or_else(|_| DEFAULT_QUEST_API_BASE_URL.to_string());
        let api_key = std::env::var("QUESTLAB_API_KEY").unwrap_or_default();
        Self::new(&base_url, &api_key)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Self::parse(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
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
            .json::<T>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl QuestApiPort for QuestApiClient {
    async fn list_active_quests(&self) -> Result<Vec<Quest>, ServiceError> {
        self.get_json("/v1/quests?status=active").await
    }

    async fn list_available_quests(&self, user_id: &UserId) -> Result<Vec<Quest>, ServiceError> {
        self.get_json(&format!("/v1/users/{user_id}/quests/available"))
            .await
    }

    async fn start_quest(
        &self,
        quest_id: &QuestId,
        user_id: &UserId,
    ) -> Result<QuestProgress, ServiceError> {
        self.post_json(
            &format!("/v1/quests/{quest_id}/start"),
            &json!({ "user_id": user_id }),
        )
        .await
    }

    async fn get_user_progress(
        &self,
        quest_id: &QuestId,
        user_id: &UserId,
    ) -> Result<QuestProgress, ServiceError> {
        self.get_json(&format!("/v1/quests/{quest_id}/progress?user_id={user_id}"))
            .await
    }

    async fn complete_step(
        &self,
        quest_id: &QuestId,
        user_id: &UserId,
        step_index: usize,
    ) -> Result<StepCompletion, ServiceError> {
        self.post_json(
            &format!("/v1/quests/{quest_id}/steps/{step_index}/complete"),
            &json!({ "user_id": user_id }),
        )
        .await
    }
}

//! Environment-backed configuration for the demo runner.

use crate::infrastructure::http::ingestion::DEFAULT_INGEST_API_BASE_URL;
use crate::infrastructure::http::quest_api::DEFAULT_QUEST_API_BASE_URL;

/// Runner configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub quest_api_url: String,
    pub ingest_api_url: String,
    pub api_key: String,
    pub user_id: String,
    /// Optional quest to drive; the runner falls back to the first listed
    /// quest when unset.
    pub quest_id: Option<String>,
    pub request_timeout_secs: u64,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            quest_api_url: std::env::var("QUESTLAB_QUEST_API_URL")
                .unwrap_or_else(|_| DEFAULT_QUEST_API_BASE_URL.to_string()),
            ingest_api_url: std::env::var("QUESTLAB_INGEST_API_URL")
                .unwrap_or_else(|_| DEFAULT_INGEST_API_BASE_URL.to_string()),
            api_key: std::env::var("QUESTLAB_API_KEY").unwrap_or_default(),
            user_id: std::env::var("QUESTLAB_USER_ID").unwrap_or_else(|_| "demo-user".to_string()),
            quest_id: std::env::var("QUESTLAB_QUEST_ID").ok(),
            request_timeout_secs: std::env::var("QUESTLAB_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

//! QuestLab demo runner - composition root binary.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use questlab_client::application::activity_log::ActivityLog;
use questlab_client::application::services::{QuestService, SettleConfig};
use questlab_client::infrastructure::{
    IngestionHttpClient, QuestApiClient, ResilientQuestApi, RetryConfig, Settings, SystemClock,
};
use questlab_client::ports::outbound::{ClockPort, IngestionPort, QuestApiPort};
use questlab_client::runner::{self, RunnerDeps};
use questlab_domain::{QuestId, UserId};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "questlab_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting QuestLab client");

    let settings = Settings::from_env();
    tracing::debug!(
        quest_api = %settings.quest_api_url,
        ingest_api = %settings.ingest_api_url,
        user_id = %settings.user_id,
        "loaded settings"
    );

    // Each session owns its handles; the retry decorator only covers the
    // quest service's idempotent reads.
    let quest_api = Arc::new(QuestApiClient::with_timeout(
        &settings.quest_api_url,
        &settings.api_key,
        settings.request_timeout_secs,
    ));
    let api: Arc<dyn QuestApiPort> = Arc::new(ResilientQuestApi::new(
        quest_api,
        RetryConfig::default(),
    ));
    let ingestion: Arc<dyn IngestionPort> = Arc::new(IngestionHttpClient::with_timeout(
        &settings.ingest_api_url,
        &settings.api_key,
        RetryConfig::default(),
        settings.request_timeout_secs,
    ));
    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
    let log = Arc::new(ActivityLog::new(clock.clone()));
    let service = Arc::new(QuestService::new(
        api,
        ingestion,
        clock,
        log.clone(),
        SettleConfig::default(),
    ));

    runner::run(RunnerDeps {
        service,
        log,
        user_id: UserId::new(settings.user_id),
        quest_id: settings.quest_id.map(QuestId::new),
    })
    .await
}

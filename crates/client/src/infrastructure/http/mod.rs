pub mod ingestion;
pub mod quest_api;

pub use ingestion::IngestionHttpClient;
pub use quest_api::QuestApiClient;

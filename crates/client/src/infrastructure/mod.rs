//! Infrastructure adapters - concrete implementations of the outbound ports.

pub mod clock;
pub mod http;
pub mod retry;
pub mod settings;

pub use clock::SystemClock;
pub use http::{IngestionHttpClient, QuestApiClient};
pub use retry::{ResilientQuestApi, RetryConfig};
pub use settings::Settings;

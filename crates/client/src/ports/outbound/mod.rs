//! Outbound ports - Interfaces for external services
//!
//! These ports define the contracts that infrastructure adapters must
//! implement, allowing application services to interact with the remote
//! quest and ingestion services without depending on concrete clients.
//! Every session gets its own injected handles; nothing is module-scoped.

pub mod clock_port;
pub mod ingestion_port;
pub mod quest_api_port;

pub use clock_port::ClockPort;
pub use ingestion_port::IngestionPort;
pub use quest_api_port::QuestApiPort;

#[cfg(test)]
pub use ingestion_port::MockIngestionPort;
#[cfg(test)]
pub use quest_api_port::MockQuestApiPort;

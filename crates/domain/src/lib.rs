//! QuestLab domain types.
//!
//! Pure data definitions shared by the client layers: quest definitions as
//! served by the remote quest service, progress snapshots, and the synthetic
//! event envelope submitted to the ingestion service. No I/O lives here.

pub mod error;
pub mod events;
pub mod ids;
pub mod progress;
pub mod quest;

pub use error::DomainError;
pub use events::{EventSource, SimulatedEvent, SimulatedEventData};
pub use ids::{EventType, QuestId, UserId};
pub use progress::{IngestReceipt, QuestProgress, QuestStatus, StepCompletion, StepProgress};
pub use quest::{Quest, QuestStep, StepType};

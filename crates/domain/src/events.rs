//! Synthetic event envelope submitted to the ingestion service.
//!
//! Events fabricated by the simulator are tagged (`event_source`,
//! `simulated: true`) so downstream consumers can tell them apart from
//! genuine user activity. The envelope casing is owned by the ingestion
//! service: camelCase at the top level, snake_case inside `data`.

use serde::{Deserialize, Serialize};

use crate::ids::{EventType, QuestId, UserId};

/// Source tag carried on every simulated event.
pub const EVENT_SOURCE: &str = "quest_demo";

/// Wrapper so the source tag cannot drift between call sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventSource(String);

impl Default for EventSource {
    fn default() -> Self {
        Self(EVENT_SOURCE.to_string())
    }
}

impl EventSource {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Step-linkage payload carried in the event body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedEventData {
    pub quest_id: QuestId,
    pub step_index: usize,
    pub simulated: bool,
    /// 1-based position of this event within its batch.
    pub iteration: u32,
}

/// A fabricated domain event, created transiently and sent in batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedEvent {
    pub user_id: UserId,
    pub event_type: EventType,
    pub event_source: EventSource,
    pub data: SimulatedEventData,
}

impl SimulatedEvent {
    /// Build the batch of events that drives one step to its target count:
    /// `count` events with iterations 1..=count, all pointing at the same
    /// (quest, step) pair.
    pub fn batch_for_step(
        user_id: &UserId,
        event_type: &EventType,
        quest_id: &QuestId,
        step_index: usize,
        count: u32,
    ) -> Vec<SimulatedEvent> {
        (1..=count)
            .map(|iteration| SimulatedEvent {
                user_id: user_id.clone(),
                event_type: event_type.clone(),
                event_source: EventSource::default(),
                data: SimulatedEventData {
                    quest_id: quest_id.clone(),
                    step_index,
                    simulated: true,
                    iteration,
                },
            })
            .collect()
    }
}

//! Quest definitions as served by the remote quest service.

use serde::{Deserialize, Serialize};

use crate::ids::{EventType, QuestId};

/// How a step is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Marked complete through an explicit complete-step call.
    Manual,
    /// Satisfied by accumulating domain events of `event_type` up to
    /// `target_count`.
    EventDriven,
}

/// One unit of a quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestStep {
    pub name: String,
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_count: Option<u32>,
}

impl QuestStep {
    /// Counting steps without an explicit target count need one event.
    pub fn effective_target_count(&self) -> u32 {
        self.target_count.unwrap_or(1)
    }

    /// Whether this step can be driven by synthetic events at all.
    pub fn is_simulatable(&self) -> bool {
        self.event_type.is_some()
    }
}

/// A named sequence of steps a user progresses through.
///
/// Immutable once loaded for a session; the descriptive fields are rendered
/// as-is and never interpreted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub reward_points: u32,
    pub steps: Vec<QuestStep>,
}

impl Quest {
    pub fn step(&self, index: usize) -> Option<&QuestStep> {
        self.steps.get(index)
    }
}

//! Progress snapshots returned by the quest service.
//!
//! A `QuestProgress` is always replaced wholesale with the latest server
//! response. It is never merged field-by-field with a previous snapshot, so
//! a regression reported by the server (fewer steps complete than before) is
//! rendered as-is.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Server-declared quest lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// Per-step completion counters. Invariant `current_count <= target_count`
/// is enforced server-side; the client only renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    pub completed: bool,
    pub current_count: u32,
    pub target_count: u32,
}

/// Snapshot of a user's progress through a quest.
///
/// The wire format keys `step_progress` by the step index rendered as a
/// string; the map is kept in that shape and exposed through [`Self::step`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub status: QuestStatus,
    pub steps_completed: u32,
    pub total_steps: u32,
    pub completion_percentage: f64,
    #[serde(default)]
    pub step_progress: BTreeMap<String, StepProgress>,
}

impl QuestProgress {
    /// Look up progress for a step by its index in the quest definition.
    pub fn step(&self, index: usize) -> Option<&StepProgress> {
        self.step_progress.get(&index.to_string())
    }

    pub fn is_completed(&self) -> bool {
        self.status == QuestStatus::Completed
    }
}

/// Acknowledgement of a manual complete-step call. The service's exact shape
/// is loose; unknown fields are ignored and missing ones default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCompletion {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Acknowledgement of a batch-ingest call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReceipt {
    /// Number of events the service queued for asynchronous processing.
    /// Absent in some service versions, in which case callers fall back to
    /// the submitted batch size.
    #[serde(default)]
    pub queued: Option<u64>,
}

impl IngestReceipt {
    pub fn queued_or(&self, submitted: u64) -> u64 {
        self.queued.unwrap_or(submitted)
    }
}

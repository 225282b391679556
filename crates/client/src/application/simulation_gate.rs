//! Per-(quest, user) mutual exclusion for simulation runs.
//!
//! Simulation state is modeled explicitly as `Idle | Running | Failed`
//! rather than a UI-level loading flag, so a second invocation for the same
//! pair is rejected before any remote call is issued. Transitions:
//! `Idle -> Running` via [`SimulationGate::try_begin`], `Running -> Idle`
//! via [`SimulationGate::complete`], `Running -> Failed` via
//! [`SimulationGate::fail`]. A `Failed` key accepts a new run.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use questlab_domain::{QuestId, UserId};

use crate::application::error::QuestFlowError;

/// State of the simulation workflow for one (quest, user) key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Failed(String),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

type RunKey = (QuestId, UserId);

#[derive(Default)]
pub struct SimulationGate {
    states: Mutex<HashMap<RunKey, RunState>>,
}

impl SimulationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the key for a new run. Rejects with `Busy` while a run for the
    /// same pair is in flight.
    pub fn try_begin(&self, quest_id: &QuestId, user_id: &UserId) -> Result<(), QuestFlowError> {
        let mut states = self.lock();
        let key = (quest_id.clone(), user_id.clone());
        match states.get(&key) {
            Some(RunState::Running) => Err(QuestFlowError::Busy {
                quest_id: quest_id.clone(),
                user_id: user_id.clone(),
            }),
            _ => {
                states.insert(key, RunState::Running);
                Ok(())
            }
        }
    }

    pub fn complete(&self, quest_id: &QuestId, user_id: &UserId) {
        self.lock()
            .insert((quest_id.clone(), user_id.clone()), RunState::Idle);
    }

    pub fn fail(&self, quest_id: &QuestId, user_id: &UserId, reason: impl Into<String>) {
        self.lock().insert(
            (quest_id.clone(), user_id.clone()),
            RunState::Failed(reason.into()),
        );
    }

    /// Current state for the pair; keys never claimed are `Idle`.
    pub fn state_of(&self, quest_id: &QuestId, user_id: &UserId) -> RunState {
        self.lock()
            .get(&(quest_id.clone(), user_id.clone()))
            .cloned()
            .unwrap_or(RunState::Idle)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RunKey, RunState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> (QuestId, UserId) {
        (QuestId::new("q1"), UserId::new("u1"))
    }

    #[test]
    fn second_begin_is_rejected_while_running() {
        let gate = SimulationGate::new();
        let (quest, user) = key();

        gate.try_begin(&quest, &user).unwrap();
        let err = gate.try_begin(&quest, &user).unwrap_err();
        assert!(matches!(err, QuestFlowError::Busy { .. }));
    }

    #[test]
    fn distinct_pairs_do_not_exclude_each_other() {
        let gate = SimulationGate::new();
        let (quest, user) = key();

        gate.try_begin(&quest, &user).unwrap();
        gate.try_begin(&quest, &UserId::new("u2")).unwrap();
        gate.try_begin(&QuestId::new("q2"), &user).unwrap();
    }

    #[test]
    fn complete_returns_key_to_idle() {
        let gate = SimulationGate::new();
        let (quest, user) = key();

        gate.try_begin(&quest, &user).unwrap();
        gate.complete(&quest, &user);
        assert_eq!(gate.state_of(&quest, &user), RunState::Idle);
        gate.try_begin(&quest, &user).unwrap();
    }

    #[test]
    fn failed_state_records_reason_and_allows_retry() {
        let gate = SimulationGate::new();
        let (quest, user) = key();

        gate.try_begin(&quest, &user).unwrap();
        gate.fail(&quest, &user, "ingestion unavailable");
        assert_eq!(
            gate.state_of(&quest, &user),
            RunState::Failed("ingestion unavailable".into())
        );

        gate.try_begin(&quest, &user).unwrap();
        assert_eq!(gate.state_of(&quest, &user), RunState::Running);
    }
}

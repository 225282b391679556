//! Quest service boundary.
//!
//! The remote quest service owns authentication, storage and scoring; this
//! port only mirrors the operations the controller consumes. Adapters parse
//! responses into typed domain structs at this boundary, so malformed
//! payloads surface as `ServiceError::InvalidResponse` instead of leaking
//! untyped data into session state.

use async_trait::async_trait;

use questlab_domain::{Quest, QuestId, QuestProgress, StepCompletion, UserId};

use crate::application::error::ServiceError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestApiPort: Send + Sync {
    /// All quests currently marked active, regardless of user.
    async fn list_active_quests(&self) -> Result<Vec<Quest>, ServiceError>;

    /// Quests available to a specific user.
    async fn list_available_quests(&self, user_id: &UserId) -> Result<Vec<Quest>, ServiceError>;

    /// Begin a quest for a user. Re-starting an already-started quest is
    /// expected to return current progress rather than error; that is the
    /// remote contract's call, not enforced here.
    async fn start_quest(
        &self,
        quest_id: &QuestId,
        user_id: &UserId,
    ) -> Result<QuestProgress, ServiceError>;

    /// Current progress snapshot for a (quest, user) pair.
    async fn get_user_progress(
        &self,
        quest_id: &QuestId,
        user_id: &UserId,
    ) -> Result<QuestProgress, ServiceError>;

    /// Mark a manual step complete.
    async fn complete_step(
        &self,
        quest_id: &QuestId,
        user_id: &UserId,
        step_index: usize,
    ) -> Result<StepCompletion, ServiceError>;
}

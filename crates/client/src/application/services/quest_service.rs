//! Quest Service - Application service for driving quest completion
//!
//! Orchestrates the quest workflow: list quests, select one, start it, then
//! complete steps either manually or by submitting batches of synthetic
//! events to the ingestion service and polling the quest service until the
//! new progress is visible. The controller is a passive renderer of
//! server-declared state: it never asserts a transition itself, it only
//! triggers re-fetches and replaces its held snapshot wholesale.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use questlab_domain::{
    DomainError, Quest, QuestId, QuestProgress, SimulatedEvent, UserId,
};

use crate::application::activity_log::{ActivityLog, LogLevel};
use crate::application::error::QuestFlowError;
use crate::application::simulation_gate::{RunState, SimulationGate};
use crate::ports::outbound::{ClockPort, IngestionPort, QuestApiPort};

/// Which quest list to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestScope {
    /// Every quest the service currently marks active.
    AllActive,
    /// Quests available to one user.
    ForUser(UserId),
}

/// Timing knobs for the post-ingest settle loop.
///
/// Ingestion is asynchronous relative to progress computation and the
/// controller has no completion signal, so after a write it waits an initial
/// delay and then polls progress on a bounded schedule with increasing
/// backoff until the snapshot changes or the budget runs out.
#[derive(Debug, Clone)]
pub struct SettleConfig {
    /// Initial wait after a single-step ingest.
    pub single_step_delay: Duration,
    /// Initial wait after a full-quest simulation.
    pub full_quest_delay: Duration,
    /// Progress polls before giving up and reporting "still pending".
    pub max_polls: u32,
    /// Delay before the second poll; doubles per attempt.
    pub poll_base_delay: Duration,
    /// Cap on the poll backoff.
    pub poll_max_delay: Duration,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            single_step_delay: Duration::from_millis(2000),
            full_quest_delay: Duration::from_millis(3000),
            max_polls: 5,
            poll_base_delay: Duration::from_millis(1000),
            poll_max_delay: Duration::from_millis(8000),
        }
    }
}

/// How a settle loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Progress changed relative to the pre-ingest snapshot.
    Updated,
    /// The poll budget ran out with no visible change. The last fetched
    /// snapshot is still adopted; the condition is reported, not retried
    /// forever.
    StillPending,
}

#[derive(Default)]
struct Session {
    available: Vec<Quest>,
    selected: Option<Quest>,
    progress: Option<QuestProgress>,
}

/// The quest progress controller.
///
/// Holds the session-scoped state (available quests, selected quest, last
/// progress snapshot) for one logical operator. All collaborators are
/// injected, so tests run against fakes and each session owns its handles.
pub struct QuestService {
    api: Arc<dyn QuestApiPort>,
    ingestion: Arc<dyn IngestionPort>,
    clock: Arc<dyn ClockPort>,
    log: Arc<ActivityLog>,
    settle: SettleConfig,
    gate: SimulationGate,
    session: Mutex<Session>,
}

impl QuestService {
    pub fn new(
        api: Arc<dyn QuestApiPort>,
        ingestion: Arc<dyn IngestionPort>,
        clock: Arc<dyn ClockPort>,
        log: Arc<ActivityLog>,
        settle: SettleConfig,
    ) -> Self {
        Self {
            api,
            ingestion,
            clock,
            log,
            settle,
            gate: SimulationGate::new(),
            session: Mutex::new(Session::default()),
        }
    }

    pub fn available_quests(&self) -> Vec<Quest> {
        self.lock_session().available.clone()
    }

    pub fn selected_quest(&self) -> Option<Quest> {
        self.lock_session().selected.clone()
    }

    /// Last adopted progress snapshot, if any has been fetched for the
    /// currently selected quest.
    pub fn progress(&self) -> Option<QuestProgress> {
        self.lock_session().progress.clone()
    }

    /// Simulation state for a (quest, user) pair.
    pub fn simulation_state(&self, quest_id: &QuestId, user_id: &UserId) -> RunState {
        self.gate.state_of(quest_id, user_id)
    }

    /// Fetch a quest list and replace the held one (no merge).
    pub async fn list_quests(&self, scope: QuestScope) -> Result<Vec<Quest>, QuestFlowError> {
        let result = match &scope {
            QuestScope::AllActive => {
                self.log
                    .record(LogLevel::Request, "quests.list(status=active)");
                self.api.list_active_quests().await
            }
            QuestScope::ForUser(user_id) => {
                self.require_user(user_id)?;
                self.log
                    .record(LogLevel::Request, format!("quests.listAvailable('{user_id}')"));
                self.api.list_available_quests(user_id).await
            }
        };

        match result {
            Ok(quests) => {
                self.log.record_with_payload(
                    LogLevel::Success,
                    format!("Found {} quests", quests.len()),
                    serde_json::to_value(&quests).ok(),
                );
                if let Ok(value) = serde_json::to_value(&quests) {
                    self.log.set_result(value);
                }
                self.lock_session().available = quests.clone();
                Ok(quests)
            }
            Err(e) => {
                self.log.record(LogLevel::Error, format!("Failed: {e}"));
                Err(e.into())
            }
        }
    }

    /// Make a quest the session's subject. Any previously fetched progress
    /// is dropped so it can never be shown against the wrong quest.
    pub fn select_quest(&self, quest: Quest) {
        tracing::debug!(quest_id = %quest.id, "quest selected, dropping held progress");
        let mut session = self.lock_session();
        session.progress = None;
        session.selected = Some(quest);
    }

    /// Start the selected quest for a user and adopt the returned progress.
    /// Whether re-starting an already-started quest errors is the remote
    /// contract's decision; the response is stored either way.
    pub async fn start_quest(&self, user_id: &UserId) -> Result<QuestProgress, QuestFlowError> {
        self.require_user(user_id)?;
        let quest = self.require_selected_quest()?;

        self.log.record(
            LogLevel::Request,
            format!("quests.start('{}', '{user_id}')", quest.id),
        );
        match self.api.start_quest(&quest.id, user_id).await {
            Ok(progress) => {
                self.log.record_with_payload(
                    LogLevel::Success,
                    "Quest started",
                    serde_json::to_value(&progress).ok(),
                );
                if let Ok(value) = serde_json::to_value(&progress) {
                    self.log.set_result(value);
                }
                self.store_progress(&quest.id, progress.clone());
                Ok(progress)
            }
            Err(e) => {
                self.log.record(LogLevel::Error, format!("Failed: {e}"));
                Err(e.into())
            }
        }
    }

    /// Fetch current progress and replace the held snapshot atomically.
    /// A regression reported by the server is adopted as-is.
    pub async fn refresh_progress(&self, user_id: &UserId) -> Result<QuestProgress, QuestFlowError> {
        self.require_user(user_id)?;
        let quest = self.require_selected_quest()?;

        self.log.record(
            LogLevel::Request,
            format!("quests.getUserProgress('{}', '{user_id}')", quest.id),
        );
        match self.api.get_user_progress(&quest.id, user_id).await {
            Ok(progress) => {
                self.log.record_with_payload(
                    LogLevel::Success,
                    "Progress fetched",
                    serde_json::to_value(&progress).ok(),
                );
                if let Ok(value) = serde_json::to_value(&progress) {
                    self.log.set_result(value);
                }
                self.store_progress(&quest.id, progress.clone());
                Ok(progress)
            }
            Err(e) => {
                self.log.record(LogLevel::Error, format!("Failed: {e}"));
                Err(e.into())
            }
        }
    }

    /// Complete a manual step, then refresh. If completion succeeds and the
    /// refresh fails, the success entry stands and the refresh failure gets
    /// its own error entry; nothing is rolled back.
    pub async fn complete_step_manually(
        &self,
        user_id: &UserId,
        step_index: usize,
    ) -> Result<(), QuestFlowError> {
        self.require_user(user_id)?;
        let quest = self.require_selected_quest()?;

        self.log.record(
            LogLevel::Request,
            format!("quests.completeStep('{}', '{user_id}', {step_index})", quest.id),
        );
        match self.api.complete_step(&quest.id, user_id, step_index).await {
            Ok(ack) => {
                self.log.record_with_payload(
                    LogLevel::Success,
                    format!("Step {step_index} completed"),
                    serde_json::to_value(&ack).ok(),
                );
                if let Ok(value) = serde_json::to_value(&ack) {
                    self.log.set_result(value);
                }
            }
            Err(e) => {
                self.log.record(LogLevel::Error, format!("Failed: {e}"));
                return Err(e.into());
            }
        }

        // The completion stands regardless; a refresh failure is reported
        // separately by refresh_progress itself.
        let _ = self.refresh_progress(user_id).await;
        Ok(())
    }

    /// Drive one event-driven step by submitting its full target count of
    /// synthetic events as a single batch, then settle.
    pub async fn simulate_step(
        &self,
        user_id: &UserId,
        step_index: usize,
    ) -> Result<SettleOutcome, QuestFlowError> {
        self.require_user(user_id)?;
        let quest = self.require_selected_quest()?;

        let Some(step) = quest.step(step_index).cloned() else {
            let err: QuestFlowError =
                DomainError::step_out_of_range(quest.id.as_str(), step_index).into();
            self.log.record(LogLevel::Error, format!("Failed: {err}"));
            return Err(err);
        };
        let Some(event_type) = step.event_type.clone() else {
            let err = QuestFlowError::InvalidStep {
                quest_id: quest.id.clone(),
                step_index,
            };
            self.log.record(LogLevel::Error, format!("Failed: {err}"));
            return Err(err);
        };
        if let Err(err) = self.gate.try_begin(&quest.id, user_id) {
            self.log.record(LogLevel::Error, format!("Failed: {err}"));
            return Err(err);
        }

        let target = step.effective_target_count();
        let baseline = self.progress();
        self.log.record(
            LogLevel::Request,
            format!("Simulating {target} \"{event_type}\" events for user {user_id}"),
        );

        let events =
            SimulatedEvent::batch_for_step(user_id, &event_type, &quest.id, step_index, target);
        match self.ingestion.ingest_batch(events).await {
            Ok(receipt) => {
                self.log.record_with_payload(
                    LogLevel::Success,
                    format!("Ingested {} events", receipt.queued_or(u64::from(target))),
                    serde_json::to_value(&receipt).ok(),
                );
                if let Ok(value) = serde_json::to_value(&receipt) {
                    self.log.set_result(value);
                }
            }
            Err(e) => {
                self.log.record(LogLevel::Error, format!("Failed: {e}"));
                self.gate.fail(&quest.id, user_id, e.to_string());
                return Err(e.into());
            }
        }

        match self
            .await_settled(&quest, user_id, self.settle.single_step_delay, baseline)
            .await
        {
            Ok(outcome) => {
                self.gate.complete(&quest.id, user_id);
                Ok(outcome)
            }
            Err(e) => {
                self.gate.fail(&quest.id, user_id, e.to_string());
                Err(e)
            }
        }
    }

    /// Simulate every event-driven step of the selected quest in quest
    /// order, one ingestion batch per step (batches are never merged, so
    /// the `step_index` ordering in the submitted payloads is preserved for
    /// any downstream step-dependency logic). Steps without an event type
    /// are skipped with an informational entry. A single settle pass runs
    /// after all batches are submitted.
    pub async fn simulate_all_steps(
        &self,
        user_id: &UserId,
    ) -> Result<SettleOutcome, QuestFlowError> {
        self.require_user(user_id)?;
        let quest = self.require_selected_quest()?;

        if let Err(err) = self.gate.try_begin(&quest.id, user_id) {
            self.log.record(LogLevel::Error, format!("Failed: {err}"));
            return Err(err);
        }

        self.log.record(
            LogLevel::Info,
            format!("Simulating all steps for quest \"{}\"", quest.name),
        );
        let baseline = self.progress();

        for (index, step) in quest.steps.iter().enumerate() {
            match &step.event_type {
                Some(event_type) => {
                    let target = step.effective_target_count();
                    self.log.record(
                        LogLevel::Request,
                        format!(
                            "Step {}: simulating {target} \"{event_type}\" events",
                            index + 1
                        ),
                    );
                    let events = SimulatedEvent::batch_for_step(
                        user_id, event_type, &quest.id, index, target,
                    );
                    match self.ingestion.ingest_batch(events).await {
                        Ok(receipt) => {
                            self.log.record(
                                LogLevel::Success,
                                format!(
                                    "Step {}: ingested {} events",
                                    index + 1,
                                    receipt.queued_or(u64::from(target))
                                ),
                            );
                        }
                        Err(e) => {
                            self.log.record(LogLevel::Error, format!("Failed: {e}"));
                            self.gate.fail(&quest.id, user_id, e.to_string());
                            return Err(e.into());
                        }
                    }
                }
                None => {
                    self.log.record(
                        LogLevel::Info,
                        format!(
                            "Step {}: \"{}\" requires manual completion (no event type)",
                            index + 1,
                            step.name
                        ),
                    );
                }
            }
        }

        match self
            .await_settled(&quest, user_id, self.settle.full_quest_delay, baseline)
            .await
        {
            Ok(outcome) => {
                self.log
                    .record(LogLevel::Success, "All quest steps simulated");
                self.gate.complete(&quest.id, user_id);
                Ok(outcome)
            }
            Err(e) => {
                self.gate.fail(&quest.id, user_id, e.to_string());
                Err(e)
            }
        }
    }

    /// Wait for asynchronous event processing to become visible: initial
    /// delay, then bounded polling with doubling backoff until the fetched
    /// progress differs from the pre-ingest baseline. Every fetched snapshot
    /// is adopted wholesale, including the final one of a pending run.
    async fn await_settled(
        &self,
        quest: &Quest,
        user_id: &UserId,
        initial_delay: Duration,
        baseline: Option<QuestProgress>,
    ) -> Result<SettleOutcome, QuestFlowError> {
        self.log
            .record(LogLevel::Info, "Waiting for event processing...");
        self.clock.sleep(initial_delay).await;

        let mut delay = self.settle.poll_base_delay;
        for attempt in 1..=self.settle.max_polls {
            match self.api.get_user_progress(&quest.id, user_id).await {
                Ok(progress) => {
                    let changed = baseline.as_ref() != Some(&progress);
                    self.store_progress(&quest.id, progress.clone());
                    if changed {
                        self.log.record_with_payload(
                            LogLevel::Success,
                            "Progress fetched",
                            serde_json::to_value(&progress).ok(),
                        );
                        if let Ok(value) = serde_json::to_value(&progress) {
                            self.log.set_result(value);
                        }
                        return Ok(SettleOutcome::Updated);
                    }
                    tracing::debug!(
                        attempt,
                        max_polls = self.settle.max_polls,
                        quest_id = %quest.id,
                        "progress unchanged after ingest, polling again"
                    );
                    if attempt < self.settle.max_polls {
                        self.clock.sleep(delay).await;
                        delay = (delay * 2).min(self.settle.poll_max_delay);
                    }
                }
                Err(e) => {
                    self.log.record(LogLevel::Error, format!("Failed: {e}"));
                    return Err(e.into());
                }
            }
        }

        self.log.record(
            LogLevel::Info,
            format!(
                "Processing still pending after {} polls - progress may be stale",
                self.settle.max_polls
            ),
        );
        Ok(SettleOutcome::StillPending)
    }

    /// Adopt a snapshot, unless the session has moved to a different quest
    /// while the fetch was in flight.
    fn store_progress(&self, quest_id: &QuestId, progress: QuestProgress) {
        let mut session = self.lock_session();
        if session.selected.as_ref().map(|q| &q.id) == Some(quest_id) {
            session.progress = Some(progress);
        }
    }

    fn require_selected_quest(&self) -> Result<Quest, QuestFlowError> {
        match self.lock_session().selected.clone() {
            Some(quest) => Ok(quest),
            None => {
                let err = QuestFlowError::Precondition("a selected quest");
                self.log.record(LogLevel::Error, format!("Failed: {err}"));
                Err(err)
            }
        }
    }

    fn require_user(&self, user_id: &UserId) -> Result<(), QuestFlowError> {
        if user_id.as_str().is_empty() {
            let err = QuestFlowError::Precondition("a user id");
            self.log.record(LogLevel::Error, format!("Failed: {err}"));
            return Err(err);
        }
        Ok(())
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::sync::Notify;

    use questlab_domain::{
        EventType, IngestReceipt, QuestStatus, QuestStep, StepCompletion, StepType,
    };

    use crate::application::error::ServiceError;
    use crate::ports::outbound::{MockIngestionPort, MockQuestApiPort};

    // ---- fakes ----------------------------------------------------------

    /// Instant clock that records requested sleeps.
    struct FakeClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                sleeps: Mutex::new(Vec::new()),
            }
        }

        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClockPort for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    /// Scripted quest API: each method pops its next response.
    #[derive(Default)]
    struct FakeQuestApi {
        active: Mutex<VecDeque<Result<Vec<Quest>, ServiceError>>>,
        start: Mutex<VecDeque<Result<QuestProgress, ServiceError>>>,
        progress: Mutex<VecDeque<Result<QuestProgress, ServiceError>>>,
        complete: Mutex<VecDeque<Result<StepCompletion, ServiceError>>>,
        progress_calls: AtomicU32,
    }

    impl FakeQuestApi {
        fn push_progress(&self, response: Result<QuestProgress, ServiceError>) {
            self.progress.lock().unwrap().push_back(response);
        }

        fn progress_calls(&self) -> u32 {
            self.progress_calls.load(Ordering::SeqCst)
        }
    }

    fn unscripted() -> ServiceError {
        ServiceError::Transport("no scripted response".into())
    }

    #[async_trait]
    impl QuestApiPort for FakeQuestApi {
        async fn list_active_quests(&self) -> Result<Vec<Quest>, ServiceError> {
            self.active.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted()))
        }

        async fn list_available_quests(&self, _user_id: &UserId) -> Result<Vec<Quest>, ServiceError> {
            self.active.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted()))
        }

        async fn start_quest(
            &self,
            _quest_id: &QuestId,
            _user_id: &UserId,
        ) -> Result<QuestProgress, ServiceError> {
            self.start.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted()))
        }

        async fn get_user_progress(
            &self,
            _quest_id: &QuestId,
            _user_id: &UserId,
        ) -> Result<QuestProgress, ServiceError> {
            self.progress_calls.fetch_add(1, Ordering::SeqCst);
            self.progress.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted()))
        }

        async fn complete_step(
            &self,
            _quest_id: &QuestId,
            _user_id: &UserId,
            _step_index: usize,
        ) -> Result<StepCompletion, ServiceError> {
            self.complete.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted()))
        }
    }

    /// Records submitted batches; optionally blocks until released.
    struct FakeIngestion {
        batches: Mutex<Vec<Vec<SimulatedEvent>>>,
        release: Option<Arc<Notify>>,
        response: Result<IngestReceipt, ServiceError>,
    }

    impl FakeIngestion {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                release: None,
                response: Ok(IngestReceipt { queued: None }),
            }
        }

        fn blocking_on(release: Arc<Notify>) -> Self {
            Self {
                release: Some(release),
                ..Self::new()
            }
        }

        fn batches(&self) -> Vec<Vec<SimulatedEvent>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IngestionPort for FakeIngestion {
        async fn ingest_batch(
            &self,
            events: Vec<SimulatedEvent>,
        ) -> Result<IngestReceipt, ServiceError> {
            self.batches.lock().unwrap().push(events);
            if let Some(release) = &self.release {
                release.notified().await;
            }
            self.response.clone()
        }
    }

    // ---- fixtures -------------------------------------------------------

    fn event_step(name: &str, event_type: &str, target: u32) -> QuestStep {
        QuestStep {
            name: name.into(),
            step_type: StepType::EventDriven,
            event_type: Some(EventType::new(event_type)),
            target_count: Some(target),
        }
    }

    fn manual_step(name: &str) -> QuestStep {
        QuestStep {
            name: name.into(),
            step_type: StepType::Manual,
            event_type: None,
            target_count: None,
        }
    }

    fn quest(id: &str, steps: Vec<QuestStep>) -> Quest {
        Quest {
            id: QuestId::new(id),
            name: format!("Quest {id}"),
            description: String::new(),
            status: "active".into(),
            difficulty: "easy".into(),
            reward_points: 10,
            steps,
        }
    }

    fn snapshot(steps_completed: u32) -> QuestProgress {
        QuestProgress {
            status: if steps_completed > 0 {
                QuestStatus::InProgress
            } else {
                QuestStatus::NotStarted
            },
            steps_completed,
            total_steps: 2,
            completion_percentage: f64::from(steps_completed) * 50.0,
            step_progress: Default::default(),
        }
    }

    fn fast_settle() -> SettleConfig {
        SettleConfig {
            single_step_delay: Duration::from_millis(20),
            full_quest_delay: Duration::from_millis(30),
            max_polls: 5,
            poll_base_delay: Duration::from_millis(10),
            poll_max_delay: Duration::from_millis(40),
        }
    }

    struct Harness {
        service: Arc<QuestService>,
        api: Arc<FakeQuestApi>,
        ingestion: Arc<FakeIngestion>,
        clock: Arc<FakeClock>,
        log: Arc<ActivityLog>,
    }

    fn harness() -> Harness {
        harness_with_ingestion(Arc::new(FakeIngestion::new()))
    }

    fn harness_with_ingestion(ingestion: Arc<FakeIngestion>) -> Harness {
        let api = Arc::new(FakeQuestApi::default());
        let clock = Arc::new(FakeClock::new());
        let log = Arc::new(ActivityLog::new(clock.clone() as Arc<dyn ClockPort>));
        let service = Arc::new(QuestService::new(
            api.clone() as Arc<dyn QuestApiPort>,
            ingestion.clone() as Arc<dyn IngestionPort>,
            clock.clone() as Arc<dyn ClockPort>,
            log.clone(),
            fast_settle(),
        ));
        Harness {
            service,
            api,
            ingestion,
            clock,
            log,
        }
    }

    fn user() -> UserId {
        UserId::new("u1")
    }

    fn messages_at(log: &ActivityLog, level: LogLevel) -> Vec<String> {
        log.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    // ---- tests ----------------------------------------------------------

    #[tokio::test]
    async fn select_quest_clears_previously_fetched_progress() {
        let h = harness();
        h.service
            .select_quest(quest("q1", vec![manual_step("only")]));
        h.api.push_progress(Ok(snapshot(1)));
        h.service.refresh_progress(&user()).await.unwrap();
        assert!(h.service.progress().is_some());

        h.service
            .select_quest(quest("q2", vec![manual_step("other")]));
        assert_eq!(h.service.progress(), None);
    }

    #[tokio::test]
    async fn start_quest_adopts_returned_progress() {
        let h = harness();
        h.service
            .select_quest(quest("q1", vec![manual_step("only")]));
        h.api.start.lock().unwrap().push_back(Ok(snapshot(0)));

        let progress = h.service.start_quest(&user()).await.unwrap();
        assert_eq!(progress.status, QuestStatus::NotStarted);
        assert_eq!(h.service.progress(), Some(progress));
        assert!(h.log.last_result().is_some());
    }

    #[tokio::test]
    async fn simulate_step_submits_target_count_events_in_one_batch() {
        let h = harness();
        h.service.select_quest(quest(
            "q1",
            vec![event_step("views", "page_view", 3), manual_step("call us")],
        ));
        h.api.push_progress(Ok(snapshot(1)));

        let outcome = h.service.simulate_step(&user(), 0).await.unwrap();
        assert_eq!(outcome, SettleOutcome::Updated);

        let batches = h.ingestion.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        let iterations: Vec<u32> = batches[0].iter().map(|e| e.data.iteration).collect();
        assert_eq!(iterations, vec![1, 2, 3]);
        assert!(batches[0]
            .iter()
            .all(|e| e.event_type == EventType::new("page_view") && e.data.step_index == 0));
    }

    #[tokio::test]
    async fn simulate_step_without_event_type_is_invalid_and_sends_nothing() {
        let h = harness();
        h.service.select_quest(quest(
            "q1",
            vec![event_step("views", "page_view", 3), manual_step("call us")],
        ));

        let err = h.service.simulate_step(&user(), 1).await.unwrap_err();
        assert!(matches!(err, QuestFlowError::InvalidStep { step_index: 1, .. }));
        assert!(h.ingestion.batches().is_empty());
        assert_eq!(h.api.progress_calls(), 0);
        assert_eq!(messages_at(&h.log, LogLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn simulate_step_out_of_range_is_a_domain_error() {
        let h = harness();
        h.service
            .select_quest(quest("q1", vec![manual_step("only")]));

        let err = h.service.simulate_step(&user(), 7).await.unwrap_err();
        assert!(matches!(err, QuestFlowError::Domain(_)));
        assert!(h.ingestion.batches().is_empty());
    }

    #[tokio::test]
    async fn simulate_all_steps_batches_event_driven_steps_in_order() {
        let h = harness();
        h.service.select_quest(quest(
            "q1",
            vec![
                event_step("views", "page_view", 2),
                manual_step("talk to support"),
                event_step("buys", "purchase", 1),
            ],
        ));
        h.api.push_progress(Ok(snapshot(2)));

        h.service.simulate_all_steps(&user()).await.unwrap();

        let batches = h.ingestion.batches();
        assert_eq!(batches.len(), 2);
        assert!(batches[0].iter().all(|e| e.data.step_index == 0));
        assert!(batches[1].iter().all(|e| e.data.step_index == 2));

        let infos = messages_at(&h.log, LogLevel::Info);
        assert!(infos
            .iter()
            .any(|m| m.contains("requires manual completion")));
    }

    /// Two-step scenario from the workflow contract: step 0 is
    /// `page_view` x3, step 1 manual. One batch of three events, one
    /// informational entry for the manual step, one progress fetch once the
    /// first poll shows movement.
    #[tokio::test]
    async fn mixed_quest_scenario_produces_one_batch_and_one_fetch() {
        let h = harness();
        h.service.select_quest(quest(
            "q-mixed",
            vec![event_step("views", "page_view", 3), manual_step("sign up")],
        ));
        h.api.push_progress(Ok(snapshot(1)));

        h.service.simulate_all_steps(&user()).await.unwrap();

        let batches = h.ingestion.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        let iterations: Vec<u32> = batches[0].iter().map(|e| e.data.iteration).collect();
        assert_eq!(iterations, vec![1, 2, 3]);

        let infos = messages_at(&h.log, LogLevel::Info);
        assert_eq!(
            infos
                .iter()
                .filter(|m| m.contains("requires manual completion"))
                .count(),
            1
        );
        assert_eq!(h.api.progress_calls(), 1);
    }

    #[tokio::test]
    async fn refresh_adopts_server_regression_wholesale() {
        let h = harness();
        h.service
            .select_quest(quest("q1", vec![manual_step("only")]));

        h.api.push_progress(Ok(snapshot(2)));
        h.service.refresh_progress(&user()).await.unwrap();
        assert_eq!(h.service.progress().unwrap().steps_completed, 2);

        h.api.push_progress(Ok(snapshot(0)));
        h.service.refresh_progress(&user()).await.unwrap();
        assert_eq!(h.service.progress().unwrap().steps_completed, 0);
    }

    #[tokio::test]
    async fn completion_success_and_refresh_failure_are_logged_separately() {
        let h = harness();
        h.service
            .select_quest(quest("q1", vec![manual_step("only")]));
        h.api.complete.lock().unwrap().push_back(Ok(StepCompletion {
            success: true,
            message: None,
        }));
        h.api.push_progress(Err(ServiceError::Status {
            status: 502,
            message: "bad gateway".into(),
        }));

        h.service.complete_step_manually(&user(), 0).await.unwrap();

        let successes = messages_at(&h.log, LogLevel::Success);
        assert!(successes.iter().any(|m| m == "Step 0 completed"));
        let errors = messages_at(&h.log, LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("502"));
    }

    #[tokio::test]
    async fn settle_polls_until_progress_changes() {
        let h = harness();
        h.service
            .select_quest(quest("q1", vec![event_step("views", "page_view", 1)]));

        // Establish a baseline, then script two stale polls before movement.
        h.api.push_progress(Ok(snapshot(0)));
        h.service.refresh_progress(&user()).await.unwrap();
        h.api.push_progress(Ok(snapshot(0)));
        h.api.push_progress(Ok(snapshot(0)));
        h.api.push_progress(Ok(snapshot(1)));

        let outcome = h.service.simulate_step(&user(), 0).await.unwrap();
        assert_eq!(outcome, SettleOutcome::Updated);
        // 1 baseline refresh + 3 settle polls
        assert_eq!(h.api.progress_calls(), 4);
        assert_eq!(h.service.progress().unwrap().steps_completed, 1);

        // Initial settle delay, then doubling backoff between stale polls.
        let sleeps = h.clock.sleeps();
        assert_eq!(
            sleeps,
            vec![
                Duration::from_millis(20),
                Duration::from_millis(10),
                Duration::from_millis(20),
            ]
        );
    }

    #[tokio::test]
    async fn settle_reports_still_pending_when_progress_never_moves() {
        let h = harness();
        h.service
            .select_quest(quest("q1", vec![event_step("views", "page_view", 1)]));

        h.api.push_progress(Ok(snapshot(0)));
        h.service.refresh_progress(&user()).await.unwrap();
        for _ in 0..5 {
            h.api.push_progress(Ok(snapshot(0)));
        }

        let outcome = h.service.simulate_step(&user(), 0).await.unwrap();
        assert_eq!(outcome, SettleOutcome::StillPending);
        assert_eq!(h.api.progress_calls(), 6);
        // Stale snapshot is adopted, and the condition is reported.
        assert_eq!(h.service.progress().unwrap().steps_completed, 0);
        let infos = messages_at(&h.log, LogLevel::Info);
        assert!(infos.iter().any(|m| m.contains("still pending")));
        // Backoff capped at poll_max_delay.
        let sleeps = h.clock.sleeps();
        assert_eq!(
            sleeps,
            vec![
                Duration::from_millis(20),
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(40),
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_simulation_for_same_pair_is_rejected() {
        let release = Arc::new(Notify::new());
        let h = harness_with_ingestion(Arc::new(FakeIngestion::blocking_on(release.clone())));
        h.service
            .select_quest(quest("q1", vec![event_step("views", "page_view", 1)]));
        h.api.push_progress(Ok(snapshot(1)));

        let service = h.service.clone();
        let first = tokio::spawn(async move { service.simulate_step(&user(), 0).await });

        // Wait until the first run has claimed the gate.
        while h.ingestion.batches().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            h.service
                .simulation_state(&QuestId::new("q1"), &user()),
            RunState::Running
        );

        let err = h.service.simulate_step(&user(), 0).await.unwrap_err();
        assert!(matches!(err, QuestFlowError::Busy { .. }));
        assert_eq!(h.ingestion.batches().len(), 1);

        release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(
            h.service
                .simulation_state(&QuestId::new("q1"), &user()),
            RunState::Idle
        );
    }

    #[tokio::test]
    async fn ingestion_failure_marks_run_failed_and_reports() {
        let h = harness_with_ingestion(Arc::new(FakeIngestion {
            batches: Mutex::new(Vec::new()),
            release: None,
            response: Err(ServiceError::Transport("connection refused".into())),
        }));
        h.service
            .select_quest(quest("q1", vec![event_step("views", "page_view", 2)]));

        let err = h.service.simulate_step(&user(), 0).await.unwrap_err();
        assert!(matches!(err, QuestFlowError::Service(_)));
        assert!(matches!(
            h.service.simulation_state(&QuestId::new("q1"), &user()),
            RunState::Failed(_)
        ));
        // Ingestion failed, so no progress poll was issued.
        assert_eq!(h.api.progress_calls(), 0);
    }

    #[tokio::test]
    async fn list_quests_replaces_available_list() {
        let h = harness();
        let first = vec![quest("q1", vec![manual_step("a")])];
        let second = vec![
            quest("q2", vec![manual_step("b")]),
            quest("q3", vec![manual_step("c")]),
        ];
        h.api.active.lock().unwrap().push_back(Ok(first));
        h.api.active.lock().unwrap().push_back(Ok(second.clone()));

        h.service.list_quests(QuestScope::AllActive).await.unwrap();
        h.service
            .list_quests(QuestScope::ForUser(user()))
            .await
            .unwrap();

        assert_eq!(h.service.available_quests(), second);
    }

    #[tokio::test]
    async fn list_quests_failure_keeps_previous_list() {
        let h = harness();
        let first = vec![quest("q1", vec![manual_step("a")])];
        h.api.active.lock().unwrap().push_back(Ok(first.clone()));
        h.api.active.lock().unwrap().push_back(Err(ServiceError::Status {
            status: 503,
            message: "unavailable".into(),
        }));

        h.service.list_quests(QuestScope::AllActive).await.unwrap();
        let err = h
            .service
            .list_quests(QuestScope::AllActive)
            .await
            .unwrap_err();

        assert!(matches!(err, QuestFlowError::Service(_)));
        assert_eq!(h.service.available_quests(), first);
        assert_eq!(messages_at(&h.log, LogLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn operations_require_a_selected_quest() {
        // Mocks with no expectations: any remote call would panic.
        let api = Arc::new(MockQuestApiPort::new());
        let ingestion = Arc::new(MockIngestionPort::new());
        let clock = Arc::new(FakeClock::new());
        let log = Arc::new(ActivityLog::new(clock.clone() as Arc<dyn ClockPort>));
        let service = QuestService::new(api, ingestion, clock, log.clone(), fast_settle());

        let err = service.start_quest(&user()).await.unwrap_err();
        assert!(matches!(err, QuestFlowError::Precondition(_)));
        let err = service.simulate_all_steps(&user()).await.unwrap_err();
        assert!(matches!(err, QuestFlowError::Precondition(_)));
        assert_eq!(messages_at(&log, LogLevel::Error).len(), 2);
    }

    #[tokio::test]
    async fn operations_require_a_user_id() {
        let h = harness();
        h.service
            .select_quest(quest("q1", vec![manual_step("only")]));

        let err = h
            .service
            .refresh_progress(&UserId::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, QuestFlowError::Precondition("a user id")));
        assert_eq!(h.api.progress_calls(), 0);
    }
}

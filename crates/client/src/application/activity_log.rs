//! Append-only activity log and last-result sink.
//!
//! Pure presentation state fed from controller outcomes: each entry gets a
//! generated id and a timestamp from the injected clock, new entries are
//! prepended (most-recent-first), and a separate slot holds the most recent
//! successful payload for display.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::ports::outbound::ClockPort;

/// Severity tag on a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Error,
    Request,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Success => write!(f, "success"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Request => write!(f, "request"),
        }
    }
}

/// One recorded outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub payload: Option<Value>,
}

#[derive(Default)]
struct LogState {
    entries: VecDeque<LogEntry>,
    last_result: Option<Value>,
}

/// Shared log/result sink. Insertion order is reverse-chronological; that is
/// the only invariant.
pub struct ActivityLog {
    clock: Arc<dyn ClockPort>,
    state: Mutex<LogState>,
}

impl ActivityLog {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self {
            clock,
            state: Mutex::new(LogState::default()),
        }
    }

    pub fn record(&self, level: LogLevel, message: impl Into<String>) {
        self.record_with_payload(level, message, None);
    }

    pub fn record_with_payload(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        payload: Option<Value>,
    ) {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            level,
            message: message.into(),
            payload,
        };
        let mut state = self.lock();
        state.entries.push_front(entry);
    }

    /// Replace the last-result slot shown alongside the log.
    pub fn set_result(&self, value: Value) {
        self.lock().last_result = Some(value);
    }

    pub fn last_result(&self) -> Option<Value> {
        self.lock().last_result.clone()
    }

    /// Snapshot of all entries, most recent first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.last_result = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    struct FixedClock(DateTime<Utc>);

    #[async_trait]
    impl ClockPort for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }

        async fn sleep(&self, _duration: Duration) {}
    }

    fn test_log() -> ActivityLog {
        ActivityLog::new(Arc::new(FixedClock(Utc::now())))
    }

    #[test]
    fn entries_are_most_recent_first() {
        let log = test_log();
        log.record(LogLevel::Request, "first");
        log.record(LogLevel::Success, "second");
        log.record(LogLevel::Error, "third");

        let entries = log.entries();
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["third", "second", "first"]);
    }

    #[test]
    fn entries_get_unique_ids() {
        let log = test_log();
        log.record(LogLevel::Info, "a");
        log.record(LogLevel::Info, "a");

        let entries = log.entries();
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[test]
    fn clear_empties_log_and_result() {
        let log = test_log();
        log.record_with_payload(LogLevel::Success, "done", Some(serde_json::json!({"ok": true})));
        log.set_result(serde_json::json!({"ok": true}));

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.last_result(), None);
    }

    #[test]
    fn last_result_is_replaced_wholesale() {
        let log = test_log();
        log.set_result(serde_json::json!({"steps_completed": 2}));
        log.set_result(serde_json::json!({"steps_completed": 0}));

        assert_eq!(
            log.last_result(),
            Some(serde_json::json!({"steps_completed": 0}))
        );
    }
}

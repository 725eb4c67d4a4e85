use chrono::{DateTime, Utc};
use hive_core::EventContext;
use serde::Serialize;

/// How an event left the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Every algorithm reached `Done`.
    Success,
    /// At least one algorithm failed; its downstream never ran.
    AlgorithmFailed,
    /// Algorithms were left that could never become ready.
    Stalled,
}

impl EventStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// A retired event as reported by `pop_finished_event`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedEvent {
    pub context: EventContext,
    pub status: EventStatus,
    /// Names of the algorithms that failed, in failure order.
    pub failed_algorithms: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl CompletedEvent {
    pub fn event_number(&self) -> u64 {
        self.context.event_number()
    }

    pub fn slot(&self) -> usize {
        self.context.slot()
    }
}

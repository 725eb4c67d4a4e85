use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::EventStatus;

/// Scheduler counters for an external metrics sink.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Events accepted by `add_event`.
    pub events_admitted: u64,
    /// Events retired, whatever their status.
    pub events_completed: u64,
    /// Events retired because an algorithm failed.
    pub events_failed: u64,
    /// Events retired because nothing could make progress.
    pub events_stalled: u64,
    /// `add_event` calls rejected with `CapacityExceeded`.
    pub capacity_rejections: u64,
    /// Events currently occupying a slot.
    pub events_in_flight: usize,
    /// Dispatches (Ready → Scheduled) by algorithm name.
    pub dispatches: HashMap<String, u64>,
    /// Finished executions by algorithm name.
    pub executions: HashMap<String, u64>,
    /// Average execution time by algorithm name.
    pub avg_execution_time: HashMap<String, Duration>,
    /// Executions currently running by algorithm name.
    pub running: HashMap<String, usize>,
    /// Highest concurrent executions observed by algorithm name.
    pub peak_running: HashMap<String, usize>,
    /// Requests waiting in the resource pool queue.
    pub queue_depth: usize,
    pub peak_queue_depth: usize,
    /// Wall-clock time of the last retirement.
    pub last_completed: Option<DateTime<Utc>>,
}

impl SchedulerMetrics {
    pub fn record_admission(&mut self) {
        self.events_admitted += 1;
        self.events_in_flight += 1;
    }

    pub fn record_rejection(&mut self) {
        self.capacity_rejections += 1;
    }

    pub fn record_dispatch(&mut self, algorithm: &str) {
        *self.dispatches.entry(algorithm.to_string()).or_default() += 1;
    }

    pub fn record_start(&mut self, algorithm: &str) {
        let running = self.running.entry(algorithm.to_string()).or_default();
        *running += 1;
        let now = *running;
        let peak = self.peak_running.entry(algorithm.to_string()).or_default();
        *peak = (*peak).max(now);
    }

    /// Record a finished execution.
    pub fn record_execution(&mut self, algorithm: &str, duration: Duration) {
        if let Some(running) = self.running.get_mut(algorithm) {
            *running = running.saturating_sub(1);
        }

        let count = {
            let n = self.executions.entry(algorithm.to_string()).or_default();
            *n += 1;
            *n
        };
        let prev_avg = self
            .avg_execution_time
            .get(algorithm)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count <= 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_execution_time
            .insert(algorithm.to_string(), new_avg);
    }

    pub fn record_retirement(&mut self, status: EventStatus) {
        self.events_completed += 1;
        self.events_in_flight = self.events_in_flight.saturating_sub(1);
        match status {
            EventStatus::Success => {}
            EventStatus::AlgorithmFailed => self.events_failed += 1,
            EventStatus::Stalled => self.events_stalled += 1,
        }
        self.last_completed = Some(Utc::now());
    }

    pub fn set_queue_depth(&mut self, depth: usize, peak: usize) {
        self.queue_depth = depth;
        self.peak_queue_depth = peak;
    }
}

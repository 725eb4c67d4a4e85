use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};

use hive_core::{
    AlgorithmNode, EventContext, HiveConfig, HiveError, HiveResult, SchedulerConfig,
};
use hive_graph::DependencyGraph;
use hive_whiteboard::{ConditionStore, Whiteboard};
use tracing::info;

use crate::executor::{RayonTaskPool, TaskPool};
use crate::metrics::SchedulerMetrics;
use crate::pool::ResourcePool;
use crate::state::{AlgsExecutionStates, ExecutionState};
use crate::task::AlgorithmRegistry;
use crate::types::CompletedEvent;

/// The event scheduler. Owns the dependency graph, the whiteboard and the
/// resource pool, and drives every admitted event until all of its
/// algorithms are finished.
///
/// All methods take `&self`; the scheduler can be shared between a
/// producer thread calling [`add_event`](Scheduler::add_event) and a
/// consumer calling [`pop_finished_event`](Scheduler::pop_finished_event).
pub struct Scheduler {
    pub(super) shared: Arc<Shared>,
}

/// State shared between the scheduler handle and in-flight tasks.
pub(super) struct Shared {
    pub(super) config: SchedulerConfig,
    pub(super) graph: DependencyGraph,
    pub(super) whiteboard: Whiteboard,
    pub(super) conditions: Arc<ConditionStore>,
    pub(super) pool: ResourcePool,
    pub(super) tasks: Arc<dyn TaskPool>,
    /// Slot table and completion accounting. Lock order: this lock, then
    /// the resource pool, then the whiteboard.
    pub(super) state: Mutex<SchedulerState>,
    /// Signalled on every retirement and on scheduler failure.
    pub(super) finished: Condvar,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    /// Set by `stop_run` and on failure; no further admissions.
    pub(super) stopped: AtomicBool,
}

pub(super) struct SchedulerState {
    /// Indexed by whiteboard slot.
    pub(super) slots: Vec<Option<EventSlot>>,
    pub(super) finished: VecDeque<CompletedEvent>,
    pub(super) in_flight: usize,
    pub(super) completed: u64,
    /// Set once a core invariant is violated.
    pub(super) failure: Option<String>,
}

/// One event in flight.
pub(super) struct EventSlot {
    pub(super) context: EventContext,
    pub(super) states: AlgsExecutionStates,
    pub(super) failed: Vec<String>,
}

// ── Construction ────────────────────────────────────────────────────

/// Assembles a [`Scheduler`] from configuration and collaborators.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    algorithms: Vec<AlgorithmNode>,
    registry: AlgorithmRegistry,
    task_pool: Option<Arc<dyn TaskPool>>,
    conditions: Option<Arc<ConditionStore>>,
}

impl SchedulerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            algorithms: Vec::new(),
            registry: AlgorithmRegistry::new(),
            task_pool: None,
            conditions: None,
        }
    }

    pub fn algorithm(mut self, node: AlgorithmNode) -> Self {
        self.algorithms.push(node);
        self
    }

    pub fn algorithms(mut self, nodes: impl IntoIterator<Item = AlgorithmNode>) -> Self {
        self.algorithms.extend(nodes);
        self
    }

    pub fn registry(mut self, registry: AlgorithmRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use a custom task pool instead of a rayon pool sized from the config.
    pub fn task_pool(mut self, pool: Arc<dyn TaskPool>) -> Self {
        self.task_pool = Some(pool);
        self
    }

    pub fn conditions(mut self, conditions: Arc<ConditionStore>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Validate the configuration, build the graph, and instantiate every
    /// algorithm. Configuration errors abort here, before any event.
    pub fn build(self) -> HiveResult<Scheduler> {
        let config = HiveConfig::new(self.config, self.algorithms);
        config.validate()?;
        let HiveConfig {
            scheduler: config,
            algorithms,
        } = config;

        let graph = DependencyGraph::build(algorithms)?;
        let pool = ResourcePool::new(&graph, &self.registry, &config)?;
        let tasks: Arc<dyn TaskPool> = match self.task_pool {
            Some(tasks) => tasks,
            None => Arc::new(RayonTaskPool::new(config.resolved_thread_pool_size())?),
        };
        let slots = config.max_events_in_flight;

        info!(
            events_in_flight = slots,
            threads = tasks.size(),
            algorithms = graph.len(),
            "scheduler started"
        );

        Ok(Scheduler {
            shared: Arc::new(Shared {
                whiteboard: Whiteboard::new(slots),
                conditions: self.conditions.unwrap_or_default(),
                state: Mutex::new(SchedulerState {
                    slots: (0..slots).map(|_| None).collect(),
                    finished: VecDeque::new(),
                    in_flight: 0,
                    completed: 0,
                    failure: None,
                }),
                finished: Condvar::new(),
                metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
                stopped: AtomicBool::new(false),
                config,
                graph,
                pool,
                tasks,
            }),
        })
    }
}

impl Scheduler {
    /// Build a scheduler from a loaded job configuration.
    pub fn new(config: HiveConfig, registry: &AlgorithmRegistry) -> HiveResult<Self> {
        SchedulerBuilder::new(config.scheduler)
            .algorithms(config.algorithms)
            .registry(registry.clone())
            .build()
    }

    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn events_in_flight(&self) -> usize {
        self.shared.lock_state().in_flight
    }

    pub fn max_events_in_flight(&self) -> usize {
        self.shared.config.max_events_in_flight
    }

    /// Events retired so far.
    pub fn completed_events(&self) -> u64 {
        self.shared.lock_state().completed
    }

    pub fn free_slots(&self) -> usize {
        self.shared.whiteboard.free_slots()
    }

    /// Whether the event has finished: every algorithm terminal or blocked.
    ///
    /// A context whose slot no longer holds it counts as retired and
    /// reports `true`. A slot index outside the slot table was never
    /// admitted and reports `false`.
    pub fn is_event_complete(&self, ctx: &EventContext) -> bool {
        let st = self.shared.lock_state();
        match st.slots.get(ctx.slot()) {
            None => false,
            Some(Some(ev)) if ev.context == *ctx => ev.states.is_complete(),
            Some(_) => true,
        }
    }

    /// Current state of an algorithm for an in-flight event.
    pub fn state_of(&self, ctx: &EventContext, algorithm: &str) -> Option<ExecutionState> {
        let id = self.shared.graph.id_of(algorithm)?;
        let st = self.shared.lock_state();
        match st.slots.get(ctx.slot()).and_then(Option::as_ref) {
            Some(ev) if ev.context == *ctx => Some(ev.states.get(id)),
            _ => None,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.shared.graph
    }

    pub fn whiteboard(&self) -> &Whiteboard {
        &self.shared.whiteboard
    }

    pub fn conditions(&self) -> &ConditionStore {
        &self.shared.conditions
    }

    pub fn resource_pool(&self) -> &ResourcePool {
        &self.shared.pool
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get an Arc to the metrics (for external reads without cloning).
    pub fn metrics_handle(&self) -> Arc<RwLock<SchedulerMetrics>> {
        Arc::clone(&self.shared.metrics)
    }

    /// Reason the scheduler stopped on an internal error, if it did.
    pub fn failure(&self) -> Option<String> {
        self.shared.lock_state().failure.clone()
    }

    // ── Finished events ─────────────────────────────────────────────

    /// Next retired event, waiting for one if events are still in flight.
    /// `None` once nothing is in flight and the queue is empty, or after
    /// the scheduler failed.
    pub fn pop_finished_event(&self) -> Option<CompletedEvent> {
        let mut st = self.shared.lock_state();
        loop {
            if let Some(event) = st.finished.pop_front() {
                return Some(event);
            }
            if st.in_flight == 0 || st.failure.is_some() {
                return None;
            }
            st = self
                .shared
                .finished
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Next retired event, if one is waiting.
    pub fn try_pop_finished_event(&self) -> Option<CompletedEvent> {
        self.shared.lock_state().finished.pop_front()
    }

    // ── Run control ─────────────────────────────────────────────────

    /// Stop admitting events. In-flight events still run to completion.
    pub fn stop_run(&self) {
        if !self.shared.stopped.swap(true, Ordering::SeqCst) {
            info!("Scheduler stop requested, draining in-flight events");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Block until no event is in flight.
    pub fn wait_until_drained(&self) -> HiveResult<()> {
        let mut st = self.shared.lock_state();
        while st.in_flight > 0 && st.failure.is_none() {
            st = self
                .shared
                .finished
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
        match &st.failure {
            Some(reason) => Err(HiveError::SchedulerFailed(reason.clone())),
            None => Ok(()),
        }
    }

    /// Stop, drain, and finalize every algorithm instance.
    pub fn finalize(&self) -> HiveResult<()> {
        self.stop_run();
        self.wait_until_drained()?;
        self.shared.pool.finalize()?;
        info!(completed = self.completed_events(), "Scheduler finalized");
        Ok(())
    }

    // ── Diagnostics ─────────────────────────────────────────────────

    /// Text dump of every live slot and its algorithm states.
    pub fn dump_state(&self) -> String {
        let st = self.shared.lock_state();
        self.shared.describe(&st)
    }
}

impl Shared {
    pub(super) fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn describe(&self, st: &SchedulerState) -> String {
        let mut out = format!(
            "Scheduler state: {}/{} slots in use, {} completed, {} queued request(s)\n",
            st.in_flight,
            self.config.max_events_in_flight,
            st.completed,
            self.pool.queue_depth()
        );
        if let Some(reason) = &st.failure {
            let _ = writeln!(out, "  FAILED: {reason}");
        }
        for ev in st.slots.iter().flatten() {
            out.push_str(&self.describe_slot(ev));
        }
        out
    }

    pub(super) fn describe_slot(&self, ev: &EventSlot) -> String {
        let mut out = format!(
            "[slot {}] event {}\n",
            ev.context.slot(),
            ev.context.event_number()
        );
        for state in ExecutionState::ALL {
            let names: Vec<&str> = ev
                .states
                .ids_in(state)
                .into_iter()
                .filter(|&id| !ev.states.is_blocked(id))
                .map(|id| self.graph.name(id))
                .collect();
            if !names.is_empty() {
                let _ = writeln!(out, "  {:<9}: {}", state.as_str(), names.join(", "));
            }
        }
        let blocked: Vec<&str> = ev
            .states
            .blocked_ids()
            .into_iter()
            .map(|id| self.graph.name(id))
            .collect();
        if !blocked.is_empty() {
            let _ = writeln!(out, "  {:<9}: {}", "Blocked", blocked.join(", "));
        }
        out
    }
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use hive_core::{
    AlgorithmId, AlgorithmNode, EventContext, HiveError, ResourceClass, SchedulerConfig,
};
use hive_graph::{DependencyGraph, ReadinessView};

use super::scheduling::SlotView;
use super::Scheduler;
use crate::data::EventData;
use crate::executor::{Job, TaskHandle, TaskPool};
use crate::state::{AlgsExecutionStates, ExecutionState};
use crate::task::{Algorithm, AlgorithmError, AlgorithmRegistry, Status};
use crate::types::EventStatus;

// ── Test helpers ────────────────────────────────────────────────────

/// Runs every job on the submitting thread.
struct InlinePool {
    next_id: AtomicU64,
}

impl TaskPool for InlinePool {
    fn submit(&self, job: Job) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        job();
        handle.complete();
        handle
    }

    fn size(&self) -> usize {
        1
    }
}

/// Holds jobs until the test runs them.
#[derive(Default)]
struct HoldingPool {
    jobs: Mutex<VecDeque<(TaskHandle, Job)>>,
    next_id: AtomicU64,
}

impl HoldingPool {
    fn pending(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    fn run_next(&self) -> bool {
        let next = self.jobs.lock().unwrap().pop_front();
        match next {
            Some((handle, job)) => {
                job();
                handle.complete();
                true
            }
            None => false,
        }
    }

    fn run_all(&self) {
        while self.run_next() {}
    }
}

impl TaskPool for HoldingPool {
    fn submit(&self, job: Job) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.jobs.lock().unwrap().push_back((handle.clone(), job));
        handle
    }

    fn size(&self) -> usize {
        1
    }
}

/// Writes its event number under every declared output and appends its
/// name to a shared log.
struct Tracer {
    name: String,
    outputs: Vec<String>,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
    panic: bool,
}

impl Algorithm for Tracer {
    fn execute(&self, ctx: &EventContext, data: &mut EventData<'_>) -> Status {
        self.log.lock().unwrap().push(self.name.clone());
        if self.panic {
            panic!("{} exploded", self.name);
        }
        if self.fail {
            return Err(AlgorithmError::failed("bad input"));
        }
        for key in &self.outputs {
            data.put(key.as_str(), ctx.event_number())?;
        }
        Ok(())
    }
}

fn registry(log: &Arc<Mutex<Vec<String>>>) -> AlgorithmRegistry {
    let mut registry = AlgorithmRegistry::new();
    for (kind, fail, panic) in [("tracer", false, false), ("failing", true, false), ("panicking", false, true)] {
        let log = Arc::clone(log);
        registry.register(kind, move |node: &AlgorithmNode| {
            Box::new(Tracer {
                name: node.name.clone(),
                outputs: node.outputs.iter().map(|k| k.to_string()).collect(),
                log: Arc::clone(&log),
                fail,
                panic,
            }) as Box<dyn Algorithm>
        });
    }
    registry
}

fn config(max_events_in_flight: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_events_in_flight,
        thread_pool_size: 1,
        ..SchedulerConfig::default()
    }
}

fn node(name: &str, inputs: &[&str], outputs: &[&str]) -> AlgorithmNode {
    AlgorithmNode::new(name)
        .with_type("tracer")
        .with_inputs(inputs.iter().copied())
        .with_outputs(outputs.iter().copied())
}

fn inline_scheduler(
    nodes: Vec<AlgorithmNode>,
    max: usize,
) -> (Scheduler, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let scheduler = Scheduler::builder(config(max))
        .algorithms(nodes)
        .registry(registry(&log))
        .task_pool(Arc::new(InlinePool {
            next_id: AtomicU64::new(0),
        }))
        .build()
        .unwrap();
    (scheduler, log)
}

fn holding_scheduler(
    nodes: Vec<AlgorithmNode>,
    max: usize,
) -> (Scheduler, Arc<HoldingPool>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let pool = Arc::new(HoldingPool::default());
    let scheduler = Scheduler::builder(config(max))
        .algorithms(nodes)
        .registry(registry(&log))
        .task_pool(Arc::clone(&pool) as Arc<dyn TaskPool>)
        .build()
        .unwrap();
    (scheduler, pool, log)
}

// ── Readiness view ──────────────────────────────────────────────────

#[test]
fn slot_view_counts_key_available_once_producer_done() {
    let graph = DependencyGraph::build(vec![node("A", &[], &["x"]), node("B", &["x"], &[])]).unwrap();
    let mut states = AlgsExecutionStates::new(graph.len());
    let a = AlgorithmId(0);
    let b = AlgorithmId(1);

    for next in [ExecutionState::Ready, ExecutionState::Scheduled, ExecutionState::Running] {
        states.update(a, next).unwrap();
        let view = SlotView { graph: &graph, states: &states };
        assert!(!view.is_available(&"x".into()), "available while {next}");
    }
    states.update(a, ExecutionState::Done).unwrap();
    let view = SlotView { graph: &graph, states: &states };
    assert!(view.is_available(&"x".into()));
    assert!(view.is_not_ready(b));
    assert_eq!(graph.ready_consumers(&"x".into(), &view), vec![b]);

    states.block(b);
    let view = SlotView { graph: &graph, states: &states };
    assert!(!view.is_not_ready(b));
    assert!(graph.ready_consumers(&"x".into(), &view).is_empty());
}

// ── Event lifecycle ─────────────────────────────────────────────────

#[test]
fn chain_runs_in_order_and_retires() {
    let (scheduler, log) = inline_scheduler(
        vec![
            node("C", &["y"], &[]),
            node("B", &["x"], &["y"]),
            node("A", &[], &["x"]),
        ],
        1,
    );
    let ctx = scheduler.add_event(7).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
    assert!(scheduler.is_event_complete(&ctx));

    let done = scheduler.pop_finished_event().unwrap();
    assert_eq!(done.event_number(), 7);
    assert_eq!(done.status, EventStatus::Success);
    assert!(done.failed_algorithms.is_empty());
    assert_eq!(scheduler.completed_events(), 1);
    assert_eq!(scheduler.events_in_flight(), 0);
    assert_eq!(scheduler.free_slots(), 1);
    assert!(scheduler.whiteboard().keys(ctx.slot()).is_empty());
}

#[test]
fn completion_of_unknown_slot_is_false() {
    let (scheduler, _log) = inline_scheduler(vec![node("A", &[], &[])], 2);
    assert!(!scheduler.is_event_complete(&EventContext::new(1, 2)));
    assert!(!scheduler.is_event_complete(&EventContext::new(1, 99)));

    let ctx = scheduler.add_event(1).unwrap();
    assert!(scheduler.is_event_complete(&ctx));
}

#[test]
fn empty_graph_retires_on_admission() {
    let (scheduler, _log) = inline_scheduler(Vec::new(), 2);
    scheduler.add_event(1).unwrap();
    assert_eq!(scheduler.events_in_flight(), 0);
    let done = scheduler.try_pop_finished_event().unwrap();
    assert_eq!(done.status, EventStatus::Success);
    assert!(scheduler.pop_finished_event().is_none());
}

#[test]
fn states_advance_as_jobs_run() {
    let (scheduler, pool, _log) =
        holding_scheduler(vec![node("A", &[], &["x"]), node("B", &["x"], &[])], 1);
    let ctx = scheduler.add_event(3).unwrap();

    assert_eq!(scheduler.state_of(&ctx, "A"), Some(ExecutionState::Scheduled));
    assert_eq!(scheduler.state_of(&ctx, "B"), Some(ExecutionState::NotReady));
    assert!(!scheduler.is_event_complete(&ctx));
    let dump = scheduler.dump_state();
    assert!(dump.contains("event 3"), "{dump}");
    assert!(dump.contains("Scheduled: A"), "{dump}");
    assert!(dump.contains("NotReady : B"), "{dump}");

    assert!(pool.run_next());
    assert_eq!(scheduler.state_of(&ctx, "A"), Some(ExecutionState::Done));
    assert_eq!(scheduler.state_of(&ctx, "B"), Some(ExecutionState::Scheduled));
    assert_eq!(*scheduler.whiteboard().get_as::<u64>(ctx.slot(), &"x".into()).unwrap(), 3);

    pool.run_all();
    assert_eq!(scheduler.state_of(&ctx, "B"), None);
    assert!(scheduler.is_event_complete(&ctx));
    assert_eq!(scheduler.metrics().executions["B"], 1);
}

#[test]
fn capacity_is_enforced_without_side_effects() {
    let (scheduler, pool, _log) = holding_scheduler(vec![node("A", &[], &[])], 1);
    scheduler.add_event(1).unwrap();

    let err = scheduler.add_event(2).unwrap_err();
    assert!(matches!(err, HiveError::CapacityExceeded { in_flight: 1, max: 1 }));
    assert_eq!(scheduler.events_in_flight(), 1);
    assert_eq!(pool.pending(), 1);
    assert_eq!(scheduler.metrics().capacity_rejections, 1);

    pool.run_all();
    assert_eq!(scheduler.pop_finished_event().unwrap().event_number(), 1);
    scheduler.add_event(2).unwrap();
    pool.run_all();
    assert_eq!(scheduler.pop_finished_event().unwrap().event_number(), 2);
}

#[test]
fn stop_run_rejects_new_events() {
    let (scheduler, _log) = inline_scheduler(vec![node("A", &[], &[])], 1);
    scheduler.stop_run();
    assert!(scheduler.is_stopped());
    assert!(matches!(scheduler.add_event(1), Err(HiveError::Stopped)));
    assert!(scheduler.wait_until_drained().is_ok());
}

// ── Failures ────────────────────────────────────────────────────────

#[test]
fn failure_blocks_only_downstream() {
    let (scheduler, log) = inline_scheduler(
        vec![
            node("A", &[], &["x"]).with_type("failing"),
            node("B", &["x"], &["y"]),
            node("D", &["y"], &[]),
            node("C", &[], &["z"]),
        ],
        1,
    );
    scheduler.add_event(11).unwrap();

    let done = scheduler.pop_finished_event().unwrap();
    assert_eq!(done.status, EventStatus::AlgorithmFailed);
    assert_eq!(done.failed_algorithms, vec!["A"]);
    let ran = log.lock().unwrap().clone();
    assert!(ran.contains(&"C".to_string()));
    assert!(!ran.contains(&"B".to_string()));
    assert!(!ran.contains(&"D".to_string()));
    assert_eq!(scheduler.metrics().events_failed, 1);
}

#[test]
fn failed_producer_output_is_not_published() {
    let (scheduler, pool, _log) = holding_scheduler(
        vec![
            node("A", &[], &["x"]).with_type("failing"),
            node("B", &["x"], &[]),
        ],
        1,
    );
    let ctx = scheduler.add_event(4).unwrap();
    assert!(pool.run_next());
    assert!(!pool.run_next());
    assert!(!scheduler.whiteboard().contains(ctx.slot(), &"x".into()));
    assert_eq!(
        scheduler.pop_finished_event().unwrap().status,
        EventStatus::AlgorithmFailed
    );
}

#[test]
fn panic_is_reported_as_failure() {
    let (scheduler, _log) = inline_scheduler(
        vec![
            node("A", &[], &["x"]).with_type("panicking"),
            node("B", &["x"], &[]),
        ],
        1,
    );
    scheduler.add_event(5).unwrap();
    let done = scheduler.pop_finished_event().unwrap();
    assert_eq!(done.status, EventStatus::AlgorithmFailed);
    assert_eq!(done.failed_algorithms, vec!["A"]);
    assert!(scheduler.failure().is_none());
    assert!(scheduler.add_event(6).is_ok());
}

#[test]
fn event_without_runnable_algorithms_retires_as_stalled() {
    let (scheduler, pool, _log) =
        holding_scheduler(vec![node("A", &[], &["x"]), node("B", &["x"], &[])], 1);
    let ctx = scheduler.add_event(9).unwrap();
    assert_eq!(pool.pending(), 1);

    {
        let shared = &scheduler.shared;
        let mut st = shared.lock_state();
        let ev = st.slots[ctx.slot()].as_mut().unwrap();
        ev.states = AlgsExecutionStates::new(shared.graph.len());
        assert!(ev.states.is_stalled());
        shared.check_retirement(&mut st, ctx.slot());
    }

    let done = scheduler.try_pop_finished_event().unwrap();
    assert_eq!(done.status, EventStatus::Stalled);
    assert_eq!(done.event_number(), 9);
    assert_eq!(scheduler.events_in_flight(), 0);
    assert_eq!(scheduler.free_slots(), 1);
    assert!(scheduler.failure().is_none());
}

// ── Resource classes ────────────────────────────────────────────────

#[test]
fn exclusive_request_waits_for_release() {
    let (scheduler, pool, log) = holding_scheduler(
        vec![node("X", &[], &["x"]).with_class(ResourceClass::Exclusive)],
        2,
    );
    let first = scheduler.add_event(1).unwrap();
    let second = scheduler.add_event(2).unwrap();

    assert_eq!(scheduler.state_of(&first, "X"), Some(ExecutionState::Scheduled));
    assert_eq!(scheduler.state_of(&second, "X"), Some(ExecutionState::Ready));
    assert_eq!(scheduler.resource_pool().queue_depth(), 1);
    assert_eq!(pool.pending(), 1);

    assert!(pool.run_next());
    assert_eq!(scheduler.state_of(&second, "X"), Some(ExecutionState::Scheduled));
    assert_eq!(scheduler.resource_pool().queue_depth(), 0);
    pool.run_all();

    assert_eq!(*log.lock().unwrap(), vec!["X", "X"]);
    assert_eq!(scheduler.completed_events(), 2);
    assert_eq!(scheduler.metrics().peak_queue_depth, 1);
    assert_eq!(scheduler.metrics().peak_running["X"], 1);
}

#[test]
fn named_resource_serializes_different_algorithms() {
    let (scheduler, pool, _log) = holding_scheduler(
        vec![
            node("P", &[], &[]).with_resource("geometry"),
            node("Q", &[], &[]).with_resource("geometry"),
        ],
        1,
    );
    let ctx = scheduler.add_event(1).unwrap();
    assert_eq!(scheduler.state_of(&ctx, "P"), Some(ExecutionState::Scheduled));
    assert_eq!(scheduler.state_of(&ctx, "Q"), Some(ExecutionState::Ready));

    assert!(pool.run_next());
    assert_eq!(scheduler.state_of(&ctx, "Q"), Some(ExecutionState::Scheduled));
    pool.run_all();
    assert_eq!(scheduler.pop_finished_event().unwrap().status, EventStatus::Success);
}

#[test]
fn finalize_after_drain() {
    let (scheduler, _log) = inline_scheduler(vec![node("A", &[], &[])], 1);
    scheduler.add_event(1).unwrap();
    scheduler.finalize().unwrap();
    assert!(scheduler.is_stopped());
    assert!(matches!(scheduler.add_event(2), Err(HiveError::Stopped)));
}

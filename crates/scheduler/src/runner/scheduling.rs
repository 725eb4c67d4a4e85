use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use hive_core::{AlgorithmId, DataKey, EventContext, HiveError, HiveResult};
use hive_graph::{DependencyGraph, ReadinessView};
use tracing::{debug, error, warn};

use super::core::{EventSlot, Scheduler, SchedulerState, Shared};
use crate::metrics::SchedulerMetrics;
use crate::pool::{Acquisition, AlgorithmInstance};
use crate::state::{AlgsExecutionStates, ExecutionState};
use crate::task::Status;
use crate::types::{CompletedEvent, EventStatus};

/// Readiness of one slot as seen by the dependency graph.
///
/// A key is available once its producer is `Done` in the slot.
pub(super) struct SlotView<'a> {
    pub(super) graph: &'a DependencyGraph,
    pub(super) states: &'a AlgsExecutionStates,
}

impl ReadinessView for SlotView<'_> {
    fn is_available(&self, key: &DataKey) -> bool {
        self.graph
            .producer_of(key)
            .is_some_and(|producer| self.states.get(producer) == ExecutionState::Done)
    }

    fn is_not_ready(&self, id: AlgorithmId) -> bool {
        self.states.get(id) == ExecutionState::NotReady && !self.states.is_blocked(id)
    }
}

/// A granted execution waiting to be handed to the task pool.
pub(super) struct Launch {
    ctx: EventContext,
    instance: AlgorithmInstance,
}

impl Scheduler {
    /// Admit a new event.
    ///
    /// Allocates a whiteboard slot, marks the root algorithms `Ready` and
    /// dispatches them. Fails with `CapacityExceeded` when every slot is
    /// occupied; the caller should pop a finished event and retry.
    pub fn add_event(&self, event_number: u64) -> HiveResult<EventContext> {
        self.shared.add_event(event_number)
    }
}

impl Shared {
    pub(super) fn add_event(self: &Arc<Self>, event_number: u64) -> HiveResult<EventContext> {
        let mut launches = Vec::new();
        let ctx = {
            let mut guard = self.lock_state();
            let st = &mut *guard;
            if let Some(reason) = &st.failure {
                return Err(HiveError::SchedulerFailed(reason.clone()));
            }
            if self.stopped.load(Ordering::SeqCst) {
                return Err(HiveError::Stopped);
            }

            let max = self.config.max_events_in_flight;
            let rejected = HiveError::CapacityExceeded {
                in_flight: st.in_flight,
                max,
            };
            if st.in_flight >= max {
                self.write_metrics().record_rejection();
                return Err(rejected);
            }
            let Some(slot) = self.whiteboard.allocate(event_number) else {
                self.write_metrics().record_rejection();
                return Err(rejected);
            };
            if st.slots[slot].is_some() {
                let err = HiveError::InvalidSlot(slot);
                self.fail(st, &err);
                return Err(err);
            }

            let ctx = EventContext::new(event_number, slot);
            let mut ev = EventSlot {
                context: ctx,
                states: AlgsExecutionStates::new(self.graph.len()),
                failed: Vec::new(),
            };
            for &root in self.graph.roots() {
                self.transition(&mut ev, root, ExecutionState::Ready)?;
            }
            st.slots[slot] = Some(ev);
            st.in_flight += 1;
            self.write_metrics().record_admission();
            debug!(event = event_number, slot, "event admitted");

            let mut roots = self.graph.roots().to_vec();
            roots.sort();
            for root in roots {
                self.dispatch(st, root, slot, &mut launches);
            }
            self.check_retirement(st, slot);
            self.update_queue_metrics();
            ctx
        };
        self.launch(launches);
        Ok(ctx)
    }

    /// Hand a `Ready` node to the resource pool. A granted instance moves
    /// the node to `Scheduled` and is queued for launch; otherwise the
    /// request waits in the pool and the node stays `Ready`.
    pub(super) fn dispatch(
        &self,
        st: &mut SchedulerState,
        id: AlgorithmId,
        slot: usize,
        launches: &mut Vec<Launch>,
    ) {
        let Some(ev) = st.slots.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        if !ev.states.is_dispatchable(id) {
            return;
        }
        let ctx = ev.context;

        match self.pool.acquire(id, slot) {
            Ok(Acquisition::Granted(instance)) => {
                if let Err(e) = self.transition(ev, id, ExecutionState::Scheduled) {
                    if let Err(release) = self.pool.release(instance) {
                        warn!(error = %release, "release after failed dispatch");
                    }
                    self.fail(st, &e);
                    return;
                }
                self.write_metrics().record_dispatch(self.graph.name(id));
                launches.push(Launch { ctx, instance });
            }
            Ok(Acquisition::Queued) => {
                debug!(algorithm = %self.graph.name(id), %ctx, "no instance available, request queued");
            }
            Err(e) => self.fail(st, &e),
        }
    }

    /// Submit granted executions to the task pool. Called without the
    /// state lock held.
    pub(super) fn launch(self: &Arc<Self>, launches: Vec<Launch>) {
        for Launch { ctx, instance } in launches {
            let shared = Arc::clone(self);
            let handle = self
                .tasks
                .submit(Box::new(move || shared.run_algorithm(ctx, instance)));
            debug!(task = handle.id(), %ctx, "task submitted");
        }
    }

    /// Record the outcome of one execution and schedule what it unblocked.
    pub(super) fn on_completion(
        self: &Arc<Self>,
        instance: AlgorithmInstance,
        ctx: EventContext,
        outcome: Status,
        elapsed: Duration,
    ) {
        let mut launches = Vec::new();
        {
            let mut guard = self.lock_state();
            let st = &mut *guard;
            let id = instance.node();
            self.write_metrics()
                .record_execution(self.graph.name(id), elapsed);

            let woken = match self.pool.release(instance) {
                Ok(woken) => woken,
                Err(e) => {
                    self.fail(st, &e);
                    return;
                }
            };
            let ready = match self.settle(st, id, ctx, &outcome) {
                Ok(ready) => ready,
                Err(e) => {
                    self.fail(st, &e);
                    return;
                }
            };

            for (waiter, slot) in woken {
                self.dispatch(st, waiter, slot, &mut launches);
            }
            for next in ready {
                self.dispatch(st, next, ctx.slot(), &mut launches);
            }
            self.check_retirement(st, ctx.slot());
            self.update_queue_metrics();
        }
        self.launch(launches);
    }

    /// Apply a finished execution to the slot's states. Returns the
    /// consumers that became `Ready`, sorted by id.
    fn settle(
        &self,
        st: &mut SchedulerState,
        id: AlgorithmId,
        ctx: EventContext,
        outcome: &Status,
    ) -> HiveResult<Vec<AlgorithmId>> {
        let slot = ctx.slot();
        let ev = match st.slots.get_mut(slot).and_then(Option::as_mut) {
            Some(ev) if ev.context == ctx => ev,
            _ => return Err(HiveError::InvalidSlot(slot)),
        };

        match outcome {
            Ok(()) => {
                self.transition(ev, id, ExecutionState::Done)?;
                let mut ready = {
                    let view = SlotView {
                        graph: &self.graph,
                        states: &ev.states,
                    };
                    let mut ready = Vec::new();
                    for key in &self.graph.node(id).outputs {
                        ready.extend(self.graph.ready_consumers(key, &view));
                    }
                    ready
                };
                ready.sort();
                ready.dedup();
                for &next in &ready {
                    self.transition(ev, next, ExecutionState::Ready)?;
                }
                Ok(ready)
            }
            Err(e) => {
                self.transition(ev, id, ExecutionState::Failed)?;
                let name = self.graph.name(id);
                warn!(algorithm = %name, %ctx, error = %e, "algorithm failed");
                ev.failed.push(name.to_string());
                let closure = self.graph.downstream_closure(id);
                let blocked = closure.iter().filter(|&&d| ev.states.block(d)).count();
                if blocked > 0 {
                    debug!(algorithm = %name, %ctx, blocked, "downstream algorithms blocked");
                }
                Ok(Vec::new())
            }
        }
    }

    /// Retire the event in `slot` if none of its algorithms can still run.
    pub(super) fn check_retirement(&self, st: &mut SchedulerState, slot: usize) {
        let Some(ev) = st.slots.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        let status = if ev.states.is_complete() {
            if ev.failed.is_empty() {
                EventStatus::Success
            } else {
                EventStatus::AlgorithmFailed
            }
        } else if ev.states.is_stalled() {
            // unreachable while the graph is acyclic and failures block their closure
            let stuck = ev.states.block_remaining();
            warn!(
                ctx = %ev.context,
                stuck,
                "event stalled: no algorithm can make progress\n{}",
                self.describe_slot(ev)
            );
            EventStatus::Stalled
        } else {
            return;
        };
        if status == EventStatus::AlgorithmFailed {
            warn!(
                ctx = %ev.context,
                failed = ?ev.failed,
                "event finished with failures\n{}",
                self.describe_slot(ev)
            );
        }

        let Some(ev) = st.slots[slot].take() else {
            return;
        };
        let discarded = self.pool.discard_waiters(slot);
        if discarded > 0 {
            debug!(slot, discarded, "dropped queued requests of retired event");
        }
        if let Err(e) = self.whiteboard.release(slot) {
            self.fail(st, &e);
            return;
        }
        st.in_flight -= 1;
        st.completed += 1;
        self.write_metrics().record_retirement(status);
        debug!(ctx = %ev.context, ?status, "event retired");

        st.finished.push_back(CompletedEvent {
            context: ev.context,
            status,
            failed_algorithms: ev.failed,
            completed_at: Utc::now(),
        });
        self.finished.notify_all();
    }

    /// Stop the scheduler after a broken internal invariant.
    pub(super) fn fail(&self, st: &mut SchedulerState, err: &HiveError) {
        if st.failure.is_none() {
            let kind = if err.is_invariant_violation() {
                "invariant violated"
            } else {
                "internal error"
            };
            error!(error = %err, "scheduler {kind}, stopping\n{}", self.describe(st));
            st.failure = Some(err.to_string());
        }
        self.stopped.store(true, Ordering::SeqCst);
        self.finished.notify_all();
    }

    pub(super) fn transition(
        &self,
        ev: &mut EventSlot,
        id: AlgorithmId,
        next: ExecutionState,
    ) -> HiveResult<()> {
        ev.states
            .update(id, next)
            .map_err(|illegal| HiveError::InvalidTransition {
                algorithm: self.graph.name(id).to_string(),
                slot: ev.context.slot(),
                from: illegal.from.to_string(),
                to: illegal.to.to_string(),
            })
    }

    pub(super) fn write_metrics(&self) -> RwLockWriteGuard<'_, SchedulerMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_queue_metrics(&self) {
        let depth = self.pool.queue_depth();
        let peak = self.pool.peak_queue_depth();
        self.write_metrics().set_queue_depth(depth, peak);
    }
}

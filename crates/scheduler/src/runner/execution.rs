use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use hive_core::{AlgorithmId, EventContext, HiveError};
use tracing::{trace, warn};

use super::core::Shared;
use crate::data::EventData;
use crate::pool::AlgorithmInstance;
use crate::state::ExecutionState;
use crate::task::AlgorithmError;

impl Shared {
    /// Worker-side body of one execution: mark `Running`, execute, commit
    /// outputs, then report back.
    pub(super) fn run_algorithm(self: &Arc<Self>, ctx: EventContext, instance: AlgorithmInstance) {
        let id = instance.node();
        if !self.on_started(id, ctx) {
            let _guard = self.lock_state();
            if let Err(e) = self.pool.release(instance) {
                warn!(error = %e, "release of abandoned instance");
            }
            return;
        }

        let node = self.graph.node(id);
        let started = Instant::now();
        let outcome = {
            let mut data = EventData::new(node, ctx, &self.whiteboard, &self.conditions);
            let algorithm = instance.algorithm();
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| algorithm.execute(&ctx, &mut data)));
            match result {
                Ok(Ok(())) => data.commit().map(|written| {
                    trace!(algorithm = %node.name, %ctx, written, "outputs committed");
                }),
                Ok(Err(e)) => Err(e),
                Err(payload) => Err(AlgorithmError::Panicked(panic_message(payload.as_ref()))),
            }
        };
        let elapsed = started.elapsed();

        self.on_completion(instance, ctx, outcome, elapsed);
    }

    fn on_started(&self, id: AlgorithmId, ctx: EventContext) -> bool {
        let mut guard = self.lock_state();
        let st = &mut *guard;
        let result = match st.slots.get_mut(ctx.slot()).and_then(Option::as_mut) {
            Some(ev) if ev.context == ctx => self.transition(ev, id, ExecutionState::Running),
            _ => Err(HiveError::InvalidSlot(ctx.slot())),
        };
        match result {
            Ok(()) => {
                self.write_metrics().record_start(self.graph.name(id));
                true
            }
            Err(e) => {
                self.fail(st, &e);
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

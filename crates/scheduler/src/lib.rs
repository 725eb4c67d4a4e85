//! Concurrent, data-driven algorithm scheduler.
//!
//! Events occupy whiteboard slots; within each slot the [`Scheduler`]
//! dispatches every algorithm whose inputs are available, through the
//! [`ResourcePool`] onto a [`TaskPool`], and reacts to completions by
//! re-evaluating only the consumers of the keys just produced.

pub mod data;
pub mod executor;
pub mod metrics;
pub mod pool;
pub mod runner;
pub mod state;
pub mod task;
pub mod types;

pub use data::EventData;
pub use executor::{RayonTaskPool, TaskHandle, TaskPool};
pub use metrics::SchedulerMetrics;
pub use pool::{Acquisition, AlgorithmInstance, ResourcePool};
pub use runner::{Scheduler, SchedulerBuilder};
pub use state::{AlgsExecutionStates, ExecutionState, IllegalTransition};
pub use task::{Algorithm, AlgorithmError, AlgorithmFactory, AlgorithmRegistry, Status};
pub use types::{CompletedEvent, EventStatus};

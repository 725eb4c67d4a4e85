//! Scheduler runner -- admits events and drives them to completion.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, builder, shared state, and accessor methods
//! - `scheduling`: event admission, dispatch, completion handling, retirement
//! - `execution`: the task body that runs one algorithm on a worker thread

mod core;
mod execution;
mod scheduling;
#[cfg(test)]
mod tests;

pub use self::core::{Scheduler, SchedulerBuilder};

//! Static data-dependency graph over algorithm nodes.
//!
//! Built once from the declared inputs and outputs of every node. An edge
//! A → B exists when B consumes a key that A produces. The graph is
//! read-only after [`DependencyGraph::build`] and is shared between
//! threads without locking.

pub mod dependency;
pub mod dump;

pub use dependency::{DependencyGraph, GraphStats, ReadinessView};

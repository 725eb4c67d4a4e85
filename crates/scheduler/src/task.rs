use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use hive_core::{AlgorithmNode, DataKey, EventContext, HiveError, HiveResult};

use crate::data::EventData;

/// Error type for algorithm execution.
#[derive(Debug, thiserror::Error)]
pub enum AlgorithmError {
    #[error("algorithm failed: {0}")]
    Failed(String),
    #[error("algorithm panicked: {0}")]
    Panicked(String),
    #[error("declared output '{0}' was not produced")]
    MissingOutput(DataKey),
    #[error(transparent)]
    Data(#[from] HiveError),
}

impl AlgorithmError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Outcome of an algorithm lifecycle call.
pub type Status = Result<(), AlgorithmError>;

/// A unit of computation the scheduler can run.
///
/// The resource pool calls `initialize` once per instance at
/// configuration, `execute` once per event the instance is handed, and
/// `finalize` once at teardown. `execute` receives the event's context
/// and a view of its data; reentrant algorithms must tolerate concurrent
/// `execute` calls on the same instance.
pub trait Algorithm: Send + Sync {
    fn initialize(&mut self) -> Status {
        Ok(())
    }

    fn execute(&self, ctx: &EventContext, data: &mut EventData<'_>) -> Status;

    fn finalize(&mut self) -> Status {
        Ok(())
    }
}

/// Builds a fresh algorithm instance from its node description.
pub type AlgorithmFactory = Arc<dyn Fn(&AlgorithmNode) -> Box<dyn Algorithm> + Send + Sync>;

/// Factories keyed by algorithm type.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    factories: HashMap<String, AlgorithmFactory>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `type_name`, replacing any previous one.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&AlgorithmNode) -> Box<dyn Algorithm> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.into(), Arc::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Instantiate the algorithm for `node` through its type's factory.
    pub fn create(&self, node: &AlgorithmNode) -> HiveResult<Box<dyn Algorithm>> {
        let factory = self
            .factories
            .get(node.type_name())
            .ok_or_else(|| HiveError::UnknownAlgorithm(node.type_name().to_string()))?;
        Ok(factory(node))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("AlgorithmRegistry").field("types", &types).finish()
    }
}

use thiserror::Error;

use crate::key::DataKey;

/// Problems in the static algorithm configuration. Detected before the
/// scheduler starts; any of these prevents startup.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("data key '{key}' is produced by both '{first}' and '{second}'")]
    AmbiguousProducer {
        key: DataKey,
        first: String,
        second: String,
    },

    #[error("algorithm '{algorithm}' requires '{key}' but nothing produces it")]
    MissingProducer { algorithm: String, key: DataKey },

    #[error("circular data dependency between: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("algorithm '{0}' is declared more than once")]
    DuplicateAlgorithm(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run-time errors of the whiteboard, resource pool and scheduler.
#[derive(Error, Debug)]
pub enum HiveError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("capacity exceeded: {in_flight} of {max} event slots in use")]
    CapacityExceeded { in_flight: usize, max: usize },

    #[error("data key '{key}' already produced in slot {slot}")]
    DuplicateProduction { key: DataKey, slot: usize },

    #[error("algorithm '{algorithm}' wrote undeclared output '{key}'")]
    UndeclaredOutput { algorithm: String, key: DataKey },

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("slot {0} is not in use")]
    InvalidSlot(usize),

    #[error("illegal state transition of '{algorithm}' in slot {slot}: {from} -> {to}")]
    InvalidTransition {
        algorithm: String,
        slot: usize,
        from: String,
        to: String,
    },

    #[error("instance of '{0}' released without a matching acquire")]
    DoubleRelease(String),

    #[error("algorithm '{algorithm}' failed to initialize: {reason}")]
    AlgorithmInitialization { algorithm: String, reason: String },

    #[error("algorithm '{algorithm}' failed to finalize: {reason}")]
    AlgorithmFinalization { algorithm: String, reason: String },

    #[error("instance of '{0}' is still in use")]
    InstanceInUse(String),

    #[error("task pool error: {0}")]
    TaskPool(String),

    #[error("scheduler is stopped")]
    Stopped,

    #[error("scheduler failed: {0}")]
    SchedulerFailed(String),
}

impl HiveError {
    /// Errors that indicate a bug in the scheduling core rather than in
    /// user code or configuration.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::DoubleRelease(_) | Self::UnknownAlgorithm(_)
        )
    }
}

pub type HiveResult<T> = Result<T, HiveError>;

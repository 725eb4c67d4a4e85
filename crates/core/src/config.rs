use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::node::AlgorithmNode;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Top-level config ────────────────────────────────────────────────

/// Full job configuration: scheduler knobs plus the algorithm list.
///
/// Parsed from TOML with support for environment variable overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HiveConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Algorithm nodes in declaration order.
    #[serde(default, rename = "algorithm", alias = "algorithms")]
    pub algorithms: Vec<AlgorithmNode>,
}

/// Concurrency settings of the scheduler and resource pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of events processed concurrently (whiteboard slots).
    #[serde(default = "default_max_events_in_flight")]
    pub max_events_in_flight: usize,

    /// Worker threads in the task pool (0 = available parallelism).
    #[serde(default)]
    pub thread_pool_size: usize,

    /// Create clones of cloneable algorithms on first demand instead of
    /// all at startup.
    #[serde(default)]
    pub lazy_clone_creation: bool,

    /// Log the per-algorithm instance-miss table at finalize.
    #[serde(default = "default_count_instance_misses")]
    pub count_instance_misses: bool,
}

fn default_max_events_in_flight() -> usize {
    1
}

fn default_count_instance_misses() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_events_in_flight: default_max_events_in_flight(),
            thread_pool_size: 0,
            lazy_clone_creation: false,
            count_instance_misses: default_count_instance_misses(),
        }
    }
}

impl SchedulerConfig {
    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_thread_pool_size(&self) -> usize {
        if self.thread_pool_size == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.thread_pool_size
        }
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `HIVE_MAX_EVENTS_IN_FLIGHT` → `scheduler.max_events_in_flight`
    /// - `HIVE_THREAD_POOL_SIZE` → `scheduler.thread_pool_size`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("HIVE_MAX_EVENTS_IN_FLIGHT") {
            match v.parse::<usize>() {
                Ok(n) => self.max_events_in_flight = n,
                Err(_) => tracing::warn!(value = %v, "ignoring non-numeric HIVE_MAX_EVENTS_IN_FLIGHT"),
            }
        }
        if let Ok(v) = std::env::var("HIVE_THREAD_POOL_SIZE") {
            match v.parse::<usize>() {
                Ok(n) => self.thread_pool_size = n,
                Err(_) => tracing::warn!(value = %v, "ignoring non-numeric HIVE_THREAD_POOL_SIZE"),
            }
        }
    }
}

// ── Loading & Validation ────────────────────────────────────────────

impl HiveConfig {
    pub fn new(scheduler: SchedulerConfig, algorithms: Vec<AlgorithmNode>) -> Self {
        Self {
            scheduler,
            algorithms,
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigurationError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.scheduler.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Validate scalar settings and algorithm declarations.
    ///
    /// Data-flow problems (producers, cycles) are checked when the
    /// dependency graph is built.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.scheduler.max_events_in_flight == 0 {
            return Err(ConfigurationError::Invalid(
                "max_events_in_flight must be at least 1".into(),
            ));
        }

        let mut seen = HashSet::new();
        for node in &self.algorithms {
            validate_node(node)?;
            if !seen.insert(node.name.as_str()) {
                return Err(ConfigurationError::DuplicateAlgorithm(node.name.clone()));
            }
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  scheduler:   events_in_flight={}, threads={}, lazy_clones={}",
            self.scheduler.max_events_in_flight,
            self.scheduler.resolved_thread_pool_size(),
            self.scheduler.lazy_clone_creation
        );
        tracing::info!("  algorithms:  {}", self.algorithms.len());
        for node in &self.algorithms {
            tracing::debug!(
                "    {} [{}] class={} clones={} in={} out={}",
                node.name,
                node.type_name(),
                node.resource_class,
                node.instance_capacity(),
                node.inputs.len(),
                node.outputs.len()
            );
        }
    }
}

fn validate_node(node: &AlgorithmNode) -> Result<(), ConfigurationError> {
    if node.name.trim().is_empty() {
        return Err(ConfigurationError::Invalid("algorithm with empty name".into()));
    }
    if node.max_clones == 0 {
        return Err(ConfigurationError::Invalid(format!(
            "algorithm '{}' has max_clones = 0",
            node.name
        )));
    }
    let mut outputs = HashSet::new();
    for key in &node.outputs {
        if !outputs.insert(key) {
            return Err(ConfigurationError::Invalid(format!(
                "algorithm '{}' declares output '{}' twice",
                node.name, key
            )));
        }
    }
    Ok(())
}

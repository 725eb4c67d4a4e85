//! Synthetic CPU-bound algorithm used by `hive-run`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;
use std::time::{Duration, Instant};

use hive_core::{AlgorithmNode, EventContext};
use hive_scheduler::{Algorithm, AlgorithmError, EventData, Status};

/// Burns a configurable amount of wall time per event and checks that
/// every input it reads belongs to the event it is running for.
///
/// Parameters, all optional:
///
/// | key               | meaning                                           |
/// |-------------------|---------------------------------------------------|
/// | `avg_runtime_ms`  | mean runtime per event                            |
/// | `var_runtime_ms`  | maximum deviation from the mean                   |
/// | `sleep_fraction`  | share of the runtime spent sleeping, `0.0..=1.0`  |
/// | `fail_on_events`  | event numbers on which execution fails            |
#[derive(Debug, Clone)]
pub struct CpuCruncher {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    avg_runtime: Duration,
    var_runtime: Duration,
    sleep_fraction: f64,
    fail_on_events: Vec<u64>,
    invalid: Option<String>,
}

impl CpuCruncher {
    pub fn from_node(node: &AlgorithmNode) -> Self {
        let mut invalid = None;
        let mut millis = |key: &str| match node.params.get(key) {
            None => Duration::ZERO,
            Some(value) => match as_f64(value) {
                Some(ms) if ms >= 0.0 => Duration::from_micros((ms * 1000.0).round() as u64),
                _ => {
                    invalid = Some(format!("'{key}' must be a non-negative number"));
                    Duration::ZERO
                }
            },
        };
        let avg_runtime = millis("avg_runtime_ms");
        let var_runtime = millis("var_runtime_ms");

        let sleep_fraction = match node.params.get("sleep_fraction").map(as_f64) {
            None => 0.0,
            Some(Some(f)) if (0.0..=1.0).contains(&f) => f,
            Some(_) => {
                invalid = Some("'sleep_fraction' must be between 0 and 1".into());
                0.0
            }
        };

        let fail_on_events = match node.params.get("fail_on_events") {
            None => Vec::new(),
            Some(toml::Value::Array(items)) => {
                let events: Vec<u64> = items
                    .iter()
                    .filter_map(|v| v.as_integer())
                    .filter_map(|n| u64::try_from(n).ok())
                    .collect();
                if events.len() != items.len() {
                    invalid = Some("'fail_on_events' must list event numbers".into());
                }
                events
            }
            Some(_) => {
                invalid = Some("'fail_on_events' must be an array".into());
                Vec::new()
            }
        };

        Self {
            name: node.name.clone(),
            inputs: node.inputs.iter().map(|k| k.to_string()).collect(),
            outputs: node.outputs.iter().map(|k| k.to_string()).collect(),
            avg_runtime,
            var_runtime,
            sleep_fraction,
            fail_on_events,
            invalid,
        }
    }

    /// Runtime for one event: the mean shifted by a jitter that depends
    /// only on the algorithm name and event number.
    pub fn runtime_for(&self, event_number: u64) -> Duration {
        if self.var_runtime.is_zero() {
            return self.avg_runtime;
        }
        let mut hasher = DefaultHasher::new();
        self.name.hash(&mut hasher);
        event_number.hash(&mut hasher);
        // uniform in [-1, 1]
        let unit = (hasher.finish() % 2001) as f64 / 1000.0 - 1.0;
        let secs = self.avg_runtime.as_secs_f64() + unit * self.var_runtime.as_secs_f64();
        Duration::from_secs_f64(secs.max(0.0))
    }

    fn crunch(&self, runtime: Duration) {
        let sleep = runtime.mul_f64(self.sleep_fraction);
        if !sleep.is_zero() {
            thread::sleep(sleep);
        }
        let spin = runtime.saturating_sub(sleep);
        let start = Instant::now();
        let mut acc = 0u64;
        while start.elapsed() < spin {
            for i in 0..1_000u64 {
                acc = acc.wrapping_mul(6364136223846793005).wrapping_add(i);
            }
            std::hint::black_box(acc);
        }
    }
}

impl Algorithm for CpuCruncher {
    fn initialize(&mut self) -> Status {
        match &self.invalid {
            Some(reason) => Err(AlgorithmError::failed(reason.clone())),
            None => Ok(()),
        }
    }

    fn execute(&self, ctx: &EventContext, data: &mut EventData<'_>) -> Status {
        let event = ctx.event_number();
        for key in &self.inputs {
            let seen = data.require::<u64>(&key.as_str().into())?;
            if *seen != event {
                return Err(AlgorithmError::failed(format!(
                    "input '{key}' belongs to event {seen}, expected {event}"
                )));
            }
        }

        self.crunch(self.runtime_for(event));

        if self.fail_on_events.contains(&event) {
            return Err(AlgorithmError::failed(format!(
                "{} configured to fail on event {event}",
                self.name
            )));
        }
        for key in &self.outputs {
            data.put(key.as_str(), event)?;
        }
        Ok(())
    }
}

fn as_f64(value: &toml::Value) -> Option<f64> {
    match value {
        toml::Value::Integer(n) => Some(*n as f64),
        toml::Value::Float(f) => Some(*f),
        _ => None,
    }
}

mod cli;
mod cruncher;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use hive_core::{HiveConfig, HiveError};
use hive_graph::DependencyGraph;
use hive_scheduler::{Algorithm, AlgorithmRegistry, CompletedEvent, EventStatus, Scheduler};

use crate::cli::{CliArgs, GraphFormat};
use crate::cruncher::CpuCruncher;

fn main() -> Result<()> {
    hive_core::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    config.log_summary();

    if let Some(format) = args.dump_graph {
        let graph = DependencyGraph::build(config.algorithms.clone())?;
        match format {
            GraphFormat::Text => print!("{}", graph.dump_data_flow()),
            GraphFormat::Dot => print!("{}", graph.to_dot()),
        }
        return Ok(());
    }

    let registry = cruncher_registry(&config);
    let scheduler = Scheduler::new(config, &registry).context("failed to configure scheduler")?;
    let summary = run(&scheduler, args.events)?;

    info!(
        events = summary.total(),
        succeeded = summary.succeeded,
        failed = summary.failed,
        stalled = summary.stalled,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "run complete"
    );
    if summary.failed + summary.stalled > 0 {
        warn!(
            "{} of {} events did not finish cleanly",
            summary.failed + summary.stalled,
            summary.total()
        );
    }

    if args.metrics_json {
        println!("{}", serde_json::to_string_pretty(&scheduler.metrics())?);
    }

    scheduler.finalize().context("failed to finalize algorithms")?;
    Ok(())
}

/// Load the job file, then apply command-line overrides.
fn load_config(args: &CliArgs) -> Result<HiveConfig> {
    let mut config = HiveConfig::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(threads) = args.threads {
        config.scheduler.thread_pool_size = threads;
    }
    if let Some(max) = args.max_in_flight {
        config.scheduler.max_events_in_flight = max;
    }
    config.validate()?;
    Ok(config)
}

/// Back every algorithm type named in the job with the CPU cruncher.
fn cruncher_registry(config: &HiveConfig) -> AlgorithmRegistry {
    let types: BTreeSet<&str> = config.algorithms.iter().map(|a| a.type_name()).collect();
    let mut registry = AlgorithmRegistry::new();
    for type_name in types {
        debug!(type_name, "registering cpu cruncher");
        registry.register(type_name, |node| {
            Box::new(CpuCruncher::from_node(node)) as Box<dyn Algorithm>
        });
    }
    registry
}

#[derive(Debug, Default)]
struct RunSummary {
    succeeded: u64,
    failed: u64,
    stalled: u64,
    elapsed: Duration,
}

impl RunSummary {
    fn record(&mut self, event: &CompletedEvent) {
        match event.status {
            EventStatus::Success => self.succeeded += 1,
            EventStatus::AlgorithmFailed => {
                self.failed += 1;
                warn!(
                    event = event.event_number(),
                    failed = ?event.failed_algorithms,
                    "event failed"
                );
            }
            EventStatus::Stalled => self.stalled += 1,
        }
    }

    fn total(&self) -> u64 {
        self.succeeded + self.failed + self.stalled
    }
}

/// Feed events `0..events`, retiring finished ones whenever every slot
/// is busy, then drain.
fn run(scheduler: &Scheduler, events: u64) -> Result<RunSummary> {
    let started = Instant::now();
    let mut summary = RunSummary::default();

    for event in 0..events {
        loop {
            match scheduler.add_event(event) {
                Ok(ctx) => {
                    debug!(%ctx, "event added");
                    break;
                }
                Err(HiveError::CapacityExceeded { .. }) => match scheduler.pop_finished_event() {
                    Some(done) => summary.record(&done),
                    None => bail!("no slot free and no event in flight"),
                },
                Err(e) => return Err(e).with_context(|| format!("failed to add event {event}")),
            }
        }
    }

    scheduler.stop_run();
    while let Some(done) = scheduler.pop_finished_event() {
        summary.record(&done);
    }
    if let Some(reason) = scheduler.failure() {
        bail!("scheduler stopped: {reason}");
    }

    summary.elapsed = started.elapsed();
    Ok(summary)
}

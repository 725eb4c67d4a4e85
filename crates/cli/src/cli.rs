use std::path::PathBuf;

use clap::Parser;

/// Run a configured algorithm graph over a stream of synthetic events.
///
/// Every algorithm in the job file is backed by a CPU cruncher whose
/// runtime and failures are set by its `params` table.
#[derive(Parser, Debug)]
#[command(name = "hive-run", about = "Concurrent event scheduler driver")]
pub struct CliArgs {
    /// Job configuration file (scheduler settings and algorithm list)
    #[arg(long, env = "HIVE_CONFIG", default_value = "config/hive.toml")]
    pub config: PathBuf,

    /// Number of events to process
    #[arg(long, default_value = "100")]
    pub events: u64,

    /// Worker threads (overrides the config file; 0 = available parallelism)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Events in flight at once (overrides the config file)
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Print the data-flow graph and exit. `text` or `dot`.
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "text")]
    pub dump_graph: Option<GraphFormat>,

    /// Print the final scheduler metrics as JSON
    #[arg(long)]
    pub metrics_json: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
}

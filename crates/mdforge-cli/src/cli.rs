use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "mdforge CLI - Builds a resumable, per-molecule archive dataset from molecular-dynamics trajectories.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build per-molecule archives for every identifier in the run window.
    Build(BuildArgs),
    /// Print the batch window and how many identifiers still need an archive.
    Plan(BuildArgs),
    /// Print the group tree, attributes and dataset shapes of an archive.
    Inspect(InspectArgs),
    /// Internal entry point of a child worker process.
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Arguments shared by the `build` and `plan` subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    // --- Inputs & Outputs ---
    /// Path to the accepted identifier list, one identifier per line.
    #[arg(short = 'l', long, required = true, value_name = "PATH")]
    pub identifiers: PathBuf,

    /// Directory containing one `<identifier>.pdb` structure per molecule.
    #[arg(long, value_name = "PATH")]
    pub structure_dir: Option<PathBuf>,

    /// Root of the trajectory tree (`<root>/<id>/<id>_<T>_<replica>/`).
    #[arg(long, value_name = "PATH")]
    pub trajectory_dir: Option<PathBuf>,

    /// Output archive directory. Created if absent.
    #[arg(short = 'o', long, value_name = "PATH")]
    pub archive_dir: Option<PathBuf>,

    /// Path to an optional configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Scheduling ---
    /// Number of identifiers per batch.
    #[arg(short = 'b', long, value_name = "NUM")]
    pub batch_size: Option<usize>,

    /// Index of the first batch to run.
    #[arg(long, value_name = "INDEX")]
    pub start_batch: Option<usize>,

    /// Number of batches to run from the start batch.
    #[arg(long, value_name = "NUM")]
    pub to_run_batches: Option<usize>,

    /// Number of batches processed concurrently.
    #[arg(short = 'w', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// How workers are isolated: 'process' or 'thread'.
    #[arg(long, value_name = "MODE")]
    pub isolation: Option<String>,

    // --- Dataset Layout ---
    /// Simulation temperatures in kelvin, comma separated.
    #[arg(short = 't', long, value_delimiter = ',', value_name = "T,T,...")]
    pub temperatures: Option<Vec<u32>>,

    /// Number of replicas simulated per temperature.
    #[arg(short = 'r', long, value_name = "NUM")]
    pub replicas: Option<usize>,

    /// Atoms kept in the archive: 'all', 'protein' or 'protein-heavy'.
    #[arg(long, value_name = "FILTER")]
    pub filter: Option<String>,

    /// Threads each worker uses for per-frame analysis.
    #[arg(short = 'j', long, value_name = "NUM")]
    pub analysis_threads: Option<usize>,

    // --- Generic Overrides ---
    /// Override any configuration value using a key-value pair (e.g., -S schedule.batch-size=20).
    /// Can be used multiple times.
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to an archive produced by `mdforge build`.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Snapshot describing the run this worker belongs to.
    #[arg(long, required = true, value_name = "PATH")]
    pub snapshot: PathBuf,
}

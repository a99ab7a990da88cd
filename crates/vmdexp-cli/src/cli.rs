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
    about = "vmdexp - compose virtual molecular-dynamics experiments into engine inputs and launch them in batches.",
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

    /// Write logs to this file instead of the session log
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used to compose simulations in parallel.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compose a simulation pool, pack it into sets and write the session.
    Compose(ComposeArgs),
    /// Submit the sets of a materialized session to a backend.
    Launch(LaunchArgs),
}

/// Arguments for the `compose` subcommand.
#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Path to the simulation pool (.json or .toml).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub pool: PathBuf,

    /// Directory under which the session directory is created.
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub output: PathBuf,

    /// Replace set directories left over from a previous run.
    #[arg(long)]
    pub overwrite: bool,
}

/// The backend a session is submitted to.
#[derive(Args, Debug, Clone, Copy, Default)]
#[group(required = false, multiple = false)]
pub struct BackendSelector {
    /// Run sets on this machine, one worker per GPU (default).
    #[arg(long)]
    pub local: bool,
    /// Submit sets to an LSF-like scheduler with `bsub`.
    #[arg(long)]
    pub liquid: bool,
    /// Submit sets to SLURM with `sbatch`.
    #[arg(long)]
    pub slurm: bool,
}

/// Arguments for the `launch` subcommand.
#[derive(Args, Debug)]
pub struct LaunchArgs {
    /// Path to the session manifest written by `compose`.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub session: PathBuf,

    #[command(flatten)]
    pub backend: BackendSelector,

    /// GPU ids for the local backend; one worker per entry.
    #[arg(long, value_name = "INT", num_args = 1..)]
    pub gpu: Vec<usize>,

    /// Cluster nodes to submit to.
    #[arg(long, value_name = "NAME", num_args = 1..)]
    pub node: Vec<String>,

    /// SLURM partitions; a single partition is shared by every node.
    #[arg(long, value_name = "NAME", num_args = 1..)]
    pub partition: Vec<String>,

    /// Jobs per node slot, one value per `--node`.
    #[arg(long, value_name = "INT", num_args = 1..)]
    pub filling: Vec<usize>,

    /// Environment modules loaded before the engine runs (SLURM).
    #[arg(long, value_name = "NAME", num_args = 1..)]
    pub modules: Vec<String>,

    /// Shell snippet appended to every job script.
    #[arg(long = "postScript", value_name = "SCRIPT")]
    pub post_script: Option<String>,

    /// Override the engine binary.
    #[arg(long, value_name = "BINARY")]
    pub engine: Option<String>,

    /// Launcher configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

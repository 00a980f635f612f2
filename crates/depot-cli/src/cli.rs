use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "depot",
    about = "Depot: blob store groups, sessions and reconciliation logs",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check every group in a topology file against the group rules
    Validate(ValidateArgs),
    /// Print the time-bucket prefixes covering a range
    Prefixes(PrefixesArgs),
    /// List blobs recorded in a store's reconciliation log
    Replay(ReplayArgs),
    /// Drive writes through the groups of a topology and report placement
    Simulate(SimulateArgs),
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Topology file (TOML)
    pub topology: PathBuf,
    /// Report only the first violation of each group
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Args)]
pub struct PrefixesArgs {
    /// Range start, e.g. `2021-04-13 10:00:00`
    #[arg(long)]
    pub from: String,
    /// Range end, inclusive
    #[arg(long)]
    pub to: String,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Base work directory
    #[arg(long)]
    pub work_dir: PathBuf,
    /// Store whose log to read
    #[arg(long)]
    pub store: String,
    /// Cut-off date or timestamp
    #[arg(long)]
    pub since: String,
    /// Logical log directory name under the work directory
    #[arg(long)]
    pub directory_name: Option<String>,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Topology file (TOML)
    pub topology: PathBuf,
    /// Writes per group
    #[arg(long, default_value_t = 100)]
    pub writes: usize,
    /// Only drive this group
    #[arg(long)]
    pub group: Option<String>,
    /// Log creations to reconciliation logs under this directory
    #[arg(long)]
    pub work_dir: Option<PathBuf>,
    /// Roll back every Nth session instead of committing it
    #[arg(long)]
    pub rollback_every: Option<usize>,
}

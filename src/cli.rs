//! CLI surface: only the subset of commands that drive the core. Output
//! formatting here is intentionally minimal.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "conveyor", about = "Cloud-to-cloud bulk transfer coordinator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Credential pool operations.
    #[command(subcommand)]
    Credentials(CredentialsCommand),

    /// Transfer coordinator operations.
    #[command(subcommand)]
    Parallel(ParallelCommand),
}

#[derive(Subcommand, Debug)]
pub enum CredentialsCommand {
    /// Bulk-load credentials from a directory.
    Import { path: PathBuf },

    /// Add one credential from a blob file.
    Add {
        provider: String,
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        daily_limit_bytes: Option<u64>,
    },

    /// Print per-credential quotas.
    Status,

    /// Print aggregate remaining quota, optionally for one provider.
    Quota { provider: Option<String> },
}

#[derive(Subcommand, Debug)]
pub enum ParallelCommand {
    /// Begin a coordinator job.
    Start {
        src: String,
        dst: String,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long)]
        largest_first: Option<bool>,
        #[arg(long)]
        enumerate_first: Option<bool>,
    },

    /// Print the current job's status snapshot.
    Status,

    /// Pause the current job.
    Pause,

    /// Resume a paused job.
    Resume,

    /// Abort the current job.
    Abort,
}

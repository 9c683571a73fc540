//! Command-line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Corten AOT tool: inspect bytecode files, warm their constant pools and
/// produce AOT snapshots.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "corten-aot", version, about)]
pub struct Cli {
    /// Loader worker threads (defaults to the available parallelism)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show classes, records and methods of bytecode files
    Inspect {
        /// Bytecode files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Create the constant pools of every method and resolve all entries
    Resolve {
        /// Bytecode files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Threads resolving each pool concurrently
        #[arg(short, long, default_value_t = 1)]
        threads: usize,
    },

    /// Record literal layouts and write an AOT snapshot
    Snapshot {
        /// Bytecode files, in snapshot order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Snapshot path; stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore constant pools of bytecode files from a snapshot
    Restore {
        /// Snapshot written by `snapshot`
        snapshot: PathBuf,

        /// Bytecode files, in the order the snapshot was taken
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

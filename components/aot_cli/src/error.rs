//! Error types for the CLI

use bytecode_system::LoadError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// A bytecode file failed to load
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A snapshot file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// Path that was read
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// An output file could not be written
    #[error("cannot write {}: {source}", path.display())]
    Write {
        /// Path that was written
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Writing the report failed
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// Snapshot JSON did not parse or serialize
    #[error("snapshot error: {0}")]
    Json(#[from] serde_json::Error),

    /// The snapshot was taken over a different file list
    #[error("snapshot covers {snapshot} files but {given} were given")]
    SnapshotMismatch {
        /// Files in the snapshot
        snapshot: usize,
        /// Files on the command line
        given: usize,
    },
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

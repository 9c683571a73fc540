//! Corten AOT tool library
//!
//! Argument parsing, the command implementations and their reports. The
//! binary only installs logging and calls [`run`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::{Cli, Command};
pub use commands::{run, FileSummary, PoolReport, RestoreReport, Workspace};
pub use error::{CliError, CliResult};

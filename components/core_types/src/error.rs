//! Fatal invariant reporting.
//!
//! Decoding problems are ordinary `Result`s owned by the crate that decodes.
//! What remains here is the class of failures that indicate a toolchain or
//! compiler-environment bug: these are logged and then terminate the caller.

use std::fmt;
use thiserror::Error;

/// The kind of invariant that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FatalKind {
    /// The bytecode file decoded but its contents are inconsistent
    #[error("bytecode file invariant violated")]
    FileFormat,
    /// A constant pool index was read as the wrong literal kind
    #[error("literal kind mismatch")]
    LiteralKind,
    /// No method literal exists for a recorded offset
    #[error("missing method literal")]
    MissingMethod,
    /// A bounded table or counter ran out of room
    #[error("capacity exhausted")]
    Capacity,
    /// A caller broke a documented precondition
    #[error("precondition violated")]
    Precondition,
}

/// Log a fatal diagnostic and panic.
///
/// Prefer the [`fatal!`](crate::fatal) macro, which builds the arguments.
#[cold]
#[track_caller]
pub fn fatal_error(kind: FatalKind, args: fmt::Arguments<'_>) -> ! {
    tracing::error!(target: "corten::fatal", %kind, "{}", args);
    panic!("{}: {}", kind, args)
}

/// Report a fatal invariant violation.
///
/// ```should_panic
/// use core_types::{fatal, FatalKind};
///
/// fatal!(FatalKind::MissingMethod, "no method at offset {}", 0x40);
/// ```
#[macro_export]
macro_rules! fatal {
    ($kind:expr, $($arg:tt)+) => {
        $crate::error::fatal_error($kind, format_args!($($arg)+))
    };
}

//! Bytecode file loading for the runtime caching layer
//!
//! This crate decodes the binary class/method container and turns it into
//! addressable in-memory method records.
//!
//! # Features
//!
//! - Container encoder and decoder with version and checksum checks
//! - Bundle / merged packaging detection and per-record module flags
//! - Method literal arena filled in parallel by a fixed worker pool
//! - Offset-indexed method lookup
//!
//! # Example
//!
//! ```
//! use bytecode_system::file_format::{ClassBuilder, FileBuilder, MethodBuilder};
//! use bytecode_system::{BytecodeFile, LoaderConfig, LoaderState, LiteralValue};
//!
//! let mut builder = FileBuilder::new();
//! builder.add_class(
//!     ClassBuilder::new("Lpkg/a;")
//!         .field("isCommonjs", LiteralValue::Boolean(true))
//!         .method(MethodBuilder::new("func_main_0")),
//! );
//! let encoded = builder.build();
//!
//! let state = LoaderState::new(LoaderConfig::default().with_workers(2));
//! let file = BytecodeFile::load(&state, "app.abc", encoded.bytes).unwrap();
//! assert!(!file.is_bundle_pack());
//! assert!(file.is_cjs("pkg/a"));
//! assert_eq!(file.main_method_index("pkg/a"), Some(encoded.method_offsets[0]));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bytecode_file;
pub mod file_format;
pub mod literal;
pub mod method_literal;
pub mod task_pool;

// Re-export main types at crate root
pub use bytecode_file::{
    parse_record_name, BytecodeFile, LoadError, Packaging, RecordInfo, ENTRY_FUNCTION_NAME,
};
pub use file_format::FileFormatError;
pub use literal::{ConstantEntry, ConstantKind, LiteralValue};
pub use method_literal::{FunctionKind, MethodLiteral, MethodLiteralArena};
pub use task_pool::{LoaderConfig, LoaderState, TaskCounter, TaskGuard, TaskPool};

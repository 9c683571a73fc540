//! Constant pool cache and profile-guided type manager
//!
//! This crate holds the runtime state shared between interpreter threads and
//! the AOT/JIT compilers:
//! - Shared and unshared constant pools resolving each entry at most once
//! - A per-context pool registry and the process-wide [`Runtime`]
//! - Host thread state and the [`HostRunning`] capability token
//! - The [`TypeManager`] recording hidden classes and building AOT snapshots
//!
//! # Example
//!
//! ```
//! use bytecode_system::file_format::{ClassBuilder, FileBuilder, MethodBuilder};
//! use bytecode_system::{ConstantEntry, ConstantKind};
//! use vm_runtime::{EcmaContext, Runtime, RuntimeOptions};
//!
//! let mut builder = FileBuilder::new();
//! let hello = builder.string("hello");
//! let header = builder.index_header(vec![ConstantEntry::new(ConstantKind::String, hello)]);
//! builder.add_class(
//!     ClassBuilder::new("Lmain;")
//!         .method(MethodBuilder::new("func_main_0").with_index_header(header)),
//! );
//! let encoded = builder.build();
//!
//! let runtime = Runtime::new(RuntimeOptions::default().with_loader_workers(1));
//! let file = runtime.load_file("hello.abc", encoded.bytes).unwrap();
//! let context = EcmaContext::new(runtime.clone());
//!
//! let pool = context.find_or_create_constpool(&file, encoded.method_offsets[0]);
//! let value = pool.get_string_from_cache(0);
//! assert_eq!(runtime.heap().string(value).as_deref(), Some("hello"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constant_pool;
pub mod context;
pub mod proto_transition;
pub mod runtime;
pub mod snapshot;
pub mod thread;
pub mod type_manager;

// Re-export main types at crate root
pub use constant_pool::{ConstantPool, ExtensionSlot, PoolKind, PoolLayout, RESERVED_POOL_LENGTH};
pub use context::{EcmaContext, UNSHARED_CONSTPOOL_LIMIT};
pub use proto_transition::{ProtoTransRequest, ProtoTransitionEdge, ProtoTransitionTable};
pub use runtime::{Builtins, Runtime, RuntimeOptions};
pub use snapshot::{
    AotPoolEntry, AotPoolImage, AotSnapshot, ConstantIndexEntry, HClassTableEntry, SymbolEntry,
};
pub use thread::{HostRunning, JsThread, ThreadState};
pub use type_manager::{JitLocalHClassTable, TypeManager, JIT_HCLASS_TABLE_LIMIT};

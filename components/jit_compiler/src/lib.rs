//! Compiler-side services for the Corten runtime
//!
//! This crate provides:
//! - Compilation environments: what AOT and JIT compilation may read from the VM
//! - A block IR for creation operations
//! - Typed lowering: inline allocation or runtime calls with exception checks
//!
//! # Example
//!
//! ```
//! use jit_compiler::ir::{IRFunction, IROpcode, Terminator};
//! use jit_compiler::{lower, AotCompilationEnv, CompilationEnv};
//! use bytecode_system::file_format::{ClassBuilder, FileBuilder, MethodBuilder};
//! use std::sync::Arc;
//! use vm_runtime::{EcmaContext, Runtime, RuntimeOptions};
//!
//! let mut builder = FileBuilder::new();
//! builder.index_header(vec![]);
//! builder.add_class(ClassBuilder::new("Lmain;").method(MethodBuilder::new("func_main_0")));
//! let encoded = builder.build();
//!
//! let runtime = Runtime::new(RuntimeOptions::default().with_loader_workers(1));
//! let file = runtime.load_file("main.abc", encoded.bytes).unwrap();
//! let context = Arc::new(EcmaContext::new(runtime));
//! let env = AotCompilationEnv::new(context, file, encoded.method_offsets[0]);
//!
//! let mut ir = IRFunction::new(env.method_offset(), 0);
//! let entry = ir.entry();
//! let array = ir.emit(entry, IROpcode::CreateEmptyArray, 0);
//! ir.terminate(entry, Terminator::Return(array));
//!
//! let stats = lower(&env, &mut ir);
//! assert_eq!(stats.inlined, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compilation_env;
pub mod ir;
pub mod jit_env;
pub mod lowering;

// Re-export main types at crate root
pub use compilation_env::{AotCompilationEnv, CompilationEnv, HeapConstantInfo};
pub use ir::{IRFunction, IROpcode};
pub use jit_env::{JitCompilationEnv, JitHandle};
pub use lowering::{lower, LoweringStats, TypedLowering, MAX_TAGGED_ARRAY_LENGTH};

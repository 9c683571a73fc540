//! Integration test suite for the Corten runtime core
//!
//! This crate verifies that components work together across crate
//! boundaries: loading files, resolving pools from several threads,
//! JIT sessions walking profile-slot chains and the AOT snapshot cycle.

/// Re-export components for test convenience
pub mod components {
    pub use aot_cli;
    pub use bytecode_system;
    pub use core_types;
    pub use jit_compiler;
    pub use memory_manager;
    pub use vm_runtime;
}

use bytecode_system::file_format::{ClassBuilder, EncodedFile, FileBuilder, MethodBuilder};
use bytecode_system::{ConstantEntry, ConstantKind, LiteralValue};

/// Methods of [`call_chain_program`], by ordinal.
pub const MAIN: usize = 0;
/// Called by `main` through feedback slot 0.
pub const MIDDLE: usize = 1;
/// Called by `middle` through feedback slot 1.
pub const LEAF: usize = 2;

/// Three methods sharing one index header:
///
/// | index | entry |
/// |-------|-------|
/// | 0 | method `main` |
/// | 1 | method `middle` |
/// | 2 | method `leaf` |
/// | 3 | string `"leaf"` |
/// | 4 | array literal of length 5 |
pub fn call_chain_program() -> EncodedFile {
    let mut builder = FileBuilder::new();
    let name = builder.string("leaf");
    let array = builder.literal((1..=5).map(LiteralValue::Integer).collect());
    let header = builder.index_header(vec![
        ConstantEntry::new(ConstantKind::Method, MAIN as u32),
        ConstantEntry::new(ConstantKind::Method, MIDDLE as u32),
        ConstantEntry::new(ConstantKind::Method, LEAF as u32),
        ConstantEntry::new(ConstantKind::String, name),
        ConstantEntry::new(ConstantKind::ArrayLiteral, array),
    ]);
    builder.add_class(
        ClassBuilder::new("Lmain;")
            .method(MethodBuilder::new("func_main_0").with_index_header(header))
            .method(
                MethodBuilder::new("middle")
                    .with_args(1)
                    .with_index_header(header),
            )
            .method(
                MethodBuilder::new("leaf")
                    .with_args(2)
                    .with_index_header(header),
            ),
    );
    builder.build()
}

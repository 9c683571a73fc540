//! What a compiler pass may ask of the VM.
//!
//! Lowering and specialization never touch the runtime directly. They go
//! through a [`CompilationEnv`], which is implemented once for ahead-of-time
//! compilation on the host thread ([`AotCompilationEnv`]) and once for a
//! JIT session on a background thread ([`crate::JitCompilationEnv`]).

use bytecode_system::{BytecodeFile, ConstantKind};
use core_types::TaggedValue;
use memory_manager::Heap;
use std::sync::Arc;
use vm_runtime::{ConstantPool, EcmaContext, PoolKind};

/// Key of a heap constant referenced by compiled code.
///
/// Compiled code may not embed raw heap references. It refers to pool
/// entries instead, and the session keeps one table row per distinct key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapConstantInfo {
    /// Shared id of the pool the entry lives in
    pub constpool_id: u32,
    /// Entry index
    pub index: u32,
    /// Whether the entry was read from the shared or the unshared pool
    pub kind: PoolKind,
}

impl HeapConstantInfo {
    /// Key for entry `index` of `pool`.
    pub fn for_entry(pool: &ConstantPool, index: u32) -> Self {
        Self {
            constpool_id: pool.shared_id(),
            index,
            kind: pool.kind(),
        }
    }
}

/// Compiler view of the VM.
pub trait CompilationEnv {
    /// Returns true for a JIT session.
    fn is_jit(&self) -> bool;

    /// Heap the compiled code will run against.
    fn heap(&self) -> &Heap;

    /// Offset of the method being compiled.
    fn method_offset(&self) -> u32;

    /// Constant pool used by the method at `method_offset`, or `None` when
    /// it cannot be reached.
    fn get_constant_pool_by_method_offset(&self, method_offset: u32)
        -> Option<Arc<ConstantPool>>;

    /// String entry `index` of the pool of `method_offset`.
    fn get_string_from_cache(&self, method_offset: u32, index: u32) -> Option<TaggedValue>;

    /// Array literal entry `index` of the pool of `method_offset`.
    fn get_array_literal_from_cache(&self, method_offset: u32, index: u32)
        -> Option<TaggedValue>;

    /// Object literal entry `index` of the pool of `method_offset`.
    fn get_object_literal_from_cache(&self, method_offset: u32, index: u32)
        -> Option<TaggedValue>;

    /// Method entry `index` of the pool of `method_offset`.
    fn get_method_from_cache(&self, method_offset: u32, index: u32) -> Option<TaggedValue>;

    /// Layout of array objects.
    fn array_hclass(&self) -> TaggedValue;

    /// Register a heap constant and return its table index. Environments
    /// that may embed heap references directly return `None`.
    fn record_heap_constant(&self, _info: HeapConstantInfo, _value: TaggedValue) -> Option<u32> {
        None
    }
}

/// Environment for ahead-of-time compilation of one file.
///
/// Runs on the host thread, so literal entries are resolved on demand.
#[derive(Debug)]
pub struct AotCompilationEnv {
    context: Arc<EcmaContext>,
    file: Arc<BytecodeFile>,
    method_offset: u32,
}

impl AotCompilationEnv {
    /// Environment for compiling the method at `method_offset` of `file`.
    pub fn new(context: Arc<EcmaContext>, file: Arc<BytecodeFile>, method_offset: u32) -> Self {
        Self {
            context,
            file,
            method_offset,
        }
    }

    /// Move to another method of the same file.
    pub fn set_method_offset(&mut self, method_offset: u32) {
        self.method_offset = method_offset;
    }

    /// File being compiled.
    pub fn file(&self) -> &Arc<BytecodeFile> {
        &self.file
    }

    /// Hidden class recorded at `index` of the AOT snapshot, or undefined.
    pub fn get_hclass_by_index(&self, index: u32) -> TaggedValue {
        self.context
            .runtime()
            .type_manager()
            .get_hclass_by_index(index)
    }

    fn literal(&self, method_offset: u32, index: u32, kind: ConstantKind) -> Option<TaggedValue> {
        let pool = self.get_constant_pool_by_method_offset(method_offset)?;
        if pool.entry_kind(index) != Some(kind) {
            return None;
        }
        Some(pool.get_literal_from_cache(index, kind))
    }
}

impl CompilationEnv for AotCompilationEnv {
    fn is_jit(&self) -> bool {
        false
    }

    fn heap(&self) -> &Heap {
        self.context.runtime().heap()
    }

    fn method_offset(&self) -> u32 {
        self.method_offset
    }

    fn get_constant_pool_by_method_offset(
        &self,
        method_offset: u32,
    ) -> Option<Arc<ConstantPool>> {
        self.file.find_method_literal(method_offset)?;
        Some(
            self.context
                .find_or_create_constpool(&self.file, method_offset),
        )
    }

    fn get_string_from_cache(&self, method_offset: u32, index: u32) -> Option<TaggedValue> {
        self.literal(method_offset, index, ConstantKind::String)
    }

    fn get_array_literal_from_cache(
        &self,
        method_offset: u32,
        index: u32,
    ) -> Option<TaggedValue> {
        self.literal(method_offset, index, ConstantKind::ArrayLiteral)
    }

    fn get_object_literal_from_cache(
        &self,
        method_offset: u32,
        index: u32,
    ) -> Option<TaggedValue> {
        self.literal(method_offset, index, ConstantKind::ObjectLiteral)
    }

    fn get_method_from_cache(&self, method_offset: u32, index: u32) -> Option<TaggedValue> {
        self.literal(method_offset, index, ConstantKind::Method)
    }

    fn array_hclass(&self) -> TaggedValue {
        TaggedValue::heap(self.context.runtime().builtins().array_hclass)
    }
}

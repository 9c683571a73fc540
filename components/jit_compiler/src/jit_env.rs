//! JIT compilation environment
//!
//! A JIT session runs on its own thread while the host context keeps
//! executing. The session reads host pools only while the host thread is
//! running, never derives pool entries itself, and reaches callee pools
//! through the frozen [`ProfileSlotChain`] captured when the compile was
//! requested.

use crate::compilation_env::{CompilationEnv, HeapConstantInfo};
use bytecode_system::ConstantKind;
use core_types::{fatal, FatalKind, ProfileSlotChain, TaggedValue};
use memory_manager::Heap;
use parking_lot::Mutex;
use std::sync::Arc;
use vm_runtime::{ConstantPool, EcmaContext, HostRunning, JitLocalHClassTable, JsThread};

/// Pinned reference to a host value, valid for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JitHandle(u32);

impl JitHandle {
    /// Position in the session's handle table.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Compilation environment of one JIT session.
#[derive(Debug)]
pub struct JitCompilationEnv {
    host: Arc<EcmaContext>,
    jit_thread: Arc<JsThread>,
    function: TaggedValue,
    method_offset: u32,
    constpool: Arc<ConstantPool>,
    chain: ProfileSlotChain,
    heap_constants: Mutex<Vec<(HeapConstantInfo, TaggedValue)>>,
    hclass_table: Mutex<JitLocalHClassTable>,
    handles: Mutex<Vec<TaggedValue>>,
}

impl JitCompilationEnv {
    /// Session for compiling `function`, which runs on `host`.
    ///
    /// The host thread must be running, and `function` must be a function
    /// object whose method is bound to a constant pool.
    pub fn new(
        host: Arc<EcmaContext>,
        jit_thread: Arc<JsThread>,
        function: TaggedValue,
        chain: ProfileSlotChain,
    ) -> Self {
        let (method_offset, constpool) = {
            let _running = host.thread().assert_running();
            let heap = host.runtime().heap();
            let Some(func) = heap.function(function) else {
                fatal!(FatalKind::Precondition, "{:?} is not a function", function);
            };
            let Some(method) = heap.method(TaggedValue::heap(func.method)) else {
                fatal!(FatalKind::Precondition, "function {:?} has no method", function);
            };
            let Some(pool) = ConstantPool::from_tagged(heap, method.constpool) else {
                fatal!(
                    FatalKind::Precondition,
                    "method at {:#x} has no constant pool",
                    method.offset
                );
            };
            (method.offset, pool)
        };
        let capacity = host.runtime().options().jit_hclass_table_capacity;
        tracing::debug!(
            target: "corten::jit",
            jit_thread = jit_thread.id(),
            method_offset,
            chain_links = chain.len(),
            "jit session opened"
        );
        Self {
            host,
            jit_thread,
            function,
            method_offset,
            constpool,
            chain,
            heap_constants: Mutex::new(Vec::new()),
            hclass_table: Mutex::new(JitLocalHClassTable::new(capacity)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Host context.
    pub fn host(&self) -> &Arc<EcmaContext> {
        &self.host
    }

    /// Thread the session compiles on.
    pub fn jit_thread(&self) -> &Arc<JsThread> {
        &self.jit_thread
    }

    /// Function being compiled.
    pub fn function(&self) -> TaggedValue {
        self.function
    }

    /// Frozen slot chain of the session.
    pub fn slot_chain(&self) -> &ProfileSlotChain {
        &self.chain
    }

    fn host_running(&self) -> HostRunning<'_> {
        self.host.thread().assert_running()
    }

    /// Function object of the method at `method_offset`, found by following
    /// feedback slots from the compiled function along the slot chain.
    pub fn get_js_function_by_method_offset(&self, method_offset: u32) -> Option<TaggedValue> {
        let _running = self.host_running();
        if method_offset == self.method_offset {
            return Some(self.function);
        }
        if self.chain.entry_offset() != self.method_offset {
            return None;
        }
        let heap = self.host.runtime().heap();
        let mut current = self.function;
        let mut current_offset = self.method_offset;
        for (callee_offset, link) in self.chain.path_to(method_offset)? {
            if link.caller_offset != current_offset {
                return None;
            }
            let slot = heap.function(current)?.feedback?.get(link.slot_id)?;
            let callee = slot.callee()?;
            let method = heap.method(TaggedValue::heap(heap.function(callee)?.method))?;
            if method.offset != callee_offset {
                tracing::debug!(
                    target: "corten::jit",
                    slot = link.slot_id,
                    expected = callee_offset,
                    found = method.offset,
                    "feedback slot leads elsewhere"
                );
                return None;
            }
            current = callee;
            current_offset = callee_offset;
        }
        Some(current)
    }

    /// Unshared pool of the host context paired with `pool`.
    pub fn find_or_create_unshared_constpool(&self, pool: &Arc<ConstantPool>) -> Arc<ConstantPool> {
        let _running = self.host_running();
        self.host.find_or_create_unshared_constpool(pool)
    }

    /// Value registered at a heap constant index.
    pub fn heap_constant(&self, index: u32) -> Option<TaggedValue> {
        self.heap_constants
            .lock()
            .get(index as usize)
            .map(|(_, value)| *value)
    }

    /// Number of registered heap constants.
    pub fn heap_constant_count(&self) -> usize {
        self.heap_constants.lock().len()
    }

    /// Session index of `hclass`, interned on first use. `None` once the
    /// session table is full.
    pub fn record_and_get_hclass_index_for_jit(&self, hclass: TaggedValue) -> Option<u32> {
        self.hclass_table.lock().record_and_get_index(hclass)
    }

    /// Hidden class at a session index.
    pub fn get_hclass_for_jit(&self, index: u32) -> Option<TaggedValue> {
        self.hclass_table.lock().get(index)
    }

    /// Pin a host value for the rest of the session.
    pub fn new_handle(&self, value: TaggedValue) -> JitHandle {
        let mut handles = self.handles.lock();
        handles.push(value);
        JitHandle((handles.len() - 1) as u32)
    }

    /// Value behind a handle.
    pub fn handle_value(&self, handle: JitHandle) -> Option<TaggedValue> {
        self.handles.lock().get(handle.0 as usize).copied()
    }

    fn resolved(&self, method_offset: u32, index: u32, kind: ConstantKind) -> Option<TaggedValue> {
        let _running = self.host_running();
        self.get_constant_pool_by_method_offset(method_offset)?
            .get_if_resolved(index, kind)
    }
}

impl CompilationEnv for JitCompilationEnv {
    fn is_jit(&self) -> bool {
        true
    }

    fn heap(&self) -> &Heap {
        self.host.runtime().heap()
    }

    fn method_offset(&self) -> u32 {
        self.method_offset
    }

    fn get_constant_pool_by_method_offset(
        &self,
        method_offset: u32,
    ) -> Option<Arc<ConstantPool>> {
        if method_offset == self.method_offset {
            return Some(self.constpool.clone());
        }
        let function = self.get_js_function_by_method_offset(method_offset)?;
        let heap = self.host.runtime().heap();
        let method = heap.method(TaggedValue::heap(heap.function(function)?.method))?;
        ConstantPool::from_tagged(heap, method.constpool)
    }

    fn get_string_from_cache(&self, method_offset: u32, index: u32) -> Option<TaggedValue> {
        self.resolved(method_offset, index, ConstantKind::String)
    }

    fn get_array_literal_from_cache(
        &self,
        method_offset: u32,
        index: u32,
    ) -> Option<TaggedValue> {
        self.resolved(method_offset, index, ConstantKind::ArrayLiteral)
    }

    fn get_object_literal_from_cache(
        &self,
        method_offset: u32,
        index: u32,
    ) -> Option<TaggedValue> {
        self.resolved(method_offset, index, ConstantKind::ObjectLiteral)
    }

    fn get_method_from_cache(&self, method_offset: u32, index: u32) -> Option<TaggedValue> {
        self.resolved(method_offset, index, ConstantKind::Method)
    }

    fn array_hclass(&self) -> TaggedValue {
        TaggedValue::heap(self.host.runtime().builtins().array_hclass)
    }

    fn record_heap_constant(&self, info: HeapConstantInfo, value: TaggedValue) -> Option<u32> {
        let mut table = self.heap_constants.lock();
        if let Some(pos) = table.iter().position(|(key, _)| *key == info) {
            return Some(pos as u32);
        }
        table.push((info, value));
        Some((table.len() - 1) as u32)
    }
}

//! Per-context constant pool registry.
//!
//! Each [`EcmaContext`] caches the shared pools it has used and owns one
//! unshared pool per shared pool, addressed by the pool's unshared index.

use crate::constant_pool::ConstantPool;
use crate::runtime::Runtime;
use crate::thread::JsThread;
use bytecode_system::BytecodeFile;
use core_types::{fatal, FatalKind, FeedbackVector, FileId, TaggedValue};
use memory_manager::FunctionObject;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Largest unshared pool index a context can hold.
pub const UNSHARED_CONSTPOOL_LIMIT: usize = 10240;

/// Execution context of one host thread.
#[derive(Debug)]
pub struct EcmaContext {
    runtime: Arc<Runtime>,
    thread: Arc<JsThread>,
    cached_pools: RwLock<HashMap<FileId, BTreeMap<u32, Arc<ConstantPool>>>>,
    unshared_pools: RwLock<Vec<Option<Arc<ConstantPool>>>>,
}

impl EcmaContext {
    /// A context on a fresh host thread.
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let thread = runtime.new_thread();
        Self::with_thread(runtime, thread)
    }

    /// A context bound to an existing host thread.
    pub fn with_thread(runtime: Arc<Runtime>, thread: Arc<JsThread>) -> Self {
        let capacity = runtime.options().unshared_capacity;
        Self {
            runtime,
            thread,
            cached_pools: RwLock::new(HashMap::new()),
            unshared_pools: RwLock::new(vec![None; capacity]),
        }
    }

    /// Owning runtime.
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Host thread running this context.
    pub fn thread(&self) -> &Arc<JsThread> {
        &self.thread
    }

    /// Current length of the unshared pool array.
    pub fn unshared_capacity(&self) -> usize {
        self.unshared_pools.read().len()
    }

    /// Shared pool of `(file, index header)`, from this context's cache or
    /// the runtime.
    pub fn find_constpool(
        &self,
        file: &BytecodeFile,
        index_header: u32,
    ) -> Option<Arc<ConstantPool>> {
        if let Some(pool) = self
            .cached_pools
            .read()
            .get(&file.id())
            .and_then(|pools| pools.get(&index_header))
        {
            return Some(pool.clone());
        }
        let pool = self.runtime.find_shared_constpool(file.id(), index_header)?;
        self.add_or_update_constpool(pool.clone());
        Some(pool)
    }

    /// Shared pool used by the method at `method_offset`, created on first
    /// use. Fatal when the file has no such method.
    pub fn find_or_create_constpool(
        &self,
        file: &Arc<BytecodeFile>,
        method_offset: u32,
    ) -> Arc<ConstantPool> {
        let Some(method) = file.find_method_literal(method_offset) else {
            fatal!(
                FatalKind::MissingMethod,
                "{} has no method at {:#x}",
                file.descriptor(),
                method_offset
            );
        };
        if let Some(pool) = self.find_constpool(file, method.index_header) {
            return pool;
        }
        let pool = self.runtime.create_shared_constpool(file, method.index_header);
        self.add_or_update_constpool(pool.clone());
        pool
    }

    /// Cache `pool` for its (file, index header), replacing any older entry.
    pub fn add_or_update_constpool(&self, pool: Arc<ConstantPool>) {
        let file = pool.file().id();
        let header = pool.index_header();
        self.cached_pools
            .write()
            .entry(file)
            .or_default()
            .insert(header, pool);
    }

    /// Unshared pool paired with `shared`.
    pub fn find_unshared_constpool(&self, shared: &ConstantPool) -> Option<Arc<ConstantPool>> {
        self.unshared_pools
            .read()
            .get(shared.unshared_index() as usize)
            .and_then(Clone::clone)
    }

    /// Unshared pool paired with `pool`, derived on first use. An unshared
    /// pool is returned as is.
    pub fn find_or_create_unshared_constpool(
        &self,
        pool: &Arc<ConstantPool>,
    ) -> Arc<ConstantPool> {
        if !pool.is_shared() {
            return pool.clone();
        }
        if let Some(unshared) = self.find_unshared_constpool(pool) {
            return unshared;
        }
        let index = pool.unshared_index() as usize;
        let mut pools = self.unshared_pools.write();
        if let Some(Some(unshared)) = pools.get(index) {
            return unshared.clone();
        }
        grow_unshared(&mut pools, index);
        let unshared = pool.create_unshared();
        pools[index] = Some(unshared.clone());
        tracing::trace!(
            target: "corten::constpool",
            thread = self.thread.id(),
            index,
            "created unshared pool"
        );
        unshared
    }

    /// Drop every pool of `file` from this context. Returns the number of
    /// shared pools removed.
    pub fn erase_unused_constpool(&self, file: &BytecodeFile) -> usize {
        let Some(shared) = self.cached_pools.write().remove(&file.id()) else {
            return 0;
        };
        let mut unshared = self.unshared_pools.write();
        for pool in shared.values() {
            if let Some(slot) = unshared.get_mut(pool.unshared_index() as usize) {
                *slot = None;
            }
        }
        tracing::debug!(
            target: "corten::constpool",
            file = %file.descriptor(),
            pools = shared.len(),
            "erased constant pools"
        );
        shared.len()
    }

    /// Create a function object for the method entry at `index` of `pool`.
    ///
    /// The method is resolved through this context's unshared pool, and the
    /// function gets a fresh feedback vector of `feedback_len` slots.
    pub fn define_function(
        &self,
        pool: &Arc<ConstantPool>,
        index: u32,
        feedback_len: usize,
    ) -> TaggedValue {
        let unshared = self.find_or_create_unshared_constpool(pool);
        let method = unshared.get_method_from_cache(index);
        let Some(method) = method.heap_ref() else {
            fatal!(FatalKind::MissingMethod, "method entry {} did not resolve", index);
        };
        let function = self.runtime.heap().new_function(FunctionObject {
            method,
            feedback: Some(Arc::new(FeedbackVector::new(feedback_len))),
            module: TaggedValue::UNDEFINED,
        });
        TaggedValue::heap(function)
    }
}

fn grow_unshared(pools: &mut Vec<Option<Arc<ConstantPool>>>, index: usize) {
    if index >= UNSHARED_CONSTPOOL_LIMIT {
        fatal!(
            FatalKind::Capacity,
            "unshared pool index {} reached the limit {}",
            index,
            UNSHARED_CONSTPOOL_LIMIT
        );
    }
    if index < pools.len() {
        return;
    }
    let mut len = pools.len().max(1);
    while len <= index {
        len *= 2;
    }
    pools.resize(len.min(UNSHARED_CONSTPOOL_LIMIT), None);
}

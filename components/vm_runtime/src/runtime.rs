//! Process-scoped runtime state.
//!
//! One [`Runtime`] per VM instance owns the shared heap, the loader worker
//! pool, the loaded files, the process-wide shared constant pools and the
//! type manager. Contexts hold an `Arc<Runtime>`.

use crate::constant_pool::ConstantPool;
use crate::snapshot::AotSnapshot;
use crate::thread::JsThread;
use crate::type_manager::{TypeManager, JIT_HCLASS_TABLE_LIMIT};
use bytecode_system::{BytecodeFile, LoadError, LoaderConfig, LoaderState};
use core_types::{FileId, HeapRef, TaggedValue};
use memory_manager::{Heap, HiddenClass};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Hidden classes the caching layer allocates literals with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtins {
    /// Layout of array literals
    pub array_hclass: HeapRef,
    /// Layout of an empty plain object
    pub object_hclass: HeapRef,
    /// Layout reserved at row 0 of every AOT hidden class table
    pub native_object_hclass: HeapRef,
}

impl Builtins {
    /// Allocate the builtin layouts on `heap`.
    pub fn install(heap: &Heap) -> Self {
        Self {
            array_hclass: heap.new_hclass(HiddenClass::new().add_property("length")),
            object_hclass: heap.new_hclass(HiddenClass::new()),
            native_object_hclass: heap.new_hclass(HiddenClass::new()),
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Loader worker pool settings
    pub loader: LoaderConfig,
    /// Initial length of each context's unshared pool array
    pub unshared_capacity: usize,
    /// Entries a JIT session may intern before giving up
    pub jit_hclass_table_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            loader: LoaderConfig::default(),
            unshared_capacity: 16,
            jit_hclass_table_capacity: JIT_HCLASS_TABLE_LIMIT,
        }
    }
}

impl RuntimeOptions {
    /// Set the loader worker count.
    pub fn with_loader_workers(mut self, workers: usize) -> Self {
        self.loader = self.loader.with_workers(workers);
        self
    }

    /// Set the initial unshared pool array length.
    pub fn with_unshared_capacity(mut self, capacity: usize) -> Self {
        self.unshared_capacity = capacity.max(1);
        self
    }

    /// Set the JIT-local hidden class table capacity.
    pub fn with_jit_hclass_table_capacity(mut self, capacity: usize) -> Self {
        self.jit_hclass_table_capacity = capacity.min(JIT_HCLASS_TABLE_LIMIT);
        self
    }
}

/// Process-wide VM state.
pub struct Runtime {
    options: RuntimeOptions,
    heap: Arc<Heap>,
    loader: LoaderState,
    builtins: Builtins,
    type_manager: TypeManager,
    files: RwLock<Vec<Arc<BytecodeFile>>>,
    shared_pools: Mutex<HashMap<(FileId, u32), Arc<ConstantPool>>>,
    next_shared_id: AtomicU32,
    next_unshared_index: AtomicU32,
    next_thread_id: AtomicU32,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.options)
            .field("files", &self.files.read().len())
            .field("shared_pools", &self.shared_pools.lock().len())
            .finish()
    }
}

impl Runtime {
    /// Create a runtime and start its loader workers.
    pub fn new(options: RuntimeOptions) -> Arc<Runtime> {
        let heap = Arc::new(Heap::new());
        let builtins = Builtins::install(&heap);
        let type_manager = TypeManager::new(TaggedValue::heap(builtins.native_object_hclass));
        Arc::new(Runtime {
            loader: LoaderState::new(options.loader.clone()),
            options,
            heap,
            builtins,
            type_manager,
            files: RwLock::new(Vec::new()),
            shared_pools: Mutex::new(HashMap::new()),
            next_shared_id: AtomicU32::new(0),
            next_unshared_index: AtomicU32::new(0),
            next_thread_id: AtomicU32::new(1),
        })
    }

    /// Options the runtime was created with.
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Shared heap.
    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    /// Builtin layouts.
    pub fn builtins(&self) -> Builtins {
        self.builtins
    }

    /// Loader state.
    pub fn loader(&self) -> &LoaderState {
        &self.loader
    }

    /// Type manager.
    pub fn type_manager(&self) -> &TypeManager {
        &self.type_manager
    }

    /// A new host thread handle.
    pub fn new_thread(&self) -> Arc<JsThread> {
        Arc::new(JsThread::new(self.next_thread_id.fetch_add(1, Ordering::Relaxed)))
    }

    /// Load a file from memory and register it.
    pub fn load_file(
        &self,
        descriptor: &str,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Result<Arc<BytecodeFile>, LoadError> {
        let file = BytecodeFile::load(&self.loader, descriptor, bytes)?;
        Ok(self.register_file(file))
    }

    /// Load a file from disk and register it.
    pub fn open_file(&self, path: &Path) -> Result<Arc<BytecodeFile>, LoadError> {
        let file = BytecodeFile::open(&self.loader, path)?;
        Ok(self.register_file(file))
    }

    /// Register a loaded file. A file already registered under the same
    /// descriptor wins and is returned instead.
    pub fn register_file(&self, file: Arc<BytecodeFile>) -> Arc<BytecodeFile> {
        let mut files = self.files.write();
        if let Some(existing) = files.iter().find(|f| f.descriptor() == file.descriptor()) {
            return existing.clone();
        }
        files.push(file.clone());
        file
    }

    /// Registered file by descriptor.
    pub fn find_file(&self, descriptor: &str) -> Option<Arc<BytecodeFile>> {
        self.files
            .read()
            .iter()
            .find(|f| f.descriptor() == descriptor)
            .cloned()
    }

    /// Registered file by id.
    pub fn find_file_by_id(&self, id: FileId) -> Option<Arc<BytecodeFile>> {
        self.files.read().iter().find(|f| f.id() == id).cloned()
    }

    /// Registered files in load order.
    pub fn files(&self) -> Vec<Arc<BytecodeFile>> {
        self.files.read().clone()
    }

    /// Position of a file in load order, used as its AOT snapshot index.
    pub fn file_index(&self, id: FileId) -> Option<usize> {
        self.files.read().iter().position(|f| f.id() == id)
    }

    /// Forget a file and its shared pools. The file itself is freed once the
    /// last context drops its pools.
    pub fn release_file(&self, descriptor: &str) -> Option<Arc<BytecodeFile>> {
        let file = {
            let mut files = self.files.write();
            let pos = files.iter().position(|f| f.descriptor() == descriptor)?;
            files.remove(pos)
        };
        self.shared_pools.lock().retain(|(id, _), _| *id != file.id());
        tracing::debug!(target: "corten::loader", descriptor, "released bytecode file");
        Some(file)
    }

    /// Shared pool of `(file, index header)`.
    pub fn find_shared_constpool(
        &self,
        file: FileId,
        index_header: u32,
    ) -> Option<Arc<ConstantPool>> {
        self.shared_pools.lock().get(&(file, index_header)).cloned()
    }

    /// Shared pool of `(file, index header)`, created with fresh ids on
    /// first use.
    pub fn create_shared_constpool(
        &self,
        file: &Arc<BytecodeFile>,
        index_header: u32,
    ) -> Arc<ConstantPool> {
        let mut pools = self.shared_pools.lock();
        if let Some(pool) = pools.get(&(file.id(), index_header)) {
            return pool.clone();
        }
        let shared_id = self.next_shared_id.fetch_add(1, Ordering::Relaxed);
        let unshared_index = self.next_unshared_index.fetch_add(1, Ordering::Relaxed);
        let pool = ConstantPool::new_shared(
            &self.heap,
            self.builtins,
            file.clone(),
            index_header,
            shared_id,
            unshared_index,
        );
        tracing::debug!(
            target: "corten::constpool",
            file = %file.descriptor(),
            index_header,
            shared_id,
            unshared_index,
            "created shared pool"
        );
        pools.insert((file.id(), index_header), pool.clone());
        pool
    }

    /// Insert or replace a shared pool, such as one restored from an image.
    pub fn add_shared_constpool(&self, pool: Arc<ConstantPool>) {
        self.next_shared_id
            .fetch_max(pool.shared_id() + 1, Ordering::Relaxed);
        self.next_unshared_index
            .fetch_max(pool.unshared_index() + 1, Ordering::Relaxed);
        self.shared_pools
            .lock()
            .insert((pool.file().id(), pool.index_header()), pool);
    }

    /// Restore the shared pool of `file` from a snapshot's pool image.
    pub fn load_aot_constpool(
        &self,
        file: &Arc<BytecodeFile>,
        file_index: usize,
        snapshot: &Arc<AotSnapshot>,
    ) -> Option<Arc<ConstantPool>> {
        let image = snapshot.constpool_image(file_index)?;
        let pool = ConstantPool::from_aot_image(
            &self.heap,
            self.builtins,
            file.clone(),
            image,
            snapshot.clone(),
        );
        self.add_shared_constpool(pool.clone());
        Some(pool)
    }
}

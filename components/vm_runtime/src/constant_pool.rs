//! Per-file constant pool cache.
//!
//! A pool is a cache region of `cache_length` slots, one per entry of the
//! method's index header, followed by [`RESERVED_POOL_LENGTH`] extension
//! slots describing the pool itself. Cache slots start as the hole and are
//! published at most once with a compare-and-swap. Readers on the fast path
//! never lock.
//!
//! Shared pools are created once per (file, index header) for the whole
//! process. Every context derives its own unshared pool from the shared one;
//! both carry the same `(shared id, unshared index)` pair so either can be
//! found from the other.

use crate::runtime::Builtins;
use crate::snapshot::{AotPoolImage, AotSnapshot};
use bytecode_system::{BytecodeFile, ConstantEntry, ConstantKind, LiteralValue};
use core_types::{fatal, FatalKind, HeapRef, TaggedValue};
use memory_manager::{Heap, HiddenClass, MethodObject};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Number of extension slots after the cache region.
pub const RESERVED_POOL_LENGTH: u32 = 9;

/// Extension slots, in layout order after the cache region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ExtensionSlot {
    /// Owning bytecode file
    File = 0,
    /// Index header the cache is sized by
    IndexHeader = 1,
    /// AOT hidden class table
    AotHClassInfo = 2,
    /// AOT array-info table
    AotArrayInfo = 3,
    /// AOT symbol table
    AotSymbolInfo = 4,
    /// AOT constant-index table
    ConstantIndexInfo = 5,
    /// AOT prototype transition table
    ProtoTransTable = 6,
    /// Index into the per-context unshared pool array
    UnsharedPoolIndex = 7,
    /// Process-wide shared pool id
    SharedPoolId = 8,
}

impl ExtensionSlot {
    const ALL: [ExtensionSlot; RESERVED_POOL_LENGTH as usize] = [
        ExtensionSlot::File,
        ExtensionSlot::IndexHeader,
        ExtensionSlot::AotHClassInfo,
        ExtensionSlot::AotArrayInfo,
        ExtensionSlot::AotSymbolInfo,
        ExtensionSlot::ConstantIndexInfo,
        ExtensionSlot::ProtoTransTable,
        ExtensionSlot::UnsharedPoolIndex,
        ExtensionSlot::SharedPoolId,
    ];
}

/// Logical slot layout of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLayout {
    /// Number of cache slots
    pub cache_length: u32,
}

impl PoolLayout {
    /// Cache slots plus extension slots.
    pub fn logical_length(&self) -> u32 {
        self.cache_length + RESERVED_POOL_LENGTH
    }

    /// Logical index of an extension slot.
    pub fn extension_index(&self, slot: ExtensionSlot) -> u32 {
        self.cache_length + slot as u32
    }

    /// Extension slot at a logical index, `None` inside the cache region.
    pub fn extension_at(&self, index: u32) -> Option<ExtensionSlot> {
        let offset = index.checked_sub(self.cache_length)?;
        ExtensionSlot::ALL.get(offset as usize).copied()
    }
}

/// Sharing kind of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// One per (file, index header) for the process
    Shared,
    /// One per context, derived from a shared pool
    Unshared,
}

/// A constant pool.
///
/// Pools live on the heap as host cells so that method objects can point
/// back at the pool they were resolved through. Constructors return the
/// `Arc` and register the cell at the same time. The cell only holds a weak
/// reference: the runtime and contexts own the pool, and once they drop it
/// the cell stops resolving and the file can be freed.
pub struct ConstantPool {
    kind: PoolKind,
    file: Arc<BytecodeFile>,
    index_header: u32,
    slots: Box<[AtomicU64]>,
    aot: Option<Arc<AotSnapshot>>,
    aot_cell: TaggedValue,
    shared_id: u32,
    unshared_index: u32,
    self_ref: OnceLock<HeapRef>,
    heap: Weak<Heap>,
    builtins: Builtins,
}

impl std::fmt::Debug for ConstantPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantPool")
            .field("kind", &self.kind)
            .field("file", &self.file.descriptor())
            .field("index_header", &self.index_header)
            .field("cache_length", &self.slots.len())
            .field("shared_id", &self.shared_id)
            .field("unshared_index", &self.unshared_index)
            .finish()
    }
}

/// Heap cell contents of a pool.
struct PoolCell(Weak<ConstantPool>);

struct PoolParts {
    kind: PoolKind,
    file: Arc<BytecodeFile>,
    index_header: u32,
    aot: Option<Arc<AotSnapshot>>,
    aot_cell: TaggedValue,
    shared_id: u32,
    unshared_index: u32,
}

impl ConstantPool {
    /// Create a shared pool over `file`'s index header `index_header`.
    ///
    /// Fatal when the file has no such index header.
    pub fn new_shared(
        heap: &Arc<Heap>,
        builtins: Builtins,
        file: Arc<BytecodeFile>,
        index_header: u32,
        shared_id: u32,
        unshared_index: u32,
    ) -> Arc<ConstantPool> {
        Self::allocate(
            heap,
            builtins,
            PoolParts {
                kind: PoolKind::Shared,
                file,
                index_header,
                aot: None,
                aot_cell: TaggedValue::UNDEFINED,
                shared_id,
                unshared_index,
            },
        )
    }

    /// Create a shared pool from a pool image stored in an AOT snapshot.
    ///
    /// Compiled method slots are prefilled with entry-index placeholders that
    /// are materialised on first resolve.
    pub fn from_aot_image(
        heap: &Arc<Heap>,
        builtins: Builtins,
        file: Arc<BytecodeFile>,
        image: &AotPoolImage,
        snapshot: Arc<AotSnapshot>,
    ) -> Arc<ConstantPool> {
        let aot_cell = TaggedValue::heap(heap.new_host(snapshot.clone()));
        let pool = Self::allocate(
            heap,
            builtins,
            PoolParts {
                kind: PoolKind::Shared,
                file,
                index_header: image.index_header,
                aot: Some(snapshot),
                aot_cell,
                shared_id: image.shared_id,
                unshared_index: image.unshared_index,
            },
        );
        for entry in &image.entries {
            pool.update(entry.index, TaggedValue::aot_entry(entry.entry_index));
        }
        tracing::debug!(
            target: "corten::constpool",
            file = %pool.file.descriptor(),
            shared_id = pool.shared_id,
            entries = image.entries.len(),
            "pool restored from aot image"
        );
        pool
    }

    fn allocate(heap: &Arc<Heap>, builtins: Builtins, parts: PoolParts) -> Arc<ConstantPool> {
        let Some(entries) = parts.file.index_header(parts.index_header) else {
            fatal!(
                FatalKind::FileFormat,
                "{} has no index header {}",
                parts.file.descriptor(),
                parts.index_header
            );
        };
        let slots = (0..entries.len())
            .map(|_| AtomicU64::new(TaggedValue::HOLE.raw()))
            .collect();
        let pool = Arc::new(ConstantPool {
            kind: parts.kind,
            file: parts.file,
            index_header: parts.index_header,
            slots,
            aot: parts.aot,
            aot_cell: parts.aot_cell,
            shared_id: parts.shared_id,
            unshared_index: parts.unshared_index,
            self_ref: OnceLock::new(),
            heap: Arc::downgrade(heap),
            builtins,
        });
        let cell = heap.new_host(Arc::new(PoolCell(Arc::downgrade(&pool))));
        let _ = pool.self_ref.set(cell);
        pool
    }

    /// Derive an unshared pool: same file, header, AOT tables and ids, with
    /// every cache slot back at the hole.
    pub fn create_unshared(&self) -> Arc<ConstantPool> {
        if self.kind != PoolKind::Shared {
            fatal!(
                FatalKind::Precondition,
                "unshared pool {} derived from another unshared pool",
                self.unshared_index
            );
        }
        Self::allocate(
            &self.heap(),
            self.builtins,
            PoolParts {
                kind: PoolKind::Unshared,
                file: self.file.clone(),
                index_header: self.index_header,
                aot: self.aot.clone(),
                aot_cell: self.aot_cell,
                shared_id: self.shared_id,
                unshared_index: self.unshared_index,
            },
        )
    }

    /// The pool behind a tagged host cell, while something still owns it.
    pub fn from_tagged(heap: &Heap, value: TaggedValue) -> Option<Arc<ConstantPool>> {
        heap.host::<PoolCell>(value)?.0.upgrade()
    }

    /// Sharing kind.
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Returns true for a shared pool.
    pub fn is_shared(&self) -> bool {
        self.kind == PoolKind::Shared
    }

    /// Owning file.
    pub fn file(&self) -> &Arc<BytecodeFile> {
        &self.file
    }

    /// Index header id.
    pub fn index_header(&self) -> u32 {
        self.index_header
    }

    /// Process-wide shared pool id.
    pub fn shared_id(&self) -> u32 {
        self.shared_id
    }

    /// Index in the per-context unshared pool array.
    pub fn unshared_index(&self) -> u32 {
        self.unshared_index
    }

    /// AOT tables attached at construction.
    pub fn aot_snapshot(&self) -> Option<&Arc<AotSnapshot>> {
        self.aot.as_ref()
    }

    /// Slot layout.
    pub fn layout(&self) -> PoolLayout {
        PoolLayout {
            cache_length: self.slots.len() as u32,
        }
    }

    /// Number of cache slots.
    pub fn cache_length(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Heap cell of this pool.
    pub fn heap_ref(&self) -> HeapRef {
        match self.self_ref.get() {
            Some(r) => *r,
            None => fatal!(FatalKind::Precondition, "constant pool used before registration"),
        }
    }

    /// Tagged reference to this pool.
    pub fn tagged(&self) -> TaggedValue {
        TaggedValue::heap(self.heap_ref())
    }

    /// Kind of the entry at `index`.
    pub fn entry_kind(&self, index: u32) -> Option<ConstantKind> {
        self.entries().get(index as usize).map(|e| e.kind)
    }

    /// Raw cache slot value, hole when unresolved.
    pub fn get(&self, index: u32) -> TaggedValue {
        TaggedValue::from_raw(self.slot(index).load(Ordering::Acquire))
    }

    /// Returns true once the slot holds a materialised value.
    pub fn is_resolved(&self, index: u32) -> bool {
        is_materialised(self.get(index))
    }

    /// Number of materialised cache slots.
    pub fn resolved_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| is_materialised(TaggedValue::from_raw(s.load(Ordering::Acquire))))
            .count()
    }

    /// Value at a logical index, covering the extension slots.
    pub fn get_logical(&self, index: u32) -> TaggedValue {
        let layout = self.layout();
        if index < layout.cache_length {
            return self.get(index);
        }
        let aot = |present: bool| if present { self.aot_cell } else { TaggedValue::UNDEFINED };
        match layout.extension_at(index) {
            Some(ExtensionSlot::File) => TaggedValue::int(self.file.id().0 as i32),
            Some(ExtensionSlot::IndexHeader) => TaggedValue::int(self.index_header as i32),
            Some(ExtensionSlot::AotHClassInfo)
            | Some(ExtensionSlot::AotArrayInfo)
            | Some(ExtensionSlot::AotSymbolInfo)
            | Some(ExtensionSlot::ConstantIndexInfo)
            | Some(ExtensionSlot::ProtoTransTable) => aot(self.aot.is_some()),
            Some(ExtensionSlot::UnsharedPoolIndex) => TaggedValue::int(self.unshared_index as i32),
            Some(ExtensionSlot::SharedPoolId) => TaggedValue::int(self.shared_id as i32),
            None => fatal!(
                FatalKind::Precondition,
                "logical index {} outside pool of length {}",
                index,
                layout.logical_length()
            ),
        }
    }

    /// Overwrite a cache slot. Only valid while restoring an AOT image, before
    /// the pool is visible to other threads.
    pub fn update(&self, index: u32, value: TaggedValue) {
        self.slot(index).store(value.raw(), Ordering::Release);
        self.heap().write_barrier(self.heap_ref(), value);
    }

    /// Resolve the entry at `index`, deriving and publishing it on first use.
    pub fn resolve(&self, index: u32) -> TaggedValue {
        let observed = self.get(index);
        if is_materialised(observed) {
            return observed;
        }
        self.resolve_slow(index, observed)
    }

    /// Resolve a string entry. Fatal when the entry is not a string.
    pub fn get_string_from_cache(&self, index: u32) -> TaggedValue {
        self.expect_kind(index, ConstantKind::String);
        self.resolve(index)
    }

    /// Resolve a method entry. Fatal when the entry is not a method.
    pub fn get_method_from_cache(&self, index: u32) -> TaggedValue {
        self.expect_kind(index, ConstantKind::Method);
        self.resolve(index)
    }

    /// Resolve a literal entry of the given kind.
    pub fn get_literal_from_cache(&self, index: u32, kind: ConstantKind) -> TaggedValue {
        self.expect_kind(index, kind);
        self.resolve(index)
    }

    /// A resolved string entry, without allocating.
    pub fn get_string_if_resolved(&self, index: u32) -> Option<TaggedValue> {
        self.get_if_resolved(index, ConstantKind::String)
    }

    /// A resolved entry of the given kind, without allocating. Used from
    /// compiler threads, which must not derive entries themselves.
    pub fn get_if_resolved(&self, index: u32, kind: ConstantKind) -> Option<TaggedValue> {
        if self.entry_kind(index) != Some(kind) {
            return None;
        }
        let value = self.get(index);
        is_materialised(value).then_some(value)
    }

    fn heap(&self) -> Arc<Heap> {
        match self.heap.upgrade() {
            Some(heap) => heap,
            None => fatal!(FatalKind::Precondition, "constant pool outlived its heap"),
        }
    }

    fn entries(&self) -> &[ConstantEntry] {
        self.file.index_header(self.index_header).unwrap_or_default()
    }

    fn slot(&self, index: u32) -> &AtomicU64 {
        match self.slots.get(index as usize) {
            Some(slot) => slot,
            None => fatal!(
                FatalKind::Precondition,
                "constant pool index {} out of range {}",
                index,
                self.slots.len()
            ),
        }
    }

    fn expect_kind(&self, index: u32, expected: ConstantKind) {
        let actual = self.entry_kind(index);
        if actual != Some(expected) {
            fatal!(
                FatalKind::LiteralKind,
                "pool {} index {}: expected {:?}, found {:?}",
                self.file.descriptor(),
                index,
                expected,
                actual
            );
        }
    }

    fn resolve_slow(&self, index: u32, observed: TaggedValue) -> TaggedValue {
        let Some(entry) = self.entries().get(index as usize).copied() else {
            fatal!(FatalKind::FileFormat, "index header entry {} missing", index);
        };
        let slot = self.slot(index);
        let heap = self.heap();
        let value = self.derive(&heap, entry, observed);
        match slot.compare_exchange(
            observed.raw(),
            value.raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                heap.write_barrier(self.heap_ref(), value);
                value
            }
            Err(raw) => {
                tracing::trace!(
                    target: "corten::constpool",
                    index,
                    kind = ?entry.kind,
                    "lost publish race, adopting winner"
                );
                await_published(slot, raw)
            }
        }
    }

    fn derive(&self, heap: &Heap, entry: ConstantEntry, observed: TaggedValue) -> TaggedValue {
        match entry.kind {
            ConstantKind::String => self.string_value(heap, entry.id),
            ConstantKind::Method => self.method_value(heap, entry.id, observed.aot_entry_index()),
            ConstantKind::ArrayLiteral => self.array_literal(heap, entry.id),
            ConstantKind::ObjectLiteral => self.object_literal(heap, entry.id),
            ConstantKind::ClassLiteral => self.class_literal(heap, entry.id),
        }
    }

    fn string_value(&self, heap: &Heap, id: u32) -> TaggedValue {
        match self.file.string(id) {
            Some(s) => TaggedValue::heap(heap.intern_string(s)),
            None => fatal!(
                FatalKind::FileFormat,
                "{} has no string {}",
                self.file.descriptor(),
                id
            ),
        }
    }

    fn method_value(&self, heap: &Heap, offset: u32, aot_entry: Option<u32>) -> TaggedValue {
        if self.file.find_method_literal(offset).is_none() {
            fatal!(
                FatalKind::MissingMethod,
                "{} has no method at {:#x}",
                self.file.descriptor(),
                offset
            );
        }
        TaggedValue::heap(heap.new_method(MethodObject {
            file: self.file.id(),
            offset,
            constpool: self.tagged(),
            aot_entry,
        }))
    }

    fn literal_values(&self, id: u32) -> &[LiteralValue] {
        match self.file.literal_array(id) {
            Some(values) => values,
            None => fatal!(
                FatalKind::FileFormat,
                "{} has no literal array {}",
                self.file.descriptor(),
                id
            ),
        }
    }

    fn literal_value(&self, heap: &Heap, literal: LiteralValue) -> TaggedValue {
        match literal {
            LiteralValue::Undefined => TaggedValue::UNDEFINED,
            LiteralValue::Null => TaggedValue::NULL,
            LiteralValue::Boolean(b) => TaggedValue::boolean(b),
            LiteralValue::Integer(n) => TaggedValue::int(n),
            LiteralValue::Double(d) => TaggedValue::double(d),
            LiteralValue::String(id) => self.string_value(heap, id),
            LiteralValue::Method(offset) => self.method_value(heap, offset, None),
        }
    }

    fn literal_key(&self, literal: LiteralValue, id: u32) -> &str {
        match literal.as_string_id().and_then(|s| self.file.string(s)) {
            Some(key) => key,
            None => fatal!(
                FatalKind::FileFormat,
                "literal array {} has a non-string key {:?}",
                id,
                literal
            ),
        }
    }

    fn array_literal(&self, heap: &Heap, id: u32) -> TaggedValue {
        let values: Vec<TaggedValue> = self
            .literal_values(id)
            .iter()
            .map(|v| self.literal_value(heap, *v))
            .collect();
        let length = values.len() as u32;
        let elements = heap.new_tagged_array(values);
        TaggedValue::heap(heap.new_array(self.builtins.array_hclass, elements, length))
    }

    fn object_literal(&self, heap: &Heap, id: u32) -> TaggedValue {
        let literals = self.literal_values(id);
        if literals.len() % 2 != 0 {
            fatal!(
                FatalKind::FileFormat,
                "object literal {} has an odd number of entries",
                id
            );
        }
        let mut hclass = HiddenClass::new();
        let mut values = Vec::with_capacity(literals.len() / 2);
        for pair in literals.chunks_exact(2) {
            hclass = hclass.add_property(self.literal_key(pair[0], id));
            values.push(self.literal_value(heap, pair[1]));
        }
        self.build_object(heap, hclass, values)
    }

    /// `[ctor, name, method, name, method, ...]` becomes a prototype object
    /// whose first property is `constructor`.
    fn class_literal(&self, heap: &Heap, id: u32) -> TaggedValue {
        let literals = self.literal_values(id);
        let Some((ctor, rest)) = literals.split_first() else {
            fatal!(FatalKind::FileFormat, "class literal {} is empty", id);
        };
        if !matches!(ctor, LiteralValue::Method(_)) || rest.len() % 2 != 0 {
            fatal!(FatalKind::FileFormat, "class literal {} is malformed", id);
        }
        let mut hclass = HiddenClass::new().as_prototype().add_property("constructor");
        let mut values = vec![self.literal_value(heap, *ctor)];
        for pair in rest.chunks_exact(2) {
            hclass = hclass.add_property(self.literal_key(pair[0], id));
            values.push(self.literal_value(heap, pair[1]));
        }
        self.build_object(heap, hclass, values)
    }

    fn build_object(
        &self,
        heap: &Heap,
        hclass: HiddenClass,
        values: Vec<TaggedValue>,
    ) -> TaggedValue {
        let hclass = heap.new_hclass(hclass);
        let object = heap.allocate_object(hclass, values.len());
        for (i, value) in values.into_iter().enumerate() {
            heap.store(object, i as u32, value);
        }
        TaggedValue::heap(object)
    }
}

fn is_materialised(value: TaggedValue) -> bool {
    !value.is_hole() && !value.is_aot_entry()
}

/// Wait for the thread that won a slot's publish race. Once a pool is shared
/// a slot only ever moves to a materialised value, so this never re-derives.
fn await_published(slot: &AtomicU64, mut raw: u64) -> TaggedValue {
    let mut spins = 0u32;
    loop {
        let value = TaggedValue::from_raw(raw);
        if is_materialised(value) {
            return value;
        }
        if spins < 64 {
            spins += 1;
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
        raw = slot.load(Ordering::Acquire);
    }
}

//! Profile-guided type manager.
//!
//! Interpreter threads record the hidden classes they observe per
//! [`ProfileTyper`]. The AOT compiler later freezes everything recorded so
//! far into an [`AotSnapshot`]; the JIT keeps its own small per-session table
//! ([`JitLocalHClassTable`]) instead of touching the shared map.

use crate::constant_pool::ConstantPool;
use crate::proto_transition::{ProtoTransRequest, ProtoTransitionTable};
use crate::snapshot::{
    AotPoolEntry, AotPoolImage, AotSnapshot, ConstantIndexEntry, HClassTableEntry, SymbolEntry,
};
use arrayvec::ArrayVec;
use core_types::{fatal, FatalKind, ProfileType, ProfileTypeTuple, ProfileTyper, TaggedValue};
use memory_manager::Heap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Hard upper bound of a JIT-local hidden class table.
pub const JIT_HCLASS_TABLE_LIMIT: usize = 64;

#[derive(Debug, Default)]
struct TypeManagerInner {
    hclasses: Vec<(ProfileTyper, TaggedValue)>,
    positions: HashMap<ProfileTyper, usize>,
    constant_index: Vec<ConstantIndexEntry>,
    proto_requests: Vec<ProtoTransRequest>,
    snapshot_index: HashMap<ProfileTyper, u32>,
    snapshot: Option<Arc<AotSnapshot>>,
}

/// Process-wide hidden class records.
#[derive(Debug)]
pub struct TypeManager {
    native_object_hclass: TaggedValue,
    inner: Mutex<TypeManagerInner>,
}

impl TypeManager {
    /// An empty manager. `native_object_hclass` fills row 0 of every
    /// snapshot hidden class table.
    pub fn new(native_object_hclass: TaggedValue) -> Self {
        Self {
            native_object_hclass,
            inner: Mutex::new(TypeManagerInner::default()),
        }
    }

    /// Record the hidden class observed for `(root, child)`.
    ///
    /// Recording the same value again is a no-op. A different value replaces
    /// the old one only when `update` is set; without it a changed value
    /// trips a debug assertion and the first value is kept.
    pub fn record_hclass(
        &self,
        root: ProfileType,
        child: ProfileType,
        hclass: TaggedValue,
        update: bool,
    ) {
        let typer = ProfileTyper::new(root, child);
        let mut inner = self.inner.lock();
        match inner.positions.get(&typer).copied() {
            Some(pos) => {
                let existing = inner.hclasses[pos].1;
                if update {
                    inner.hclasses[pos].1 = hclass;
                } else {
                    debug_assert!(
                        existing == hclass,
                        "hclass for {:?} changed from {:?} to {:?}",
                        typer,
                        existing,
                        hclass
                    );
                }
            }
            None => {
                let pos = inner.hclasses.len();
                inner.hclasses.push((typer, hclass));
                inner.positions.insert(typer, pos);
                tracing::trace!(
                    target: "corten::pgo",
                    root = %root,
                    child = %child,
                    "recorded hclass"
                );
            }
        }
    }

    /// Hidden class recorded for `(root, child)`, undefined on a miss.
    pub fn query_hclass(&self, root: ProfileType, child: ProfileType) -> TaggedValue {
        let inner = self.inner.lock();
        inner
            .positions
            .get(&ProfileTyper::new(root, child))
            .map(|&pos| inner.hclasses[pos].1)
            .unwrap_or(TaggedValue::UNDEFINED)
    }

    /// Number of recorded hidden classes.
    pub fn recorded_hclasses(&self) -> usize {
        self.inner.lock().hclasses.len()
    }

    /// Remember that the instruction at `bc_offset` used pool index `cp_index`.
    pub fn record_constant_index(&self, bc_offset: u32, cp_index: u32) {
        self.inner.lock().constant_index.push(ConstantIndexEntry {
            bc_offset,
            cp_index,
        });
    }

    /// Remember a prototype transition to resolve at snapshot time.
    pub fn record_proto_trans_type(&self, request: ProtoTransRequest) {
        self.inner.lock().proto_requests.push(request);
    }

    /// Freeze everything recorded so far into a snapshot with one pool slot
    /// per file.
    pub fn init_aot_snapshot(&self, heap: &Heap, file_count: usize) -> Arc<AotSnapshot> {
        let mut inner = self.inner.lock();

        let mut hclass_table = Vec::with_capacity(inner.hclasses.len() + 1);
        hclass_table.push(HClassTableEntry {
            typer: ProfileTyper::root_only(ProfileType::native_object()),
            hclass: self.native_object_hclass,
        });
        let mut snapshot_index = HashMap::with_capacity(inner.hclasses.len());
        for (typer, hclass) in &inner.hclasses {
            snapshot_index.insert(*typer, hclass_table.len() as u32);
            hclass_table.push(HClassTableEntry {
                typer: *typer,
                hclass: *hclass,
            });
        }

        let symbol_table = Self::collect_symbols(heap, &inner.hclasses);
        let proto_transitions = self.resolve_proto_transitions(&inner);

        let snapshot = Arc::new(AotSnapshot {
            hclass_table,
            symbol_table,
            array_info: Vec::new(),
            constant_index: inner.constant_index.clone(),
            proto_transitions,
            constpools: vec![None; file_count],
        });
        tracing::debug!(
            target: "corten::pgo",
            hclasses = snapshot.hclass_table.len(),
            symbols = snapshot.symbol_table.len(),
            constant_index = snapshot.constant_index.len(),
            transitions = snapshot.proto_transitions.len(),
            file_count,
            "aot snapshot initialised"
        );
        inner.snapshot_index = snapshot_index;
        inner.snapshot = Some(snapshot.clone());
        snapshot
    }

    fn collect_symbols(
        heap: &Heap,
        hclasses: &[(ProfileTyper, TaggedValue)],
    ) -> Vec<SymbolEntry> {
        let mut symbols = Vec::new();
        for (typer, value) in hclasses {
            let Some(hclass) = heap.hclass(*value) else {
                continue;
            };
            if hclass.transitioning {
                continue;
            }
            for (offset, symbol) in hclass.symbol_keys() {
                let tuple = ProfileTypeTuple::new(typer.root, typer.child, offset);
                symbols.push(SymbolEntry {
                    tuple,
                    symbol_id: tuple.symbol_id(),
                    symbol: TaggedValue::heap(symbol),
                });
            }
        }
        symbols
    }

    fn resolve_proto_transitions(&self, inner: &TypeManagerInner) -> ProtoTransitionTable {
        let query = |root: ProfileType, child: ProfileType| {
            inner
                .positions
                .get(&ProfileTyper::new(root, child))
                .map(|&pos| inner.hclasses[pos].1)
        };
        let mut table = ProtoTransitionTable::new();
        for request in &inner.proto_requests {
            let ihc = query(request.ihc_type, request.ihc_type);
            let base_ihc = query(request.base_root_type, request.base_type);
            let trans_ihc = query(request.trans_ihc_type, request.trans_ihc_type);
            let trans_phc = query(request.trans_phc_type, request.trans_phc_type);
            match (ihc, base_ihc, trans_ihc, trans_phc) {
                (Some(ihc), Some(base_ihc), Some(trans_ihc), Some(trans_phc)) => {
                    table.insert_transition_item(ihc, base_ihc, trans_ihc, trans_phc);
                }
                _ => tracing::debug!(
                    target: "corten::pgo",
                    ihc = %request.ihc_type,
                    base = %request.base_type,
                    found_ihc = ihc.is_some(),
                    found_base = base_ihc.is_some(),
                    found_trans_ihc = trans_ihc.is_some(),
                    found_trans_phc = trans_phc.is_some(),
                    "skipping proto transition with unrecorded hclass"
                ),
            }
        }
        table
    }

    /// The current snapshot, if one was initialised.
    pub fn aot_snapshot(&self) -> Option<Arc<AotSnapshot>> {
        self.inner.lock().snapshot.clone()
    }

    /// Snapshot table index of a typer.
    pub fn get_hclass_index_by_profile_type(&self, typer: ProfileTyper) -> Option<u32> {
        if typer.root.is_native_object() {
            return Some(0);
        }
        self.inner.lock().snapshot_index.get(&typer).copied()
    }

    /// Hidden class at a snapshot table index, undefined when absent.
    pub fn get_hclass_by_index(&self, index: u32) -> TaggedValue {
        self.inner
            .lock()
            .snapshot
            .as_ref()
            .map(|s| s.hclass(index))
            .unwrap_or(TaggedValue::UNDEFINED)
    }

    /// Snapshot symbol id of a symbol-keyed slot.
    pub fn get_symbol_id_by_profile_type(&self, tuple: &ProfileTypeTuple) -> Option<u64> {
        self.inner
            .lock()
            .snapshot
            .as_ref()
            .and_then(|s| s.symbol_id(tuple))
    }

    /// Store the image of `pool` as the snapshot entry of file `file_index`.
    ///
    /// `compiled` lists `(pool index, entry index)` pairs of methods that have
    /// compiled code in the image.
    pub fn store_constpool_info(
        &self,
        file_index: usize,
        pool: &ConstantPool,
        compiled: &[(u32, u32)],
    ) {
        let mut inner = self.inner.lock();
        let Some(snapshot) = inner.snapshot.as_mut() else {
            fatal!(FatalKind::Precondition, "constant pool stored before snapshot init");
        };
        let snapshot = Arc::make_mut(snapshot);
        let Some(slot) = snapshot.constpools.get_mut(file_index) else {
            fatal!(
                FatalKind::Precondition,
                "file index {} outside snapshot of {} files",
                file_index,
                snapshot.constpools.len()
            );
        };
        *slot = Some(AotPoolImage {
            index_header: pool.index_header(),
            shared_id: pool.shared_id(),
            unshared_index: pool.unshared_index(),
            entries: compiled
                .iter()
                .map(|&(index, entry_index)| AotPoolEntry { index, entry_index })
                .collect(),
        });
    }

    /// Drop per-compilation records. The last snapshot stays available.
    pub fn clear_hclass_records(&self) {
        let mut inner = self.inner.lock();
        inner.hclasses.clear();
        inner.positions.clear();
        inner.constant_index.clear();
        inner.proto_requests.clear();
    }
}

/// Hidden classes interned by one JIT compilation session.
///
/// Indices are stable for the session. Nothing is removed mid session; the
/// table is dropped with the session.
#[derive(Debug, Clone)]
pub struct JitLocalHClassTable {
    limit: usize,
    entries: ArrayVec<TaggedValue, JIT_HCLASS_TABLE_LIMIT>,
}

impl JitLocalHClassTable {
    /// A table holding at most `limit` entries, capped at
    /// [`JIT_HCLASS_TABLE_LIMIT`].
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.min(JIT_HCLASS_TABLE_LIMIT),
            entries: ArrayVec::new(),
        }
    }

    /// Index of `hclass`, appending it on a miss. `None` once full.
    pub fn record_and_get_index(&mut self, hclass: TaggedValue) -> Option<u32> {
        if let Some(pos) = self.entries.iter().position(|h| *h == hclass) {
            return Some(pos as u32);
        }
        if self.entries.len() >= self.limit {
            return None;
        }
        self.entries.push(hclass);
        Some((self.entries.len() - 1) as u32)
    }

    /// Hidden class at a session index.
    pub fn get(&self, index: u32) -> Option<TaggedValue> {
        self.entries.get(index as usize).copied()
    }

    /// Number of interned hidden classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing was interned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

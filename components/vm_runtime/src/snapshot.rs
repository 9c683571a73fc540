//! AOT snapshot tables.
//!
//! Produced once per compilation unit by
//! [`TypeManager::init_aot_snapshot`](crate::TypeManager::init_aot_snapshot)
//! and attached to constant pools built from an AOT image.

use crate::proto_transition::ProtoTransitionTable;
use core_types::{ProfileTypeTuple, ProfileTyper, TaggedValue};
use serde::{Deserialize, Serialize};

/// Hidden class table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HClassTableEntry {
    /// Key the hidden class was recorded under
    pub typer: ProfileTyper,
    /// The hidden class
    pub hclass: TaggedValue,
}

/// Symbol table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    /// Owning typer plus slot index
    pub tuple: ProfileTypeTuple,
    /// Stable id derived from the tuple
    pub symbol_id: u64,
    /// The symbol
    pub symbol: TaggedValue,
}

/// Constant-index table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantIndexEntry {
    /// Bytecode offset of the instruction
    pub bc_offset: u32,
    /// Constant pool index it referenced
    pub cp_index: u32,
}

/// A slot whose value is compiled code in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AotPoolEntry {
    /// Constant pool index
    pub index: u32,
    /// Entry index of the compiled method
    pub entry_index: u32,
}

/// What the image stores for one file's constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AotPoolImage {
    /// Index header the pool is built over
    pub index_header: u32,
    /// Shared pool id used to re-link the pool pair
    pub shared_id: u32,
    /// Unshared pool index used to re-link the pool pair
    pub unshared_index: u32,
    /// Compiled method slots
    pub entries: Vec<AotPoolEntry>,
}

/// The five AOT tables plus per-file pool images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AotSnapshot {
    /// Row 0 is the native-object hidden class
    pub hclass_table: Vec<HClassTableEntry>,
    /// Symbol keys of non-transitioning hidden classes
    pub symbol_table: Vec<SymbolEntry>,
    /// Reserved, always empty
    pub array_info: Vec<TaggedValue>,
    /// Recorded `(bytecode offset, constant pool index)` pairs
    pub constant_index: Vec<ConstantIndexEntry>,
    /// Prototype transitions
    pub proto_transitions: ProtoTransitionTable,
    /// One slot per file in the compilation unit
    pub constpools: Vec<Option<AotPoolImage>>,
}

impl AotSnapshot {
    /// Hidden class at a table index, undefined when out of range.
    pub fn hclass(&self, index: u32) -> TaggedValue {
        self.hclass_table
            .get(index as usize)
            .map(|e| e.hclass)
            .unwrap_or(TaggedValue::UNDEFINED)
    }

    /// Symbol id recorded for a tuple.
    pub fn symbol_id(&self, tuple: &ProfileTypeTuple) -> Option<u64> {
        self.symbol_table
            .iter()
            .find(|e| e.tuple == *tuple)
            .map(|e| e.symbol_id)
    }

    /// Pool image of a file.
    pub fn constpool_image(&self, file_index: usize) -> Option<&AotPoolImage> {
        self.constpools.get(file_index).and_then(Option::as_ref)
    }
}

//! Profile type keys used by the PGO type manager.
//!
//! This module is placed in core_types to avoid cyclic dependencies
//! between vm_runtime and jit_compiler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a [`ProfileType`] identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProfileTypeKind {
    /// Class declaration site
    ClassId = 0,
    /// Object literal allocation site
    LiteralId,
    /// Array literal allocation site
    ArrayLiteralId,
    /// Constructor function
    ConstructorId,
    /// Prototype object of a class
    PrototypeId,
    /// Instance class after a prototype transition
    TransitionClassId,
    /// Prototype after a prototype transition
    TransitionPrototypeId,
    /// Builtin object
    BuiltinsId,
    /// Object created by a native host module
    NapiId,
}

/// Compact key of an allocation site or a transition target.
///
/// # Examples
///
/// ```
/// use core_types::{ProfileType, ProfileTypeKind};
///
/// let t = ProfileType::new(1, 42, ProfileTypeKind::LiteralId);
/// assert_eq!(ProfileType::from_raw(t.raw()), Some(t));
/// assert!(ProfileType::native_object().is_native_object());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileType {
    /// Index of the bytecode file the site belongs to
    pub abc_id: u16,
    /// Site id inside that file
    pub type_id: u32,
    /// Site kind
    pub kind: ProfileTypeKind,
}

impl ProfileType {
    /// Create a profile type.
    pub const fn new(abc_id: u16, type_id: u32, kind: ProfileTypeKind) -> Self {
        Self {
            abc_id,
            type_id,
            kind,
        }
    }

    /// The reserved root type of host-created native objects.
    pub const fn native_object() -> Self {
        Self::new(0, 0, ProfileTypeKind::NapiId)
    }

    /// Returns true for the reserved native-object root type.
    pub fn is_native_object(&self) -> bool {
        *self == Self::native_object()
    }

    /// Returns true for the two transition kinds.
    pub fn is_transition(&self) -> bool {
        matches!(
            self.kind,
            ProfileTypeKind::TransitionClassId | ProfileTypeKind::TransitionPrototypeId
        )
    }

    /// Pack into one word: kind in bits 56..64, file in 32..48, site in 0..32.
    pub const fn raw(&self) -> u64 {
        ((self.kind as u64) << 56) | ((self.abc_id as u64) << 32) | self.type_id as u64
    }

    /// Unpack a word produced by [`ProfileType::raw`].
    pub fn from_raw(raw: u64) -> Option<Self> {
        let kind = match (raw >> 56) as u8 {
            0 => ProfileTypeKind::ClassId,
            1 => ProfileTypeKind::LiteralId,
            2 => ProfileTypeKind::ArrayLiteralId,
            3 => ProfileTypeKind::ConstructorId,
            4 => ProfileTypeKind::PrototypeId,
            5 => ProfileTypeKind::TransitionClassId,
            6 => ProfileTypeKind::TransitionPrototypeId,
            7 => ProfileTypeKind::BuiltinsId,
            8 => ProfileTypeKind::NapiId,
            _ => return None,
        };
        Some(Self::new((raw >> 32) as u16, raw as u32, kind))
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}:{})", self.kind, self.abc_id, self.type_id)
    }
}

/// Key of the type manager's hidden-class map: an allocation site and the
/// declared or transitioned type reached from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileTyper {
    /// Allocation site
    pub root: ProfileType,
    /// Declared or transition target
    pub child: ProfileType,
}

impl ProfileTyper {
    /// Create a typer.
    pub const fn new(root: ProfileType, child: ProfileType) -> Self {
        Self { root, child }
    }

    /// A typer whose child is its own root.
    pub const fn root_only(root: ProfileType) -> Self {
        Self { root, child: root }
    }
}

/// A typer plus the index of a symbol-keyed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileTypeTuple {
    /// Allocation site
    pub root: ProfileType,
    /// Declared or transition target
    pub child: ProfileType,
    /// Property slot holding the symbol key
    pub slot_index: u32,
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

impl ProfileTypeTuple {
    /// Create a tuple.
    pub const fn new(root: ProfileType, child: ProfileType, slot_index: u32) -> Self {
        Self {
            root,
            child,
            slot_index,
        }
    }

    /// The typer this tuple extends.
    pub const fn typer(&self) -> ProfileTyper {
        ProfileTyper::new(self.root, self.child)
    }

    /// Stable 64-bit id for the symbol at this slot.
    ///
    /// FNV-1a over the little-endian bytes of both raw types and the slot
    /// index, so the value never depends on process state.
    pub fn symbol_id(&self) -> u64 {
        let mut hash = FNV_OFFSET;
        let words = [
            self.root.raw(),
            self.child.raw(),
            u64::from(self.slot_index),
        ];
        for word in words {
            for byte in word.to_le_bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        }
        hash
    }
}

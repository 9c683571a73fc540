//! Method literals and the arena that owns them

use core_types::{fatal, FatalKind, FileId};
use std::ops::Range;
use std::sync::OnceLock;

/// Kind of function a method compiles to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Plain function
    Normal,
    /// Arrow function
    Arrow,
    /// Object or class method
    Method,
    /// Constructor of a base class
    BaseConstructor,
    /// Constructor of a derived class
    DerivedConstructor,
    /// Generator function
    Generator,
    /// Async function
    Async,
    /// Async generator function
    AsyncGenerator,
    /// Getter accessor
    Getter,
    /// Setter accessor
    Setter,
}

impl FunctionKind {
    pub(crate) fn tag(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => FunctionKind::Normal,
            1 => FunctionKind::Arrow,
            2 => FunctionKind::Method,
            3 => FunctionKind::BaseConstructor,
            4 => FunctionKind::DerivedConstructor,
            5 => FunctionKind::Generator,
            6 => FunctionKind::Async,
            7 => FunctionKind::AsyncGenerator,
            8 => FunctionKind::Getter,
            9 => FunctionKind::Setter,
            _ => return None,
        })
    }

    /// Returns true for kinds that may be called with `new`.
    pub fn is_constructor(self) -> bool {
        matches!(
            self,
            FunctionKind::Normal | FunctionKind::BaseConstructor | FunctionKind::DerivedConstructor
        )
    }
}

/// Method descriptor addressed by its record offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodLiteral {
    /// Offset of the method record
    pub offset: u32,
    /// String id of the method name
    pub name: u32,
    /// Byte range of the bytecode inside the file
    pub code: Range<u32>,
    /// Declared argument count
    pub num_args: u32,
    /// Function kind
    pub kind: FunctionKind,
    /// Index header sizing the method's constant pool
    pub index_header: u32,
    /// Owning file
    pub file: FileId,
}

/// Fixed-size arena of method literals.
///
/// Sized once to the file's method count. Loader workers fill disjoint index
/// ranges concurrently; afterwards the arena is read-only and indices are
/// stable for the file's lifetime.
#[derive(Debug)]
pub struct MethodLiteralArena {
    slots: Box<[OnceLock<MethodLiteral>]>,
}

impl MethodLiteralArena {
    /// An arena with `len` empty slots.
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true when the arena has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fill one slot. Each slot is written exactly once.
    pub fn set(&self, index: usize, literal: MethodLiteral) {
        let Some(slot) = self.slots.get(index) else {
            fatal!(
                FatalKind::Capacity,
                "method literal index {} past arena of {}",
                index,
                self.slots.len()
            );
        };
        if slot.set(literal).is_err() {
            fatal!(FatalKind::FileFormat, "method literal slot {} written twice", index);
        }
    }

    /// Literal at `index`, if filled.
    pub fn get(&self, index: usize) -> Option<&MethodLiteral> {
        self.slots.get(index).and_then(OnceLock::get)
    }

    /// All filled literals in index order.
    pub fn iter(&self) -> impl Iterator<Item = &MethodLiteral> {
        self.slots.iter().filter_map(OnceLock::get)
    }

    /// Returns true once every slot is filled.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|s| s.get().is_some())
    }
}

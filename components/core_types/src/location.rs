//! Identifiers for loaded bytecode files and the methods inside them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-unique id of a loaded bytecode file.
///
/// Method literals refer to their owning file by id rather than by pointer so
/// the arena stays free of back references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

/// A method identified by its owning file and bytecode offset.
///
/// # Examples
///
/// ```
/// use core_types::{FileId, MethodId};
///
/// let m = MethodId::new(FileId(1), 0x120);
/// assert_eq!(m.offset, 0x120);
/// assert_eq!(m.to_string(), "file#1@0x120");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId {
    /// Owning file
    pub file: FileId,
    /// Byte offset of the method record inside the file
    pub offset: u32,
}

impl MethodId {
    /// Create a method id.
    pub fn new(file: FileId, offset: u32) -> Self {
        Self { file, offset }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}@{:#x}", self.file.0, self.offset)
    }
}

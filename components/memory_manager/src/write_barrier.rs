//! Write barrier and remembered set
//!
//! Cells below the heap's old boundary are old. When an old cell is made to
//! reference a young cell, the old cell is recorded in the remembered set so
//! a collector can treat it as an extra root. This applies both to heap
//! stores and to constant pool slots published outside the object table.

use core_types::{HeapRef, TaggedValue};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Returns true when storing `value` into `holder` creates an old → young edge.
///
/// ```
/// use core_types::{HeapRef, TaggedValue};
/// use memory_manager::needs_barrier;
///
/// let young = TaggedValue::heap(HeapRef(10));
/// assert!(needs_barrier(HeapRef(1), young, 5));
/// assert!(!needs_barrier(HeapRef(6), young, 5));
/// assert!(!needs_barrier(HeapRef(1), TaggedValue::int(3), 5));
/// ```
pub fn needs_barrier(holder: HeapRef, value: TaggedValue, old_boundary: u32) -> bool {
    match value.heap_ref() {
        Some(target) => holder.0 < old_boundary && target.0 >= old_boundary,
        None => false,
    }
}

/// Set of old cells that hold references to young cells.
#[derive(Debug, Default)]
pub struct RememberedSet {
    cards: Mutex<HashSet<HeapRef>>,
}

impl RememberedSet {
    /// Creates an empty remembered set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a holder to the remembered set.
    pub fn add(&self, holder: HeapRef) {
        self.cards.lock().insert(holder);
    }

    /// Removes a holder from the remembered set.
    pub fn remove(&self, holder: HeapRef) {
        self.cards.lock().remove(&holder);
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.cards.lock().clear();
    }

    /// Checks if a holder is in the remembered set.
    pub fn contains(&self, holder: HeapRef) -> bool {
        self.cards.lock().contains(&holder)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.cards.lock().len()
    }

    /// Returns true if the remembered set is empty.
    pub fn is_empty(&self) -> bool {
        self.cards.lock().is_empty()
    }

    /// Snapshot of all holders, sorted.
    pub fn roots(&self) -> Vec<HeapRef> {
        let mut roots: Vec<_> = self.cards.lock().iter().copied().collect();
        roots.sort();
        roots
    }
}

//! Per-function profiling feedback.
//!
//! Each interpreted function owns a [`FeedbackVector`]. Call sites record
//! their callee, property sites move through mono/poly/megamorphic states as
//! hidden classes are observed.

use crate::TaggedValue;
use arrayvec::ArrayVec;
use parking_lot::RwLock;

/// Maximum number of hidden classes a polymorphic slot tracks.
pub const POLYMORPHIC_LIMIT: usize = 4;

/// How a cached property access finds its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyHandler {
    /// Own data field at a fixed index
    Field {
        /// Field index inside the object
        offset: u32,
    },
    /// Accessor found on a prototype
    Prototype {
        /// Prototype object that owns the accessor
        holder: TaggedValue,
        /// Getter or setter function bound to the site
        accessor: TaggedValue,
    },
}

/// State of one feedback slot.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackSlot {
    /// Nothing observed yet
    Uninitialized,
    /// Call site with a single observed target
    Call {
        /// Function object that was called
        target: TaggedValue,
    },
    /// Property site with one hidden class
    Monomorphic {
        /// Observed hidden class
        hclass: TaggedValue,
        /// Access handler
        handler: PropertyHandler,
    },
    /// Property site with up to [`POLYMORPHIC_LIMIT`] hidden classes
    Polymorphic {
        /// (hidden class, handler) pairs
        entries: ArrayVec<(TaggedValue, PropertyHandler), POLYMORPHIC_LIMIT>,
    },
    /// Too many shapes
    Megamorphic,
}

impl FeedbackSlot {
    /// The function this slot leads to, if any.
    ///
    /// A call slot yields its target. A monomorphic property slot yields the
    /// accessor of a prototype handler.
    pub fn callee(&self) -> Option<TaggedValue> {
        match self {
            FeedbackSlot::Call { target } if target.is_heap_object() => Some(*target),
            FeedbackSlot::Monomorphic {
                handler: PropertyHandler::Prototype { accessor, .. },
                ..
            } if accessor.is_heap_object() => Some(*accessor),
            _ => None,
        }
    }

    /// Handler cached for `hclass`.
    pub fn lookup(&self, hclass: TaggedValue) -> Option<PropertyHandler> {
        match self {
            FeedbackSlot::Monomorphic {
                hclass: cached,
                handler,
            } if *cached == hclass => Some(*handler),
            FeedbackSlot::Polymorphic { entries } => entries
                .iter()
                .find(|(h, _)| *h == hclass)
                .map(|(_, handler)| *handler),
            _ => None,
        }
    }

    fn update_property(&mut self, hclass: TaggedValue, handler: PropertyHandler) {
        match self {
            FeedbackSlot::Uninitialized | FeedbackSlot::Call { .. } => {
                *self = FeedbackSlot::Monomorphic { hclass, handler };
            }
            FeedbackSlot::Monomorphic {
                hclass: cached,
                handler: cached_handler,
            } => {
                if *cached == hclass {
                    *cached_handler = handler;
                } else {
                    let mut entries = ArrayVec::new();
                    entries.push((*cached, *cached_handler));
                    entries.push((hclass, handler));
                    *self = FeedbackSlot::Polymorphic { entries };
                }
            }
            FeedbackSlot::Polymorphic { entries } => {
                if let Some(entry) = entries.iter_mut().find(|(h, _)| *h == hclass) {
                    entry.1 = handler;
                } else if entries.try_push((hclass, handler)).is_err() {
                    *self = FeedbackSlot::Megamorphic;
                }
            }
            FeedbackSlot::Megamorphic => {}
        }
    }
}

/// Feedback slots of one function.
///
/// Interpreter threads write, the JIT thread reads a snapshot of one slot at
/// a time.
#[derive(Debug)]
pub struct FeedbackVector {
    slots: RwLock<Vec<FeedbackSlot>>,
}

impl FeedbackVector {
    /// Create a vector with `len` uninitialized slots.
    pub fn new(len: usize) -> Self {
        Self {
            slots: RwLock::new(vec![FeedbackSlot::Uninitialized; len]),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns true if the vector has no slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of one slot.
    pub fn get(&self, slot: u32) -> Option<FeedbackSlot> {
        self.slots.read().get(slot as usize).cloned()
    }

    /// Record a call target. Returns false for an out-of-range slot.
    pub fn record_call(&self, slot: u32, target: TaggedValue) -> bool {
        match self.slots.write().get_mut(slot as usize) {
            Some(entry) => {
                *entry = FeedbackSlot::Call { target };
                true
            }
            None => false,
        }
    }

    /// Record a property access. Returns false for an out-of-range slot.
    pub fn record_property(&self, slot: u32, hclass: TaggedValue, handler: PropertyHandler) -> bool {
        match self.slots.write().get_mut(slot as usize) {
            Some(entry) => {
                entry.update_property(hclass, handler);
                true
            }
            None => false,
        }
    }
}

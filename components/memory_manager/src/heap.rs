//! Handle-based heap.
//!
//! The caching layer treats the heap as an external collaborator: it
//! allocates cells, interns strings, stores through a write barrier and reads
//! tagged values back. Cells are never freed here. Collection is not part of
//! this crate.

use crate::object::{FunctionObject, HeapObject, MethodObject};
use crate::write_barrier::{needs_barrier, RememberedSet};
use crate::HiddenClass;
use core_types::{HeapRef, TaggedValue};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Heap usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of allocated cells
    pub objects: usize,
    /// Number of distinct interned strings
    pub interned_strings: usize,
    /// Number of remembered old cells
    pub remembered: usize,
}

/// Array object fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayView {
    /// Layout
    pub hclass: HeapRef,
    /// Backing store
    pub elements: HeapRef,
    /// Logical length
    pub length: u32,
}

/// Shared heap.
///
/// All methods take `&self`; the heap is shared between interpreter, loader
/// and compiler threads behind an `Arc`.
///
/// # Example
///
/// ```
/// use memory_manager::{Heap, HiddenClass};
///
/// let heap = Heap::new();
/// let a = heap.intern_string("answer");
/// let b = heap.intern_string("answer");
/// assert_eq!(a, b);
///
/// let hclass = heap.new_hclass(HiddenClass::new().add_property("x"));
/// let obj = heap.allocate_object(hclass, 1);
/// assert!(heap.store(obj, 0, core_types::TaggedValue::int(42)));
/// assert_eq!(heap.load(obj, 0), Some(core_types::TaggedValue::int(42)));
/// ```
#[derive(Debug, Default)]
pub struct Heap {
    objects: RwLock<Vec<HeapObject>>,
    strings: Mutex<HashMap<Arc<str>, HeapRef>>,
    remembered: RememberedSet,
    old_boundary: AtomicU32,
}

impl Heap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, object: HeapObject) -> HeapRef {
        let mut objects = self.objects.write();
        let r = HeapRef(objects.len() as u32);
        objects.push(object);
        r
    }

    fn with<R>(&self, r: HeapRef, f: impl FnOnce(&HeapObject) -> R) -> Option<R> {
        self.objects.read().get(r.0 as usize).map(f)
    }

    fn with_value<R>(&self, v: TaggedValue, f: impl FnOnce(&HeapObject) -> Option<R>) -> Option<R> {
        let r = v.heap_ref()?;
        self.with(r, f).flatten()
    }

    /// Allocates an object with `size` undefined fields.
    pub fn allocate_object(&self, hclass: HeapRef, size: usize) -> HeapRef {
        self.push(HeapObject::Object {
            hclass,
            fields: vec![TaggedValue::UNDEFINED; size],
        })
    }

    /// Returns the unique string cell for `s`, allocating it on first use.
    pub fn intern_string(&self, s: &str) -> HeapRef {
        let mut strings = self.strings.lock();
        if let Some(&r) = strings.get(s) {
            return r;
        }
        let key: Arc<str> = Arc::from(s);
        let r = self.push(HeapObject::String(Arc::clone(&key)));
        strings.insert(key, r);
        r
    }

    /// Looks up an interned string without allocating.
    pub fn find_string(&self, s: &str) -> Option<HeapRef> {
        self.strings.lock().get(s).copied()
    }

    /// Allocates a fresh symbol.
    pub fn new_symbol(&self, description: Option<&str>) -> HeapRef {
        self.push(HeapObject::Symbol(description.map(Arc::from)))
    }

    /// Places a hidden class on the heap.
    pub fn new_hclass(&self, hclass: HiddenClass) -> HeapRef {
        self.push(HeapObject::HiddenClass(Arc::new(hclass)))
    }

    /// Allocates a tagged backing store.
    pub fn new_tagged_array(&self, values: Vec<TaggedValue>) -> HeapRef {
        self.push(HeapObject::TaggedArray(values))
    }

    /// Allocates an array object over an existing backing store.
    pub fn new_array(&self, hclass: HeapRef, elements: HeapRef, length: u32) -> HeapRef {
        self.push(HeapObject::Array {
            hclass,
            elements,
            length,
        })
    }

    /// Allocates a method object.
    pub fn new_method(&self, method: MethodObject) -> HeapRef {
        self.push(HeapObject::Method(method))
    }

    /// Allocates a function object.
    pub fn new_function(&self, function: FunctionObject) -> HeapRef {
        self.push(HeapObject::Function(function))
    }

    /// Places a runtime-owned native structure on the heap.
    pub fn new_host<T: Any + Send + Sync>(&self, value: Arc<T>) -> HeapRef {
        self.push(HeapObject::Host(value))
    }

    /// Stores into an object field or backing-store element.
    ///
    /// Returns false when `holder` has no such slot.
    pub fn store(&self, holder: HeapRef, index: u32, value: TaggedValue) -> bool {
        let stored = {
            let mut objects = self.objects.write();
            let slot = match objects.get_mut(holder.0 as usize) {
                Some(HeapObject::Object { fields, .. }) => fields.get_mut(index as usize),
                Some(HeapObject::TaggedArray(values)) => values.get_mut(index as usize),
                _ => None,
            };
            match slot {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            }
        };
        if stored {
            self.write_barrier(holder, value);
        }
        stored
    }

    /// Reads an object field or backing-store element.
    pub fn load(&self, holder: HeapRef, index: u32) -> Option<TaggedValue> {
        self.with(holder, |obj| match obj {
            HeapObject::Object { fields, .. } => fields.get(index as usize).copied(),
            HeapObject::TaggedArray(values) => values.get(index as usize).copied(),
            _ => None,
        })
        .flatten()
    }

    /// Records an old → young edge created outside [`Heap::store`].
    pub fn write_barrier(&self, holder: HeapRef, value: TaggedValue) {
        if needs_barrier(holder, value, self.old_boundary.load(Ordering::Acquire)) {
            self.remembered.add(holder);
        }
    }

    /// Marks every cell allocated so far as old.
    pub fn promote_all(&self) {
        let len = self.objects.read().len() as u32;
        self.old_boundary.store(len, Ordering::Release);
    }

    /// The remembered set maintained by the write barrier.
    pub fn remembered_set(&self) -> &RememberedSet {
        &self.remembered
    }

    /// Number of allocated cells.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true when nothing was allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usage counters.
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            objects: self.len(),
            interned_strings: self.strings.lock().len(),
            remembered: self.remembered.len(),
        }
    }

    /// Kind name of a cell, for diagnostics.
    pub fn kind_name(&self, r: HeapRef) -> Option<&'static str> {
        self.with(r, HeapObject::kind_name)
    }

    /// String contents.
    pub fn string(&self, v: TaggedValue) -> Option<Arc<str>> {
        self.with_value(v, |obj| match obj {
            HeapObject::String(s) => Some(Arc::clone(s)),
            _ => None,
        })
    }

    /// Hidden class contents.
    pub fn hclass(&self, v: TaggedValue) -> Option<Arc<HiddenClass>> {
        self.with_value(v, |obj| match obj {
            HeapObject::HiddenClass(h) => Some(Arc::clone(h)),
            _ => None,
        })
    }

    /// Hidden class of an ordinary or array object.
    pub fn hclass_of(&self, v: TaggedValue) -> Option<HeapRef> {
        self.with_value(v, |obj| match obj {
            HeapObject::Object { hclass, .. } | HeapObject::Array { hclass, .. } => Some(*hclass),
            _ => None,
        })
    }

    /// Method object fields.
    pub fn method(&self, v: TaggedValue) -> Option<MethodObject> {
        self.with_value(v, |obj| match obj {
            HeapObject::Method(m) => Some(*m),
            _ => None,
        })
    }

    /// Function object fields.
    pub fn function(&self, v: TaggedValue) -> Option<FunctionObject> {
        self.with_value(v, |obj| match obj {
            HeapObject::Function(f) => Some(f.clone()),
            _ => None,
        })
    }

    /// Array object fields.
    pub fn array(&self, v: TaggedValue) -> Option<ArrayView> {
        self.with_value(v, |obj| match obj {
            HeapObject::Array {
                hclass,
                elements,
                length,
            } => Some(ArrayView {
                hclass: *hclass,
                elements: *elements,
                length: *length,
            }),
            _ => None,
        })
    }

    /// Copy of a tagged backing store.
    pub fn tagged_array(&self, v: TaggedValue) -> Option<Vec<TaggedValue>> {
        self.with_value(v, |obj| match obj {
            HeapObject::TaggedArray(values) => Some(values.clone()),
            _ => None,
        })
    }

    /// Length of a tagged backing store.
    pub fn tagged_array_len(&self, v: TaggedValue) -> Option<u32> {
        self.with_value(v, |obj| match obj {
            HeapObject::TaggedArray(values) => Some(values.len() as u32),
            _ => None,
        })
    }

    /// Native structure of type `T`.
    pub fn host<T: Any + Send + Sync>(&self, v: TaggedValue) -> Option<Arc<T>> {
        self.with_value(v, |obj| match obj {
            HeapObject::Host(any) => Arc::clone(any).downcast::<T>().ok(),
            _ => None,
        })
    }

    /// Returns true for a string cell.
    pub fn is_string(&self, v: TaggedValue) -> bool {
        self.is_kind(v, |obj| matches!(obj, HeapObject::String(_)))
    }

    /// Returns true for a symbol cell.
    pub fn is_symbol(&self, v: TaggedValue) -> bool {
        self.is_kind(v, |obj| matches!(obj, HeapObject::Symbol(_)))
    }

    /// Returns true for a hidden class cell.
    pub fn is_hclass(&self, v: TaggedValue) -> bool {
        self.is_kind(v, |obj| matches!(obj, HeapObject::HiddenClass(_)))
    }

    /// Returns true for a method cell.
    pub fn is_method(&self, v: TaggedValue) -> bool {
        self.is_kind(v, |obj| matches!(obj, HeapObject::Method(_)))
    }

    /// Returns true for a function cell.
    pub fn is_function(&self, v: TaggedValue) -> bool {
        self.is_kind(v, |obj| matches!(obj, HeapObject::Function(_)))
    }

    /// Returns true for an array object.
    pub fn is_array(&self, v: TaggedValue) -> bool {
        self.is_kind(v, |obj| matches!(obj, HeapObject::Array { .. }))
    }

    /// Returns true for an ordinary object.
    pub fn is_object(&self, v: TaggedValue) -> bool {
        self.is_kind(v, |obj| matches!(obj, HeapObject::Object { .. }))
    }

    fn is_kind(&self, v: TaggedValue, f: impl FnOnce(&HeapObject) -> bool) -> bool {
        self.with_value(v, |obj| Some(f(obj))).unwrap_or(false)
    }
}

//! Contract tests verifying the memory_manager API the caching layer relies on.

use core_types::{HeapRef, TaggedValue};
use memory_manager::{Heap, HiddenClass};
use std::sync::Arc;
use std::thread;

/// Contract: allocate_object(hclass, size) yields an object of that layout
#[test]
fn contract_allocate_object() {
    let heap = Heap::new();
    let hclass = heap.new_hclass(HiddenClass::new().add_property("a").add_property("b"));
    let obj = heap.allocate_object(hclass, 2);
    let v = TaggedValue::heap(obj);
    assert!(heap.is_object(v));
    assert_eq!(heap.hclass_of(v), Some(hclass));
    assert_eq!(heap.load(obj, 1), Some(TaggedValue::UNDEFINED));
}

/// Contract: intern_string(bytes) converges on one cell per contents
#[test]
fn contract_intern_string() {
    let heap = Heap::new();
    let a = heap.intern_string("k");
    let b = heap.intern_string("k");
    let c = heap.intern_string("j");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(heap.find_string("k"), Some(a));
    assert_eq!(heap.find_string("missing"), None);
    assert_eq!(heap.string(TaggedValue::heap(c)).as_deref(), Some("j"));
}

/// Contract: tagged predicates never treat specials as heap cells
#[test]
fn contract_predicates_on_specials() {
    let heap = Heap::new();
    heap.intern_string("s");
    for v in [TaggedValue::HOLE, TaggedValue::UNDEFINED, TaggedValue::int(0)] {
        assert!(!heap.is_string(v));
        assert!(!heap.is_array(v));
        assert!(!heap.is_hclass(v));
    }
}

/// Contract: store(ref, offset, value) is visible to other threads
#[test]
fn contract_store_is_shared() {
    let heap = Arc::new(Heap::new());
    let store = heap.new_tagged_array(vec![TaggedValue::HOLE; 4]);
    let handles: Vec<_> = (0..4u32)
        .map(|i| {
            let heap = Arc::clone(&heap);
            thread::spawn(move || heap.store(store, i, TaggedValue::int(i as i32)))
        })
        .collect();
    for h in handles {
        assert!(h.join().unwrap());
    }
    let values = heap.tagged_array(TaggedValue::heap(store)).unwrap();
    assert_eq!(
        values,
        (0..4).map(TaggedValue::int).collect::<Vec<_>>()
    );
}

/// Contract: array objects expose their backing store and length
#[test]
fn contract_array_view() {
    let heap = Heap::new();
    let hclass = heap.new_hclass(HiddenClass::new());
    let elements = heap.new_tagged_array(vec![TaggedValue::int(1); 3]);
    let array = heap.new_array(hclass, elements, 3);
    let view = heap.array(TaggedValue::heap(array)).unwrap();
    assert_eq!(view.elements, elements);
    assert_eq!(view.length, 3);
    assert_eq!(heap.tagged_array_len(TaggedValue::heap(elements)), Some(3));
    assert!(heap.array(TaggedValue::heap(HeapRef(0))).is_none());
}

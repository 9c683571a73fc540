//! Contract compliance tests for core_types
//!
//! These tests verify the value-word contract the heap and constant pools
//! rely on.

use core_types::{HeapRef, TaggedValue};

/// Contract: the unresolved sentinel is distinct from every resolvable value
#[test]
fn test_hole_is_not_a_value() {
    let hole = TaggedValue::HOLE;
    assert!(hole.is_hole());
    assert!(!hole.is_undefined());
    assert!(!hole.is_heap_object());
    assert!(!hole.is_aot_entry());
    assert_ne!(hole, TaggedValue::int(0));
}

/// Contract: heap references round-trip through the word
#[test]
fn test_heap_refs_roundtrip() {
    for index in [0u32, 1, 7, 1 << 20, u32::MAX >> 4] {
        let v = TaggedValue::heap(HeapRef(index));
        assert_eq!(v.heap_ref(), Some(HeapRef(index)));
        assert!(!v.is_number());
    }
}

/// Contract: the raw word is what a pool slot stores
#[test]
fn test_raw_word_roundtrip() {
    let v = TaggedValue::aot_entry(3);
    assert_eq!(TaggedValue::from_raw(v.raw()), v);
}

/// Contract: values are plain data and can move across threads
#[test]
fn test_value_is_send_sync_copy() {
    fn assert_traits<T: Send + Sync + Copy>() {}
    assert_traits::<TaggedValue>();
    assert_traits::<HeapRef>();
}

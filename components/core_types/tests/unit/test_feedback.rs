//! Unit tests for feedback vectors and the frozen slot chain

use core_types::{
    FeedbackSlot, FeedbackVector, HeapRef, ProfileSlotChain, PropertyHandler, TaggedValue,
};
use std::sync::Arc;
use std::thread;

fn obj(i: u32) -> TaggedValue {
    TaggedValue::heap(HeapRef(i))
}

#[test]
fn test_new_vector_is_uninitialized() {
    let v = FeedbackVector::new(3);
    assert_eq!(v.len(), 3);
    assert!(!v.is_empty());
    for slot in 0..3 {
        assert_eq!(v.get(slot), Some(FeedbackSlot::Uninitialized));
    }
}

#[test]
fn test_call_slot_overwrites_property_state() {
    let v = FeedbackVector::new(1);
    v.record_property(0, obj(1), PropertyHandler::Field { offset: 0 });
    v.record_call(0, obj(7));
    assert_eq!(v.get(0).and_then(|s| s.callee()), Some(obj(7)));
}

#[test]
fn test_concurrent_recording_keeps_slot_consistent() {
    let v = Arc::new(FeedbackVector::new(1));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let v = Arc::clone(&v);
            thread::spawn(move || {
                for _ in 0..100 {
                    v.record_property(0, obj(t), PropertyHandler::Field { offset: t });
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    match v.get(0).unwrap() {
        FeedbackSlot::Polymorphic { entries } => assert_eq!(entries.len(), 4),
        other => panic!("unexpected state {:?}", other),
    }
}

#[test]
fn test_unknown_offset_has_no_path() {
    let chain = ProfileSlotChain::builder(0x10).link(0x20, 0x10, 0).build();
    assert!(chain.path_to(0x30).is_none());
    assert_eq!(chain.path_to(0x20).map(|p| p.len()), Some(1));
    assert_eq!(chain.entry_offset(), 0x10);
}

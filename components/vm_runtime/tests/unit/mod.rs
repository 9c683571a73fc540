//! Unit tests for the type manager and snapshot tables

use core_types::{HeapRef, ProfileType, ProfileTypeKind, ProfileTypeTuple, ProfileTyper, TaggedValue};
use memory_manager::{Heap, HiddenClass};
use vm_runtime::{ProtoTransRequest, TypeManager};

fn class(id: u32) -> ProfileType {
    ProfileType::new(1, id, ProfileTypeKind::ClassId)
}

fn transition(id: u32) -> ProfileType {
    ProfileType::new(1, id, ProfileTypeKind::TransitionClassId)
}

fn v(i: u32) -> TaggedValue {
    TaggedValue::heap(HeapRef(i))
}

// ============================================================================
// Recording
// ============================================================================

#[test]
fn test_recording_same_value_twice_is_idempotent() {
    let manager = TypeManager::new(v(0));
    manager.record_hclass(class(1), class(1), v(7), false);
    manager.record_hclass(class(1), class(1), v(7), false);
    assert_eq!(manager.recorded_hclasses(), 1);
    assert_eq!(manager.query_hclass(class(1), class(1)), v(7));
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "changed from")]
fn test_changed_value_without_update_asserts() {
    let manager = TypeManager::new(v(0));
    manager.record_hclass(class(1), class(1), v(7), false);
    manager.record_hclass(class(1), class(1), v(8), false);
}

#[test]
fn test_query_miss_is_undefined() {
    let manager = TypeManager::new(v(0));
    assert!(manager.query_hclass(class(9), class(9)).is_undefined());
}

#[test]
fn test_clear_keeps_last_snapshot() {
    let heap = Heap::new();
    let manager = TypeManager::new(v(0));
    manager.record_hclass(class(1), class(1), v(7), false);
    manager.record_constant_index(4, 2);
    manager.init_aot_snapshot(&heap, 1);
    manager.clear_hclass_records();

    assert_eq!(manager.recorded_hclasses(), 0);
    assert!(manager.query_hclass(class(1), class(1)).is_undefined());
    assert_eq!(manager.get_hclass_by_index(1), v(7));
    let next = manager.init_aot_snapshot(&heap, 1);
    assert_eq!(next.hclass_table.len(), 1);
    assert!(next.constant_index.is_empty());
}

// ============================================================================
// Snapshot tables
// ============================================================================

#[test]
fn test_hclass_table_keeps_insertion_order() {
    let heap = Heap::new();
    let manager = TypeManager::new(v(0));
    manager.record_hclass(class(3), class(3), v(30), false);
    manager.record_hclass(class(1), class(1), v(10), false);
    manager.record_hclass(class(2), class(2), v(20), false);
    let snapshot = manager.init_aot_snapshot(&heap, 0);

    let hclasses: Vec<_> = snapshot.hclass_table.iter().map(|e| e.hclass).collect();
    assert_eq!(hclasses, vec![v(0), v(30), v(10), v(20)]);
    assert!(snapshot.hclass_table[0].typer.root.is_native_object());
    assert_eq!(
        manager.get_hclass_index_by_profile_type(ProfileTyper::new(class(2), class(2))),
        Some(3)
    );
    assert_eq!(
        manager.get_hclass_index_by_profile_type(ProfileTyper::root_only(ProfileType::native_object())),
        Some(0)
    );
}

#[test]
fn test_symbol_table_skips_transitioning_hclasses() {
    let heap = Heap::new();
    let sym_a = heap.new_symbol(Some("a"));
    let sym_b = heap.new_symbol(Some("b"));
    let stable = heap.new_hclass(HiddenClass::new().add_property("x").add_symbol(sym_a));
    let moving = heap.new_hclass(HiddenClass::new().add_symbol(sym_b).as_transitioning());

    let manager = TypeManager::new(v(0));
    manager.record_hclass(class(1), class(1), TaggedValue::heap(stable), false);
    manager.record_hclass(class(2), class(2), TaggedValue::heap(moving), false);
    let snapshot = manager.init_aot_snapshot(&heap, 0);

    assert_eq!(snapshot.symbol_table.len(), 1);
    let entry = snapshot.symbol_table[0];
    assert_eq!(entry.symbol, TaggedValue::heap(sym_a));
    assert_eq!(entry.tuple.slot_index, 1);

    let tuple = ProfileTypeTuple::new(class(1), class(1), 1);
    assert_eq!(manager.get_symbol_id_by_profile_type(&tuple), Some(tuple.symbol_id()));
    assert_eq!(
        manager.get_symbol_id_by_profile_type(&ProfileTypeTuple::new(class(2), class(2), 0)),
        None
    );
}

#[test]
fn test_constant_index_table_preserves_order() {
    let heap = Heap::new();
    let manager = TypeManager::new(v(0));
    manager.record_constant_index(12, 3);
    manager.record_constant_index(4, 1);
    manager.record_constant_index(12, 3);
    let snapshot = manager.init_aot_snapshot(&heap, 0);
    let pairs: Vec<_> = snapshot
        .constant_index
        .iter()
        .map(|e| (e.bc_offset, e.cp_index))
        .collect();
    assert_eq!(pairs, vec![(12, 3), (4, 1), (12, 3)]);
}

#[test]
fn test_proto_transition_resolved_and_skipped() {
    let heap = Heap::new();
    let manager = TypeManager::new(v(0));
    manager.record_hclass(class(1), class(1), v(11), false);
    manager.record_hclass(class(2), class(2), v(12), false);
    manager.record_hclass(transition(3), transition(3), v(13), false);
    manager.record_hclass(transition(4), transition(4), v(14), false);

    manager.record_proto_trans_type(ProtoTransRequest {
        ihc_type: class(1),
        base_root_type: class(2),
        base_type: class(2),
        trans_ihc_type: transition(3),
        trans_phc_type: transition(4),
    });
    manager.record_proto_trans_type(ProtoTransRequest {
        ihc_type: class(1),
        base_root_type: class(2),
        base_type: class(2),
        trans_ihc_type: transition(5),
        trans_phc_type: transition(4),
    });
    let snapshot = manager.init_aot_snapshot(&heap, 0);

    let table = &snapshot.proto_transitions;
    assert_eq!(table.len(), 1);
    assert_eq!(table.find_transition(v(11), v(12)), Some((v(13), v(14))));
    assert_eq!(table.fake_parent(v(14)), Some(v(11)));
}

#[test]
fn test_snapshot_is_deterministic() {
    let build = || {
        let heap = Heap::new();
        let sym = heap.new_symbol(None);
        let hclass = heap.new_hclass(HiddenClass::new().add_symbol(sym));
        let manager = TypeManager::new(v(0));
        manager.record_hclass(class(1), class(2), TaggedValue::heap(hclass), false);
        manager.record_hclass(class(3), class(3), v(9), false);
        manager.record_constant_index(1, 2);
        let snapshot = manager.init_aot_snapshot(&heap, 2);
        serde_json::to_string(&*snapshot).unwrap()
    };
    assert_eq!(build(), build());
}

#[test]
fn test_snapshot_json_roundtrip() {
    let heap = Heap::new();
    let manager = TypeManager::new(v(0));
    manager.record_hclass(class(1), class(1), v(5), false);
    let snapshot = manager.init_aot_snapshot(&heap, 1);
    let json = serde_json::to_string(&*snapshot).unwrap();
    let back: vm_runtime::AotSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, *snapshot);
}

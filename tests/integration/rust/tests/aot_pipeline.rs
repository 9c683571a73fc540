//! AOT snapshot cycle
//!
//! Record layouts, freeze a snapshot, serialize it, restore pools in a
//! fresh runtime and check compiled entries materialise on resolve.

use aot_cli::commands::{read_snapshot, restore, take_snapshot};
use aot_cli::Workspace;
use bytecode_system::ConstantKind;
use core_types::{ProfileType, ProfileTypeKind, TaggedValue};
use integration_tests::{call_chain_program, LEAF, MAIN};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use vm_runtime::{AotSnapshot, EcmaContext, Runtime, RuntimeOptions};

fn table_order() -> Vec<u32> {
    let runtime = Runtime::new(RuntimeOptions::default().with_loader_workers(1));
    let encoded = call_chain_program();
    let file = runtime.load_file("chain.abc", encoded.bytes).unwrap();
    let context = EcmaContext::new(runtime.clone());
    let pool = context.find_or_create_constpool(&file, encoded.method_offsets[MAIN]);
    let array = pool.get_literal_from_cache(4, ConstantKind::ArrayLiteral);
    let hclass = TaggedValue::heap(runtime.heap().hclass_of(array).unwrap());

    let types = runtime.type_manager();
    for id in [9u32, 3, 5] {
        let site = ProfileType::new(0, id, ProfileTypeKind::ArrayLiteralId);
        types.record_hclass(site, site, hclass, false);
    }
    let snapshot = types.init_aot_snapshot(runtime.heap(), 1);
    assert!(snapshot.hclass_table[0].typer.root.is_native_object());
    snapshot
        .hclass_table
        .iter()
        .map(|row| row.typer.root.type_id)
        .collect()
}

/// Test: the hidden class table keeps recording order
#[test]
fn test_snapshot_table_order_is_stable() {
    let first = table_order();
    assert_eq!(first, vec![0, 9, 3, 5]);
    assert_eq!(first, table_order());
}

/// Test: snapshot from a file on disk, JSON roundtrip, restore in a new
/// runtime and resolve a compiled method
#[test]
fn test_snapshot_restore_cycle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chain.abc");
    let encoded = call_chain_program();
    fs::write(&path, &encoded.bytes).unwrap();

    let workspace = Workspace::open(&[path.clone()], Some(1)).unwrap();
    let snapshot = take_snapshot(&workspace);
    // Array literal layout plus the reserved native-object row.
    assert_eq!(snapshot.hclass_table.len(), 2);
    assert_eq!(snapshot.constant_index.len(), 3);

    let json_path = dir.path().join("snap.json");
    fs::write(&json_path, serde_json::to_string_pretty(&*snapshot).unwrap()).unwrap();
    let loaded: AotSnapshot = read_snapshot(&json_path).unwrap();
    assert_eq!(*snapshot, loaded);

    let fresh = Workspace::open(&[path], Some(1)).unwrap();
    let reports = restore(&fresh, &Arc::new(loaded));
    assert!(reports[0].restored);
    assert_eq!(reports[0].aot_entries, 3);

    let file = &fresh.files()[0];
    let pool = fresh.runtime().find_shared_constpool(file.id(), 0).unwrap();
    assert!(pool.aot_snapshot().is_some());
    let method = pool.get_method_from_cache(LEAF as u32);
    let method = fresh.runtime().heap().method(method).unwrap();
    assert_eq!(method.aot_entry, Some(LEAF as u32));
    assert_eq!(method.offset, encoded.method_offsets[LEAF]);
    // Entries that were never compiled still resolve normally.
    assert!(pool.get_string_from_cache(3).is_heap_object());
}

/// Test: a snapshot for one file does not restore pools of another
#[test]
fn test_restore_skips_files_without_image() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chain.abc");
    fs::write(&path, call_chain_program().bytes).unwrap();

    let workspace = Workspace::open(&[path], Some(1)).unwrap();
    let empty = Arc::new(AotSnapshot {
        constpools: vec![None],
        ..AotSnapshot::default()
    });
    let reports = restore(&workspace, &empty);
    assert!(!reports[0].restored);
    assert_eq!(reports[0].aot_entries, 0);
}

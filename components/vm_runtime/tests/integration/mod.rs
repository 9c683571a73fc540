//! Integration tests for constant pools, contexts and the runtime
//!
//! Tests interaction between BytecodeFile, ConstantPool, EcmaContext and
//! TypeManager

use bytecode_system::file_format::{ClassBuilder, EncodedFile, FileBuilder, MethodBuilder};
use bytecode_system::{ConstantEntry, ConstantKind, LiteralValue};
use std::sync::{Arc, Barrier};
use std::thread;
use vm_runtime::{EcmaContext, Runtime, RuntimeOptions};

/// Index header: 0 string, 1 method, 2 object literal, 3 array literal of
/// length 5, 4 class literal.
fn program() -> EncodedFile {
    let mut builder = FileBuilder::new();
    let greeting = builder.string("greeting");
    let name = builder.string("name");
    let speak = builder.string("speak");
    let object = builder.literal(vec![LiteralValue::String(name), LiteralValue::String(greeting)]);
    let array = builder.literal(vec![
        LiteralValue::Integer(1),
        LiteralValue::Integer(2),
        LiteralValue::Double(3.5),
        LiteralValue::String(greeting),
        LiteralValue::Boolean(true),
    ]);
    let class = builder.literal(vec![
        LiteralValue::Method(1),
        LiteralValue::String(speak),
        LiteralValue::Method(2),
    ]);
    let header = builder.index_header(vec![
        ConstantEntry::new(ConstantKind::String, greeting),
        ConstantEntry::new(ConstantKind::Method, 1),
        ConstantEntry::new(ConstantKind::ObjectLiteral, object),
        ConstantEntry::new(ConstantKind::ArrayLiteral, array),
        ConstantEntry::new(ConstantKind::ClassLiteral, class),
    ]);
    builder.add_class(
        ClassBuilder::new("Lapp;")
            .method(MethodBuilder::new("func_main_0").with_index_header(header))
            .method(MethodBuilder::new("Animal").with_index_header(header))
            .method(MethodBuilder::new("speak").with_index_header(header)),
    );
    builder.build()
}

fn runtime() -> Arc<Runtime> {
    Runtime::new(RuntimeOptions::default().with_loader_workers(2))
}

#[test]
fn test_two_threads_resolve_same_array_literal() {
    let runtime = runtime();
    let encoded = program();
    let file = runtime.load_file("app.abc", encoded.bytes).unwrap();
    let context = EcmaContext::new(runtime.clone());
    let pool = context.find_or_create_constpool(&file, encoded.method_offsets[0]);
    assert!(pool.get(3).is_hole());

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                pool.get_literal_from_cache(3, ConstantKind::ArrayLiteral)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results[0], results[1]);
    assert!(!pool.get(3).is_hole());
    assert_eq!(pool.get(3), results[0]);
    let array = runtime.heap().array(results[0]).unwrap();
    assert_eq!(array.length, 5);
}

#[test]
fn test_many_threads_resolve_at_most_once() {
    let runtime = runtime();
    let encoded = program();
    let file = runtime.load_file("app.abc", encoded.bytes).unwrap();
    let pool = runtime.create_shared_constpool(&file, 0);

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                (0..5).map(|i| pool.resolve(i)).collect::<Vec<_>>()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for r in &results[1..] {
        assert_eq!(r, &results[0]);
    }
    assert_eq!(pool.resolved_count(), 5);
}

#[test]
fn test_shared_and_unshared_are_independent() {
    let runtime = runtime();
    let encoded = program();
    let file = runtime.load_file("app.abc", encoded.bytes).unwrap();
    let context = EcmaContext::new(runtime.clone());
    let shared = context.find_or_create_constpool(&file, encoded.method_offsets[0]);
    let unshared = context.find_or_create_unshared_constpool(&shared);

    let from_unshared = unshared.get_literal_from_cache(3, ConstantKind::ArrayLiteral);
    assert!(shared.get(3).is_hole());
    let from_shared = shared.get_literal_from_cache(3, ConstantKind::ArrayLiteral);
    assert_ne!(from_shared, from_unshared);

    // strings are interned, so both kinds agree
    assert_eq!(shared.get_string_from_cache(0), unshared.get_string_from_cache(0));
}

#[test]
fn test_contexts_share_pools_but_not_unshared_pools() {
    let runtime = runtime();
    let encoded = program();
    let file = runtime.load_file("app.abc", encoded.bytes).unwrap();
    let a = EcmaContext::new(runtime.clone());
    let b = EcmaContext::new(runtime.clone());

    let shared_a = a.find_or_create_constpool(&file, encoded.method_offsets[0]);
    let shared_b = b.find_or_create_constpool(&file, encoded.method_offsets[1]);
    assert!(Arc::ptr_eq(&shared_a, &shared_b));

    let unshared_a = a.find_or_create_unshared_constpool(&shared_a);
    let unshared_b = b.find_or_create_unshared_constpool(&shared_b);
    assert!(!Arc::ptr_eq(&unshared_a, &unshared_b));
    assert!(Arc::ptr_eq(
        &a.find_unshared_constpool(&shared_a).unwrap(),
        &unshared_a
    ));
    assert!(Arc::ptr_eq(&a.find_or_create_unshared_constpool(&unshared_a), &unshared_a));
}

#[test]
fn test_class_literal_builds_prototype() {
    let runtime = runtime();
    let encoded = program();
    let file = runtime.load_file("app.abc", encoded.bytes).unwrap();
    let pool = runtime.create_shared_constpool(&file, 0);
    let heap = runtime.heap();

    let proto = pool.get_literal_from_cache(4, ConstantKind::ClassLiteral);
    let hclass = heap
        .hclass(core_types::TaggedValue::heap(heap.hclass_of(proto).unwrap()))
        .unwrap();
    assert!(hclass.is_prototype);
    assert_eq!(hclass.lookup_property("constructor"), Some(0));
    assert_eq!(hclass.lookup_property("speak"), Some(1));

    let ctor = heap.load(proto.heap_ref().unwrap(), 0).unwrap();
    let ctor = heap.method(ctor).unwrap();
    assert_eq!(ctor.offset, encoded.method_offsets[1]);
    assert_eq!(ctor.constpool, pool.tagged());
}

#[test]
fn test_define_function_uses_unshared_pool() {
    let runtime = runtime();
    let encoded = program();
    let file = runtime.load_file("app.abc", encoded.bytes).unwrap();
    let context = EcmaContext::new(runtime.clone());
    let shared = context.find_or_create_constpool(&file, encoded.method_offsets[0]);

    let function = context.define_function(&shared, 1, 4);
    let heap = runtime.heap();
    let function = heap.function(function).unwrap();
    assert_eq!(function.feedback.as_ref().map(|f| f.len()), Some(4));
    let method = heap
        .method(core_types::TaggedValue::heap(function.method))
        .unwrap();
    let unshared = context.find_unshared_constpool(&shared).unwrap();
    assert_eq!(method.constpool, unshared.tagged());
}

#[test]
fn test_erase_unused_constpool() {
    let runtime = runtime();
    let encoded = program();
    let file = runtime.load_file("app.abc", encoded.bytes).unwrap();
    let context = EcmaContext::new(runtime.clone());
    let shared = context.find_or_create_constpool(&file, encoded.method_offsets[0]);
    context.find_or_create_unshared_constpool(&shared);

    assert_eq!(context.erase_unused_constpool(&file), 1);
    assert!(context.find_unshared_constpool(&shared).is_none());
    assert_eq!(context.erase_unused_constpool(&file), 0);
    // the runtime still knows the shared pool
    assert!(context.find_constpool(&file, 0).is_some());
}

#[test]
fn test_unshared_array_grows_past_initial_capacity() {
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_loader_workers(1)
            .with_unshared_capacity(2),
    );
    let mut files = Vec::new();
    for i in 0..5 {
        let file = runtime
            .load_file(&format!("f{}.abc", i), program().bytes)
            .unwrap();
        files.push(file);
    }
    let context = EcmaContext::new(runtime.clone());
    assert_eq!(context.unshared_capacity(), 2);
    for file in &files {
        let shared = runtime.create_shared_constpool(file, 0);
        context.find_or_create_unshared_constpool(&shared);
    }
    assert_eq!(context.unshared_capacity(), 8);
}

#[test]
fn test_aot_image_roundtrip() {
    let runtime = runtime();
    let encoded = program();
    let file = runtime.load_file("app.abc", encoded.bytes.clone()).unwrap();
    let pool = runtime.create_shared_constpool(&file, 0);

    let manager = runtime.type_manager();
    let file_index = runtime.file_index(file.id()).unwrap();
    manager.init_aot_snapshot(runtime.heap(), runtime.files().len());
    manager.store_constpool_info(file_index, &pool, &[(1, 77)]);
    let snapshot = manager.aot_snapshot().unwrap();

    let image = snapshot.constpool_image(file_index).unwrap();
    assert_eq!(image.shared_id, pool.shared_id());
    assert_eq!(image.unshared_index, pool.unshared_index());

    // a fresh process restores the pool from the image
    let restored_runtime = Runtime::new(RuntimeOptions::default().with_loader_workers(2));
    let restored_file = restored_runtime
        .load_file("app.abc", encoded.bytes)
        .unwrap();
    let restored = restored_runtime
        .load_aot_constpool(&restored_file, file_index, &snapshot)
        .unwrap();
    assert_eq!(restored.get(1).aot_entry_index(), Some(77));
    let method = restored_runtime
        .heap()
        .method(restored.get_method_from_cache(1))
        .unwrap();
    assert_eq!(method.aot_entry, Some(77));
    assert!(Arc::ptr_eq(
        &restored_runtime
            .find_shared_constpool(restored_file.id(), 0)
            .unwrap(),
        &restored
    ));
}

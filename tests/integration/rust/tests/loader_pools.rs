//! Loader and constant pool integration
//!
//! Files loaded through the runtime, pools created through contexts and
//! resolved from several interpreter threads at once.

use bytecode_system::file_format::{ClassBuilder, FileBuilder, MethodBuilder};
use bytecode_system::{ConstantKind, LiteralValue, Packaging};
use core_types::TaggedValue;
use integration_tests::{call_chain_program, MAIN};
use std::sync::{Arc, Barrier};
use std::thread;
use vm_runtime::{ConstantPool, EcmaContext, Runtime, RuntimeOptions};

fn runtime() -> Arc<Runtime> {
    Runtime::new(RuntimeOptions::default().with_loader_workers(2))
}

/// Test: two threads resolving the same array literal see one object
#[test]
fn test_two_threads_resolve_array_literal() {
    let runtime = runtime();
    let encoded = call_chain_program();
    let file = runtime.load_file("chain.abc", encoded.bytes).unwrap();
    let context = EcmaContext::new(runtime.clone());
    let pool = context.find_or_create_constpool(&file, encoded.method_offsets[MAIN]);
    assert!(pool.get(4).is_hole());

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                pool.get_literal_from_cache(4, ConstantKind::ArrayLiteral)
            })
        })
        .collect();
    let results: Vec<TaggedValue> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results[0], results[1]);
    assert!(!pool.get(4).is_hole());
    let view = runtime.heap().array(results[0]).unwrap();
    assert_eq!(view.length, 5);
    assert_eq!(
        runtime.heap().tagged_array(TaggedValue::heap(view.elements)),
        Some((1..=5).map(TaggedValue::int).collect())
    );
}

/// Test: contexts on different threads share one shared pool but get
/// their own unshared pools
#[test]
fn test_contexts_share_shared_pools() {
    let runtime = runtime();
    let encoded = call_chain_program();
    let file = runtime.load_file("chain.abc", encoded.bytes).unwrap();
    let offset = encoded.method_offsets[MAIN];

    let pools: Vec<_> = (0..4)
        .map(|_| {
            let runtime = runtime.clone();
            let file = file.clone();
            thread::spawn(move || {
                let context = EcmaContext::new(runtime);
                let shared = context.find_or_create_constpool(&file, offset);
                let unshared = context.find_or_create_unshared_constpool(&shared);
                unshared.get_string_from_cache(3);
                (shared, unshared)
            })
        })
        .map(|h| h.join().unwrap())
        .collect();

    for (shared, unshared) in &pools {
        assert!(Arc::ptr_eq(shared, &pools[0].0));
        assert!(!shared.is_resolved(3));
        assert!(unshared.is_resolved(3));
    }
    assert!(!Arc::ptr_eq(&pools[0].1, &pools[1].1));
    // Interned: every context resolved the same string.
    assert_eq!(pools[0].1.get(3), pools[3].1.get(3));
}

/// Test: merged packaging through the runtime
#[test]
fn test_merged_file_records() {
    let mut builder = FileBuilder::new();
    builder.index_header(vec![]);
    builder.add_class(
        ClassBuilder::new("Lpkg/a;")
            .field("isCommonjs", LiteralValue::Boolean(true))
            .method(MethodBuilder::new("func_main_0"))
            .method(MethodBuilder::new("helper")),
    );
    builder.add_class(ClassBuilder::new("Lplain;").method(MethodBuilder::new("other")));
    let encoded = builder.build();

    let runtime = runtime();
    let file = runtime.load_file("merged.abc", encoded.bytes).unwrap();
    assert_eq!(file.packaging(), Packaging::Merged);
    assert_eq!(file.record_names(), vec!["pkg/a"]);
    assert!(file.is_cjs("pkg/a"));
    assert_eq!(file.num_methods(), 3);
}

/// Test: many files loaded concurrently get distinct ids
#[test]
fn test_concurrent_loads() {
    let runtime = runtime();
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let runtime = runtime.clone();
            thread::spawn(move || {
                runtime
                    .load_file(&format!("f{}.abc", i), call_chain_program().bytes)
                    .unwrap()
            })
        })
        .collect();
    let files: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(runtime.files().len(), 6);
    for (i, a) in files.iter().enumerate() {
        assert_eq!(a.num_methods(), 3);
        for b in &files[i + 1..] {
            assert_ne!(a.id(), b.id());
        }
    }
}

/// Test: releasing a file drops its pools from the runtime and contexts
#[test]
fn test_release_and_erase() {
    let runtime = runtime();
    let encoded = call_chain_program();
    let file = runtime.load_file("chain.abc", encoded.bytes).unwrap();
    let context = EcmaContext::new(runtime.clone());
    let shared = context.find_or_create_constpool(&file, encoded.method_offsets[MAIN]);
    context.find_or_create_unshared_constpool(&shared);

    assert!(runtime.release_file("chain.abc").is_some());
    assert!(runtime.find_shared_constpool(file.id(), 0).is_none());
    assert_eq!(context.erase_unused_constpool(&file), 1);
    assert!(context.find_unshared_constpool(&shared).is_none());
    assert!(context.find_constpool(&file, 0).is_none());

    let weak_file = Arc::downgrade(&file);
    let cell = shared.tagged();
    drop(shared);
    drop(file);
    assert!(weak_file.upgrade().is_none());
    assert!(ConstantPool::from_tagged(runtime.heap(), cell).is_none());
}

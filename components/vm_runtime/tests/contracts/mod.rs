//! Contract tests for the vm_runtime API
//!
//! These tests pin the public surface other crates build on.

use bytecode_system::file_format::{ClassBuilder, FileBuilder, MethodBuilder};
use bytecode_system::{ConstantEntry, ConstantKind};
use core_types::TaggedValue;
use vm_runtime::{
    EcmaContext, ExtensionSlot, JsThread, PoolKind, Runtime, RuntimeOptions, ThreadState,
    RESERVED_POOL_LENGTH,
};

fn setup() -> (std::sync::Arc<Runtime>, std::sync::Arc<bytecode_system::BytecodeFile>) {
    let mut builder = FileBuilder::new();
    let s = builder.string("s");
    let header = builder.index_header(vec![
        ConstantEntry::new(ConstantKind::String, s),
        ConstantEntry::new(ConstantKind::String, s),
    ]);
    builder.add_class(
        ClassBuilder::new("Lmain;")
            .method(MethodBuilder::new("func_main_0").with_index_header(header)),
    );
    let runtime = Runtime::new(RuntimeOptions::default().with_loader_workers(1));
    let file = runtime.load_file("main.abc", builder.build().bytes).unwrap();
    (runtime, file)
}

/// A new pool has every cache slot at the hole and the reserved trailer.
#[test]
fn test_new_pool_contract() {
    let (runtime, file) = setup();
    let pool = runtime.create_shared_constpool(&file, 0);
    assert_eq!(pool.kind(), PoolKind::Shared);
    assert_eq!(pool.cache_length(), 2);
    assert_eq!(pool.layout().logical_length(), 2 + RESERVED_POOL_LENGTH);
    assert!(pool.get(0).is_hole() && pool.get(1).is_hole());
    assert_eq!(
        pool.get_logical(pool.layout().extension_index(ExtensionSlot::File)),
        TaggedValue::int(file.id().0 as i32)
    );
    assert!(pool
        .get_logical(pool.layout().extension_index(ExtensionSlot::AotHClassInfo))
        .is_undefined());
}

/// resolve() returns the published value on every later call.
#[test]
fn test_resolve_contract() {
    let (runtime, file) = setup();
    let pool = runtime.create_shared_constpool(&file, 0);
    let first = pool.resolve(0);
    assert!(first.is_heap_object());
    assert_eq!(pool.resolve(0), first);
    assert_eq!(pool.get(0), first);
}

/// Two entries naming the same string resolve to the same interned cell.
#[test]
fn test_strings_are_interned_contract() {
    let (runtime, file) = setup();
    let pool = runtime.create_shared_constpool(&file, 0);
    assert_eq!(pool.resolve(0), pool.resolve(1));
}

/// A context starts on a fresh, created thread.
#[test]
fn test_context_thread_contract() {
    let (runtime, _) = setup();
    let context = EcmaContext::new(runtime.clone());
    assert_eq!(context.thread().state(), ThreadState::Created);
    let other = EcmaContext::new(runtime);
    assert_ne!(context.thread().id(), other.thread().id());
}

/// The running token is only handed out while running.
#[test]
fn test_host_running_contract() {
    let thread = JsThread::new(9);
    assert!(thread.try_running().is_none());
    thread.set_state(ThreadState::Running);
    assert_eq!(thread.try_running().map(|t| t.thread().id()), Some(9));
}

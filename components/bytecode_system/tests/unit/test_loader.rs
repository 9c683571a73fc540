//! Loader tests: arena population and offset indexing

use bytecode_system::file_format::{adler32, ClassBuilder, FileBuilder, MethodBuilder};
use bytecode_system::{BytecodeFile, FileFormatError, FunctionKind, LoadError, LoaderConfig, LoaderState};
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn many_classes(classes: usize, methods_per_class: usize) -> (FileBuilder, Vec<String>) {
    let mut builder = FileBuilder::new();
    let mut names = Vec::new();
    for c in 0..classes {
        let mut class = ClassBuilder::new(&format!("Lmod{};", c));
        for m in 0..methods_per_class {
            let name = format!("m{}_{}", c, m);
            class = class.method(
                MethodBuilder::new(&name)
                    .with_args(m as u32)
                    .with_code(vec![c as u8, m as u8]),
            );
            names.push(name);
        }
        builder.add_class(class);
    }
    (builder, names)
}

#[test]
fn test_parallel_translation_fills_every_slot() {
    let (builder, names) = many_classes(40, 3);
    let encoded = builder.build();
    let state = LoaderState::new(LoaderConfig::default().with_workers(4));
    let file = BytecodeFile::load(&state, "many.abc", encoded.bytes.clone()).unwrap();

    assert_eq!(file.num_methods(), 120);
    assert_eq!(file.num_classes(), 40);
    for (ordinal, offset) in encoded.method_offsets.iter().enumerate() {
        let literal = file.find_method_literal(*offset).unwrap();
        assert_eq!(literal.offset, *offset);
        assert_eq!(file.method_name(literal), names[ordinal]);
        assert_eq!(literal.num_args, (ordinal % 3) as u32);
        assert_eq!(file.code(literal), &[(ordinal / 3) as u8, (ordinal % 3) as u8]);
        assert_eq!(literal.file, file.id());
    }
}

#[test]
fn test_arena_order_follows_class_order() {
    let (builder, _) = many_classes(5, 2);
    let encoded = builder.build();
    let state = LoaderState::new(LoaderConfig::default().with_workers(3));
    let file = BytecodeFile::load(&state, "order.abc", encoded.bytes).unwrap();
    let offsets: Vec<u32> = file.method_literals().map(|m| m.offset).collect();
    assert_eq!(offsets, encoded.method_offsets);
}

#[test]
fn test_unknown_offset_misses() {
    let (builder, _) = many_classes(1, 1);
    let state = LoaderState::new(LoaderConfig::default().with_workers(1));
    let file = BytecodeFile::load(&state, "one.abc", builder.build().bytes).unwrap();
    assert!(file.find_method_literal(1).is_none());
}

#[test]
fn test_function_kind_is_preserved() {
    let mut builder = FileBuilder::new();
    builder.add_class(
        ClassBuilder::new("Lk;")
            .method(MethodBuilder::new("gen").with_kind(FunctionKind::Generator))
            .method(MethodBuilder::new("get").with_kind(FunctionKind::Getter)),
    );
    let encoded = builder.build();
    let state = LoaderState::new(LoaderConfig::default().with_workers(1));
    let file = BytecodeFile::load(&state, "k.abc", encoded.bytes).unwrap();
    let kinds: Vec<_> = file.method_literals().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![FunctionKind::Generator, FunctionKind::Getter]);
}

#[test]
fn test_files_get_distinct_ids() {
    let (builder, _) = many_classes(1, 1);
    let bytes = builder.build().bytes;
    let state = LoaderState::new(LoaderConfig::default().with_workers(1));
    let a = BytecodeFile::load(&state, "a.abc", bytes.clone()).unwrap();
    let b = BytecodeFile::load(&state, "b.abc", bytes).unwrap();
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_decode_error_is_recoverable() {
    let (builder, _) = many_classes(1, 1);
    let mut bytes = builder.build().bytes;
    bytes[20] ^= 0x55;
    let state = LoaderState::new(LoaderConfig::default().with_workers(1));
    match BytecodeFile::load(&state, "bad.abc", bytes) {
        Err(LoadError::Format {
            descriptor,
            source: FileFormatError::ChecksumMismatch { .. },
        }) => assert_eq!(descriptor, "bad.abc"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
#[should_panic(expected = "declares no methods")]
fn test_zero_methods_is_fatal() {
    let mut builder = FileBuilder::new();
    builder.add_class(ClassBuilder::new("Lempty;"));
    let state = LoaderState::new(LoaderConfig::default().with_workers(1));
    let _ = BytecodeFile::load(&state, "empty.abc", builder.build().bytes);
}

#[test]
fn test_open_reads_from_disk() {
    let (builder, _) = many_classes(2, 2);
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&builder.build().bytes).unwrap();
    let state = LoaderState::new(LoaderConfig::default().with_workers(2));
    let file = BytecodeFile::open(&state, tmp.path()).unwrap();
    assert_eq!(file.num_methods(), 4);

    let missing = BytecodeFile::open(&state, &tmp.path().with_extension("missing"));
    assert!(matches!(missing, Err(LoadError::Io { .. })));
}

/// Overwrite the function kind tag of one method and re-seal the file.
fn with_bad_kind(mut bytes: Vec<u8>, method_offset: u32) -> Vec<u8> {
    bytes[method_offset as usize + 8] = 99;
    let checksum = adler32(&bytes[12..]);
    bytes[8..12].copy_from_slice(&checksum.to_le_bytes());
    bytes
}

#[test]
fn test_bad_method_kind_fails_the_load_without_hanging() {
    let (builder, _) = many_classes(8, 2);
    let encoded = builder.build();
    // Bad method in the last class, then in the first.
    let bad = [
        with_bad_kind(encoded.bytes.clone(), encoded.method_offsets[14]),
        with_bad_kind(encoded.bytes.clone(), encoded.method_offsets[0]),
    ];
    let state = Arc::new(LoaderState::new(LoaderConfig::default().with_workers(4)));

    for iteration in 0..30 {
        let bytes = bad[iteration % 2].clone();
        let (tx, rx) = crossbeam::channel::bounded(1);
        let loader = Arc::clone(&state);
        thread::spawn(move || {
            let _ = tx.send(BytecodeFile::load(&loader, "bad.abc", bytes));
        });
        let result = rx
            .recv_timeout(Duration::from_secs(10))
            .unwrap_or_else(|_| panic!("load {} did not finish", iteration));
        match result {
            Err(LoadError::Format {
                source:
                    FileFormatError::UnknownTag {
                        what: "function kind",
                        tag: 99,
                        ..
                    },
                ..
            }) => {}
            other => panic!("load {}: unexpected {:?}", iteration, other),
        }
    }

    // The pool is intact for the next file.
    let file = BytecodeFile::load(&state, "good.abc", encoded.bytes).unwrap();
    assert_eq!(file.num_methods(), 16);
    assert_eq!(state.pool().size(), 4);
}

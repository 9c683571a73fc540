//! Contract compliance tests for bytecode_system
//! Verifies the interface the constant pool and JIT layers consume.

use bytecode_system::file_format::{ClassBuilder, FileBuilder, MethodBuilder};
use bytecode_system::{
    BytecodeFile, ConstantEntry, ConstantKind, LiteralValue, LoaderConfig, LoaderState,
};

/// Contract: index headers and literal arrays are addressable by id
#[test]
fn test_contract_index_header_and_literals() {
    let mut builder = FileBuilder::new();
    let s = builder.string("hello");
    let lit = builder.literal(vec![LiteralValue::Integer(1), LiteralValue::String(s)]);
    let header = builder.index_header(vec![
        ConstantEntry::new(ConstantKind::String, s),
        ConstantEntry::new(ConstantKind::ArrayLiteral, lit),
        ConstantEntry::new(ConstantKind::Method, 0),
    ]);
    builder.add_class(
        ClassBuilder::new("Lmain;")
            .method(MethodBuilder::new("func_main_0").with_index_header(header)),
    );
    let encoded = builder.build();
    let state = LoaderState::new(LoaderConfig::default().with_workers(1));
    let file = BytecodeFile::load(&state, "c.abc", encoded.bytes).unwrap();

    let entries = file.index_header(header).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0], ConstantEntry::new(ConstantKind::String, s));
    assert_eq!(entries[2].id, encoded.method_offsets[0]);
    assert_eq!(file.string(s), Some("hello"));
    assert_eq!(file.literal_array(lit).map(|l| l.len()), Some(2));
    assert!(file.index_header(header + 1).is_none());
    assert_eq!(file.num_index_headers(), 1);

    let main = file.find_method_literal(encoded.method_offsets[0]).unwrap();
    assert_eq!(main.index_header, header);
}

/// Contract: loaded files are shareable across threads
#[test]
fn test_contract_file_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<BytecodeFile>();
    assert_send_sync::<LoaderState>();
}

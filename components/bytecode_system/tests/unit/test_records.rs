//! Packaging detection and record table tests

use bytecode_system::file_format::{ClassBuilder, FileBuilder, MethodBuilder};
use bytecode_system::{
    BytecodeFile, LiteralValue, LoaderConfig, LoaderState, Packaging, ENTRY_FUNCTION_NAME,
};
use std::sync::Arc;

fn state() -> LoaderState {
    LoaderState::new(LoaderConfig::default().with_workers(2))
}

fn load(builder: &FileBuilder) -> Arc<BytecodeFile> {
    BytecodeFile::load(&state(), "test.abc", builder.build().bytes).unwrap()
}

#[test]
fn test_commonjs_and_plain_class_make_one_record() {
    let mut builder = FileBuilder::new();
    builder.add_class(
        ClassBuilder::new("Lpkg/a;")
            .field("isCommonjs", LiteralValue::Boolean(true))
            .method(MethodBuilder::new("func_main_0"))
            .method(MethodBuilder::new("helper")),
    );
    builder.add_class(
        ClassBuilder::new("Lplain;")
            .method(MethodBuilder::new("a"))
            .method(MethodBuilder::new("b"))
            .method(MethodBuilder::new("c")),
    );
    let file = load(&builder);

    assert_eq!(file.packaging(), Packaging::Merged);
    assert_eq!(file.record_names(), vec!["pkg/a"]);
    assert_eq!(file.num_methods(), 5);
    assert!(file.is_cjs("pkg/a"));
    assert!(!file.check_record("plain"));
}

#[test]
fn test_file_without_markers_is_bundle() {
    let mut builder = FileBuilder::new();
    builder.add_class(ClassBuilder::new("Lone;").method(MethodBuilder::new("func_main_0")));
    builder.add_class(ClassBuilder::new("Ltwo;").method(MethodBuilder::new("f")));
    let encoded = builder.build();
    let file = BytecodeFile::load(&state(), "test.abc", encoded.bytes).unwrap();

    assert!(file.is_bundle_pack());
    assert_eq!(file.record_names(), vec![ENTRY_FUNCTION_NAME]);
    assert_eq!(
        file.main_method_index(ENTRY_FUNCTION_NAME),
        Some(encoded.method_offsets[0])
    );
}

#[test]
fn test_bundle_record_classes_fill_flags() {
    let mut builder = FileBuilder::new();
    builder.add_class(ClassBuilder::new("Lmain;").method(MethodBuilder::new("func_main_0")));
    builder.add_class(
        ClassBuilder::new("L_ESModuleRecord;").field("test.abc", LiteralValue::Integer(4)),
    );
    builder.add_class(
        ClassBuilder::new("L_CommonJsRecord;").field("other.abc", LiteralValue::Integer(0)),
    );
    let file = load(&builder);

    let info = file.record_info(ENTRY_FUNCTION_NAME).unwrap();
    assert_eq!(info.module_record_index, Some(4));
    assert!(!info.is_cjs);
    assert!(file.is_module(ENTRY_FUNCTION_NAME));
}

#[test]
fn test_module_record_marker_alone_makes_merged_but_no_record() {
    let mut builder = FileBuilder::new();
    builder.add_class(
        ClassBuilder::new("Les/mod;")
            .field("moduleRecordIdx", LiteralValue::Integer(2))
            .method(MethodBuilder::new("func_main_0")),
    );
    let file = load(&builder);
    assert_eq!(file.packaging(), Packaging::Merged);
    assert!(file.record_info("es/mod").is_none());
    assert!(!file.is_module("es/mod"));
}

#[test]
fn test_merged_field_markers() {
    let mut builder = FileBuilder::new();
    let json = builder.string("{\"a\":1}");
    builder.add_class(
        ClassBuilder::new("Lapp/main;")
            .field("isCommonjs", LiteralValue::Boolean(false))
            .field("moduleRecordIdx", LiteralValue::Integer(7))
            .field("isSharedModule", LiteralValue::Boolean(true))
            .field("hasTopLevelAwait", LiteralValue::Boolean(true))
            .field("moduleRequestPhaseIdx", LiteralValue::Integer(3))
            .field("pkgName@lodash", LiteralValue::Undefined)
            .method(MethodBuilder::new("func_main_0")),
    );
    builder.add_class(
        ClassBuilder::new("Lapp/data;")
            .field("jsonFileContent", LiteralValue::String(json))
            .method(MethodBuilder::new("func_main_0")),
    );
    let file = load(&builder);

    let main = file.record_info("app/main").unwrap();
    assert!(!main.is_cjs);
    assert_eq!(main.module_record_index, Some(7));
    assert!(main.is_shared_module);
    assert!(main.has_top_level_await);
    assert_eq!(main.lazy_import_index, Some(3));
    assert_eq!(main.npm_package_name.as_deref(), Some("lodash"));
    assert_eq!(main.class_id, Some(0));
    assert!(file.is_module("app/main"));

    let data = file.record_info("app/data").unwrap();
    assert!(data.is_json);
    assert_eq!(file.string(data.json_string_id.unwrap()), Some("{\"a\":1}"));
    assert!(file.is_json("app/data"));
    assert_ne!(
        file.main_method_index("app/main"),
        file.main_method_index("app/data")
    );
}

#[test]
fn test_npm_entries_side_table() {
    let mut builder = FileBuilder::new();
    builder.add_class(
        ClassBuilder::new("Lapp/main;")
            .field("isCommonjs", LiteralValue::Boolean(true))
            .field("sourceHash", LiteralValue::Integer(12))
            .method(MethodBuilder::new("func_main_0")),
    );
    builder.add_class(
        ClassBuilder::new("Lnode_modules/lodash;")
            .field("node_modules/lodash/index", LiteralValue::Undefined),
    );
    let file = load(&builder);

    assert_eq!(
        file.find_npm_entry_point("node_modules/lodash"),
        Some("node_modules/lodash/index")
    );
    assert!(!file.check_record("node_modules/lodash"));
    // Unknown fields outside an npm package are not entries.
    assert_eq!(file.find_npm_entry_point("app/main"), None);
    assert!(file.record_info("app/main").unwrap().is_cjs);
}

#[test]
fn test_external_classes_do_not_mark_merged() {
    let mut builder = FileBuilder::new();
    builder.add_class(
        ClassBuilder::new("Lext;")
            .external()
            .field("isCommonjs", LiteralValue::Boolean(true)),
    );
    builder.add_class(ClassBuilder::new("Lmain;").method(MethodBuilder::new("func_main_0")));
    let file = load(&builder);
    assert!(file.is_bundle_pack());
}

#[test]
fn test_first_merged_file_is_tagged_once() {
    let mut builder = FileBuilder::new();
    builder.add_class(
        ClassBuilder::new("La;")
            .field("isCommonjs", LiteralValue::Boolean(true))
            .method(MethodBuilder::new("func_main_0")),
    );
    let bytes = builder.build().bytes;
    let state = state();
    BytecodeFile::load(&state, "first.abc", bytes.clone()).unwrap();
    BytecodeFile::load(&state, "second.abc", bytes).unwrap();
    assert_eq!(state.first_merged_file().as_deref(), Some("first.abc"));
}

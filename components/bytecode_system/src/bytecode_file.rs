//! Loaded bytecode files.
//!
//! Loading decodes the container, classifies its packaging, builds the
//! record table and translates every method into the literal arena on the
//! loader's worker pool. The file is immutable afterwards and shared through
//! `Arc`; dropping the last reference releases the arena and offset index.

use crate::file_format::{decode_layout, decode_methods, ClassRecord, FileFormatError, FileLayout};
use crate::literal::{ConstantEntry, LiteralValue};
use crate::method_literal::{MethodLiteral, MethodLiteralArena};
use crate::task_pool::{LoaderState, TaskCounter};
use core_types::{fatal, FatalKind, FileId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Record name of the single record in a bundle-packaged file, and the name
/// of every record's entry method.
pub const ENTRY_FUNCTION_NAME: &str = "func_main_0";
/// Class holding module record indices in a bundle-packaged file.
pub const MODULE_RECORD_CLASS: &str = "L_ESModuleRecord;";
/// Class holding CommonJS flags in a bundle-packaged file.
pub const COMMONJS_RECORD_CLASS: &str = "L_CommonJsRecord;";

const IS_COMMON_JS: &str = "isCommonjs";
const IS_JSON_CONTENT: &str = "jsonFileContent";
const MODULE_RECORD_IDX: &str = "moduleRecordIdx";
const IS_SHARED_MODULE: &str = "isSharedModule";
const HAS_TOP_LEVEL_AWAIT: &str = "hasTopLevelAwait";
const MODULE_REQUEST_PHASE_IDX: &str = "moduleRequestPhaseIdx";
const PACKAGE_NAME: &str = "pkgName@";
const NPM_PATH_SEGMENT: &str = "node_modules";

/// Errors returned by [`BytecodeFile::load`] and [`BytecodeFile::open`].
#[derive(Debug, Error)]
pub enum LoadError {
    /// The container failed to decode
    #[error("{descriptor}: {source}")]
    Format {
        /// Descriptor of the file
        descriptor: String,
        /// Decode failure
        #[source]
        source: FileFormatError,
    },
    /// The file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Path that was read
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },
}

/// How records are laid out in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packaging {
    /// Legacy layout with one implicit record
    Bundle,
    /// One record per module
    Merged,
}

/// Per-record module flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordInfo {
    /// Index of the class the record was read from
    pub class_id: Option<u32>,
    /// CommonJS module
    pub is_cjs: bool,
    /// JSON module
    pub is_json: bool,
    /// String id of the JSON text
    pub json_string_id: Option<u32>,
    /// Shared between execution contexts
    pub is_shared_module: bool,
    /// Uses top-level await
    pub has_top_level_await: bool,
    /// Literal index of the module record
    pub module_record_index: Option<i32>,
    /// Literal index of the lazy-import phase table
    pub lazy_import_index: Option<u32>,
    /// npm package the record belongs to
    pub npm_package_name: Option<String>,
}

/// An immutable loaded bytecode file.
pub struct BytecodeFile {
    id: FileId,
    descriptor: String,
    bytes: Arc<[u8]>,
    layout: FileLayout,
    packaging: Packaging,
    records: HashMap<String, RecordInfo>,
    npm_entries: HashMap<String, String>,
    arena: Arc<MethodLiteralArena>,
    offset_index: HashMap<u32, u32>,
    main_methods: HashMap<String, u32>,
}

impl std::fmt::Debug for BytecodeFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BytecodeFile")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("packaging", &self.packaging)
            .field("methods", &self.arena.len())
            .finish()
    }
}

/// Parse `Lname;` into `name`.
pub fn parse_record_name(descriptor: &str) -> Option<&str> {
    descriptor.strip_prefix('L')?.strip_suffix(';')
}

impl BytecodeFile {
    /// Read and load a file from disk. The path becomes the descriptor.
    pub fn open(state: &LoaderState, path: &Path) -> Result<Arc<BytecodeFile>, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(state, &path.to_string_lossy(), bytes)
    }

    /// Load a file from memory.
    pub fn load(
        state: &LoaderState,
        descriptor: &str,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Result<Arc<BytecodeFile>, LoadError> {
        let bytes: Arc<[u8]> = bytes.into();
        let layout = decode_layout(&bytes).map_err(|source| LoadError::Format {
            descriptor: descriptor.to_string(),
            source,
        })?;

        let num_methods = layout.num_methods();
        if num_methods == 0 {
            fatal!(FatalKind::Precondition, "{} declares no methods", descriptor);
        }

        let packaging = detect_packaging(&layout);
        let mut records = HashMap::new();
        let mut npm_entries = HashMap::new();
        match packaging {
            Packaging::Merged => {
                scan_merged_records(&layout, &mut records, &mut npm_entries);
                if state.note_merged_file(descriptor) {
                    tracing::debug!(target: "corten::loader", descriptor, "first merged file");
                }
            }
            Packaging::Bundle => {
                records.insert(
                    ENTRY_FUNCTION_NAME.to_string(),
                    scan_bundle_record(&layout, descriptor),
                );
            }
        }

        let id = state.next_file_id();
        let arena = Arc::new(MethodLiteralArena::with_len(num_methods));
        let classes: Arc<[ClassRecord]> = layout.classes.clone().into();
        translate_classes(state, id, &bytes, &classes, &arena).map_err(|source| {
            LoadError::Format {
                descriptor: descriptor.to_string(),
                source,
            }
        })?;

        let mut file = BytecodeFile {
            id,
            descriptor: descriptor.to_string(),
            bytes,
            layout,
            packaging,
            records,
            npm_entries,
            arena,
            offset_index: HashMap::with_capacity(num_methods),
            main_methods: HashMap::new(),
        };
        file.index_methods();

        tracing::debug!(
            target: "corten::loader",
            descriptor,
            file = id.0,
            classes = file.num_classes(),
            methods = num_methods,
            records = file.records.len(),
            packaging = ?packaging,
            "loaded bytecode file"
        );
        Ok(Arc::new(file))
    }

    fn index_methods(&mut self) {
        let mut index = 0u32;
        for class in &self.layout.classes {
            let record = match self.packaging {
                Packaging::Bundle => Some(ENTRY_FUNCTION_NAME),
                Packaging::Merged => self
                    .layout
                    .strings
                    .get(class.descriptor as usize)
                    .and_then(|d| parse_record_name(d)),
            };
            for _ in 0..class.num_methods {
                let Some(literal) = self.arena.get(index as usize) else {
                    fatal!(FatalKind::MissingMethod, "arena slot {} left empty", index);
                };
                self.offset_index.insert(literal.offset, index);
                let is_entry = self
                    .layout
                    .strings
                    .get(literal.name as usize)
                    .is_some_and(|n| n == ENTRY_FUNCTION_NAME);
                if let (true, Some(record)) = (is_entry, record) {
                    self.main_methods
                        .entry(record.to_string())
                        .or_insert(literal.offset);
                }
                index += 1;
            }
        }
    }

    /// Process-unique id.
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Descriptor the file was loaded under.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Container version.
    pub fn version(&self) -> u32 {
        self.layout.version
    }

    /// Packaging kind.
    pub fn packaging(&self) -> Packaging {
        self.packaging
    }

    /// Returns true for bundle packaging.
    pub fn is_bundle_pack(&self) -> bool {
        self.packaging == Packaging::Bundle
    }

    /// Number of class records.
    pub fn num_classes(&self) -> usize {
        self.layout.classes.len()
    }

    /// Number of method literals.
    pub fn num_methods(&self) -> usize {
        self.arena.len()
    }

    /// Raw container bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// String table entry.
    pub fn string(&self, id: u32) -> Option<&str> {
        self.layout.strings.get(id as usize).map(String::as_str)
    }

    /// Literal array.
    pub fn literal_array(&self, id: u32) -> Option<&[LiteralValue]> {
        self.layout.literals.get(id as usize).map(Vec::as_slice)
    }

    /// Index header.
    pub fn index_header(&self, id: u32) -> Option<&[ConstantEntry]> {
        self.layout.index_headers.get(id as usize).map(Vec::as_slice)
    }

    /// Number of index headers.
    pub fn num_index_headers(&self) -> usize {
        self.layout.index_headers.len()
    }

    /// Method literal by record offset.
    pub fn find_method_literal(&self, offset: u32) -> Option<&MethodLiteral> {
        let index = *self.offset_index.get(&offset)?;
        self.arena.get(index as usize)
    }

    /// All method literals in arena order.
    pub fn method_literals(&self) -> impl Iterator<Item = &MethodLiteral> {
        self.arena.iter()
    }

    /// Bytecode of a method.
    pub fn code(&self, literal: &MethodLiteral) -> &[u8] {
        self.bytes
            .get(literal.code.start as usize..literal.code.end as usize)
            .unwrap_or(&[])
    }

    /// Name of a method.
    pub fn method_name(&self, literal: &MethodLiteral) -> &str {
        self.string(literal.name).unwrap_or("")
    }

    /// Returns true if the record exists.
    pub fn check_record(&self, record: &str) -> bool {
        self.records.contains_key(record)
    }

    /// Flags of a record.
    pub fn record_info(&self, record: &str) -> Option<&RecordInfo> {
        self.records.get(record)
    }

    /// Every record name, sorted.
    pub fn record_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.records.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Re-export field recorded for an npm entry record.
    pub fn find_npm_entry_point(&self, record: &str) -> Option<&str> {
        self.npm_entries.get(record).map(String::as_str)
    }

    /// Returns true if the record is an ES module.
    pub fn is_module(&self, record: &str) -> bool {
        self.record_info(record)
            .is_some_and(|r| r.module_record_index.is_some())
    }

    /// Returns true if the record is a CommonJS module.
    pub fn is_cjs(&self, record: &str) -> bool {
        self.record_info(record).is_some_and(|r| r.is_cjs)
    }

    /// Returns true if the record is a JSON module.
    pub fn is_json(&self, record: &str) -> bool {
        self.record_info(record).is_some_and(|r| r.is_json)
    }

    /// Offset of the entry method of a record.
    pub fn main_method_index(&self, record: &str) -> Option<u32> {
        self.main_methods.get(record).copied()
    }
}

impl Drop for BytecodeFile {
    fn drop(&mut self) {
        tracing::trace!(target: "corten::loader", descriptor = %self.descriptor, "releasing bytecode file");
    }
}

fn field_name<'a>(layout: &'a FileLayout, id: u32) -> &'a str {
    layout.strings.get(id as usize).map(String::as_str).unwrap_or("")
}

fn detect_packaging(layout: &FileLayout) -> Packaging {
    let merged = layout.classes.iter().filter(|c| !c.external).any(|c| {
        c.fields.iter().any(|f| {
            let name = field_name(layout, f.name);
            name == IS_COMMON_JS || name == MODULE_RECORD_IDX
        })
    });
    if merged {
        Packaging::Merged
    } else {
        Packaging::Bundle
    }
}

/// Records under an npm package directory carry re-export entry fields.
fn is_npm_record(record: &str) -> bool {
    record.split('/').any(|segment| segment == NPM_PATH_SEGMENT)
}

fn scan_merged_records(
    layout: &FileLayout,
    records: &mut HashMap<String, RecordInfo>,
    npm_entries: &mut HashMap<String, String>,
) {
    for (class_id, class) in layout.classes.iter().enumerate() {
        if class.external {
            continue;
        }
        let descriptor = field_name(layout, class.descriptor);
        let Some(record) = parse_record_name(descriptor) else {
            fatal!(FatalKind::FileFormat, "malformed class descriptor {:?}", descriptor);
        };
        let mut info = RecordInfo {
            class_id: Some(class_id as u32),
            ..RecordInfo::default()
        };
        let mut has_cjs_field = false;
        let mut has_json_field = false;
        for field in &class.fields {
            let name = field_name(layout, field.name);
            match name {
                IS_COMMON_JS => {
                    has_cjs_field = true;
                    info.is_cjs = field.value.as_boolean().unwrap_or(false);
                }
                IS_JSON_CONTENT => {
                    has_json_field = true;
                    info.is_json = true;
                    info.json_string_id = field.value.as_string_id();
                }
                MODULE_RECORD_IDX => info.module_record_index = field.value.as_integer(),
                IS_SHARED_MODULE => {
                    info.is_shared_module = field.value.as_boolean().unwrap_or(false)
                }
                HAS_TOP_LEVEL_AWAIT => {
                    info.has_top_level_await = field.value.as_boolean().unwrap_or(false)
                }
                MODULE_REQUEST_PHASE_IDX => {
                    info.lazy_import_index = field.value.as_integer().map(|i| i as u32)
                }
                _ => match name.strip_prefix(PACKAGE_NAME) {
                    Some(package) if !package.is_empty() => {
                        info.npm_package_name = Some(package.to_string())
                    }
                    _ if is_npm_record(record) => {
                        npm_entries.insert(record.to_string(), name.to_string());
                    }
                    _ => tracing::debug!(
                        target: "corten::loader",
                        record,
                        field = name,
                        "skipping unknown record field"
                    ),
                },
            }
        }
        if has_cjs_field || has_json_field {
            records.insert(record.to_string(), info);
        }
    }
}

fn scan_bundle_record(layout: &FileLayout, descriptor: &str) -> RecordInfo {
    let mut info = RecordInfo::default();
    for class in &layout.classes {
        let class_name = field_name(layout, class.descriptor);
        let module_class = class_name == MODULE_RECORD_CLASS;
        let cjs_class = class_name == COMMONJS_RECORD_CLASS;
        if !module_class && !cjs_class {
            continue;
        }
        for field in &class.fields {
            if field_name(layout, field.name) != descriptor {
                continue;
            }
            if module_class {
                info.module_record_index = field.value.as_integer();
            } else {
                info.is_cjs = true;
            }
        }
    }
    info
}

struct ClassCursor {
    next_class: usize,
    next_method: usize,
}

struct Translation {
    file: FileId,
    bytes: Arc<[u8]>,
    classes: Arc<[ClassRecord]>,
    arena: Arc<MethodLiteralArena>,
    cursor: Mutex<ClassCursor>,
    counter: TaskCounter,
    failure: Mutex<Option<FileFormatError>>,
}

impl Translation {
    /// Claim the next class and the arena index of its first method. Stops
    /// handing out classes once any class failed.
    fn claim(&self) -> Option<(usize, usize)> {
        let mut cursor = self.cursor.lock();
        if self.failure.lock().is_some() {
            return None;
        }
        let class = self.classes.get(cursor.next_class)?;
        let claimed = (cursor.next_class, cursor.next_method);
        cursor.next_class += 1;
        cursor.next_method += class.num_methods as usize;
        Some(claimed)
    }

    fn run(&self) {
        while let Some((class_index, base)) = self.claim() {
            if let Err(err) = self.translate_class(class_index, base) {
                tracing::debug!(
                    target: "corten::loader",
                    class = class_index,
                    %err,
                    "method translation failed"
                );
                self.failure.lock().get_or_insert(err);
            }
        }
    }

    fn translate_class(&self, class_index: usize, base: usize) -> Result<(), FileFormatError> {
        let class = &self.classes[class_index];
        let methods = decode_methods(&self.bytes, class)?;
        for (i, record) in methods.into_iter().enumerate() {
            self.arena.set(
                base + i,
                MethodLiteral {
                    offset: record.offset,
                    name: record.name,
                    code: record.code_offset..record.code_offset + record.code_len,
                    num_args: record.num_args,
                    kind: record.kind,
                    index_header: record.index_header,
                    file: self.file,
                },
            );
        }
        Ok(())
    }
}

fn translate_classes(
    state: &LoaderState,
    file: FileId,
    bytes: &Arc<[u8]>,
    classes: &Arc<[ClassRecord]>,
    arena: &Arc<MethodLiteralArena>,
) -> Result<(), FileFormatError> {
    let tasks = state.pool().size().min(classes.len().saturating_sub(1));
    let translation = Arc::new(Translation {
        file,
        bytes: Arc::clone(bytes),
        classes: Arc::clone(classes),
        arena: Arc::clone(arena),
        cursor: Mutex::new(ClassCursor {
            next_class: 0,
            next_method: 0,
        }),
        counter: TaskCounter::new(tasks),
        failure: Mutex::new(None),
    });
    for _ in 0..tasks {
        let translation = Arc::clone(&translation);
        state.pool().submit(move || {
            let _done = translation.counter.guard();
            translation.run();
        });
    }
    translation.run();
    translation.counter.wait();

    let panicked = translation.counter.panicked();
    if panicked > 0 {
        fatal!(
            FatalKind::FileFormat,
            "{} method translation task(s) aborted",
            panicked
        );
    }
    let failure = translation.failure.lock().take();
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

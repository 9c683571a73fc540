//! Command implementations
//!
//! Every command opens its files into a fresh [`Workspace`], does its work
//! through the runtime's public API and writes a report to `out`.

use crate::cli::{Cli, Command};
use crate::error::{CliError, CliResult};
use bytecode_system::{BytecodeFile, ConstantKind, Packaging};
use core_types::{ProfileType, ProfileTypeKind, TaggedValue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vm_runtime::{AotSnapshot, ConstantPool, EcmaContext, Runtime, RuntimeOptions};

/// Files loaded into one runtime with one context.
pub struct Workspace {
    runtime: Arc<Runtime>,
    context: Arc<EcmaContext>,
    files: Vec<Arc<BytecodeFile>>,
}

impl Workspace {
    /// Load `paths` in order.
    pub fn open(paths: &[PathBuf], workers: Option<usize>) -> CliResult<Self> {
        let mut options = RuntimeOptions::default();
        if let Some(workers) = workers {
            options = options.with_loader_workers(workers);
        }
        let runtime = Runtime::new(options);
        let files = paths
            .iter()
            .map(|path| runtime.open_file(path))
            .collect::<Result<Vec<_>, _>>()?;
        let context = Arc::new(EcmaContext::new(runtime.clone()));
        Ok(Self {
            runtime,
            context,
            files,
        })
    }

    /// Runtime the files are loaded into.
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Loaded files in command-line order.
    pub fn files(&self) -> &[Arc<BytecodeFile>] {
        &self.files
    }

    /// Shared pools of `file`, one per index header, keyed by header.
    pub fn pools(&self, file: &Arc<BytecodeFile>) -> BTreeMap<u32, Arc<ConstantPool>> {
        let mut pools = BTreeMap::new();
        for method in file.method_literals() {
            pools
                .entry(method.index_header)
                .or_insert_with(|| self.context.find_or_create_constpool(file, method.offset));
        }
        pools
    }
}

/// One record of a file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecordSummary {
    /// Record name
    pub name: String,
    /// CommonJS module
    pub cjs: bool,
    /// JSON module
    pub json: bool,
    /// Owning npm package
    pub npm_package: Option<String>,
}

/// One method of a file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MethodSummary {
    /// Method record offset
    pub offset: u32,
    /// Method name
    pub name: String,
    /// Declared argument count
    pub num_args: u32,
    /// Index header of the method's pool
    pub index_header: u32,
}

/// What `inspect` reports per file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileSummary {
    /// File descriptor
    pub descriptor: String,
    /// Container version
    pub version: u32,
    /// `bundle` or `merged`
    pub packaging: &'static str,
    /// Number of classes
    pub classes: usize,
    /// Number of index headers
    pub index_headers: usize,
    /// Records, sorted by name
    pub records: Vec<RecordSummary>,
    /// Methods in file order
    pub methods: Vec<MethodSummary>,
}

impl FileSummary {
    /// Summarise a loaded file.
    pub fn of(file: &BytecodeFile) -> Self {
        let mut records: Vec<RecordSummary> = file
            .record_names()
            .into_iter()
            .filter_map(|name| {
                let info = file.record_info(name)?;
                Some(RecordSummary {
                    name: name.to_string(),
                    cjs: info.is_cjs,
                    json: info.is_json,
                    npm_package: info.npm_package_name.clone(),
                })
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            descriptor: file.descriptor().to_string(),
            version: file.version(),
            packaging: match file.packaging() {
                Packaging::Bundle => "bundle",
                Packaging::Merged => "merged",
            },
            classes: file.num_classes(),
            index_headers: file.num_index_headers(),
            records,
            methods: file
                .method_literals()
                .map(|m| MethodSummary {
                    offset: m.offset,
                    name: file.method_name(m).to_string(),
                    num_args: m.num_args,
                    index_header: m.index_header,
                })
                .collect(),
        }
    }
}

/// What `resolve` reports per pool.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolReport {
    /// File descriptor
    pub descriptor: String,
    /// Index header of the pool
    pub index_header: u32,
    /// Process-wide pool id
    pub shared_id: u32,
    /// Index of the pool's unshared counterpart
    pub unshared_index: u32,
    /// Cache slots
    pub entries: u32,
    /// Slots holding a value
    pub resolved: usize,
}

impl PoolReport {
    fn of(pool: &ConstantPool) -> Self {
        Self {
            descriptor: pool.file().descriptor().to_string(),
            index_header: pool.index_header(),
            shared_id: pool.shared_id(),
            unshared_index: pool.unshared_index(),
            entries: pool.cache_length(),
            resolved: pool.resolved_count(),
        }
    }
}

/// What `restore` reports per file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RestoreReport {
    /// File descriptor
    pub descriptor: String,
    /// Whether the snapshot held a pool for the file
    pub restored: bool,
    /// Slots prefilled with compiled entry indices
    pub aot_entries: usize,
}

/// Execute the parsed command line.
pub fn run(cli: &Cli, out: &mut impl Write) -> CliResult<()> {
    match &cli.command {
        Command::Inspect { files } => {
            let workspace = Workspace::open(files, cli.workers)?;
            let summaries: Vec<FileSummary> =
                workspace.files().iter().map(|f| FileSummary::of(f)).collect();
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&summaries)?)?;
            } else {
                for summary in &summaries {
                    write_summary(out, summary)?;
                }
            }
        }
        Command::Resolve { files, threads } => {
            let workspace = Workspace::open(files, cli.workers)?;
            let reports = resolve_all(&workspace, *threads);
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&reports)?)?;
            } else {
                for r in &reports {
                    writeln!(
                        out,
                        "{} header {}: {}/{} resolved (shared id {}, unshared index {})",
                        r.descriptor,
                        r.index_header,
                        r.resolved,
                        r.entries,
                        r.shared_id,
                        r.unshared_index
                    )?;
                }
            }
        }
        Command::Snapshot { files, output } => {
            let workspace = Workspace::open(files, cli.workers)?;
            let snapshot = take_snapshot(&workspace);
            let text = serde_json::to_string_pretty(&*snapshot)?;
            match output {
                Some(path) => {
                    std::fs::write(path, text).map_err(|source| CliError::Write {
                        path: path.clone(),
                        source,
                    })?;
                    writeln!(
                        out,
                        "wrote {} hidden classes, {} symbols for {} files to {}",
                        snapshot.hclass_table.len(),
                        snapshot.symbol_table.len(),
                        snapshot.constpools.len(),
                        path.display()
                    )?;
                }
                None => writeln!(out, "{}", text)?,
            }
        }
        Command::Restore { snapshot, files } => {
            let snapshot = Arc::new(read_snapshot(snapshot)?);
            if snapshot.constpools.len() != files.len() {
                return Err(CliError::SnapshotMismatch {
                    snapshot: snapshot.constpools.len(),
                    given: files.len(),
                });
            }
            let workspace = Workspace::open(files, cli.workers)?;
            let reports = restore(&workspace, &snapshot);
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&reports)?)?;
            } else {
                for r in &reports {
                    if r.restored {
                        writeln!(out, "{}: restored, {} aot entries", r.descriptor, r.aot_entries)?;
                    } else {
                        writeln!(out, "{}: no pool in snapshot", r.descriptor)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn write_summary(out: &mut impl Write, s: &FileSummary) -> std::io::Result<()> {
    writeln!(
        out,
        "{} (version {}, {}, {} classes, {} index headers)",
        s.descriptor, s.version, s.packaging, s.classes, s.index_headers
    )?;
    for r in &s.records {
        let mut flags = Vec::new();
        if r.cjs {
            flags.push("cjs");
        }
        if r.json {
            flags.push("json");
        }
        write!(out, "  record {}", r.name)?;
        if !flags.is_empty() {
            write!(out, " [{}]", flags.join(","))?;
        }
        if let Some(pkg) = &r.npm_package {
            write!(out, " pkg={}", pkg)?;
        }
        writeln!(out)?;
    }
    for m in &s.methods {
        writeln!(
            out,
            "  method {:#x} {} args={} header={}",
            m.offset, m.name, m.num_args, m.index_header
        )?;
    }
    Ok(())
}

/// Resolve every entry of every pool, with `threads` threads racing over
/// each pool.
pub fn resolve_all(workspace: &Workspace, threads: usize) -> Vec<PoolReport> {
    let mut reports = Vec::new();
    for file in workspace.files() {
        for pool in workspace.pools(file).into_values() {
            resolve_pool(&pool, threads.max(1));
            reports.push(PoolReport::of(&pool));
        }
    }
    reports
}

fn resolve_pool(pool: &ConstantPool, threads: usize) {
    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                for index in 0..pool.cache_length() {
                    pool.resolve(index);
                }
            });
        }
    });
}

/// Resolve all literals, record their layouts with the type manager and
/// freeze a snapshot with one pool image per file.
pub fn take_snapshot(workspace: &Workspace) -> Arc<AotSnapshot> {
    let runtime = workspace.runtime();
    let heap = runtime.heap();
    let types = runtime.type_manager();
    let mut images = Vec::new();

    for (file_index, file) in workspace.files().iter().enumerate() {
        let pools = workspace.pools(file);
        for pool in pools.values() {
            for index in 0..pool.cache_length() {
                let Some(kind) = pool.entry_kind(index) else {
                    continue;
                };
                let site_kind = match kind {
                    ConstantKind::ObjectLiteral => ProfileTypeKind::LiteralId,
                    ConstantKind::ArrayLiteral => ProfileTypeKind::ArrayLiteralId,
                    ConstantKind::ClassLiteral => ProfileTypeKind::PrototypeId,
                    ConstantKind::Method => {
                        types.record_constant_index(pool.index_header(), index);
                        continue;
                    }
                    ConstantKind::String => continue,
                };
                let value = pool.resolve(index);
                let Some(hclass) = heap.hclass_of(value) else {
                    continue;
                };
                let site = ProfileType::new(
                    file_index as u16,
                    (pool.index_header() << 16) | index,
                    site_kind,
                );
                types.record_hclass(site, site, TaggedValue::heap(hclass), false);
            }
        }

        // The image keeps the pool of the first method; its method entries
        // get consecutive compiled entry indices.
        let primary = file
            .method_literals()
            .next()
            .and_then(|m| pools.get(&m.index_header).cloned());
        if let Some(pool) = primary {
            let compiled: Vec<(u32, u32)> = (0..pool.cache_length())
                .filter(|&i| pool.entry_kind(i) == Some(ConstantKind::Method))
                .enumerate()
                .map(|(entry, index)| (index, entry as u32))
                .collect();
            images.push((file_index, pool, compiled));
        }
    }

    let snapshot = types.init_aot_snapshot(heap, workspace.files().len());
    for (file_index, pool, compiled) in &images {
        types.store_constpool_info(*file_index, pool, compiled);
    }
    tracing::info!(
        target: "corten::pgo",
        hclasses = snapshot.hclass_table.len(),
        files = workspace.files().len(),
        "aot snapshot taken"
    );
    types.aot_snapshot().unwrap_or(snapshot)
}

/// Rebuild the shared pools of every file from `snapshot`.
pub fn restore(workspace: &Workspace, snapshot: &Arc<AotSnapshot>) -> Vec<RestoreReport> {
    workspace
        .files()
        .iter()
        .enumerate()
        .map(|(file_index, file)| {
            let pool = workspace
                .runtime()
                .load_aot_constpool(file, file_index, snapshot);
            RestoreReport {
                descriptor: file.descriptor().to_string(),
                restored: pool.is_some(),
                aot_entries: pool.map_or(0, |p| {
                    (0..p.cache_length())
                        .filter(|&i| p.get(i).is_aot_entry())
                        .count()
                }),
            }
        })
        .collect()
}

/// Parse a snapshot written by the `snapshot` command.
pub fn read_snapshot(path: &Path) -> CliResult<AotSnapshot> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

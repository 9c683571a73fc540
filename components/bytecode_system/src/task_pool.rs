//! Process-scoped loader state and its worker pool.
//!
//! One [`LoaderState`] lives as long as the VM instance. It owns the worker
//! threads that translate method literals, the file-id allocator and the
//! "first merged file" tag. Dropping it joins the workers.

use core_types::FileId;
use crossbeam::channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Loader configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Number of translation worker threads
    pub workers: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl LoaderConfig {
    /// Set the worker count. Zero is raised to one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// Fixed-size pool of worker threads fed through a channel.
pub struct TaskPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Spawn `size` workers.
    pub fn new(size: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..size.max(1))
            .map(|i| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("corten-loader-{}", i))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            // A failed job is reported through its own
                            // counter; the worker stays in the pool.
                            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                tracing::error!(target: "corten::loader", "loader job panicked");
                            }
                        }
                    })
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(err) => {
                    tracing::warn!(target: "corten::loader", %err, "failed to spawn loader worker");
                    None
                }
            })
            .collect();
        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Number of live workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job. Runs it inline when no worker could be spawned.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        match &self.sender {
            Some(sender) if !self.workers.is_empty() => {
                if let Err(err) = sender.send(Box::new(job)) {
                    (err.into_inner())();
                }
            }
            _ => job(),
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

/// Counter the loading thread waits on until every posted task finished.
#[derive(Debug, Default)]
pub struct TaskCounter {
    running: Mutex<usize>,
    finished: Condvar,
    panicked: AtomicUsize,
}

impl TaskCounter {
    /// A counter starting at `n`.
    pub fn new(n: usize) -> Self {
        Self {
            running: Mutex::new(n),
            finished: Condvar::new(),
            panicked: AtomicUsize::new(0),
        }
    }

    /// Guard that marks one task finished when dropped, including when the
    /// task unwinds.
    pub fn guard(&self) -> TaskGuard<'_> {
        TaskGuard { counter: self }
    }

    /// Number of tasks that unwound instead of returning.
    pub fn panicked(&self) -> usize {
        self.panicked.load(Ordering::Acquire)
    }

    /// Mark one task finished.
    pub fn done(&self) {
        let mut running = self.running.lock();
        *running = running.saturating_sub(1);
        if *running == 0 {
            self.finished.notify_all();
        }
    }

    /// Block until the counter reaches zero.
    pub fn wait(&self) {
        let mut running = self.running.lock();
        while *running > 0 {
            self.finished.wait(&mut running);
        }
    }
}

/// Finishes one task of a [`TaskCounter`] on drop.
#[derive(Debug)]
pub struct TaskGuard<'a> {
    counter: &'a TaskCounter,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.counter.panicked.fetch_add(1, Ordering::AcqRel);
        }
        self.counter.done();
    }
}

/// State shared by every load in one VM instance.
#[derive(Debug)]
pub struct LoaderState {
    config: LoaderConfig,
    pool: TaskPool,
    next_file_id: AtomicU32,
    first_merged_file: Mutex<Option<String>>,
}

impl LoaderState {
    /// Start the worker pool.
    pub fn new(config: LoaderConfig) -> Self {
        let pool = TaskPool::new(config.workers);
        tracing::debug!(target: "corten::loader", workers = pool.size(), "loader state initialised");
        Self {
            config,
            pool,
            next_file_id: AtomicU32::new(0),
            first_merged_file: Mutex::new(None),
        }
    }

    /// Configuration the state was built with.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The translation pool.
    pub fn pool(&self) -> &TaskPool {
        &self.pool
    }

    /// Allocate the id of a newly loaded file.
    pub fn next_file_id(&self) -> FileId {
        FileId(self.next_file_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Record a merged file. Returns true for the first one loaded.
    pub fn note_merged_file(&self, descriptor: &str) -> bool {
        let mut first = self.first_merged_file.lock();
        if first.is_none() {
            *first = Some(descriptor.to_string());
            true
        } else {
            false
        }
    }

    /// Descriptor of the first merged file loaded.
    pub fn first_merged_file(&self) -> Option<String> {
        self.first_merged_file.lock().clone()
    }
}

impl Default for LoaderState {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

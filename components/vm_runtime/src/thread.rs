//! Host thread state and the running-state capability token

use core_types::{fatal, FatalKind};
use std::sync::atomic::{AtomicU8, Ordering};

/// Scheduling state of a host (interpreter) thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Constructed, not yet executing
    Created = 0,
    /// Executing bytecode; its pools are safe to read
    Running = 1,
    /// Parked at a safepoint; may be mid-mutation of its own pools
    Suspended = 2,
    /// Finished
    Terminated = 3,
}

impl ThreadState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ThreadState::Running,
            2 => ThreadState::Suspended,
            3 => ThreadState::Terminated,
            _ => ThreadState::Created,
        }
    }
}

/// A host thread as seen by the caching layer.
#[derive(Debug)]
pub struct JsThread {
    id: u32,
    state: AtomicU8,
}

impl JsThread {
    /// A thread in the created state.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            state: AtomicU8::new(ThreadState::Created as u8),
        }
    }

    /// Thread id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to a new state.
    pub fn set_state(&self, state: ThreadState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Returns true while running.
    pub fn is_running(&self) -> bool {
        self.state() == ThreadState::Running
    }

    /// Token proving the thread was running, or `None`.
    pub fn try_running(&self) -> Option<HostRunning<'_>> {
        self.is_running().then_some(HostRunning { thread: self })
    }

    /// Token proving the thread is running.
    ///
    /// Reading host data from a thread that is not running is a compiler
    /// environment bug and terminates.
    pub fn assert_running(&self) -> HostRunning<'_> {
        match self.try_running() {
            Some(token) => token,
            None => fatal!(
                FatalKind::Precondition,
                "host thread {} read while {:?}",
                self.id,
                self.state()
            ),
        }
    }
}

/// Capability to read a host thread's pools.
///
/// Obtained only through [`JsThread::assert_running`] or
/// [`JsThread::try_running`]; read paths that touch host state take one.
#[derive(Debug, Clone, Copy)]
pub struct HostRunning<'a> {
    thread: &'a JsThread,
}

impl<'a> HostRunning<'a> {
    /// The thread this token was issued for.
    pub fn thread(&self) -> &'a JsThread {
        self.thread
    }
}

//! Frozen profile-slot chain.
//!
//! Profiling records, for every method the compiled function reached through
//! a feedback slot, which caller reached it and through which slot. The chain
//! is captured once and handed to the JIT thread as an immutable value, so
//! compilation never walks the live call chain of the host thread.

use std::collections::HashMap;

/// How a method was reached from its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLink {
    /// Feedback slot in the caller's vector
    pub slot_id: u32,
    /// Method offset of the caller
    pub caller_offset: u32,
}

/// Immutable callee → caller map rooted at one entry method.
///
/// # Examples
///
/// ```
/// use core_types::ProfileSlotChain;
///
/// let chain = ProfileSlotChain::builder(0x10)
///     .link(0x40, 0x10, 2)
///     .link(0x80, 0x40, 0)
///     .build();
///
/// let path = chain.path_to(0x80).unwrap();
/// assert_eq!(path.len(), 2);
/// assert_eq!(path[0].1.caller_offset, 0x10);
/// assert!(chain.path_to(0x99).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSlotChain {
    entry_offset: u32,
    links: HashMap<u32, SlotLink>,
}

/// Builder for [`ProfileSlotChain`].
#[derive(Debug)]
pub struct ProfileSlotChainBuilder {
    entry_offset: u32,
    links: HashMap<u32, SlotLink>,
}

impl ProfileSlotChainBuilder {
    /// Record that `callee_offset` is reached from `caller_offset` via `slot_id`.
    pub fn link(mut self, callee_offset: u32, caller_offset: u32, slot_id: u32) -> Self {
        self.links.insert(
            callee_offset,
            SlotLink {
                slot_id,
                caller_offset,
            },
        );
        self
    }

    /// Freeze the chain.
    pub fn build(self) -> ProfileSlotChain {
        ProfileSlotChain {
            entry_offset: self.entry_offset,
            links: self.links,
        }
    }
}

impl ProfileSlotChain {
    /// Start a chain rooted at the compiled method.
    pub fn builder(entry_offset: u32) -> ProfileSlotChainBuilder {
        ProfileSlotChainBuilder {
            entry_offset,
            links: HashMap::new(),
        }
    }

    /// A chain with no recorded links.
    pub fn empty(entry_offset: u32) -> Self {
        Self::builder(entry_offset).build()
    }

    /// Offset of the compiled method.
    pub fn entry_offset(&self) -> u32 {
        self.entry_offset
    }

    /// Link recorded for a callee.
    pub fn link(&self, callee_offset: u32) -> Option<SlotLink> {
        self.links.get(&callee_offset).copied()
    }

    /// Number of recorded links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Returns true when no link was recorded.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Steps from the entry method down to `target`, entry side first.
    ///
    /// Each step is `(callee offset, link)`. The entry itself yields an empty
    /// path. A missing link or a cycle yields `None`.
    pub fn path_to(&self, target: u32) -> Option<Vec<(u32, SlotLink)>> {
        let mut path = Vec::new();
        let mut current = target;
        while current != self.entry_offset {
            if path.len() > self.links.len() {
                return None;
            }
            let link = self.link(current)?;
            path.push((current, link));
            current = link.caller_offset;
        }
        path.reverse();
        Some(path)
    }
}

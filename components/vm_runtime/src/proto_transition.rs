//! Prototype transition table built for the AOT compiler.
//!
//! When a class prototype is replaced after instances were created, the
//! instance hidden class (ihc) of the declaration and the transitioned pair
//! (transitioned ihc, transitioned prototype hidden class) are linked so that
//! compiled code can follow the transition without re-deriving it.

use core_types::{ProfileType, TaggedValue};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// A transition observed during profiling, described by profile types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtoTransRequest {
    /// Instance hidden class of the declaration
    pub ihc_type: ProfileType,
    /// Allocation site of the base class
    pub base_root_type: ProfileType,
    /// Base class type reached from that site
    pub base_type: ProfileType,
    /// Instance hidden class after the transition
    pub trans_ihc_type: ProfileType,
    /// Prototype hidden class after the transition
    pub trans_phc_type: ProfileType,
}

/// One direct transition edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoTransitionEdge {
    /// Instance hidden class before the transition
    pub ihc: TaggedValue,
    /// Hidden class of the base class
    pub base_ihc: TaggedValue,
    /// Instance hidden class after the transition
    pub trans_ihc: TaggedValue,
    /// Prototype hidden class after the transition
    pub trans_phc: TaggedValue,
}

/// Direct edges plus the shared-prototype ("fake parent") edges.
///
/// Edges keep insertion order for the image; lookups go through maps keyed
/// by the declaration pair and by prototype layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TableImage", into = "TableImage")]
pub struct ProtoTransitionTable {
    edges: Vec<ProtoTransitionEdge>,
    by_declaration: HashMap<(TaggedValue, TaggedValue), usize>,
    fake_parents: Vec<(TaggedValue, TaggedValue)>,
    by_phc: HashMap<TaggedValue, TaggedValue>,
}

/// Serialized form of [`ProtoTransitionTable`].
#[derive(Clone, Serialize, Deserialize)]
struct TableImage {
    edges: Vec<ProtoTransitionEdge>,
    fake_parents: Vec<(TaggedValue, TaggedValue)>,
}

impl From<TableImage> for ProtoTransitionTable {
    fn from(image: TableImage) -> Self {
        let mut table = Self::new();
        for edge in image.edges {
            table.put_edge(edge);
        }
        for (phc, ihc) in image.fake_parents {
            table.put_fake_parent(phc, ihc);
        }
        table
    }
}

impl From<ProtoTransitionTable> for TableImage {
    fn from(table: ProtoTransitionTable) -> Self {
        Self {
            edges: table.edges,
            fake_parents: table.fake_parents,
        }
    }
}

impl ProtoTransitionTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the direct edge `(ihc, base_ihc) -> (trans_ihc, trans_phc)` and
    /// the edge recording that `trans_phc` is the prototype layout of `ihc`.
    ///
    /// A later edge for the same `(ihc, base_ihc)` replaces the earlier one.
    /// The first parent recorded for a prototype layout wins.
    pub fn insert_transition_item(
        &mut self,
        ihc: TaggedValue,
        base_ihc: TaggedValue,
        trans_ihc: TaggedValue,
        trans_phc: TaggedValue,
    ) {
        self.put_edge(ProtoTransitionEdge {
            ihc,
            base_ihc,
            trans_ihc,
            trans_phc,
        });
        self.put_fake_parent(trans_phc, ihc);
    }

    fn put_edge(&mut self, edge: ProtoTransitionEdge) {
        match self.by_declaration.entry((edge.ihc, edge.base_ihc)) {
            Entry::Occupied(slot) => self.edges[*slot.get()] = edge,
            Entry::Vacant(slot) => {
                slot.insert(self.edges.len());
                self.edges.push(edge);
            }
        }
    }

    fn put_fake_parent(&mut self, phc: TaggedValue, ihc: TaggedValue) {
        if let Entry::Vacant(slot) = self.by_phc.entry(phc) {
            slot.insert(ihc);
            self.fake_parents.push((phc, ihc));
        }
    }

    /// Transitioned `(ihc, phc)` pair for a declaration.
    pub fn find_transition(
        &self,
        ihc: TaggedValue,
        base_ihc: TaggedValue,
    ) -> Option<(TaggedValue, TaggedValue)> {
        let edge = &self.edges[*self.by_declaration.get(&(ihc, base_ihc))?];
        Some((edge.trans_ihc, edge.trans_phc))
    }

    /// Instance layout a prototype layout was derived for.
    pub fn fake_parent(&self, phc: TaggedValue) -> Option<TaggedValue> {
        self.by_phc.get(&phc).copied()
    }

    /// Direct edges in insertion order.
    pub fn edges(&self) -> &[ProtoTransitionEdge] {
        &self.edges
    }

    /// Number of direct edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true when no edge was inserted.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

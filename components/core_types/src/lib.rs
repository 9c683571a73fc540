//! Core value and profiling types shared by the runtime caching layer.
//!
//! This crate provides the foundational types used by every other component:
//! the tagged value word stored in constant pools, fatal-error reporting,
//! profile type keys for the PGO type manager, and per-function feedback.
//!
//! # Overview
//!
//! - [`TaggedValue`] - One-word value representation
//! - [`FileId`] / [`MethodId`] - Bytecode file and method identifiers
//! - [`ProfileType`] / [`ProfileTyper`] / [`ProfileTypeTuple`] - Type manager keys
//! - [`FeedbackVector`] - Call and property feedback of one function
//! - [`ProfileSlotChain`] - Frozen callee → caller chain for the JIT
//! - [`fatal!`] - Invariant violation reporting
//!
//! # Examples
//!
//! ```
//! use core_types::{ProfileType, ProfileTypeKind, ProfileTyper, TaggedValue};
//!
//! let site = ProfileType::new(1, 12, ProfileTypeKind::LiteralId);
//! let typer = ProfileTyper::root_only(site);
//! assert_eq!(typer.child, site);
//!
//! assert!(TaggedValue::HOLE.is_hole());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
mod feedback;
mod location;
mod profile;
mod slot_chain;
mod value;

pub use error::FatalKind;
pub use feedback::{FeedbackSlot, FeedbackVector, PropertyHandler, POLYMORPHIC_LIMIT};
pub use location::{FileId, MethodId};
pub use profile::{ProfileType, ProfileTypeKind, ProfileTypeTuple, ProfileTyper};
pub use slot_chain::{ProfileSlotChain, ProfileSlotChainBuilder, SlotLink};
pub use value::{HeapRef, TaggedValue};

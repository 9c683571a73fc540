//! Memory Manager - heap interface for the runtime caching layer
//!
//! This component provides:
//! - A shared, handle-based heap with a string intern table
//! - Hidden classes describing object layout
//! - A write barrier maintaining the remembered set

pub mod heap;
pub mod hidden_class;
pub mod object;
pub mod write_barrier;

// Re-export main types
pub use heap::{ArrayView, Heap, HeapStats};
pub use hidden_class::{HiddenClass, PropertyDescriptor, PropertyKey};
pub use object::{FunctionObject, HeapObject, MethodObject};
pub use write_barrier::{needs_barrier, RememberedSet};

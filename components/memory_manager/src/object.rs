//! Heap object representation
//!
//! Every heap cell is one [`HeapObject`]. References between cells are
//! [`TaggedValue`] words, so the heap never holds Rust pointers into itself.

use crate::HiddenClass;
use core_types::{FeedbackVector, FileId, HeapRef, TaggedValue};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A method bound to the constant pool it resolves literals through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodObject {
    /// Owning bytecode file
    pub file: FileId,
    /// Offset of the method record in that file
    pub offset: u32,
    /// Constant pool the method was resolved from
    pub constpool: TaggedValue,
    /// Compiled entry index when the method came from an AOT image
    pub aot_entry: Option<u32>,
}

/// A callable closure over a method.
#[derive(Debug, Clone)]
pub struct FunctionObject {
    /// The method object
    pub method: HeapRef,
    /// Profiling feedback gathered while interpreting this function
    pub feedback: Option<Arc<FeedbackVector>>,
    /// Module environment, undefined for scripts
    pub module: TaggedValue,
}

/// One heap cell.
pub enum HeapObject {
    /// Interned string
    String(Arc<str>),
    /// Symbol with an optional description
    Symbol(Option<Arc<str>>),
    /// Object layout
    HiddenClass(Arc<HiddenClass>),
    /// Ordinary object with fields laid out by its hidden class
    Object {
        /// Layout
        hclass: HeapRef,
        /// Field values
        fields: Vec<TaggedValue>,
    },
    /// Array object over a tagged backing store
    Array {
        /// Layout
        hclass: HeapRef,
        /// Backing store
        elements: HeapRef,
        /// Logical length
        length: u32,
    },
    /// Flat tagged backing store
    TaggedArray(Vec<TaggedValue>),
    /// Method bound to a constant pool
    Method(MethodObject),
    /// Function closure
    Function(FunctionObject),
    /// Runtime-owned native structure, such as a constant pool
    Host(Arc<dyn Any + Send + Sync>),
}

impl HeapObject {
    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            HeapObject::String(_) => "string",
            HeapObject::Symbol(_) => "symbol",
            HeapObject::HiddenClass(_) => "hclass",
            HeapObject::Object { .. } => "object",
            HeapObject::Array { .. } => "array",
            HeapObject::TaggedArray(_) => "tagged-array",
            HeapObject::Method(_) => "method",
            HeapObject::Function(_) => "function",
            HeapObject::Host(_) => "host",
        }
    }
}

impl fmt::Debug for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapObject::String(s) => f.debug_tuple("String").field(s).finish(),
            HeapObject::Symbol(d) => f.debug_tuple("Symbol").field(d).finish(),
            HeapObject::HiddenClass(h) => f
                .debug_struct("HiddenClass")
                .field("properties", &h.number_of_properties())
                .finish(),
            HeapObject::Object { hclass, fields } => f
                .debug_struct("Object")
                .field("hclass", hclass)
                .field("fields", &fields.len())
                .finish(),
            HeapObject::Array {
                elements, length, ..
            } => f
                .debug_struct("Array")
                .field("elements", elements)
                .field("length", length)
                .finish(),
            HeapObject::TaggedArray(v) => f.debug_tuple("TaggedArray").field(&v.len()).finish(),
            HeapObject::Method(m) => f.debug_tuple("Method").field(m).finish(),
            HeapObject::Function(func) => f
                .debug_struct("Function")
                .field("method", &func.method)
                .finish(),
            HeapObject::Host(_) => write!(f, "Host"),
        }
    }
}

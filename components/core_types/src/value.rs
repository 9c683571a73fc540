//! Tagged value word shared by the heap, constant pools and compilers.
//!
//! Every value the caching layer stores is a single 64-bit word so that a
//! constant pool slot can be published with one compare-and-swap.
//!
//! # Encoding
//!
//! - `0xFFFF_xxxx_xxxx_xxxx`: 32-bit integer in the low bits
//! - `bits + 2^48`: IEEE 754 double (NaN is canonicalised first)
//! - `(index + 1) << 3`, below `2^48`: heap reference
//! - `(entry << 8) | 0x0F`, below `2^48`: AOT entry-index placeholder
//! - small odd/unaligned words: hole, null, undefined, booleans, exception

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of an object in the heap's object table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapRef(pub u32);

/// A JavaScript value packed into one machine word.
///
/// # Examples
///
/// ```
/// use core_types::TaggedValue;
///
/// let v = TaggedValue::int(42);
/// assert!(v.is_int());
/// assert_eq!(v.as_int(), Some(42));
///
/// assert!(TaggedValue::HOLE.is_hole());
/// assert!(!TaggedValue::UNDEFINED.is_heap_object());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct TaggedValue(u64);

const TAG_INT: u64 = 0xFFFF_0000_0000_0000;
const DOUBLE_ENCODE_OFFSET: u64 = 1 << 48;
const HEAP_LIMIT: u64 = 1 << 48;
const TAG_AOT_ENTRY: u64 = 0x0F;
const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;

impl TaggedValue {
    /// Sentinel for "not yet resolved" / "no value"
    pub const HOLE: TaggedValue = TaggedValue(0x05);
    /// JavaScript null
    pub const NULL: TaggedValue = TaggedValue(0x02);
    /// JavaScript false
    pub const FALSE: TaggedValue = TaggedValue(0x06);
    /// JavaScript true
    pub const TRUE: TaggedValue = TaggedValue(0x07);
    /// JavaScript undefined
    pub const UNDEFINED: TaggedValue = TaggedValue(0x0A);
    /// Marker returned by runtime calls that left a pending exception
    pub const EXCEPTION: TaggedValue = TaggedValue(0x12);

    /// Reinterpret a raw word.
    pub const fn from_raw(raw: u64) -> Self {
        TaggedValue(raw)
    }

    /// The raw word.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Encode a 32-bit integer.
    pub const fn int(value: i32) -> Self {
        TaggedValue(TAG_INT | (value as u32 as u64))
    }

    /// Encode a double.
    pub fn double(value: f64) -> Self {
        let bits = if value.is_nan() {
            CANONICAL_NAN
        } else {
            value.to_bits()
        };
        TaggedValue(bits.wrapping_add(DOUBLE_ENCODE_OFFSET))
    }

    /// Encode a boolean.
    pub const fn boolean(value: bool) -> Self {
        if value {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    /// Encode a heap reference.
    pub const fn heap(r: HeapRef) -> Self {
        TaggedValue(((r.0 as u64) + 1) << 3)
    }

    /// Encode an AOT entry-index placeholder.
    ///
    /// Pools produced from an AOT image carry these in slots whose value must
    /// still be materialised on first access.
    pub const fn aot_entry(entry_index: u32) -> Self {
        TaggedValue(((entry_index as u64) << 8) | TAG_AOT_ENTRY)
    }

    /// Returns true for the hole sentinel.
    pub const fn is_hole(self) -> bool {
        self.0 == Self::HOLE.0
    }

    /// Returns true for undefined.
    pub const fn is_undefined(self) -> bool {
        self.0 == Self::UNDEFINED.0
    }

    /// Returns true for null.
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    /// Returns true for the exception marker.
    pub const fn is_exception(self) -> bool {
        self.0 == Self::EXCEPTION.0
    }

    /// Returns true for either boolean.
    pub const fn is_boolean(self) -> bool {
        self.0 == Self::TRUE.0 || self.0 == Self::FALSE.0
    }

    /// Returns true for an encoded integer.
    pub const fn is_int(self) -> bool {
        self.0 & TAG_INT == TAG_INT
    }

    /// Returns true for an encoded double.
    pub const fn is_double(self) -> bool {
        !self.is_int() && self.0 >= DOUBLE_ENCODE_OFFSET
    }

    /// Returns true for an integer or a double.
    pub const fn is_number(self) -> bool {
        self.0 >= DOUBLE_ENCODE_OFFSET
    }

    /// Returns true for a heap reference.
    pub const fn is_heap_object(self) -> bool {
        self.0 != 0 && self.0 < HEAP_LIMIT && self.0 & 0x7 == 0
    }

    /// Returns true for an AOT entry-index placeholder.
    pub const fn is_aot_entry(self) -> bool {
        self.0 < HEAP_LIMIT && self.0 & 0xFF == TAG_AOT_ENTRY
    }

    /// Decode an integer.
    pub const fn as_int(self) -> Option<i32> {
        if self.is_int() {
            Some(self.0 as u32 as i32)
        } else {
            None
        }
    }

    /// Decode a double. Integers are widened.
    pub fn as_double(self) -> Option<f64> {
        if self.is_int() {
            Some(self.0 as u32 as i32 as f64)
        } else if self.is_double() {
            Some(f64::from_bits(self.0.wrapping_sub(DOUBLE_ENCODE_OFFSET)))
        } else {
            None
        }
    }

    /// Decode a boolean.
    pub const fn as_boolean(self) -> Option<bool> {
        match self.0 {
            0x07 => Some(true),
            0x06 => Some(false),
            _ => None,
        }
    }

    /// Decode a heap reference.
    pub const fn heap_ref(self) -> Option<HeapRef> {
        if self.is_heap_object() {
            Some(HeapRef(((self.0 >> 3) - 1) as u32))
        } else {
            None
        }
    }

    /// Decode an AOT entry index.
    pub const fn aot_entry_index(self) -> Option<u32> {
        if self.is_aot_entry() {
            Some((self.0 >> 8) as u32)
        } else {
            None
        }
    }
}

impl Default for TaggedValue {
    fn default() -> Self {
        TaggedValue::UNDEFINED
    }
}

impl From<HeapRef> for TaggedValue {
    fn from(r: HeapRef) -> Self {
        TaggedValue::heap(r)
    }
}

impl fmt::Debug for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TaggedValue::HOLE => write!(f, "Hole"),
            TaggedValue::NULL => write!(f, "Null"),
            TaggedValue::UNDEFINED => write!(f, "Undefined"),
            TaggedValue::TRUE => write!(f, "True"),
            TaggedValue::FALSE => write!(f, "False"),
            TaggedValue::EXCEPTION => write!(f, "Exception"),
            v if v.is_int() => f.debug_tuple("Int").field(&(v.0 as u32 as i32)).finish(),
            v if v.is_double() => f
                .debug_tuple("Double")
                .field(&f64::from_bits(v.0.wrapping_sub(DOUBLE_ENCODE_OFFSET)))
                .finish(),
            v if v.is_heap_object() => f
                .debug_tuple("Heap")
                .field(&((v.0 >> 3) - 1))
                .finish(),
            v if v.is_aot_entry() => f.debug_tuple("AotEntry").field(&(v.0 >> 8)).finish(),
            v => write!(f, "Raw({:#x})", v.0),
        }
    }
}

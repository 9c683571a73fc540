//! Literal values and constant-pool entry descriptors stored in a bytecode file

use crate::file_format::{ByteReader, FileFormatError};

/// A literal stored in a literal array or as a class field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralValue {
    /// undefined
    Undefined,
    /// null
    Null,
    /// boolean
    Boolean(bool),
    /// 32-bit integer
    Integer(i32),
    /// IEEE 754 double
    Double(f64),
    /// Reference into the string table
    String(u32),
    /// Reference to a method by offset
    Method(u32),
}

impl LiteralValue {
    /// Integer payload.
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            LiteralValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload. Integers count as booleans when non-zero.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            LiteralValue::Boolean(b) => Some(*b),
            LiteralValue::Integer(n) => Some(*n != 0),
            _ => None,
        }
    }

    /// String id payload.
    pub fn as_string_id(&self) -> Option<u32> {
        match self {
            LiteralValue::String(id) => Some(*id),
            _ => None,
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        match self {
            LiteralValue::Undefined => out.push(0),
            LiteralValue::Null => out.push(1),
            LiteralValue::Boolean(b) => {
                out.push(2);
                out.push(u8::from(*b));
            }
            LiteralValue::Integer(n) => {
                out.push(3);
                out.extend_from_slice(&n.to_le_bytes());
            }
            LiteralValue::Double(d) => {
                out.push(4);
                out.extend_from_slice(&d.to_le_bytes());
            }
            LiteralValue::String(id) => {
                out.push(5);
                out.extend_from_slice(&id.to_le_bytes());
            }
            LiteralValue::Method(offset) => {
                out.push(6);
                out.extend_from_slice(&offset.to_le_bytes());
            }
        }
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self, FileFormatError> {
        let at = reader.position();
        let tag = reader.read_u8()?;
        Ok(match tag {
            0 => LiteralValue::Undefined,
            1 => LiteralValue::Null,
            2 => LiteralValue::Boolean(reader.read_u8()? != 0),
            3 => LiteralValue::Integer(reader.read_i32()?),
            4 => LiteralValue::Double(reader.read_f64()?),
            5 => LiteralValue::String(reader.read_u32()?),
            6 => LiteralValue::Method(reader.read_u32()?),
            _ => return Err(FileFormatError::UnknownTag { what: "literal", tag, offset: at }),
        })
    }
}

/// What a constant pool index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantKind {
    /// String table entry
    String,
    /// Method by offset
    Method,
    /// Array literal by literal id
    ArrayLiteral,
    /// Object literal by literal id
    ObjectLiteral,
    /// Class literal by literal id
    ClassLiteral,
}

impl ConstantKind {
    fn tag(self) -> u8 {
        match self {
            ConstantKind::String => 0,
            ConstantKind::Method => 1,
            ConstantKind::ArrayLiteral => 2,
            ConstantKind::ObjectLiteral => 3,
            ConstantKind::ClassLiteral => 4,
        }
    }
}

/// One entry of an index header: the entity behind a constant pool index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantEntry {
    /// Entity kind
    pub kind: ConstantKind,
    /// String id, method offset or literal id depending on `kind`
    pub id: u32,
}

impl ConstantEntry {
    /// Create an entry.
    pub fn new(kind: ConstantKind, id: u32) -> Self {
        Self { kind, id }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.kind.tag());
        out.extend_from_slice(&self.id.to_le_bytes());
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self, FileFormatError> {
        let at = reader.position();
        let tag = reader.read_u8()?;
        let kind = match tag {
            0 => ConstantKind::String,
            1 => ConstantKind::Method,
            2 => ConstantKind::ArrayLiteral,
            3 => ConstantKind::ObjectLiteral,
            4 => ConstantKind::ClassLiteral,
            _ => {
                return Err(FileFormatError::UnknownTag {
                    what: "constant kind",
                    tag,
                    offset: at,
                })
            }
        };
        Ok(Self::new(kind, reader.read_u32()?))
    }
}

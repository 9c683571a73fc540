//! Binary container format.
//!
//! All integers are little-endian. Layout:
//!
//! ```text
//! header      magic "CRTN" | version u32 | checksum u32 | file size u32
//! strings     count u32 | (len u32, utf8)*
//! literals    count u32 | (n u32, literal*n)*
//! indexes     count u32 | (n u32, entry*n)*
//! classes     count u32 | (descriptor u32, access u8, n u32, field*n,
//!                          methods u32, methods offset u32)*
//! methods     (name u32, args u32, kind u8, index header u32, len u32, code)*
//! ```
//!
//! The checksum is Adler-32 over everything after the checksum field. A
//! method is identified by the byte offset of its record.

use crate::literal::{ConstantEntry, ConstantKind, LiteralValue};
use crate::method_literal::FunctionKind;
use std::collections::HashMap;
use thiserror::Error;

/// File magic.
pub const MAGIC: [u8; 4] = *b"CRTN";
/// Version written by [`FileBuilder`] and accepted by the decoder.
pub const CURRENT_VERSION: u32 = 1;
/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 16;
const CHECKSUM_START: usize = 12;
const ACC_EXTERNAL: u8 = 0x01;

// Smallest encoding of each record, used to bound counts read from input.
const MIN_LENGTH_PREFIXED: usize = 4;
const MIN_CLASS_RECORD: usize = 17;
const MIN_FIELD_RECORD: usize = 5;
/// Size of a method record without its code.
pub const METHOD_RECORD_SIZE: usize = 17;

/// Errors produced while decoding a container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileFormatError {
    /// The magic bytes do not match
    #[error("bad magic {found:?}")]
    BadMagic {
        /// First four bytes of the input
        found: [u8; 4],
    },
    /// The header names a version this decoder does not read
    #[error("unsupported version {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version in the header
        found: u32,
        /// Version this decoder reads
        expected: u32,
    },
    /// The stored checksum does not match the contents
    #[error("checksum mismatch: header says {expected:#010x}, contents hash to {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum in the header
        expected: u32,
        /// Checksum of the contents
        actual: u32,
    },
    /// The header's size field disagrees with the input length
    #[error("size mismatch: header says {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size in the header
        expected: u32,
        /// Input length
        actual: usize,
    },
    /// Input ended inside a record
    #[error("unexpected end of file at offset {offset}")]
    UnexpectedEof {
        /// Offset of the truncated read
        offset: usize,
    },
    /// A string table entry is not UTF-8
    #[error("invalid utf-8 string at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the string
        offset: usize,
    },
    /// An enum tag has no meaning
    #[error("unknown {what} tag {tag} at offset {offset}")]
    UnknownTag {
        /// What was being decoded
        what: &'static str,
        /// The tag byte
        tag: u8,
        /// Offset of the tag
        offset: usize,
    },
    /// A string id points past the string table
    #[error("string id {id} out of range at offset {offset}")]
    StringOutOfRange {
        /// The id
        id: u32,
        /// Offset of the reference
        offset: usize,
    },
    /// A class points its methods outside the file
    #[error("methods of class {class} start at {offset}, past end of file")]
    MethodsOutOfRange {
        /// Class index
        class: u32,
        /// Claimed method offset
        offset: u32,
    },
    /// The classes declare more method records than the file can hold
    #[error("{declared} methods declared, file holds at most {capacity}")]
    TooManyMethods {
        /// Sum of the declared method counts
        declared: u64,
        /// Records that fit in the file
        capacity: usize,
    },
}

/// Adler-32 checksum.
///
/// ```
/// assert_eq!(bytecode_system::file_format::adler32(b"Wikipedia"), 0x11E6_0398);
/// ```
pub fn adler32(bytes: &[u8]) -> u32 {
    const MOD: u32 = 65_521;
    let (mut a, mut b) = (1u32, 0u32);
    for chunk in bytes.chunks(5552) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}

/// Cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Reader positioned at `pos`.
    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// Capacity to reserve for `count` records of at least `min_size` bytes.
    /// Never more than the rest of the input could encode.
    fn capacity_for(&self, count: u32, min_size: usize) -> usize {
        (count as usize).min(self.remaining() / min_size)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FileFormatError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(FileFormatError::UnexpectedEof { offset: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FileFormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, FileFormatError> {
        Ok(self.take(1)?[0])
    }

    /// Read a u32.
    pub fn read_u32(&mut self) -> Result<u32, FileFormatError> {
        self.array().map(u32::from_le_bytes)
    }

    /// Read an i32.
    pub fn read_i32(&mut self) -> Result<i32, FileFormatError> {
        self.array().map(i32::from_le_bytes)
    }

    /// Read an f64.
    pub fn read_f64(&mut self) -> Result<f64, FileFormatError> {
        self.array().map(f64::from_le_bytes)
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), FileFormatError> {
        self.take(n).map(|_| ())
    }
}

/// A typed field on a class record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    /// String id of the field name
    pub name: u32,
    /// Field value
    pub value: LiteralValue,
}

/// A class record as it appears in the class section.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    /// String id of the descriptor, e.g. `Lpkg/a;`
    pub descriptor: u32,
    /// Declared in another file
    pub external: bool,
    /// Typed marker fields
    pub fields: Vec<FieldRecord>,
    /// Number of method records
    pub num_methods: u32,
    /// Offset of the first method record
    pub methods_offset: u32,
}

/// A decoded method record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    /// Offset of the record, which is the method's identity
    pub offset: u32,
    /// String id of the method name
    pub name: u32,
    /// Declared argument count
    pub num_args: u32,
    /// Function kind
    pub kind: FunctionKind,
    /// Index header sizing this method's constant pool
    pub index_header: u32,
    /// Offset of the first bytecode byte
    pub code_offset: u32,
    /// Bytecode length
    pub code_len: u32,
}

/// Everything except the method records.
#[derive(Debug, Clone, PartialEq)]
pub struct FileLayout {
    /// Container version
    pub version: u32,
    /// String table
    pub strings: Vec<String>,
    /// Literal arrays
    pub literals: Vec<Vec<LiteralValue>>,
    /// Index headers
    pub index_headers: Vec<Vec<ConstantEntry>>,
    /// Class records
    pub classes: Vec<ClassRecord>,
}

impl FileLayout {
    /// Total method count over all classes.
    pub fn num_methods(&self) -> usize {
        self.classes.iter().map(|c| c.num_methods as usize).sum()
    }
}

/// Check the header and decode every section except the methods.
pub fn decode_layout(bytes: &[u8]) -> Result<FileLayout, FileFormatError> {
    let mut reader = ByteReader::at(bytes, 0);
    let magic: [u8; 4] = reader.array()?;
    if magic != MAGIC {
        return Err(FileFormatError::BadMagic { found: magic });
    }
    let version = reader.read_u32()?;
    if version != CURRENT_VERSION {
        return Err(FileFormatError::UnsupportedVersion {
            found: version,
            expected: CURRENT_VERSION,
        });
    }
    let checksum = reader.read_u32()?;
    let size = reader.read_u32()?;
    if size as usize != bytes.len() {
        return Err(FileFormatError::SizeMismatch {
            expected: size,
            actual: bytes.len(),
        });
    }
    let actual = adler32(&bytes[CHECKSUM_START..]);
    if actual != checksum {
        return Err(FileFormatError::ChecksumMismatch {
            expected: checksum,
            actual,
        });
    }

    let count = reader.read_u32()?;
    let mut strings = Vec::with_capacity(reader.capacity_for(count, MIN_LENGTH_PREFIXED));
    for _ in 0..count {
        let len = reader.read_u32()? as usize;
        let at = reader.position();
        let raw = reader.take(len)?;
        let s = std::str::from_utf8(raw).map_err(|_| FileFormatError::InvalidUtf8 { offset: at })?;
        strings.push(s.to_string());
    }

    let count = reader.read_u32()?;
    let mut literals = Vec::with_capacity(reader.capacity_for(count, MIN_LENGTH_PREFIXED));
    for _ in 0..count {
        let n = reader.read_u32()?;
        let values = (0..n)
            .map(|_| LiteralValue::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;
        literals.push(values);
    }

    let count = reader.read_u32()?;
    let mut index_headers = Vec::with_capacity(reader.capacity_for(count, MIN_LENGTH_PREFIXED));
    for _ in 0..count {
        let n = reader.read_u32()?;
        let entries = (0..n)
            .map(|_| ConstantEntry::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;
        index_headers.push(entries);
    }

    let count = reader.read_u32()?;
    let mut classes = Vec::with_capacity(reader.capacity_for(count, MIN_CLASS_RECORD));
    for class_index in 0..count {
        let at = reader.position();
        let descriptor = reader.read_u32()?;
        if descriptor as usize >= strings.len() {
            return Err(FileFormatError::StringOutOfRange {
                id: descriptor,
                offset: at,
            });
        }
        let external = reader.read_u8()? & ACC_EXTERNAL != 0;
        let n = reader.read_u32()?;
        let mut fields = Vec::with_capacity(reader.capacity_for(n, MIN_FIELD_RECORD));
        for _ in 0..n {
            let at = reader.position();
            let name = reader.read_u32()?;
            if name as usize >= strings.len() {
                return Err(FileFormatError::StringOutOfRange { id: name, offset: at });
            }
            fields.push(FieldRecord {
                name,
                value: LiteralValue::decode(&mut reader)?,
            });
        }
        let num_methods = reader.read_u32()?;
        let methods_offset = reader.read_u32()?;
        let fits = (num_methods as usize)
            .checked_mul(METHOD_RECORD_SIZE)
            .zip(bytes.len().checked_sub(methods_offset as usize))
            .is_some_and(|(needed, room)| needed <= room);
        if num_methods > 0 && !fits {
            return Err(FileFormatError::MethodsOutOfRange {
                class: class_index,
                offset: methods_offset,
            });
        }
        classes.push(ClassRecord {
            descriptor,
            external,
            fields,
            num_methods,
            methods_offset,
        });
    }

    let declared: u64 = classes.iter().map(|c| u64::from(c.num_methods)).sum();
    let capacity = bytes.len() / METHOD_RECORD_SIZE;
    if declared > capacity as u64 {
        return Err(FileFormatError::TooManyMethods { declared, capacity });
    }

    Ok(FileLayout {
        version,
        strings,
        literals,
        index_headers,
        classes,
    })
}

/// Decode the method records of one class.
pub fn decode_methods(bytes: &[u8], class: &ClassRecord) -> Result<Vec<MethodRecord>, FileFormatError> {
    let mut reader = ByteReader::at(bytes, class.methods_offset as usize);
    let mut methods = Vec::with_capacity(reader.capacity_for(class.num_methods, METHOD_RECORD_SIZE));
    for _ in 0..class.num_methods {
        let offset = reader.position() as u32;
        let name = reader.read_u32()?;
        let num_args = reader.read_u32()?;
        let at = reader.position();
        let tag = reader.read_u8()?;
        let kind = FunctionKind::from_tag(tag).ok_or(FileFormatError::UnknownTag {
            what: "function kind",
            tag,
            offset: at,
        })?;
        let index_header = reader.read_u32()?;
        let code_len = reader.read_u32()?;
        let code_offset = reader.position() as u32;
        reader.skip(code_len as usize)?;
        methods.push(MethodRecord {
            offset,
            name,
            num_args,
            kind,
            index_header,
            code_offset,
            code_len,
        });
    }
    Ok(methods)
}

/// A method to be written by [`FileBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBuilder {
    name: String,
    num_args: u32,
    kind: FunctionKind,
    index_header: u32,
    code: Vec<u8>,
}

impl MethodBuilder {
    /// A normal function with no arguments and empty code.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            num_args: 0,
            kind: FunctionKind::Normal,
            index_header: 0,
            code: Vec::new(),
        }
    }

    /// Set the declared argument count.
    pub fn with_args(mut self, num_args: u32) -> Self {
        self.num_args = num_args;
        self
    }

    /// Set the function kind.
    pub fn with_kind(mut self, kind: FunctionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the index header.
    pub fn with_index_header(mut self, index_header: u32) -> Self {
        self.index_header = index_header;
        self
    }

    /// Set the bytecode.
    pub fn with_code(mut self, code: Vec<u8>) -> Self {
        self.code = code;
        self
    }
}

/// A class to be written by [`FileBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassBuilder {
    descriptor: String,
    external: bool,
    fields: Vec<(String, LiteralValue)>,
    methods: Vec<MethodBuilder>,
}

impl ClassBuilder {
    /// A class with the given descriptor, e.g. `Lpkg/a;`.
    pub fn new(descriptor: &str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            external: false,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Mark the class as declared elsewhere.
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    /// Add a typed field.
    pub fn field(mut self, name: &str, value: LiteralValue) -> Self {
        self.fields.push((name.to_string(), value));
        self
    }

    /// Add a method.
    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }
}

/// Output of [`FileBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFile {
    /// Container bytes
    pub bytes: Vec<u8>,
    /// Offset of every method, by ordinal
    pub method_offsets: Vec<u32>,
}

/// Writes containers.
///
/// Methods are numbered by ordinal in insertion order across classes. Inside
/// a builder, [`LiteralValue::Method`] and method [`ConstantEntry`] ids are
/// ordinals; [`FileBuilder::build`] rewrites them to record offsets.
///
/// ```
/// use bytecode_system::file_format::{decode_layout, ClassBuilder, FileBuilder, MethodBuilder};
///
/// let mut builder = FileBuilder::new();
/// builder.add_class(ClassBuilder::new("Lmain;").method(MethodBuilder::new("func_main_0")));
/// let encoded = builder.build();
/// let layout = decode_layout(&encoded.bytes).unwrap();
/// assert_eq!(layout.num_methods(), 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct FileBuilder {
    strings: Vec<String>,
    string_ids: HashMap<String, u32>,
    literals: Vec<Vec<LiteralValue>>,
    index_headers: Vec<Vec<ConstantEntry>>,
    classes: Vec<ClassBuilder>,
    method_count: u32,
}

impl FileBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string and return its id.
    pub fn string(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.string_ids.get(s) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_ids.insert(s.to_string(), id);
        id
    }

    /// Add a literal array and return its id.
    pub fn literal(&mut self, values: Vec<LiteralValue>) -> u32 {
        self.literals.push(values);
        (self.literals.len() - 1) as u32
    }

    /// Add an index header and return its id.
    pub fn index_header(&mut self, entries: Vec<ConstantEntry>) -> u32 {
        self.index_headers.push(entries);
        (self.index_headers.len() - 1) as u32
    }

    /// Add a class and return the ordinal of its first method.
    pub fn add_class(&mut self, class: ClassBuilder) -> u32 {
        self.string(&class.descriptor);
        for (name, _) in &class.fields {
            self.string(name);
        }
        for method in &class.methods {
            self.string(&method.name);
        }
        let first = self.method_count;
        self.method_count += class.methods.len() as u32;
        self.classes.push(class);
        first
    }

    /// Encode the container.
    pub fn build(&self) -> EncodedFile {
        let placeholder = vec![0u32; self.method_count as usize];
        let prefix = self.encode_prefix(&placeholder, &[]);

        let mut method_offsets = Vec::with_capacity(self.method_count as usize);
        let mut class_offsets = Vec::with_capacity(self.classes.len());
        let mut pos = prefix.len() as u32;
        for class in &self.classes {
            class_offsets.push(pos);
            for method in &class.methods {
                method_offsets.push(pos);
                pos += (METHOD_RECORD_SIZE + method.code.len()) as u32;
            }
        }

        let mut bytes = self.encode_prefix(&method_offsets, &class_offsets);
        for class in &self.classes {
            for method in &class.methods {
                put_u32(&mut bytes, self.string_ids[&method.name]);
                put_u32(&mut bytes, method.num_args);
                bytes.push(method.kind.tag());
                put_u32(&mut bytes, method.index_header);
                put_u32(&mut bytes, method.code.len() as u32);
                bytes.extend_from_slice(&method.code);
            }
        }

        let size = bytes.len() as u32;
        bytes[12..16].copy_from_slice(&size.to_le_bytes());
        let checksum = adler32(&bytes[CHECKSUM_START..]);
        bytes[8..12].copy_from_slice(&checksum.to_le_bytes());

        EncodedFile {
            bytes,
            method_offsets,
        }
    }

    fn encode_prefix(&self, method_offsets: &[u32], class_offsets: &[u32]) -> Vec<u8> {
        let patch = |ordinal: u32| method_offsets.get(ordinal as usize).copied().unwrap_or(ordinal);
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        put_u32(&mut out, CURRENT_VERSION);
        put_u32(&mut out, 0);
        put_u32(&mut out, 0);

        put_u32(&mut out, self.strings.len() as u32);
        for s in &self.strings {
            put_u32(&mut out, s.len() as u32);
            out.extend_from_slice(s.as_bytes());
        }

        put_u32(&mut out, self.literals.len() as u32);
        for values in &self.literals {
            put_u32(&mut out, values.len() as u32);
            for value in values {
                match value {
                    LiteralValue::Method(ordinal) => LiteralValue::Method(patch(*ordinal)).encode(&mut out),
                    other => other.encode(&mut out),
                }
            }
        }

        put_u32(&mut out, self.index_headers.len() as u32);
        for entries in &self.index_headers {
            put_u32(&mut out, entries.len() as u32);
            for entry in entries {
                let id = match entry.kind {
                    ConstantKind::Method => patch(entry.id),
                    _ => entry.id,
                };
                ConstantEntry::new(entry.kind, id).encode(&mut out);
            }
        }

        put_u32(&mut out, self.classes.len() as u32);
        for (i, class) in self.classes.iter().enumerate() {
            put_u32(&mut out, self.string_ids[&class.descriptor]);
            out.push(if class.external { ACC_EXTERNAL } else { 0 });
            put_u32(&mut out, class.fields.len() as u32);
            for (name, value) in &class.fields {
                put_u32(&mut out, self.string_ids[name]);
                value.encode(&mut out);
            }
            put_u32(&mut out, class.methods.len() as u32);
            put_u32(&mut out, class_offsets.get(i).copied().unwrap_or(0));
        }
        out
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

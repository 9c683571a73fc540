//! Hidden classes describing object layout.
//!
//! The caching layer never inspects layout beyond property keys, the
//! prototype and two flags, so this stays a plain immutable value shared
//! through `Arc` once it is placed on the heap.

use core_types::{HeapRef, TaggedValue};

/// Key of a property slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String-named property
    String(String),
    /// Symbol-keyed property; the symbol lives on the heap
    Symbol(HeapRef),
}

/// A property descriptor for a hidden class.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Key of the property
    pub key: PropertyKey,
    /// Offset in the object's field vector
    pub offset: u32,
}

/// Hidden class for heap objects.
///
/// Objects with the same properties in the same order share a hidden class,
/// enabling fast property access through offset-based lookups.
///
/// # Example
///
/// ```
/// use memory_manager::HiddenClass;
///
/// let empty_class = HiddenClass::new();
/// let with_x = empty_class.add_property("x");
/// let with_xy = with_x.add_property("y");
///
/// assert_eq!(with_xy.lookup_property("x"), Some(0));
/// assert_eq!(with_xy.lookup_property("y"), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenClass {
    /// Properties in this class with their offsets
    pub properties: Vec<PropertyDescriptor>,
    /// Prototype object, undefined when none
    pub prototype: TaggedValue,
    /// Set on the layout of a prototype object
    pub is_prototype: bool,
    /// Set while a layout is an intermediate step of a transition chain
    pub transitioning: bool,
}

impl HiddenClass {
    /// Creates a new empty hidden class.
    pub fn new() -> Self {
        HiddenClass {
            properties: Vec::new(),
            prototype: TaggedValue::UNDEFINED,
            is_prototype: false,
            transitioning: false,
        }
    }

    /// Same layout with a different prototype.
    pub fn with_prototype(mut self, prototype: TaggedValue) -> Self {
        self.prototype = prototype;
        self
    }

    /// Same layout marked as a prototype layout.
    pub fn as_prototype(mut self) -> Self {
        self.is_prototype = true;
        self
    }

    /// Same layout marked as an intermediate transition step.
    pub fn as_transitioning(mut self) -> Self {
        self.transitioning = true;
        self
    }

    /// Adds a string-named property, creating a new hidden class.
    ///
    /// ```
    /// use memory_manager::HiddenClass;
    ///
    /// let class1 = HiddenClass::new();
    /// let class2 = class1.add_property("name");
    /// assert_eq!(class2.lookup_property("name"), Some(0));
    /// assert_eq!(class1.number_of_properties(), 0);
    /// ```
    pub fn add_property(&self, name: &str) -> HiddenClass {
        self.add_key(PropertyKey::String(name.to_string()))
    }

    /// Adds a symbol-keyed property, creating a new hidden class.
    pub fn add_symbol(&self, symbol: HeapRef) -> HiddenClass {
        self.add_key(PropertyKey::Symbol(symbol))
    }

    fn add_key(&self, key: PropertyKey) -> HiddenClass {
        let offset = self.properties.len() as u32;
        let mut properties = self.properties.clone();
        properties.push(PropertyDescriptor { key, offset });
        HiddenClass {
            properties,
            prototype: self.prototype,
            is_prototype: self.is_prototype,
            transitioning: false,
        }
    }

    /// Looks up a string-named property and returns its offset.
    pub fn lookup_property(&self, name: &str) -> Option<u32> {
        self.properties
            .iter()
            .find(|prop| matches!(&prop.key, PropertyKey::String(s) if s == name))
            .map(|prop| prop.offset)
    }

    /// Symbol keys with their slot offsets, in layout order.
    pub fn symbol_keys(&self) -> impl Iterator<Item = (u32, HeapRef)> + '_ {
        self.properties.iter().filter_map(|prop| match prop.key {
            PropertyKey::Symbol(sym) => Some((prop.offset, sym)),
            PropertyKey::String(_) => None,
        })
    }

    /// Number of fields an instance needs.
    pub fn number_of_properties(&self) -> usize {
        self.properties.len()
    }
}

impl Default for HiddenClass {
    fn default() -> Self {
        Self::new()
    }
}

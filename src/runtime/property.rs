//! Property bags
//!
//! A property bag is the object payload of a [`Variant`]: an ordered map
//! from identifier to value, tagged PLAIN or ARRAY when it is created.
//!
//! Bags read from the host remember the host object they were read from.
//! Converting such a bag back to host form hands out the original object
//! instead of building a fresh one. Any mutation forgets that backing,
//! since the snapshot no longer matches the host object.

use std::collections::BTreeMap;
use std::fmt;

use crate::host::NativeObject;
use crate::marshal::NativeBacked;
use crate::runtime::Identifier;
use crate::value::Variant;

/// Object shape, fixed at construction
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectKind {
    #[default]
    Plain = 0,
    Array = 1,
}

/// Mapping from identifier to value
#[derive(Clone, Default)]
pub struct PropertyBag {
    /// Plain object or array
    kind: ObjectKind,
    /// Properties in identifier order
    properties: BTreeMap<Identifier, Variant>,
    /// Host object this snapshot was read from (counted reference)
    native: Option<NativeObject>,
}

impl PropertyBag {
    /// Create an empty plain object
    pub fn new() -> Self {
        Self::with_kind(ObjectKind::Plain)
    }

    /// Create an empty array
    pub fn array() -> Self {
        Self::with_kind(ObjectKind::Array)
    }

    /// Create an empty bag of the given kind
    pub fn with_kind(kind: ObjectKind) -> Self {
        PropertyBag {
            kind,
            properties: BTreeMap::new(),
            native: None,
        }
    }

    /// Create an array from values, indexed from 0
    pub fn from_values(values: impl IntoIterator<Item = Variant>) -> Self {
        let mut bag = Self::array();
        for (i, value) in values.into_iter().enumerate() {
            bag.properties.insert(Identifier::Int32(i as i32), value);
        }
        bag
    }

    /// Attach the host object this bag was read from
    pub(crate) fn backed_by(mut self, native: NativeObject) -> Self {
        self.native = Some(native);
        self
    }

    /// Get the object kind
    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Check if this bag is an array
    #[inline]
    pub fn is_array(&self) -> bool {
        self.kind == ObjectKind::Array
    }

    /// Number of properties
    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Check if the bag is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Check if a property exists
    pub fn has_property(&self, id: &Identifier) -> bool {
        self.properties.contains_key(id)
    }

    /// Get a copy of a property value
    pub fn get_property(&self, id: &Identifier) -> Option<Variant> {
        self.properties.get(id).cloned()
    }

    /// Borrow a property value
    pub fn get(&self, id: &Identifier) -> Option<&Variant> {
        self.properties.get(id)
    }

    /// Insert or overwrite a property
    pub fn set_property(&mut self, id: impl Into<Identifier>, value: impl Into<Variant>) {
        self.native = None;
        self.properties.insert(id.into(), value.into());
    }

    /// One past the highest non-negative integer key
    ///
    /// Integer keys sort after string keys, so the last key is the highest
    /// integer key when there is one.
    pub fn array_length(&self) -> usize {
        match self.properties.keys().next_back() {
            Some(Identifier::Int32(i)) if *i >= 0 => *i as usize + 1,
            _ => 0,
        }
    }

    /// Append a value after the highest index
    pub fn push(&mut self, value: impl Into<Variant>) {
        let index = self.array_length() as i32;
        self.set_property(index, value);
    }

    /// Delete a property
    ///
    /// Returns true if the property existed.
    pub fn remove_property(&mut self, id: &Identifier) -> bool {
        let existed = self.properties.remove(id).is_some();
        if existed {
            self.native = None;
        }
        existed
    }

    /// Snapshot of all identifiers, in order
    pub fn enumerate(&self) -> Vec<Identifier> {
        self.properties.keys().cloned().collect()
    }

    /// Iterate over all properties
    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Variant)> {
        self.properties.iter()
    }

    /// Array elements in index order, holes read as void
    pub fn elements(&self) -> impl Iterator<Item = Variant> + '_ {
        (0..self.array_length() as i32).map(|i| {
            self.properties
                .get(&Identifier::Int32(i))
                .cloned()
                .unwrap_or_default()
        })
    }
}

impl NativeBacked for PropertyBag {
    fn native_object(&self) -> Option<&NativeObject> {
        self.native.as_ref()
    }
}

impl PartialEq for PropertyBag {
    fn eq(&self, other: &Self) -> bool {
        // Host backing is identity, not content
        self.kind == other.kind && self.properties == other.properties
    }
}

impl fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PropertyBag");
        s.field("kind", &self.kind).field("properties", &self.properties);
        if let Some(native) = &self.native {
            s.field("native", &native.handle());
        }
        s.finish()
    }
}

impl fmt::Display for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ObjectKind::Array => {
                write!(f, "[")?;
                for (i, value) in self.elements().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            ObjectKind::Plain => {
                write!(f, "{{")?;
                for (i, (id, value)) in self.properties.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", id, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

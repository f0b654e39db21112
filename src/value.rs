//! Boundary value representation
//!
//! A [`Variant`] is the tagged union that crosses the engine/host boundary.
//! Exactly one payload is active. Strings are owned buffers, so a copy never
//! aliases its source. Objects are [`PropertyBag`] snapshots; a bag that was
//! read from a host object keeps a counted reference to it, so copying such
//! a variant retains the host object and dropping it releases it.
//!
//! Reading a variant as the wrong kind never fails: the loose accessors
//! return the zero value of the requested type, the way a loosely-typed host
//! would coerce.

use std::fmt;

use crate::host::NativeObject;
use crate::marshal::NativeBacked;
use crate::runtime::PropertyBag;

/// Variant kinds
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    String = 0,
    Int32 = 1,
    Double = 2,
    Boolean = 3,
    Object = 4,
    /// An empty value is present
    Null = 5,
    /// No value at all
    Void = 6,
}

impl VariantKind {
    /// Name used in log lines and diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            VariantKind::String => "string",
            VariantKind::Int32 => "int32",
            VariantKind::Double => "double",
            VariantKind::Boolean => "boolean",
            VariantKind::Object => "object",
            VariantKind::Null => "null",
            VariantKind::Void => "void",
        }
    }
}

/// Tagged value crossing the boundary
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Variant {
    #[default]
    Void,
    Null,
    Boolean(bool),
    Int32(i32),
    Double(f64),
    String(String),
    Object(PropertyBag),
}

impl Variant {
    /// Get the kind of this value
    #[inline]
    pub const fn kind(&self) -> VariantKind {
        match self {
            Variant::Void => VariantKind::Void,
            Variant::Null => VariantKind::Null,
            Variant::Boolean(_) => VariantKind::Boolean,
            Variant::Int32(_) => VariantKind::Int32,
            Variant::Double(_) => VariantKind::Double,
            Variant::String(_) => VariantKind::String,
            Variant::Object(_) => VariantKind::Object,
        }
    }

    /// Check if this is void (no value)
    #[inline]
    pub const fn is_void(&self) -> bool {
        matches!(self, Variant::Void)
    }

    /// Check if this is null (empty value present)
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    /// Check if this is an object
    #[inline]
    pub const fn is_object(&self) -> bool {
        matches!(self, Variant::Object(_))
    }

    // Loose accessors

    /// String payload, or "" for any other kind
    pub fn as_str(&self) -> &str {
        match self {
            Variant::String(s) => s,
            _ => "",
        }
    }

    /// Integer payload, or 0 for any other kind
    pub const fn as_i32(&self) -> i32 {
        match self {
            Variant::Int32(i) => *i,
            _ => 0,
        }
    }

    /// Double payload, or 0.0 for any other kind
    pub const fn as_f64(&self) -> f64 {
        match self {
            Variant::Double(d) => *d,
            _ => 0.0,
        }
    }

    /// Boolean payload, or false for any other kind
    pub const fn as_bool(&self) -> bool {
        match self {
            Variant::Boolean(b) => *b,
            _ => false,
        }
    }

    /// Object payload, if this is an object
    pub const fn as_object(&self) -> Option<&PropertyBag> {
        match self {
            Variant::Object(bag) => Some(bag),
            _ => None,
        }
    }

    /// Mutable object payload, if this is an object
    pub fn as_object_mut(&mut self) -> Option<&mut PropertyBag> {
        match self {
            Variant::Object(bag) => Some(bag),
            _ => None,
        }
    }
}

impl NativeBacked for Variant {
    fn native_object(&self) -> Option<&NativeObject> {
        self.as_object().and_then(PropertyBag::native_object)
    }
}

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Variant::Boolean(b)
    }
}

impl From<i32> for Variant {
    fn from(i: i32) -> Self {
        Variant::Int32(i)
    }
}

impl From<f64> for Variant {
    fn from(d: f64) -> Self {
        Variant::Double(d)
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Variant::String(s.to_owned())
    }
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Variant::String(s)
    }
}

impl From<PropertyBag> for Variant {
    fn from(bag: PropertyBag) -> Self {
        Variant::Object(bag)
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    fn from(value: Option<T>) -> Self {
        value.map_or(Variant::Null, Into::into)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Void => write!(f, "undefined"),
            Variant::Null => write!(f, "null"),
            Variant::Boolean(b) => write!(f, "{}", b),
            Variant::Int32(i) => write!(f, "{}", i),
            Variant::Double(d) => write!(f, "{}", d),
            Variant::String(s) => write!(f, "{:?}", s),
            Variant::Object(bag) => write!(f, "{}", bag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_and_null_are_distinct() {
        let void = Variant::Void;
        let null = Variant::Null;

        assert!(void.is_void());
        assert!(!void.is_null());
        assert!(null.is_null());
        assert_ne!(void, null);
        assert_eq!(Variant::default(), Variant::Void);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Variant::from("x").kind(), VariantKind::String);
        assert_eq!(Variant::from(1).kind(), VariantKind::Int32);
        assert_eq!(Variant::from(1.5).kind(), VariantKind::Double);
        assert_eq!(Variant::from(true).kind(), VariantKind::Boolean);
        assert_eq!(Variant::from(PropertyBag::new()).kind(), VariantKind::Object);
        assert_eq!(Variant::from(None::<i32>).kind(), VariantKind::Null);
    }

    #[test]
    fn test_loose_reads_default_to_zero() {
        let s = Variant::from("text");
        assert_eq!(s.as_i32(), 0);
        assert_eq!(s.as_f64(), 0.0);
        assert!(!s.as_bool());
        assert!(s.as_object().is_none());

        let i = Variant::from(7);
        assert_eq!(i.as_str(), "");
        assert_eq!(i.as_i32(), 7);
        // No numeric widening either
        assert_eq!(i.as_f64(), 0.0);
    }

    #[test]
    fn test_string_copies_are_deep() {
        let mut source = Variant::from("hello");
        let copies: Vec<Variant> = (0..4).map(|_| source.clone()).collect();

        if let Variant::String(buf) = &mut source {
            buf.push_str(", world");
            buf.make_ascii_uppercase();
        }

        assert_eq!(source.as_str(), "HELLO, WORLD");
        for copy in &copies {
            assert_eq!(copy.as_str(), "hello");
        }
    }

    #[test]
    fn test_double_bits_preserved() {
        let v = Variant::from(-0.0f64);
        assert_eq!(v.as_f64().to_bits(), (-0.0f64).to_bits());
    }

    #[test]
    fn test_display() {
        assert_eq!(Variant::Void.to_string(), "undefined");
        assert_eq!(Variant::Null.to_string(), "null");
        assert_eq!(Variant::from(42).to_string(), "42");
        assert_eq!(Variant::from("a").to_string(), "\"a\"");
    }
}

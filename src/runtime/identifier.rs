//! Property and method identifiers
//!
//! Identifiers are either strings or 32-bit integers. A string that is
//! entirely a base-10 integer is the same identifier as that integer, so
//! `"3"` and `3` name the same array slot.

use std::fmt;

/// Identifier kinds
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    String = 0,
    Int32 = 1,
}

/// Canonical property/method key
///
/// Ordering compares kind first (strings before integers), then value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identifier {
    String(String),
    Int32(i32),
}

impl Identifier {
    /// Create an identifier from a name, folding integer names to Int32
    pub fn new(name: &str) -> Self {
        match name.parse::<i32>() {
            Ok(i) => Identifier::Int32(i),
            Err(_) => Identifier::String(name.to_owned()),
        }
    }

    /// Get the identifier kind
    #[inline]
    pub const fn kind(&self) -> IdentifierKind {
        match self {
            Identifier::String(_) => IdentifierKind::String,
            Identifier::Int32(_) => IdentifierKind::Int32,
        }
    }

    /// Check if this is a string identifier
    #[inline]
    pub const fn is_string(&self) -> bool {
        matches!(self, Identifier::String(_))
    }

    /// String value, or "" for integer identifiers
    pub fn as_str(&self) -> &str {
        match self {
            Identifier::String(s) => s,
            Identifier::Int32(_) => "",
        }
    }

    /// Integer value, or 0 for string identifiers
    pub const fn as_i32(&self) -> i32 {
        match self {
            Identifier::Int32(i) => *i,
            Identifier::String(_) => 0,
        }
    }

    /// Script text that evaluates this identifier as an expression
    pub fn to_expression(&self) -> String {
        format!("({})", self)
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier::new(name)
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        match name.parse::<i32>() {
            Ok(i) => Identifier::Int32(i),
            Err(_) => Identifier::String(name),
        }
    }
}

impl From<i32> for Identifier {
    fn from(i: i32) -> Self {
        Identifier::Int32(i)
    }
}

impl From<&Identifier> for Identifier {
    fn from(id: &Identifier) -> Self {
        id.clone()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::String(s) => f.write_str(s),
            Identifier::Int32(i) => write!(f, "{}", i),
        }
    }
}

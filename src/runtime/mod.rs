//! Registry support
//!
//! This module contains the engine-side types the host sees:
//! - Identifiers (string or integer keys)
//! - Property bags (plain objects and arrays)
//! - Callbacks and the legacy verb table
//! - The script object holding properties and methods

pub mod function;
pub mod identifier;
pub mod object;
pub mod property;

pub use function::{register_legacy_verbs, CallResult, Callback, LegacyVerb, StubValue, LEGACY_VERBS};
pub use identifier::{Identifier, IdentifierKind};
pub use object::ScriptObject;
pub use property::{ObjectKind, PropertyBag};

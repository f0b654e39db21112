//! Callbacks bound to host-invocable methods
//!
//! A callback receives the owning [`ScriptObject`], the identifier it was
//! invoked under and the converted arguments. It reports whether the call
//! was handled plus an optional result.
//!
//! The legacy verbs are compatibility methods a host may look for. None of
//! them do anything; each returns a fixed value, so they live in one table.

use super::{Identifier, ScriptObject};
use crate::value::Variant;

/// Outcome of a host-to-engine call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallResult {
    /// Whether the callback handled the call
    pub handled: bool,
    /// Value handed back to the host, if any
    pub value: Option<Variant>,
}

impl CallResult {
    /// Create a call result
    pub fn new(handled: bool, value: Option<Variant>) -> Self {
        CallResult { handled, value }
    }

    /// Handled, returning `value`
    pub fn handled(value: impl Into<Variant>) -> Self {
        CallResult::new(true, Some(value.into()))
    }

    /// Handled, returning nothing
    pub fn done() -> Self {
        CallResult::new(true, None)
    }

    /// Not handled
    pub fn unhandled() -> Self {
        CallResult::default()
    }
}

/// Function bound to a method identifier
pub trait Callback: Send {
    fn call(&self, object: &ScriptObject, id: &Identifier, args: &[Variant]) -> CallResult;
}

impl<F> Callback for F
where
    F: Fn(&ScriptObject, &Identifier, &[Variant]) -> CallResult + Send,
{
    fn call(&self, object: &ScriptObject, id: &Identifier, args: &[Variant]) -> CallResult {
        self(object, id, args)
    }
}

/// Fixed result of a legacy verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubValue {
    Void,
    Boolean(bool),
    Int32(i32),
}

impl StubValue {
    pub fn to_variant(self) -> Variant {
        match self {
            StubValue::Void => Variant::Void,
            StubValue::Boolean(b) => Variant::Boolean(b),
            StubValue::Int32(i) => Variant::Int32(i),
        }
    }
}

/// A compatibility method with a fixed outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyVerb {
    pub name: &'static str,
    pub handled: bool,
    pub value: StubValue,
}

const fn verb(name: &'static str, handled: bool, value: StubValue) -> LegacyVerb {
    LegacyVerb { name, handled, value }
}

/// Legacy verbs, registered in this order
pub const LEGACY_VERBS: &[LegacyVerb] = &[
    verb("SetVariable", false, StubValue::Boolean(false)),
    verb("GetVariable", false, StubValue::Void),
    verb("GotoFrame", false, StubValue::Boolean(false)),
    verb("IsPlaying", true, StubValue::Boolean(true)),
    verb("LoadMovie", false, StubValue::Boolean(false)),
    verb("Pan", false, StubValue::Boolean(false)),
    verb("PercentLoaded", true, StubValue::Int32(100)),
    verb("Play", false, StubValue::Boolean(false)),
    verb("Rewind", false, StubValue::Boolean(false)),
    verb("SetZoomRect", false, StubValue::Boolean(false)),
    verb("StopPlay", false, StubValue::Boolean(false)),
    verb("Zoom", false, StubValue::Boolean(false)),
    verb("TotalFrames", false, StubValue::Boolean(false)),
];

impl Callback for LegacyVerb {
    fn call(&self, _object: &ScriptObject, _id: &Identifier, _args: &[Variant]) -> CallResult {
        log::warn!("{} is not implemented", self.name);
        CallResult::new(self.handled, Some(self.value.to_variant()))
    }
}

/// Register every legacy verb on `object`
pub fn register_legacy_verbs(object: &mut ScriptObject) {
    for verb in LEGACY_VERBS {
        object.set_method(verb.name, *verb);
    }
}

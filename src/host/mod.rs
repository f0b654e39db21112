//! Host boundary
//!
//! The host is an external collaborator. It owns the real objects, the
//! identifier table and the designated thread; the bridge only reaches it
//! through [`HostAdapter`]. Values cross the trait in [`RawVariant`] form,
//! which says nothing about ownership. [`NativeVariant`] and
//! [`NativeObject`] are the owning wrappers the rest of the crate uses.

mod memory;
mod native;

pub use memory::{HostFunction, MemoryHost};
pub use native::{NativeObject, NativeVariant};

use std::thread::ThreadId;

/// Opaque handle to a host-owned object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

/// Opaque host identifier (an interned string or an integer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeId(pub u64);

/// A value in host form
///
/// Object handles inside a raw variant are not owned by it: cloning does
/// not retain and dropping does not release.
#[derive(Debug, Clone, PartialEq)]
pub enum RawVariant {
    Void,
    Null,
    Boolean(bool),
    Int32(i32),
    Double(f64),
    String(String),
    Object(ObjectHandle),
}

impl RawVariant {
    /// Object handle, if this is an object
    #[inline]
    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            RawVariant::Object(handle) => Some(*handle),
            _ => None,
        }
    }
}

/// Work item run on the designated thread
pub type HostTask = Box<dyn FnOnce() + Send + 'static>;

/// Host entry points
///
/// Every method except [`dispatch`](HostAdapter::dispatch),
/// [`designated_thread`](HostAdapter::designated_thread),
/// [`retain`](HostAdapter::retain) and [`release`](HostAdapter::release)
/// must only be called on the designated thread. Reference counting must be
/// safe from any thread.
///
/// Values returned from the host (`invoke`, `evaluate`, `get_property`,
/// `global_object`, ...) carry one reference owned by the caller. Arguments
/// passed to the host are borrowed.
pub trait HostAdapter: Send + Sync {
    /// The only thread on which the host API may be entered
    fn designated_thread(&self) -> ThreadId;

    /// Queue a task to run on the designated thread; never blocks
    fn dispatch(&self, task: HostTask);

    /// The host's global object
    fn global_object(&self) -> Option<ObjectHandle>;

    /// The element object the engine is embedded in, if any
    fn plugin_element(&self) -> Option<ObjectHandle>;

    /// Call method `id` on `target`
    fn invoke(&self, target: ObjectHandle, id: NativeId, args: &[RawVariant]) -> Option<RawVariant>;

    /// Call `target` itself as a function
    fn invoke_default(&self, target: ObjectHandle, args: &[RawVariant]) -> Option<RawVariant>;

    /// Evaluate script text in the scope of `target`
    fn evaluate(&self, target: ObjectHandle, script: &str) -> Option<RawVariant>;

    /// Read a property
    fn get_property(&self, target: ObjectHandle, id: NativeId) -> Option<RawVariant>;

    /// Write a property
    fn set_property(&self, target: ObjectHandle, id: NativeId, value: &RawVariant) -> bool;

    /// Enumerable property identifiers of `target`
    fn enumerate(&self, target: ObjectHandle) -> Option<Vec<NativeId>>;

    /// Add a reference to an object
    fn retain(&self, target: ObjectHandle);

    /// Drop a reference to an object
    fn release(&self, target: ObjectHandle);

    /// Intern a string identifier
    fn string_identifier(&self, name: &str) -> NativeId;

    /// Intern an integer identifier
    fn int_identifier(&self, value: i32) -> NativeId;

    /// Check whether an identifier is string-kind
    fn identifier_is_string(&self, id: NativeId) -> bool;

    /// Name of a string identifier
    fn utf8_from_identifier(&self, id: NativeId) -> Option<String>;

    /// Value of an integer identifier
    fn int_from_identifier(&self, id: NativeId) -> i32;

    /// Raise a script exception in the host
    fn set_exception(&self, message: &str);
}

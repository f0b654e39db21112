//! Owning wrappers around host values
//!
//! A [`NativeObject`] holds one host reference: cloning retains, dropping
//! releases. A [`NativeVariant`] owns its string buffer outright, so it can
//! outlive whatever buffer the host handed over.

use std::fmt;
use std::sync::Arc;

use super::{HostAdapter, ObjectHandle, RawVariant};
use crate::value::VariantKind;

/// Counted reference to a host object
pub struct NativeObject {
    handle: ObjectHandle,
    host: Arc<dyn HostAdapter>,
}

impl NativeObject {
    /// Take ownership of a reference the host already handed out
    pub fn adopt(host: &Arc<dyn HostAdapter>, handle: ObjectHandle) -> Self {
        NativeObject {
            handle,
            host: Arc::clone(host),
        }
    }

    /// Add a reference to a borrowed handle and own it
    pub fn retain(host: &Arc<dyn HostAdapter>, handle: ObjectHandle) -> Self {
        host.retain(handle);
        Self::adopt(host, handle)
    }

    /// The underlying handle (not retained)
    #[inline]
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// The host that owns this object
    #[inline]
    pub fn host(&self) -> &Arc<dyn HostAdapter> {
        &self.host
    }

    /// Give the reference back to the caller without releasing it
    pub fn into_handle(self) -> ObjectHandle {
        // Balanced by the release in Drop
        self.host.retain(self.handle);
        self.handle
    }
}

impl Clone for NativeObject {
    fn clone(&self) -> Self {
        Self::retain(&self.host, self.handle)
    }
}

impl Drop for NativeObject {
    fn drop(&mut self) {
        self.host.release(self.handle);
    }
}

impl PartialEq for NativeObject {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && Arc::ptr_eq(&self.host, &other.host)
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeObject").field(&self.handle.0).finish()
    }
}

/// A host value with owned payload
#[derive(Clone, Debug, Default, PartialEq)]
pub enum NativeVariant {
    #[default]
    Void,
    Null,
    Boolean(bool),
    Int32(i32),
    Double(f64),
    String(Box<str>),
    Object(NativeObject),
}

impl NativeVariant {
    /// Take ownership of a value returned by the host
    pub fn adopt(host: &Arc<dyn HostAdapter>, raw: RawVariant) -> Self {
        match raw {
            RawVariant::Void => NativeVariant::Void,
            RawVariant::Null => NativeVariant::Null,
            RawVariant::Boolean(b) => NativeVariant::Boolean(b),
            RawVariant::Int32(i) => NativeVariant::Int32(i),
            RawVariant::Double(d) => NativeVariant::Double(d),
            RawVariant::String(s) => NativeVariant::String(s.into_boxed_str()),
            RawVariant::Object(handle) => NativeVariant::Object(NativeObject::adopt(host, handle)),
        }
    }

    /// Copy a value the host only lent us
    pub fn copy_from(host: &Arc<dyn HostAdapter>, raw: &RawVariant) -> Self {
        match raw {
            RawVariant::Object(handle) => NativeVariant::Object(NativeObject::retain(host, *handle)),
            other => Self::adopt(host, other.clone()),
        }
    }

    /// Get the kind of this value
    pub const fn kind(&self) -> VariantKind {
        match self {
            NativeVariant::Void => VariantKind::Void,
            NativeVariant::Null => VariantKind::Null,
            NativeVariant::Boolean(_) => VariantKind::Boolean,
            NativeVariant::Int32(_) => VariantKind::Int32,
            NativeVariant::Double(_) => VariantKind::Double,
            NativeVariant::String(_) => VariantKind::String,
            NativeVariant::Object(_) => VariantKind::Object,
        }
    }

    /// Object payload, if this is an object
    pub fn as_object(&self) -> Option<&NativeObject> {
        match self {
            NativeVariant::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Borrowed host view; the host must not keep object handles without retaining
    pub fn as_raw(&self) -> RawVariant {
        match self {
            NativeVariant::Void => RawVariant::Void,
            NativeVariant::Null => RawVariant::Null,
            NativeVariant::Boolean(b) => RawVariant::Boolean(*b),
            NativeVariant::Int32(i) => RawVariant::Int32(*i),
            NativeVariant::Double(d) => RawVariant::Double(*d),
            NativeVariant::String(s) => RawVariant::String(s.to_string()),
            NativeVariant::Object(obj) => RawVariant::Object(obj.handle()),
        }
    }

    /// Hand the value to the host, transferring any object reference
    pub fn into_raw(self) -> RawVariant {
        match self {
            NativeVariant::Object(obj) => RawVariant::Object(obj.into_handle()),
            other => other.as_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    #[test]
    fn test_clone_retains_and_drop_releases() {
        let memory = MemoryHost::new();
        let host: Arc<dyn HostAdapter> = memory.clone();
        let handle = memory.create_object();
        assert_eq!(memory.ref_count(handle), 1);

        let obj = NativeObject::adopt(&host, handle);
        let copy = obj.clone();
        assert_eq!(memory.ref_count(handle), 2);

        drop(copy);
        assert_eq!(memory.ref_count(handle), 1);
        drop(obj);
        assert_eq!(memory.ref_count(handle), 0);
    }

    #[test]
    fn test_into_raw_keeps_reference() {
        let memory = MemoryHost::new();
        let host: Arc<dyn HostAdapter> = memory.clone();
        let handle = memory.create_object();

        let value = NativeVariant::adopt(&host, RawVariant::Object(handle));
        let raw = value.into_raw();
        assert_eq!(raw, RawVariant::Object(handle));
        assert_eq!(memory.ref_count(handle), 1);

        memory.release(handle);
        assert_eq!(memory.ref_count(handle), 0);
    }

    #[test]
    fn test_copy_from_borrowed() {
        let memory = MemoryHost::new();
        let host: Arc<dyn HostAdapter> = memory.clone();
        let handle = memory.create_object();

        let lent = RawVariant::Object(handle);
        let owned = NativeVariant::copy_from(&host, &lent);
        assert_eq!(memory.ref_count(handle), 2);
        drop(owned);
        assert_eq!(memory.ref_count(handle), 1);
    }

    #[test]
    fn test_string_is_owned() {
        let memory = MemoryHost::new();
        let host: Arc<dyn HostAdapter> = memory;
        let mut source = RawVariant::String("abc".to_string());
        let owned = NativeVariant::copy_from(&host, &source);

        if let RawVariant::String(s) = &mut source {
            s.clear();
        }
        assert_eq!(owned.as_raw(), RawVariant::String("abc".to_string()));
    }
}

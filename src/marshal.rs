//! Marshalling between host form and engine form
//!
//! Conversions are value-preserving: strings are byte-identical, numbers are
//! bit-identical, and host objects keep their identity when they make a round
//! trip. No validation happens here, only structural classification.
//!
//! Host containers become [`PropertyBag`]s. A container is an ARRAY only if
//! every enumerated key is an integer and it also answers an integer `length`
//! that was *not* enumerated (arrays keep `length` non-enumerable). Anything
//! else is PLAIN.
//!
//! Host objects may refer to themselves. A container that is already being
//! read further up the current path is not expanded again: it becomes an
//! empty bag backed by that object, so it still converts back to the same
//! host object.
//!
//! Engine values go back to the host through a capability query first: a
//! value still backed by a host object is handed over as that object.
//! Otherwise ARRAY bags are rebuilt with `Array()` + `push`, and PLAIN bags
//! with `Object()` + one property write per entry.

use std::sync::Arc;

use crate::host::{HostAdapter, NativeId, NativeObject, NativeVariant, ObjectHandle, RawVariant};
use crate::runtime::{Identifier, ObjectKind, PropertyBag};
use crate::value::Variant;

/// Nesting limit when reading host containers
pub const MAX_MARSHAL_DEPTH: usize = 64;

/// Capability query: is a host representation already available?
pub trait NativeBacked {
    /// The host object this value stands for, if it still matches it
    fn native_object(&self) -> Option<&NativeObject>;
}

/// Converts values and identifiers for one host
#[derive(Clone)]
pub struct Marshaller {
    host: Arc<dyn HostAdapter>,
}

impl Marshaller {
    /// Create a marshaller for a host
    pub fn new(host: Arc<dyn HostAdapter>) -> Self {
        Marshaller { host }
    }

    /// The host this marshaller talks to
    #[inline]
    pub fn host(&self) -> &Arc<dyn HostAdapter> {
        &self.host
    }

    // Identifiers

    /// Host identifier to engine identifier
    pub fn identifier_from_native(&self, id: NativeId) -> Identifier {
        if self.host.identifier_is_string(id) {
            let name = self.host.utf8_from_identifier(id).unwrap_or_default();
            Identifier::String(name)
        } else {
            Identifier::Int32(self.host.int_from_identifier(id))
        }
    }

    /// Engine identifier to host identifier
    pub fn identifier_to_native(&self, id: &Identifier) -> NativeId {
        match id {
            Identifier::String(name) => self.host.string_identifier(name),
            Identifier::Int32(i) => self.host.int_identifier(*i),
        }
    }

    // Host form -> engine form

    /// Convert a host value to an engine value
    pub fn variant_from_native(&self, value: &NativeVariant) -> Variant {
        self.from_native_at(value, &mut Vec::new())
    }

    /// Convert a value the host lent us
    pub fn variant_from_raw(&self, raw: &RawVariant) -> Variant {
        self.variant_from_native(&NativeVariant::copy_from(&self.host, raw))
    }

    /// `path` holds the containers being read, outermost first
    fn from_native_at(&self, value: &NativeVariant, path: &mut Vec<ObjectHandle>) -> Variant {
        let converted = match value {
            NativeVariant::Void => Variant::Void,
            NativeVariant::Null => Variant::Null,
            NativeVariant::Boolean(b) => Variant::Boolean(*b),
            NativeVariant::Int32(i) => Variant::Int32(*i),
            NativeVariant::Double(d) => Variant::Double(*d),
            NativeVariant::String(s) => Variant::String(s.to_string()),
            NativeVariant::Object(obj) => {
                if path.len() >= MAX_MARSHAL_DEPTH {
                    log::warn!(
                        "host object {:?} nested deeper than {} levels, read as void",
                        obj.handle(),
                        MAX_MARSHAL_DEPTH
                    );
                    return Variant::Void;
                }
                Variant::Object(self.bag_from_native_at(obj, path))
            }
        };
        #[cfg(feature = "trace-values")]
        log::trace!("from host: {}", converted);
        converted
    }

    /// Read a host container into a property bag
    pub fn bag_from_native(&self, obj: &NativeObject) -> PropertyBag {
        self.bag_from_native_at(obj, &mut Vec::new())
    }

    fn bag_from_native_at(&self, obj: &NativeObject, path: &mut Vec<ObjectHandle>) -> PropertyBag {
        let handle = obj.handle();
        if path.contains(&handle) {
            log::debug!("host object {:?} refers back to itself, not expanded", handle);
            return PropertyBag::new().backed_by(obj.clone());
        }
        let Some(ids) = self.host.enumerate(handle) else {
            log::debug!("host object {:?} is not enumerable", handle);
            return PropertyBag::new().backed_by(obj.clone());
        };

        let mut all_int_ids = true;
        let mut entries = Vec::with_capacity(ids.len());
        path.push(handle);
        for id in ids {
            let Some(value) = self.get_native(handle, id) else {
                continue;
            };
            if self.host.identifier_is_string(id) {
                all_int_ids = false;
            }
            entries.push((self.identifier_from_native(id), self.from_native_at(&value, path)));
        }
        path.pop();

        let kind = if all_int_ids && self.has_hidden_int_length(handle) {
            ObjectKind::Array
        } else {
            ObjectKind::Plain
        };

        let mut bag = PropertyBag::with_kind(kind);
        for (id, value) in entries {
            bag.set_property(id, value);
        }
        bag.backed_by(obj.clone())
    }

    /// Arrays don't enumerate `length`, so a readable Int32 `length` that
    /// was missing from the enumeration marks an array
    fn has_hidden_int_length(&self, handle: ObjectHandle) -> bool {
        let length = self.host.string_identifier("length");
        matches!(self.get_native(handle, length), Some(NativeVariant::Int32(_)))
    }

    fn get_native(&self, handle: ObjectHandle, id: NativeId) -> Option<NativeVariant> {
        self.host
            .get_property(handle, id)
            .map(|raw| NativeVariant::adopt(&self.host, raw))
    }

    // Engine form -> host form

    /// Convert an engine value to a host value
    ///
    /// New host objects created here are owned by the returned value.
    pub fn variant_to_native(&self, value: &Variant) -> NativeVariant {
        #[cfg(feature = "trace-values")]
        log::trace!("to host: {}", value);
        match value {
            Variant::Void => NativeVariant::Void,
            Variant::Null => NativeVariant::Null,
            Variant::Boolean(b) => NativeVariant::Boolean(*b),
            Variant::Int32(i) => NativeVariant::Int32(*i),
            Variant::Double(d) => NativeVariant::Double(*d),
            Variant::String(s) => NativeVariant::String(s.as_str().into()),
            Variant::Object(bag) => match self.bag_to_native(bag) {
                Some(obj) => NativeVariant::Object(obj),
                None => NativeVariant::Null,
            },
        }
    }

    /// Build (or reuse) the host object for a bag
    pub fn bag_to_native(&self, bag: &PropertyBag) -> Option<NativeObject> {
        if let Some(native) = bag.native_object() {
            return Some(native.clone());
        }

        let global = self.global_object()?;
        let result = match bag.kind() {
            ObjectKind::Array => {
                let array = self.construct(&global, "Array")?;
                let push = self.host.string_identifier("push");
                for element in bag.elements() {
                    let element = self.variant_to_native(&element);
                    if let Some(raw) = self.host.invoke(array.handle(), push, &[element.as_raw()]) {
                        drop(NativeVariant::adopt(&self.host, raw));
                    }
                }
                array
            }
            ObjectKind::Plain => {
                let object = self.construct(&global, "Object")?;
                for (id, value) in bag.iter() {
                    let value = self.variant_to_native(value);
                    let id = self.identifier_to_native(id);
                    if !self.host.set_property(object.handle(), id, &value.as_raw()) {
                        log::debug!("host refused property write on {:?}", object.handle());
                    }
                }
                object
            }
        };
        Some(result)
    }

    /// The host's global object, owned
    pub fn global_object(&self) -> Option<NativeObject> {
        let global = self.host.global_object();
        if global.is_none() {
            log::warn!("host has no global object");
        }
        global.map(|handle| NativeObject::adopt(&self.host, handle))
    }

    fn construct(&self, global: &NativeObject, constructor: &str) -> Option<NativeObject> {
        let id = self.host.string_identifier(constructor);
        let created = self
            .host
            .invoke(global.handle(), id, &[])
            .map(|raw| NativeVariant::adopt(&self.host, raw));
        match created {
            Some(NativeVariant::Object(obj)) => Some(obj),
            Some(other) => {
                log::warn!("{}() returned {} instead of an object", constructor, other.kind().name());
                None
            }
            None => {
                log::warn!("host could not construct {}", constructor);
                None
            }
        }
    }
}

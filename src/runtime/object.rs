//! Script object: the registry the host sees
//!
//! A `ScriptObject` owns the exposed properties and the method table. It is
//! confined to the host's designated thread, which the `&mut self` setters
//! enforce through ownership; engine worker threads reach the host through
//! the shared [`CallBridge`] instead.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{CallResult, Callback, Identifier, PropertyBag};
use crate::bridge::CallBridge;
use crate::value::Variant;

/// Host-visible object exposing properties and methods
pub struct ScriptObject {
    properties: PropertyBag,
    methods: BTreeMap<Identifier, Box<dyn Callback>>,
    bridge: Arc<CallBridge>,
}

impl ScriptObject {
    /// Create an empty registry calling out through `bridge`
    pub fn new(bridge: Arc<CallBridge>) -> Self {
        ScriptObject {
            properties: PropertyBag::new(),
            methods: BTreeMap::new(),
            bridge,
        }
    }

    /// The outbound call bridge
    #[inline]
    pub fn bridge(&self) -> &Arc<CallBridge> {
        &self.bridge
    }

    /// Check if shutdown has begun
    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.bridge.is_shutting_down()
    }

    /// The exposed properties
    #[inline]
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    // Properties

    pub fn has_property(&self, id: &Identifier) -> bool {
        self.properties.has_property(id)
    }

    /// Copy of a property value
    pub fn get_property(&self, id: &Identifier) -> Option<Variant> {
        self.properties.get_property(id)
    }

    /// Insert or overwrite a property
    ///
    /// Returns false, leaving the registry unchanged, after shutdown.
    pub fn set_property(&mut self, id: impl Into<Identifier>, value: impl Into<Variant>) -> bool {
        let id = id.into();
        if self.is_shutting_down() {
            log::debug!("property {} not set, shutting down", id);
            return false;
        }
        self.properties.set_property(id, value);
        true
    }

    /// Remove a property, reporting whether it existed
    pub fn remove_property(&mut self, id: &Identifier) -> bool {
        if self.is_shutting_down() {
            return false;
        }
        self.properties.remove_property(id)
    }

    // Methods

    pub fn has_method(&self, id: &Identifier) -> bool {
        self.methods.contains_key(id)
    }

    /// Bind `callback` to `id`, replacing any previous binding
    ///
    /// Returns false, leaving the registry unchanged, after shutdown.
    pub fn set_method(&mut self, id: impl Into<Identifier>, callback: impl Callback + 'static) -> bool {
        let id = id.into();
        if self.is_shutting_down() {
            log::debug!("method {} not registered, shutting down", id);
            return false;
        }
        self.methods.insert(id, Box::new(callback));
        true
    }

    /// Remove a method, reporting whether it existed
    pub fn remove_method(&mut self, id: &Identifier) -> bool {
        if self.is_shutting_down() {
            return false;
        }
        self.methods.remove(id).is_some()
    }

    /// Property identifiers followed by method identifiers, each in key order
    pub fn enumerate(&self) -> Vec<Identifier> {
        let mut ids = self.properties.enumerate();
        ids.extend(self.methods.keys().cloned());
        ids
    }

    /// Run the method bound to `id`
    ///
    /// Returns None if no method is bound, without invoking anything.
    pub fn invoke(&self, id: &Identifier, args: &[Variant]) -> Option<CallResult> {
        let callback = self.methods.get(id)?;
        log::trace!("invoking {} with {} argument(s)", id, args.len());
        Some(callback.call(self, id, args))
    }

    // Host direction

    /// Call a host function by name; see [`CallBridge::call_external`]
    pub fn call_external(&self, id: &Identifier, args: &[Variant]) -> Option<Variant> {
        self.bridge.call_external(id, args)
    }

    /// Raise a script exception on the host, if exception marshalling is on
    pub fn set_exception(&self, message: &str) {
        if self.bridge.marshal_exceptions() {
            self.bridge.host().set_exception(message);
        } else {
            log::debug!("exception not marshalled: {}", message);
        }
    }

    /// Begin shutdown; see [`CallBridge::destroy`]
    pub fn destroy(&self) {
        self.bridge.destroy();
    }
}

impl fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptObject")
            .field("properties", &self.properties)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

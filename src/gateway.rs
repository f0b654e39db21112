//! Host-facing session surface
//!
//! The host talks to the engine through a `ScriptGateway`, in host form:
//! native identifiers and raw values. The gateway converts at the edge and
//! forwards to the [`ScriptObject`] registry. Values it returns carry one
//! reference the host now owns; values it receives are only borrowed.
//!
//! A gateway is created on the designated thread. Construction publishes
//! `$version`, the legacy verbs and the host element's `id`/`name`, as
//! configured.

use std::sync::Arc;

use crate::bridge::CallBridge;
use crate::config::BridgeConfig;
use crate::host::{HostAdapter, NativeId, NativeObject, NativeVariant, RawVariant};
use crate::marshal::Marshaller;
use crate::runtime::{register_legacy_verbs, Identifier, ScriptObject};
use crate::value::Variant;

/// One engine session as seen by the host
pub struct ScriptGateway {
    object: ScriptObject,
    marshaller: Marshaller,
}

impl ScriptGateway {
    /// Create a session and publish its initial properties and methods
    pub fn new(host: Arc<dyn HostAdapter>, config: BridgeConfig) -> Self {
        let bridge = Arc::new(CallBridge::new(Arc::clone(&host), config.marshal_exceptions));
        let marshaller = bridge.marshaller().clone();
        let mut object = ScriptObject::new(bridge);

        object.set_property("$version", config.version.as_str());
        if config.legacy_methods {
            register_legacy_verbs(&mut object);
        }

        let mut gateway = ScriptGateway { object, marshaller };
        if config.expose_element_ids {
            gateway.copy_element_ids();
        }
        log::debug!("script gateway ready, {} identifiers exposed", gateway.object.enumerate().len());
        gateway
    }

    /// Copy `id` and `name` from the host's element object
    fn copy_element_ids(&mut self) {
        let host = self.marshaller.host();
        let Some(element) = host.plugin_element().map(|handle| NativeObject::adopt(host, handle)) else {
            log::debug!("host has no element object");
            return;
        };
        for name in ["id", "name"] {
            let id = host.string_identifier(name);
            let Some(raw) = host.get_property(element.handle(), id) else {
                continue;
            };
            let value = self.marshaller.variant_from_native(&NativeVariant::adopt(host, raw));
            self.object.set_property(name, value);
        }
    }

    /// Shared handle for engine threads making outbound calls
    pub fn bridge(&self) -> Arc<CallBridge> {
        Arc::clone(self.object.bridge())
    }

    #[inline]
    pub fn object(&self) -> &ScriptObject {
        &self.object
    }

    #[inline]
    pub fn object_mut(&mut self) -> &mut ScriptObject {
        &mut self.object
    }

    fn identifier(&self, id: NativeId) -> Identifier {
        self.marshaller.identifier_from_native(id)
    }

    fn to_raw(&self, value: &Variant) -> RawVariant {
        self.marshaller.variant_to_native(value).into_raw()
    }

    // Methods

    pub fn has_method(&self, id: NativeId) -> bool {
        self.object.has_method(&self.identifier(id))
    }

    /// Invoke a registered method
    ///
    /// Returns the handled flag and the result, if the callback produced
    /// one. An unknown identifier reports `(false, None)`.
    pub fn invoke(&self, id: NativeId, args: &[RawVariant]) -> (bool, Option<RawVariant>) {
        let id = self.identifier(id);
        let args: Vec<Variant> = args.iter().map(|raw| self.marshaller.variant_from_raw(raw)).collect();

        let Some(result) = self.object.invoke(&id, &args) else {
            log::debug!("host invoked unknown method {}", id);
            return (false, None);
        };
        let value = result.value.as_ref().map(|value| self.to_raw(value));
        (result.handled, value)
    }

    /// Calling the object itself is not supported
    pub fn invoke_default(&self, args: &[RawVariant]) -> (bool, Option<RawVariant>) {
        log::warn!("default invocation is not implemented ({} argument(s))", args.len());
        (false, None)
    }

    // Properties

    pub fn has_property(&self, id: NativeId) -> bool {
        self.object.has_property(&self.identifier(id))
    }

    /// Read a property; the host owns the returned value
    pub fn get_property(&self, id: NativeId) -> Option<RawVariant> {
        let value = self.object.get_property(&self.identifier(id))?;
        Some(self.to_raw(&value))
    }

    /// Write a property from a value the host lends
    pub fn set_property(&mut self, id: NativeId, value: &RawVariant) -> bool {
        let id = self.identifier(id);
        let value = self.marshaller.variant_from_raw(value);
        self.object.set_property(id, value)
    }

    pub fn remove_property(&mut self, id: NativeId) -> bool {
        let id = self.identifier(id);
        self.object.remove_property(&id)
    }

    /// Every exposed identifier, properties first
    pub fn enumerate(&self) -> Vec<NativeId> {
        self.object
            .enumerate()
            .iter()
            .map(|id| self.marshaller.identifier_to_native(id))
            .collect()
    }

    /// Begin shutdown; must precede teardown
    pub fn destroy(&self) {
        self.object.destroy();
    }
}

impl Drop for ScriptGateway {
    fn drop(&mut self) {
        self.destroy();
    }
}

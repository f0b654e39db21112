//! hostbridge - the boundary between an embedded script engine and its host
//!
//! A host (typically a browser) embeds the engine and only guarantees correct
//! behavior when its API is entered from one designated thread. This crate
//! carries values and calls across that boundary:
//!
//! - Canonical marshalling of identifiers and tagged values
//! - A registry of host-exposed properties and methods
//! - Single-flight, cross-thread synchronous calls into the host, with a
//!   fallback resolution chain and cooperative shutdown
//!
//! # Example
//! ```ignore
//! use hostbridge::{BridgeConfig, MemoryHost, ScriptGateway, Variant};
//!
//! let host = MemoryHost::new();
//! let gateway = ScriptGateway::new(host.clone(), BridgeConfig::default());
//! let bridge = gateway.bridge();
//!
//! // From any engine worker thread
//! let result = bridge.call_external(&"alert".into(), &[Variant::from("hi")]);
//! ```

// Core modules
pub mod value;
pub mod config;
pub mod error;

// Host boundary and marshalling
pub mod host;
pub mod marshal;

// Registry: identifiers, property bags, callbacks, script object
pub mod runtime;

// Outbound calls
pub mod bridge;

// Host-facing session surface
pub mod gateway;

// Re-export main types
pub use bridge::CallBridge;
pub use config::{BridgeConfig, ConfigError};
pub use error::{ErrorKind, ResolveError};
pub use gateway::ScriptGateway;
pub use host::{HostAdapter, MemoryHost, NativeId, NativeObject, NativeVariant, ObjectHandle, RawVariant};
pub use runtime::{CallResult, Callback, Identifier, ObjectKind, PropertyBag, ScriptObject};
pub use value::{Variant, VariantKind};

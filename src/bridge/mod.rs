//! Cross-thread synchronous calls into the host
//!
//! The engine may call out from any worker thread, but the host may only be
//! entered on its designated thread, and at most one outbound call may be
//! in flight. A call moves through:
//!
//! ```text
//! REQUESTED --> DISPATCHED --> COMPLETED
//!                         \--> CANCELLED
//! ```
//!
//! REQUESTED: the caller takes the call mutex; if shutdown has begun the call
//! fails right away. DISPATCHED: a completion latch is registered in the
//! pending set and the mutex is released *before* the task is handed to the
//! host, so a host function that calls back into the engine (and out again)
//! cannot deadlock. The task marshals the arguments and runs the resolution
//! chain on the designated thread, in-line if the caller is already there.
//! COMPLETED: the waiter wakes, takes the mutex again, unregisters its latch
//! and reads the result. CANCELLED: [`CallBridge::destroy`] flags shutdown and
//! signals every pending latch once; their callers return no result.

mod completion;
mod resolve;

pub use completion::Completion;
pub use resolve::resolve;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::error::{ErrorKind, ResolveError};
use crate::host::{HostAdapter, NativeVariant, RawVariant};
use crate::marshal::Marshaller;
use crate::runtime::Identifier;
use crate::value::Variant;

/// State guarded by the call mutex
#[derive(Default)]
struct CallState {
    /// Latches of calls that are dispatched but not yet collected
    pending: HashMap<u64, Arc<Completion>>,
}

/// Serializes and dispatches engine-initiated calls into the host
pub struct CallBridge {
    marshaller: Marshaller,
    designated: ThreadId,
    /// The call mutex
    calls: Mutex<CallState>,
    shutting_down: AtomicBool,
    next_call: AtomicU64,
    marshal_exceptions: bool,
}

impl CallBridge {
    /// Create a bridge for a host
    pub fn new(host: Arc<dyn HostAdapter>, marshal_exceptions: bool) -> Self {
        let designated = host.designated_thread();
        log::debug!("call bridge created, designated thread {:?}", designated);
        CallBridge {
            marshaller: Marshaller::new(host),
            designated,
            calls: Mutex::new(CallState::default()),
            shutting_down: AtomicBool::new(false),
            next_call: AtomicU64::new(1),
            marshal_exceptions,
        }
    }

    /// The host this bridge calls into
    #[inline]
    pub fn host(&self) -> &Arc<dyn HostAdapter> {
        self.marshaller.host()
    }

    /// Marshaller bound to the same host
    #[inline]
    pub fn marshaller(&self) -> &Marshaller {
        &self.marshaller
    }

    /// Check if the caller is on the host's designated thread
    #[inline]
    pub fn on_designated_thread(&self) -> bool {
        thread::current().id() == self.designated
    }

    /// Check if shutdown has begun
    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Whether failed calls are reported to the host as exceptions
    #[inline]
    pub fn marshal_exceptions(&self) -> bool {
        self.marshal_exceptions
    }

    /// Number of calls dispatched but not yet collected
    pub fn pending_calls(&self) -> usize {
        self.calls.lock().pending.len()
    }

    /// Call a host function by name and wait for its result
    ///
    /// Returns None if every resolution step failed or the call was
    /// cancelled by shutdown; the two are indistinguishable by design of the
    /// boundary.
    pub fn call_external(&self, id: &Identifier, args: &[Variant]) -> Option<Variant> {
        // REQUESTED
        let (call_id, completion) = {
            let mut calls = self.calls.lock();
            if self.is_shutting_down() {
                log::debug!("call to {} refused, bridge is shutting down", id);
                return None;
            }
            let call_id = self.next_call.fetch_add(1, Ordering::Relaxed);
            let completion = Arc::new(Completion::new());
            calls.pending.insert(call_id, Arc::clone(&completion));
            (call_id, completion)
        };

        // DISPATCHED, with the mutex released
        let call = ExternalCall {
            call_id,
            id: id.clone(),
            args: args.to_vec(),
            marshaller: self.marshaller.clone(),
            completion: Arc::clone(&completion),
            marshal_exceptions: self.marshal_exceptions,
        };
        if self.on_designated_thread() {
            log::trace!("call #{} to {} runs in-line", call_id, id);
            call.run();
        } else {
            log::trace!("call #{} to {} dispatched to the host thread", call_id, id);
            self.host().dispatch(Box::new(move || call.run()));
        }

        completion.wait();

        // COMPLETED or CANCELLED
        let mut calls = self.calls.lock();
        calls.pending.remove(&call_id);
        let result = completion.take();
        drop(calls);
        result
    }

    /// Cancel every pending call and refuse new ones
    ///
    /// Only the first call has any effect. Calls already executing on the
    /// host thread run to completion; their results are discarded.
    pub fn destroy(&self) {
        let mut calls = self.calls.lock();
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending: Vec<_> = calls.pending.drain().collect();
        for (_, completion) in &pending {
            completion.cancel();
        }
        log::debug!("bridge shut down, {} pending call(s) cancelled", pending.len());
    }
}

/// One outbound call, executed on the designated thread
struct ExternalCall {
    call_id: u64,
    id: Identifier,
    args: Vec<Variant>,
    marshaller: Marshaller,
    completion: Arc<Completion>,
    marshal_exceptions: bool,
}

impl ExternalCall {
    fn run(self) {
        let outcome = if self.completion.is_cancelled() {
            Err(ResolveError::Cancelled)
        } else {
            self.execute()
        };

        let result = match outcome {
            Ok(value) => Some(value),
            Err(err) if err.kind() == ErrorKind::ShutdownCancellation => {
                log::debug!("call #{} to {} skipped: {}", self.call_id, self.id, err);
                return;
            }
            Err(err) => {
                log::debug!("call #{} to {} failed: {}", self.call_id, self.id, err);
                if self.marshal_exceptions {
                    let host = self.marshaller.host();
                    host.set_exception(&format!("call to {} failed: {}", self.id, err));
                }
                None
            }
        };

        if !self.completion.complete(result) {
            log::debug!("call #{} to {} was cancelled, result discarded", self.call_id, self.id);
        }
    }

    /// Marshal the arguments, resolve, and convert the result back
    fn execute(&self) -> Result<Variant, ResolveError> {
        let native_args: Vec<NativeVariant> = self
            .args
            .iter()
            .map(|arg| self.marshaller.variant_to_native(arg))
            .collect();
        let raw_args: Vec<RawVariant> = native_args.iter().map(NativeVariant::as_raw).collect();
        let native_id = self.marshaller.identifier_to_native(&self.id);

        let value = resolve(self.marshaller.host(), native_id, &self.id.to_expression(), &raw_args)?;
        Ok(self.marshaller.variant_from_native(&value))
    }
}

impl Drop for ExternalCall {
    fn drop(&mut self) {
        // A task the host dropped or that panicked must still wake its caller
        self.completion.complete(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    #[test]
    fn test_call_from_worker() {
        let memory = MemoryHost::new();
        let f = memory.create_function(|args| match args {
            [RawVariant::Int32(a), RawVariant::Int32(b)] => Some(RawVariant::Int32(a + b)),
            _ => None,
        });
        memory.define_global("add", RawVariant::Object(f));

        let bridge = CallBridge::new(memory.clone(), false);
        let result = bridge.call_external(&"add".into(), &[Variant::from(2), Variant::from(3)]);
        assert_eq!(result, Some(Variant::from(5)));
        assert_eq!(bridge.pending_calls(), 0);
    }

    #[test]
    fn test_call_in_line_on_host_thread() {
        let memory = MemoryHost::new();
        let f = memory.create_function(|_| Some(RawVariant::Boolean(true)));
        memory.define_global("ok", RawVariant::Object(f));

        let bridge = Arc::new(CallBridge::new(memory.clone(), false));
        let on_host = Arc::clone(&bridge);
        let result = memory
            .run_on_host(move || {
                assert!(on_host.on_designated_thread());
                on_host.call_external(&"ok".into(), &[])
            })
            .unwrap();
        assert_eq!(result, Some(Variant::from(true)));
    }

    #[test]
    fn test_call_after_destroy_fails_fast() {
        let memory = MemoryHost::new();
        let f = memory.create_function(|_| Some(RawVariant::Null));
        memory.define_global("f", RawVariant::Object(f));

        let bridge = CallBridge::new(memory.clone(), false);
        bridge.destroy();
        bridge.destroy();
        assert!(bridge.is_shutting_down());
        assert_eq!(bridge.call_external(&"f".into(), &[]), None);
        assert_eq!(bridge.pending_calls(), 0);
    }

    #[test]
    fn test_failure_marshals_exception() {
        let memory = MemoryHost::new();
        let bridge = CallBridge::new(memory.clone(), true);

        assert_eq!(bridge.call_external(&"missing".into(), &[]), None);
        let exceptions = memory.exceptions();
        assert_eq!(exceptions.len(), 1);
        assert!(exceptions[0].contains("missing"));
    }

    #[test]
    fn test_failure_without_exception_marshalling() {
        let memory = MemoryHost::new();
        let bridge = CallBridge::new(memory.clone(), false);

        assert_eq!(bridge.call_external(&"missing".into(), &[]), None);
        assert!(memory.exceptions().is_empty());
    }

    #[test]
    fn test_cancelled_call_skips_host_and_exception() {
        let memory = MemoryHost::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let f = memory.create_function(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(RawVariant::Null)
        });
        memory.define_global("f", RawVariant::Object(f));

        let bridge = CallBridge::new(memory.clone(), true);
        let completion = Arc::new(Completion::new());
        let call = ExternalCall {
            call_id: 1,
            id: "f".into(),
            args: vec![],
            marshaller: bridge.marshaller().clone(),
            completion: Arc::clone(&completion),
            marshal_exceptions: true,
        };
        completion.cancel();
        memory.run_on_host(move || call.run()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(memory.exceptions().is_empty());
        assert_eq!(completion.take(), None);
    }

    #[test]
    fn test_arguments_released_after_call() {
        let memory = MemoryHost::new();
        let f = memory.create_function(|args| Some(RawVariant::Int32(args.len() as i32)));
        memory.define_global("f", RawVariant::Object(f));
        memory.release(f);
        let live_before = memory.live_objects();

        let mut bag = crate::runtime::PropertyBag::new();
        bag.set_property("k", "v");
        let bridge = CallBridge::new(memory.clone(), false);
        let result = bridge.call_external(&"f".into(), &[Variant::from(bag)]);

        assert_eq!(result, Some(Variant::from(1)));
        assert_eq!(memory.live_objects(), live_before);
    }
}

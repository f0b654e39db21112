//! In-process host
//!
//! `MemoryHost` implements [`HostAdapter`] over a small object heap. It has
//! everything the bridge relies on: reference counts, interned identifiers,
//! arrays whose `length` is readable but not enumerable, `Array()` and
//! `Object()` on the global object, callable objects, and a table of
//! expressions that `evaluate` can resolve. Its designated thread drains a
//! task queue, so dispatch behaves like a real host event loop.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::{Sender, bounded, unbounded};
use parking_lot::Mutex;

use super::{HostAdapter, HostTask, NativeId, ObjectHandle, RawVariant};

/// Function body of a callable host object
pub type HostFunction = Arc<dyn Fn(&[RawVariant]) -> Option<RawVariant> + Send + Sync>;

/// Tag bit for interned string identifiers; integers use the low 32 bits
const STRING_ID_BIT: u64 = 1 << 63;

/// Object payload
enum Slot {
    Plain,
    /// Dense elements; `length` is derived and never enumerated
    Array(Vec<RawVariant>),
    Function(HostFunction),
}

struct Entry {
    refs: usize,
    slot: Slot,
    props: BTreeMap<NativeId, RawVariant>,
}

/// Resolved target of an `invoke`, computed under the heap lock
enum Call {
    Push,
    Construct(bool),
    Function(HostFunction),
}

#[derive(Default)]
struct Heap {
    objects: HashMap<ObjectHandle, Entry>,
    next_handle: u64,
    strings: Vec<String>,
    string_ids: HashMap<String, NativeId>,
    expressions: HashMap<String, RawVariant>,
    releases: HashMap<ObjectHandle, usize>,
    exceptions: Vec<String>,
}

impl Heap {
    fn alloc(&mut self, slot: Slot) -> ObjectHandle {
        self.next_handle += 1;
        let handle = ObjectHandle(self.next_handle);
        self.objects.insert(
            handle,
            Entry {
                refs: 1,
                slot,
                props: BTreeMap::new(),
            },
        );
        handle
    }

    fn retain(&mut self, handle: ObjectHandle) {
        match self.objects.get_mut(&handle) {
            Some(entry) => entry.refs += 1,
            None => log::warn!("retain of dead host object {:?}", handle),
        }
    }

    fn retain_value(&mut self, value: &RawVariant) {
        if let RawVariant::Object(handle) = value {
            self.retain(*handle);
        }
    }

    fn release(&mut self, handle: ObjectHandle) {
        let mut worklist = vec![handle];
        while let Some(handle) = worklist.pop() {
            *self.releases.entry(handle).or_default() += 1;
            let Some(entry) = self.objects.get_mut(&handle) else {
                log::warn!("release of dead host object {:?}", handle);
                continue;
            };
            entry.refs -= 1;
            if entry.refs > 0 {
                continue;
            }
            if let Some(entry) = self.objects.remove(&handle) {
                let elements = match entry.slot {
                    Slot::Array(elements) => elements,
                    _ => Vec::new(),
                };
                worklist.extend(
                    entry
                        .props
                        .into_values()
                        .chain(elements)
                        .filter_map(|v| v.as_object()),
                );
            }
        }
    }

    fn intern(&mut self, name: &str) -> NativeId {
        if let Some(id) = self.string_ids.get(name) {
            return *id;
        }
        let id = NativeId(STRING_ID_BIT | self.strings.len() as u64);
        self.strings.push(name.to_owned());
        self.string_ids.insert(name.to_owned(), id);
        id
    }

    /// Identifier for a property name, folding integer names
    fn key(&mut self, name: &str) -> NativeId {
        match name.parse::<i32>() {
            Ok(i) => int_id(i),
            Err(_) => self.intern(name),
        }
    }

    fn name_of(&self, id: NativeId) -> Option<&str> {
        if id.0 & STRING_ID_BIT == 0 {
            return None;
        }
        self.strings
            .get((id.0 & !STRING_ID_BIT) as usize)
            .map(String::as_str)
    }

    /// Property lookup without retaining
    fn lookup(&self, target: ObjectHandle, id: NativeId) -> Option<RawVariant> {
        let entry = self.objects.get(&target)?;
        if let Slot::Array(elements) = &entry.slot {
            if let Some(index) = array_index(id) {
                return elements.get(index).cloned();
            }
            if self.name_of(id) == Some("length") {
                return Some(RawVariant::Int32(elements.len() as i32));
            }
        }
        entry.props.get(&id).cloned()
    }

    fn store(&mut self, target: ObjectHandle, id: NativeId, value: RawVariant) -> bool {
        if !self.objects.contains_key(&target) {
            return false;
        }
        self.retain_value(&value);
        let Some(entry) = self.objects.get_mut(&target) else {
            return false;
        };
        let old = match (&mut entry.slot, array_index(id)) {
            (Slot::Array(elements), Some(index)) => {
                if index >= elements.len() {
                    elements.resize(index + 1, RawVariant::Void);
                }
                Some(std::mem::replace(&mut elements[index], value))
            }
            _ => entry.props.insert(id, value),
        };
        if let Some(old) = old {
            self.release_value(&old);
        }
        true
    }

    fn release_value(&mut self, value: &RawVariant) {
        if let RawVariant::Object(handle) = value {
            self.release(*handle);
        }
    }

    fn function(&self, handle: ObjectHandle) -> Option<HostFunction> {
        match &self.objects.get(&handle)?.slot {
            Slot::Function(f) => Some(Arc::clone(f)),
            _ => None,
        }
    }
}

fn int_id(value: i32) -> NativeId {
    NativeId(value as u32 as u64)
}

fn array_index(id: NativeId) -> Option<usize> {
    if id.0 & STRING_ID_BIT != 0 {
        return None;
    }
    usize::try_from(id.0 as u32 as i32).ok()
}

/// Script-free host backed by an in-memory object heap
pub struct MemoryHost {
    heap: Mutex<Heap>,
    tasks: Sender<HostTask>,
    thread: ThreadId,
    global: ObjectHandle,
    element: Option<ObjectHandle>,
}

impl MemoryHost {
    /// Create a host and start its designated thread
    ///
    /// # Panics
    /// Panics if the designated thread cannot be spawned
    pub fn new() -> Arc<Self> {
        Self::try_new(None).expect("failed to spawn host thread")
    }

    /// Create a host whose element object carries `id` and `name`
    ///
    /// # Panics
    /// Panics if the designated thread cannot be spawned
    pub fn with_element(id: &str, name: &str) -> Arc<Self> {
        Self::try_new(Some((id, name))).expect("failed to spawn host thread")
    }

    /// Create a host, reporting thread spawn failures
    pub fn try_new(element: Option<(&str, &str)>) -> io::Result<Arc<Self>> {
        let (tx, rx) = unbounded::<HostTask>();
        let worker = thread::Builder::new()
            .name("host-main".to_string())
            .spawn(move || {
                for task in rx {
                    task();
                }
                log::debug!("host task queue closed");
            })?;

        let mut heap = Heap::default();
        let global = heap.alloc(Slot::Plain);
        let element = element.map(|(id, name)| {
            let handle = heap.alloc(Slot::Plain);
            let id_key = heap.intern("id");
            let name_key = heap.intern("name");
            heap.store(handle, id_key, RawVariant::String(id.to_owned()));
            heap.store(handle, name_key, RawVariant::String(name.to_owned()));
            handle
        });

        Ok(Arc::new(MemoryHost {
            heap: Mutex::new(heap),
            tasks: tx,
            thread: worker.thread().id(),
            global,
            element,
        }))
    }

    /// The global object (not retained)
    pub fn global(&self) -> ObjectHandle {
        self.global
    }

    /// Allocate a plain object; the caller owns one reference
    pub fn create_object(&self) -> ObjectHandle {
        self.heap.lock().alloc(Slot::Plain)
    }

    /// Allocate an array holding `elements`; the caller owns one reference
    pub fn create_array(&self, elements: Vec<RawVariant>) -> ObjectHandle {
        let mut heap = self.heap.lock();
        for element in &elements {
            heap.retain_value(element);
        }
        heap.alloc(Slot::Array(elements))
    }

    /// Allocate a callable object; the caller owns one reference
    pub fn create_function<F>(&self, f: F) -> ObjectHandle
    where
        F: Fn(&[RawVariant]) -> Option<RawVariant> + Send + Sync + 'static,
    {
        self.heap.lock().alloc(Slot::Function(Arc::new(f)))
    }

    /// Write a property by name (integer names address array slots)
    pub fn put(&self, target: ObjectHandle, name: &str, value: RawVariant) -> bool {
        let mut heap = self.heap.lock();
        let id = heap.key(name);
        heap.store(target, id, value)
    }

    /// Read a property by name without taking a reference
    pub fn peek(&self, target: ObjectHandle, name: &str) -> Option<RawVariant> {
        let mut heap = self.heap.lock();
        let id = heap.key(name);
        heap.lookup(target, id)
    }

    /// Define a property on the global object
    pub fn define_global(&self, name: &str, value: RawVariant) {
        self.put(self.global, name, value);
    }

    /// Make `evaluate` resolve `expression` (outer parentheses ignored) to `value`
    pub fn define_expression(&self, expression: &str, value: RawVariant) {
        let mut heap = self.heap.lock();
        heap.retain_value(&value);
        let old = heap.expressions.insert(strip_parens(expression).to_owned(), value);
        if let Some(old) = old {
            heap.release_value(&old);
        }
    }

    /// Elements of an array object
    pub fn array_elements(&self, handle: ObjectHandle) -> Option<Vec<RawVariant>> {
        match &self.heap.lock().objects.get(&handle)?.slot {
            Slot::Array(elements) => Some(elements.clone()),
            _ => None,
        }
    }

    /// Current reference count (0 once freed)
    pub fn ref_count(&self, handle: ObjectHandle) -> usize {
        self.heap.lock().objects.get(&handle).map_or(0, |e| e.refs)
    }

    /// Number of release calls an object has received
    pub fn release_count(&self, handle: ObjectHandle) -> usize {
        self.heap.lock().releases.get(&handle).copied().unwrap_or(0)
    }

    /// Number of objects still alive
    pub fn live_objects(&self) -> usize {
        self.heap.lock().objects.len()
    }

    /// Exceptions raised through `set_exception`
    pub fn exceptions(&self) -> Vec<String> {
        self.heap.lock().exceptions.clone()
    }

    /// Run `f` on the designated thread and wait for its result
    ///
    /// Returns None if the host thread is gone. A panic in `f` is resumed on
    /// the calling thread and leaves the host thread running.
    pub fn run_on_host<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.on_host_thread() {
            return Some(f());
        }
        let (tx, rx) = bounded(1);
        self.dispatch(Box::new(move || {
            let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(f)));
        }));
        match rx.recv().ok()? {
            Ok(result) => Some(result),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Run `f` with this host on the designated thread
    pub fn enter<R, F>(self: &Arc<Self>, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&Arc<MemoryHost>) -> R + Send + 'static,
    {
        let host = Arc::clone(self);
        self.run_on_host(move || f(&host))
    }

    #[inline]
    fn on_host_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// Host API entry check; only `dispatch`, `designated_thread`, `retain`
    /// and `release` may be called from other threads
    #[inline]
    fn confined(&self, entry: &str) {
        debug_assert!(
            self.on_host_thread(),
            "{} called off the designated thread (on {:?})",
            entry,
            thread::current().name()
        );
    }

    fn resolve_call(&self, target: ObjectHandle, id: NativeId) -> Option<Call> {
        let heap = self.heap.lock();
        let entry = heap.objects.get(&target)?;
        let name = heap.name_of(id);

        if matches!(entry.slot, Slot::Array(_)) && name == Some("push") {
            return Some(Call::Push);
        }
        if let Some(RawVariant::Object(callee)) = heap.lookup(target, id) {
            return heap.function(callee).map(Call::Function);
        }
        if target == self.global {
            return match name {
                Some("Array") => Some(Call::Construct(true)),
                Some("Object") => Some(Call::Construct(false)),
                _ => None,
            };
        }
        None
    }
}

fn strip_parens(script: &str) -> &str {
    let mut text = script.trim();
    while let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        text = inner.trim();
    }
    text
}

impl HostAdapter for MemoryHost {
    fn designated_thread(&self) -> ThreadId {
        self.thread
    }

    fn dispatch(&self, task: HostTask) {
        if self.tasks.send(task).is_err() {
            log::warn!("host thread is gone, task dropped");
        }
    }

    fn global_object(&self) -> Option<ObjectHandle> {
        self.confined("global_object");
        self.heap.lock().retain(self.global);
        Some(self.global)
    }

    fn plugin_element(&self) -> Option<ObjectHandle> {
        self.confined("plugin_element");
        let element = self.element?;
        self.heap.lock().retain(element);
        Some(element)
    }

    fn invoke(&self, target: ObjectHandle, id: NativeId, args: &[RawVariant]) -> Option<RawVariant> {
        self.confined("invoke");
        match self.resolve_call(target, id)? {
            Call::Push => {
                let mut heap = self.heap.lock();
                for arg in args {
                    heap.retain_value(arg);
                }
                let Slot::Array(elements) = &mut heap.objects.get_mut(&target)?.slot else {
                    return None;
                };
                elements.extend(args.iter().cloned());
                Some(RawVariant::Int32(elements.len() as i32))
            }
            Call::Construct(array) => {
                let slot = if array { Slot::Array(Vec::new()) } else { Slot::Plain };
                Some(RawVariant::Object(self.heap.lock().alloc(slot)))
            }
            Call::Function(f) => f(args),
        }
    }

    fn invoke_default(&self, target: ObjectHandle, args: &[RawVariant]) -> Option<RawVariant> {
        self.confined("invoke_default");
        let f = self.heap.lock().function(target)?;
        f(args)
    }

    fn evaluate(&self, target: ObjectHandle, script: &str) -> Option<RawVariant> {
        self.confined("evaluate");
        let expression = strip_parens(script);
        let mut heap = self.heap.lock();
        let defined = heap.expressions.get(expression).cloned();
        let value = match defined {
            Some(value) => value,
            None => {
                let id = heap.key(expression);
                heap.lookup(target, id)?
            }
        };
        heap.retain_value(&value);
        Some(value)
    }

    fn get_property(&self, target: ObjectHandle, id: NativeId) -> Option<RawVariant> {
        self.confined("get_property");
        let mut heap = self.heap.lock();
        let value = heap.lookup(target, id)?;
        heap.retain_value(&value);
        Some(value)
    }

    fn set_property(&self, target: ObjectHandle, id: NativeId, value: &RawVariant) -> bool {
        self.confined("set_property");
        self.heap.lock().store(target, id, value.clone())
    }

    fn enumerate(&self, target: ObjectHandle) -> Option<Vec<NativeId>> {
        self.confined("enumerate");
        let heap = self.heap.lock();
        let entry = heap.objects.get(&target)?;
        let ids = match &entry.slot {
            Slot::Array(elements) => (0..elements.len() as i32).map(int_id).collect(),
            _ => entry.props.keys().copied().collect(),
        };
        Some(ids)
    }

    fn retain(&self, target: ObjectHandle) {
        self.heap.lock().retain(target);
    }

    fn release(&self, target: ObjectHandle) {
        self.heap.lock().release(target);
    }

    fn string_identifier(&self, name: &str) -> NativeId {
        self.confined("string_identifier");
        self.heap.lock().intern(name)
    }

    fn int_identifier(&self, value: i32) -> NativeId {
        self.confined("int_identifier");
        int_id(value)
    }

    fn identifier_is_string(&self, id: NativeId) -> bool {
        self.confined("identifier_is_string");
        id.0 & STRING_ID_BIT != 0
    }

    fn utf8_from_identifier(&self, id: NativeId) -> Option<String> {
        self.confined("utf8_from_identifier");
        self.heap.lock().name_of(id).map(str::to_owned)
    }

    fn int_from_identifier(&self, id: NativeId) -> i32 {
        self.confined("int_from_identifier");
        if self.identifier_is_string(id) {
            0
        } else {
            id.0 as u32 as i32
        }
    }

    fn set_exception(&self, message: &str) {
        self.confined("set_exception");
        log::debug!("host exception: {}", message);
        self.heap.lock().exceptions.push(message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        let host = MemoryHost::new();
        host.enter(|host| {
            let a = host.string_identifier("alpha");
            assert_eq!(host.string_identifier("alpha"), a);
            assert!(host.identifier_is_string(a));
            assert_eq!(host.utf8_from_identifier(a).as_deref(), Some("alpha"));

            let n = host.int_identifier(-5);
            assert!(!host.identifier_is_string(n));
            assert_eq!(host.int_from_identifier(n), -5);
            assert_eq!(host.utf8_from_identifier(n), None);
        })
        .unwrap();
    }

    #[test]
    fn test_array_length_not_enumerated() {
        let host = MemoryHost::new();
        host.enter(|host| {
            let array = host.create_array(vec![RawVariant::Null, RawVariant::Null]);

            let ids = host.enumerate(array).unwrap();
            assert_eq!(ids, vec![host.int_identifier(0), host.int_identifier(1)]);

            let length = host.string_identifier("length");
            assert_eq!(host.get_property(array, length), Some(RawVariant::Int32(2)));
        })
        .unwrap();
    }

    #[test]
    fn test_release_frees_children() {
        let host = MemoryHost::new();
        let parent = host.create_object();
        let child = host.create_object();
        host.put(parent, "child", RawVariant::Object(child));
        host.release(child);
        assert_eq!(host.ref_count(child), 1);

        host.release(parent);
        assert_eq!(host.ref_count(parent), 0);
        assert_eq!(host.ref_count(child), 0);
    }

    #[test]
    fn test_constructors_on_global() {
        let host = MemoryHost::new();
        host.enter(|host| {
            let global = host.global_object().unwrap();
            let array_id = host.string_identifier("Array");
            let push = host.string_identifier("push");

            let array = host.invoke(global, array_id, &[]).unwrap().as_object().unwrap();
            assert_eq!(host.invoke(array, push, &[RawVariant::Int32(4)]), Some(RawVariant::Int32(1)));
            assert_eq!(host.array_elements(array), Some(vec![RawVariant::Int32(4)]));
        })
        .unwrap();
    }

    #[test]
    fn test_function_objects() {
        let host = MemoryHost::new();
        let double = host.create_function(|args| match args {
            [RawVariant::Int32(i)] => Some(RawVariant::Int32(i * 2)),
            _ => None,
        });
        host.define_global("double", RawVariant::Object(double));

        host.enter(move |host| {
            let id = host.string_identifier("double");
            let global = host.global();
            assert_eq!(host.invoke(global, id, &[RawVariant::Int32(21)]), Some(RawVariant::Int32(42)));
            assert_eq!(host.invoke_default(double, &[RawVariant::Int32(2)]), Some(RawVariant::Int32(4)));
            assert_eq!(host.invoke(global, id, &[]), None);
        })
        .unwrap();
    }

    #[test]
    fn test_evaluate_strips_parens() {
        let host = MemoryHost::new();
        host.define_expression("answer", RawVariant::Int32(42));
        host.define_global("g", RawVariant::Boolean(true));

        host.enter(|host| {
            let global = host.global();
            assert_eq!(host.evaluate(global, "((answer))"), Some(RawVariant::Int32(42)));
            assert_eq!(host.evaluate(global, "(g)"), Some(RawVariant::Boolean(true)));
            assert_eq!(host.evaluate(global, "(missing)"), None);
        })
        .unwrap();
    }

    #[test]
    fn test_run_on_host_uses_designated_thread() {
        let host = MemoryHost::new();
        let designated = host.designated_thread();
        let ran_on = host.run_on_host(|| thread::current().id()).unwrap();
        assert_eq!(ran_on, designated);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "off the designated thread")]
    fn test_host_api_rejects_other_threads() {
        let host = MemoryHost::new();
        host.string_identifier("alpha");
    }

    #[test]
    fn test_panic_on_host_reaches_caller() {
        let host = MemoryHost::new();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| host.run_on_host(|| -> i32 { panic!("boom") })));
        assert!(outcome.is_err());
        // The host thread survives and keeps serving tasks
        assert_eq!(host.run_on_host(|| 1), Some(1));
    }

    #[test]
    fn test_retain_release_from_any_thread() {
        let host = MemoryHost::new();
        let obj = host.create_object();
        host.retain(obj);
        assert_eq!(host.ref_count(obj), 2);
        host.release(obj);
        host.release(obj);
        assert_eq!(host.ref_count(obj), 0);
    }
}

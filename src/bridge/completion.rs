//! Per-call completion latch
//!
//! Each outbound call owns one latch. It leaves `Pending` exactly once,
//! either because the call finished or because shutdown cancelled it, and
//! wakes the waiter when it does. A result that arrives after cancellation
//! is dropped by whoever delivered it, so late results never reach the
//! caller.

use parking_lot::{Condvar, Mutex};

use crate::value::Variant;

#[derive(Debug)]
enum State {
    Pending,
    Done(Option<Variant>),
    Cancelled,
    /// Result already handed to the waiter
    Taken,
}

/// One-shot signal carrying the call result
#[derive(Debug)]
pub struct Completion {
    state: Mutex<State>,
    signal: Condvar,
}

impl Completion {
    /// Create a pending latch
    pub fn new() -> Self {
        Completion {
            state: Mutex::new(State::Pending),
            signal: Condvar::new(),
        }
    }

    /// Publish the result and wake the waiter
    ///
    /// Returns false, dropping `result`, if the latch already left `Pending`.
    pub fn complete(&self, result: Option<Variant>) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, State::Pending) {
            return false;
        }
        *state = State::Done(result);
        self.signal.notify_all();
        true
    }

    /// Cancel the call and wake the waiter
    ///
    /// Returns false if the latch already left `Pending`.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, State::Pending) {
            return false;
        }
        *state = State::Cancelled;
        self.signal.notify_all();
        true
    }

    /// Check whether shutdown cancelled this call
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), State::Cancelled)
    }

    #[cfg(test)]
    fn is_signalled(&self) -> bool {
        !matches!(*self.state.lock(), State::Pending)
    }

    /// Block until the latch is signalled
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while matches!(*state, State::Pending) {
            self.signal.wait(&mut state);
        }
    }

    /// Take the result; None if cancelled, failed, unsignalled or already taken
    pub fn take(&self) -> Option<Variant> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, State::Taken) {
            State::Done(result) => result,
            State::Pending => {
                *state = State::Pending;
                None
            }
            State::Cancelled => {
                *state = State::Cancelled;
                None
            }
            State::Taken => None,
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_complete_then_take() {
        let latch = Completion::new();
        assert!(!latch.is_signalled());
        assert!(latch.complete(Some(Variant::from(5))));
        latch.wait();
        assert_eq!(latch.take(), Some(Variant::from(5)));
        assert_eq!(latch.take(), None);
    }

    #[test]
    fn test_signalled_once() {
        let latch = Completion::new();
        assert!(latch.cancel());
        assert!(!latch.complete(Some(Variant::from(1))));
        assert!(!latch.cancel());
        assert!(latch.is_cancelled());
        assert_eq!(latch.take(), None);
        assert!(latch.is_cancelled());
    }

    #[test]
    fn test_take_before_signal() {
        let latch = Completion::new();
        assert_eq!(latch.take(), None);
        assert!(!latch.is_signalled());
    }

    #[test]
    fn test_wait_across_threads() {
        let latch = Arc::new(Completion::new());
        let signaller = Arc::clone(&latch);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.complete(Some(Variant::from("done")));
        });

        latch.wait();
        assert_eq!(latch.take(), Some(Variant::from("done")));
        handle.join().unwrap();
    }
}

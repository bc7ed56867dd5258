// src/future/promise.rs

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::errors::{Result, TaskGraphError};
use crate::future::future::{Future, FutureStatus};

/// State shared by a promise and its future.
pub(crate) struct State<R> {
    slot: Mutex<Slot<R>>,
    waiters: Condvar,
}

struct Slot<R> {
    result: Option<Result<R>>,
    /// Set once `result` may be observed by waiters.
    ready: bool,
    /// Set once the result has been written, even if not yet ready.
    satisfied: bool,
    future_retrieved: bool,
}

impl<R> State<R> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                result: None,
                ready: false,
                satisfied: false,
                future_retrieved: false,
            }),
            waiters: Condvar::new(),
        }
    }

    fn set(&self, result: Result<R>, set_ready: bool) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot.satisfied {
            return Err(TaskGraphError::AlreadySatisfied);
        }
        slot.result = Some(result);
        slot.satisfied = true;
        if set_ready {
            slot.ready = true;
            self.waiters.notify_all();
        }
        Ok(())
    }

    fn set_ready(&self) {
        let mut slot = self.slot.lock();
        slot.ready = true;
        self.waiters.notify_all();
    }

    /// Called when the promise goes away.
    fn abandon(&self) {
        let mut slot = self.slot.lock();
        if !slot.satisfied {
            slot.result = Some(Err(TaskGraphError::BrokenPromise));
            slot.satisfied = true;
        }
        if !slot.ready {
            slot.ready = true;
            self.waiters.notify_all();
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.slot.lock().ready
    }

    pub(crate) fn wait_until(&self, deadline: Option<Instant>) -> FutureStatus {
        let mut slot = self.slot.lock();
        while !slot.ready {
            match deadline {
                Some(deadline) => {
                    if self.waiters.wait_until(&mut slot, deadline).timed_out() && !slot.ready {
                        return FutureStatus::Timeout;
                    }
                }
                None => self.waiters.wait(&mut slot),
            }
        }
        FutureStatus::Ready
    }

    /// Wait, then move the result out.
    pub(crate) fn take(&self) -> Result<R> {
        self.wait_until(None);
        self.slot
            .lock()
            .result
            .take()
            .unwrap_or(Err(TaskGraphError::NoState))
    }

    /// Wait, then clone the result.
    pub(crate) fn peek(&self) -> Result<R>
    where
        R: Clone,
    {
        self.wait_until(None);
        match self.slot.lock().result.as_ref() {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(TaskGraphError::NoState),
        }
    }
}

/// Write side of the result channel.
///
/// A promise must be fulfilled before being dropped, otherwise its future
/// reports [`TaskGraphError::BrokenPromise`].
pub struct Promise<R> {
    state: Arc<State<R>>,
}

impl<R> Promise<R> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(State::new()),
        }
    }

    /// Get the future from which the result can be retrieved.
    ///
    /// Fails with [`TaskGraphError::FutureAlreadyRetrieved`] on a second call.
    pub fn future(&self) -> Result<Future<R>> {
        let mut slot = self.state.slot.lock();
        if slot.future_retrieved {
            return Err(TaskGraphError::FutureAlreadyRetrieved);
        }
        slot.future_retrieved = true;
        drop(slot);
        Ok(Future::new(Arc::clone(&self.state)))
    }

    pub fn set_value(&self, value: R) -> Result<()> {
        self.state.set(Ok(value), true)
    }

    pub fn set_error(&self, error: TaskGraphError) -> Result<()> {
        self.state.set(Err(error), true)
    }

    /// Store a result without waking waiters; see [`Promise::set_ready`].
    pub(crate) fn set_delayed(&self, result: Result<R>) -> Result<()> {
        self.state.set(result, false)
    }

    pub(crate) fn set_ready(&self) {
        self.state.set_ready();
    }

    pub fn is_satisfied(&self) -> bool {
        self.state.slot.lock().satisfied
    }
}

impl<R> Default for Promise<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Drop for Promise<R> {
    fn drop(&mut self) {
        self.state.abandon();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn value_reaches_future_across_threads() {
        let promise = Promise::new();
        let future = promise.future().unwrap();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            promise.set_value(7).unwrap();
        });

        assert_eq!(future.get().unwrap(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn second_future_and_second_value_are_rejected() {
        let promise = Promise::new();
        let _future = promise.future().unwrap();
        assert!(matches!(
            promise.future(),
            Err(TaskGraphError::FutureAlreadyRetrieved)
        ));

        promise.set_value(1).unwrap();
        assert!(matches!(
            promise.set_value(2),
            Err(TaskGraphError::AlreadySatisfied)
        ));
        assert!(matches!(
            promise.set_error(TaskGraphError::NoState),
            Err(TaskGraphError::AlreadySatisfied)
        ));
    }

    #[test]
    fn dropped_promise_breaks_future() {
        let promise = Promise::<u32>::new();
        let future = promise.future().unwrap();
        drop(promise);
        assert!(matches!(future.get(), Err(TaskGraphError::BrokenPromise)));
    }

    #[test]
    fn delayed_value_is_invisible_until_ready() {
        let promise = Promise::new();
        let future = promise.future().unwrap();

        promise.set_delayed(Ok("late")).unwrap();
        assert!(!future.is_ready());
        assert_eq!(
            future.wait_for(Duration::from_millis(5)),
            FutureStatus::Timeout
        );

        promise.set_ready();
        assert_eq!(future.wait_for(Duration::from_millis(5)), FutureStatus::Ready);
        assert_eq!(future.get().unwrap(), "late");
    }

    #[test]
    fn stored_error_is_returned_by_get() {
        let promise = Promise::<()>::new();
        let future = promise.future().unwrap();
        promise
            .set_error(TaskGraphError::ConfigError("boom".to_string()))
            .unwrap();
        match future.get() {
            Err(TaskGraphError::ConfigError(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }
}

// src/future/packaged.rs

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::errors::{Result, TaskGraphError};
use crate::future::{Future, Promise};
use crate::task::TaskContext;

/// Boxed functor run by a task; one type for every result type.
pub type TaskFn<R> = Box<dyn FnMut(&TaskContext<'_>) -> R + Send>;

/// A functor bundled with the promise its result is stored into.
///
/// The functor and the promise sit behind separate locks so that
/// [`PackagedTask::future`] never waits on a running functor.
pub struct PackagedTask<R> {
    func: Mutex<TaskFn<R>>,
    promise: Mutex<Promise<R>>,
    invoked: AtomicBool,
}

impl<R> PackagedTask<R> {
    pub fn new(func: TaskFn<R>) -> Self {
        Self {
            func: Mutex::new(func),
            promise: Mutex::new(Promise::new()),
            invoked: AtomicBool::new(false),
        }
    }

    /// Future for the current cycle; callable once until [`reset`](Self::reset).
    pub fn future(&self) -> Result<Future<R>> {
        self.promise.lock().future()
    }

    /// Run the functor and make the result ready immediately.
    pub fn invoke(&self, ctx: &TaskContext<'_>) -> Result<()> {
        self.invoke_delayed_ready(ctx)?;
        self.set_ready()
    }

    /// Run the functor, storing its result (or the panic it raised) without
    /// waking waiters. The caller must follow with [`set_ready`](Self::set_ready).
    pub fn invoke_delayed_ready(&self, ctx: &TaskContext<'_>) -> Result<()> {
        if self.invoked.swap(true, Ordering::AcqRel) {
            return Err(TaskGraphError::AlreadyInvoked);
        }

        let outcome = {
            let mut func = self.func.lock();
            panic::catch_unwind(AssertUnwindSafe(|| (*func)(ctx)))
        };

        let result = outcome.map_err(|payload| TaskGraphError::Panicked {
            task: ctx.task_id().clone(),
            message: panic_message(payload.as_ref()),
        });

        self.promise.lock().set_delayed(result)
    }

    /// Publish a result stored by [`invoke_delayed_ready`](Self::invoke_delayed_ready).
    pub fn set_ready(&self) -> Result<()> {
        if !self.invoked.load(Ordering::Acquire) {
            return Err(TaskGraphError::NoState);
        }
        self.promise.lock().set_ready();
        Ok(())
    }

    /// Re-arm with a fresh promise so the functor can run again.
    pub fn reset(&self) {
        if !self.invoked.swap(false, Ordering::AcqRel) {
            return;
        }
        *self.promise.lock() = Promise::new();
    }

    /// Swap in a new functor and a fresh promise.
    pub fn replace(&self, func: TaskFn<R>) {
        *self.func.lock() = func;
        *self.promise.lock() = Promise::new();
        self.invoked.store(false, Ordering::Release);
    }

    pub fn is_invoked(&self) -> bool {
        self.invoked.load(Ordering::Acquire)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SchedulerId, TaskId};

    fn ctx(id: &TaskId) -> TaskContext<'_> {
        TaskContext::new(id, 0, SchedulerId::next())
    }

    #[test]
    fn invoke_twice_requires_reset() {
        let id = TaskId::from("t");
        let mut n = 0;
        let task = PackagedTask::new(Box::new(move |_: &TaskContext<'_>| {
            n += 1;
            n
        }));

        let first = task.future().unwrap();
        task.invoke(&ctx(&id)).unwrap();
        assert!(matches!(
            task.invoke(&ctx(&id)),
            Err(TaskGraphError::AlreadyInvoked)
        ));
        assert_eq!(first.get().unwrap(), 1);

        task.reset();
        let second = task.future().unwrap();
        task.invoke(&ctx(&id)).unwrap();
        assert_eq!(second.get().unwrap(), 2);
    }

    #[test]
    fn panic_is_captured_into_future() {
        let id = TaskId::from("boom");
        let func: TaskFn<()> = Box::new(|_: &TaskContext<'_>| {
            if true {
                panic!("exploded");
            }
        });
        let task = PackagedTask::new(func);

        let future = task.future().unwrap();
        task.invoke_delayed_ready(&ctx(&id)).unwrap();
        assert!(!future.is_ready());
        task.set_ready().unwrap();

        match future.get() {
            Err(TaskGraphError::Panicked { task, message }) => {
                assert_eq!(task.as_str(), "boom");
                assert_eq!(message, "exploded");
            }
            other => panic!("expected Panicked, got {other:?}"),
        }
    }

    #[test]
    fn set_ready_before_invoke_is_an_error() {
        let task: PackagedTask<u8> = PackagedTask::new(Box::new(|_: &TaskContext<'_>| 1));
        assert!(matches!(task.set_ready(), Err(TaskGraphError::NoState)));
    }
}

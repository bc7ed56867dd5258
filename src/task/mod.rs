// src/task/mod.rs

//! Schedulable tasks.
//!
//! - [`Task`] is the typed, clonable handle callers build graphs from.
//! - [`state`] defines the five-state lifecycle and counter snapshots.
//! - [`context`] is what a functor receives while it runs.
//! - `record` holds the type-erased record the scheduler works on.

pub mod context;
pub(crate) mod record;
pub mod state;

use std::fmt;
use std::sync::Arc;

use parking_lot::MutexGuard;
use tracing::error;

use crate::dag::DepNode;
use crate::errors::{Result, TaskGraphError};
use crate::future::{Future, PackagedTask};
use crate::task::record::TaskCore;
use crate::types::TaskId;

pub use context::TaskContext;
pub(crate) use record::{Schedulable, TaskRef};
pub use state::{TaskState, WaitCounts};

struct TaskCell<R> {
    core: TaskCore,
    func: PackagedTask<R>,
}

impl<R: Send + 'static> Schedulable for TaskCell<R> {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn exec(&self, ctx: &TaskContext<'_>) {
        if let Err(e) = self.func.invoke_delayed_ready(ctx) {
            error!(task = %ctx.task_id(), error = %e, "functor invocation rejected");
        }
    }

    fn publish(&self) {
        if self.func.is_invoked() {
            let _ = self.func.set_ready();
        }
        self.func.reset();
    }
}

/// A unit of work with an id, a functor producing `R`, and dependency edges.
///
/// Build the graph by declaring edges through [`Task::deps`], register every
/// task with a [`Scheduler`](crate::Scheduler), then enqueue a root. Clones
/// share the same task.
pub struct Task<R> {
    cell: Arc<TaskCell<R>>,
}

impl<R: Send + 'static> Task<R> {
    /// Create a task whose functor takes no arguments.
    pub fn new<F>(id: impl Into<TaskId>, mut func: F) -> Self
    where
        F: FnMut() -> R + Send + 'static,
    {
        Self::with_context(id, move |_: &TaskContext<'_>| func())
    }

    /// Create a task whose functor receives the running [`TaskContext`].
    pub fn with_context<F>(id: impl Into<TaskId>, func: F) -> Self
    where
        F: FnMut(&TaskContext<'_>) -> R + Send + 'static,
    {
        Self {
            cell: Arc::new(TaskCell {
                core: TaskCore::new(id.into()),
                func: PackagedTask::new(Box::new(func)),
            }),
        }
    }

    pub(crate) fn task_ref(&self) -> TaskRef {
        self.cell.clone()
    }
}

impl<R> Task<R> {
    pub fn id(&self) -> TaskId {
        self.cell.core.id()
    }

    /// Change the id. Fails while the task is registered anywhere.
    pub fn set_id(&self, id: impl Into<TaskId>) -> Result<()> {
        self.cell.core.set_id(id.into())
    }

    /// Edges of this task. Upstream ids run before this task, downstream ids
    /// after it. Fails while the task is registered anywhere.
    pub fn deps(&self) -> Result<MutexGuard<'_, DepNode>> {
        self.cell.core.deps_mut()
    }

    #[cfg(test)]
    pub(crate) fn dep_node(&self) -> DepNode {
        self.cell.core.node_snapshot()
    }

    /// Future for the result of the current or next execution.
    ///
    /// Fails with [`TaskGraphError::FutureAlreadyRetrieved`] if called twice
    /// within one cycle.
    pub fn future(&self) -> Result<Future<R>> {
        self.cell.func.future()
    }

    /// Replace the functor. Fails while the task is active.
    pub fn set_functor<F>(&self, mut func: F) -> Result<()>
    where
        F: FnMut() -> R + Send + 'static,
    {
        let st = self.cell.core.sched.lock();
        if st.state.is_active() {
            return Err(TaskGraphError::TaskActive(self.id()));
        }
        self.cell
            .func
            .replace(Box::new(move |_: &TaskContext<'_>| func()));
        Ok(())
    }

    pub fn state(&self) -> TaskState {
        self.cell.core.sched.lock().state
    }

    /// Queued or executing.
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn is_registered(&self) -> bool {
        self.cell.core.is_registered()
    }

    pub fn wait_counts(&self) -> WaitCounts {
        self.cell.core.sched.lock().counts()
    }
}

impl<R> Clone for Task<R> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<R> fmt::Debug for Task<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

impl<R> From<&Task<R>> for TaskId {
    fn from(task: &Task<R>) -> Self {
        task.id()
    }
}

// src/task/record.rs

//! Type-erased scheduling record shared by every `Task<R>`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::dag::DepNode;
use crate::errors::{Result, TaskGraphError};
use crate::sched::roots::RootTable;
use crate::task::TaskContext;
use crate::task::state::{TaskState, WaitCounts};
use crate::types::{SchedulerId, TaskId};

/// What the scheduler needs from a task, independent of its result type.
pub(crate) trait Schedulable: Send + Sync {
    fn core(&self) -> &TaskCore;

    /// Run the functor, keeping its result unpublished.
    fn exec(&self, ctx: &TaskContext<'_>);

    /// Publish the stored result and re-arm the functor for the next cycle.
    fn publish(&self);
}

pub(crate) type TaskRef = Arc<dyn Schedulable>;

/// Association of a task with one bind generation of one scheduler.
///
/// Roots are not stored here; they live in the scheduler's [`RootTable`]
/// under `generation`.
#[derive(Clone)]
pub(crate) struct Binding {
    pub scheduler: SchedulerId,
    pub generation: u64,
    pub roots: Weak<RootTable>,
}

impl Binding {
    /// First root of the generation, for diagnostics.
    pub fn root(&self) -> Option<TaskId> {
        self.roots.upgrade()?.first_root(self.generation)
    }

    pub fn is_root(&self, id: &TaskId) -> bool {
        self.roots
            .upgrade()
            .is_some_and(|roots| roots.is_root(self.generation, id))
    }

    pub fn same_generation(&self, other: &Binding) -> bool {
        self.scheduler == other.scheduler && self.generation == other.generation
    }

    /// The cached binding of this generation no longer matches the graph.
    pub fn mark_root_dirty(&self) {
        if let Some(roots) = self.roots.upgrade() {
            roots.mark_dirty(self.generation);
        }
    }

    /// `id` is leaving this generation.
    pub fn release(&self, id: &TaskId) {
        if let Some(roots) = self.roots.upgrade() {
            roots.release(self.generation, id);
        }
    }
}

/// Fields guarded by the per-task lock.
#[derive(Default)]
pub(crate) struct SchedState {
    pub state: TaskState,
    pub binding: Option<Binding>,
    pub dep_up_wait_init: usize,
    pub dep_up_wait: usize,
    pub dep_down_wait_init: usize,
    pub dep_down_wait: usize,
    /// Only meaningful during a bind pass.
    pub on_stack: bool,
    /// Bind pass that last visited this task.
    pub pass: u64,
    /// Bumped by every finalize.
    pub epoch: u64,
    /// `(generation, cycle)` of the last finalize.
    pub completed: Option<(u64, u64)>,
}

impl SchedState {
    /// Generation this task is bound to on `scheduler`, if any.
    pub fn generation_on(&self, scheduler: SchedulerId) -> Option<u64> {
        self.binding
            .as_ref()
            .filter(|b| b.scheduler == scheduler)
            .map(|b| b.generation)
    }

    pub fn in_generation(&self, binding: &Binding) -> bool {
        self.binding
            .as_ref()
            .is_some_and(|b| b.same_generation(binding))
    }

    /// One upstream task completed. Returns `true` when none remain.
    pub fn ack_upstream(&mut self) -> bool {
        self.dep_up_wait = self.dep_up_wait.saturating_sub(1);
        self.dep_up_wait == 0
    }

    /// One downstream neighbour acknowledged. Returns `true` when none remain.
    pub fn ack_downstream(&mut self) -> bool {
        self.dep_down_wait = self.dep_down_wait.saturating_sub(1);
        self.dep_down_wait == 0
    }

    pub fn counts(&self) -> WaitCounts {
        WaitCounts {
            dep_up_wait_init: self.dep_up_wait_init,
            dep_up_wait: self.dep_up_wait,
            dep_down_wait_init: self.dep_down_wait_init,
            dep_down_wait: self.dep_down_wait,
        }
    }
}

pub(crate) struct TaskCore {
    id: RwLock<TaskId>,
    node: Mutex<DepNode>,
    /// Number of schedulers this task is registered with.
    reg_count: AtomicUsize,
    pub sched: Mutex<SchedState>,
}

impl TaskCore {
    pub fn new(id: TaskId) -> Self {
        Self {
            node: Mutex::new(DepNode::new(id.clone())),
            id: RwLock::new(id),
            reg_count: AtomicUsize::new(0),
            sched: Mutex::new(SchedState::default()),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.reg_count.load(Ordering::Acquire) > 0
    }

    pub fn node_snapshot(&self) -> DepNode {
        self.node.lock().clone()
    }

    /// Count a registration and return the edges to insert. Counting happens
    /// under the node lock so concurrent edge edits see it.
    pub fn begin_register(&self) -> DepNode {
        let node = self.node.lock();
        self.reg_count.fetch_add(1, Ordering::AcqRel);
        node.clone()
    }

    pub fn end_register(&self) {
        self.reg_count.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn deps_mut(&self) -> Result<MutexGuard<'_, DepNode>> {
        let node = self.node.lock();
        if self.is_registered() {
            return Err(TaskGraphError::TaskRegistered(node.id().clone()));
        }
        Ok(node)
    }

    pub fn set_id(&self, id: TaskId) -> Result<()> {
        let mut node = self.deps_mut()?;
        node.set_id(id.clone());
        *self.id.write() = id;
        Ok(())
    }
}

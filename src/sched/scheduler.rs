// src/sched/scheduler.rs

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::config::SchedulerConfig;
use crate::dag::{DepGraph, Link};
use crate::errors::{Result, TaskGraphError};
use crate::sched::bind::Binder;
use crate::sched::roots::RootTable;
use crate::sched::worker::{Worker, WorkerSlot};
use crate::task::{Task, TaskRef, TaskState};
use crate::types::{SchedulerId, TaskId};

/// State shared between the scheduler handle and its worker threads.
pub(crate) struct Shared {
    pub id: SchedulerId,
    pub workers: Vec<WorkerSlot>,
    /// Used when every worker queue is at capacity.
    pub overflow: Mutex<VecDeque<TaskRef>>,
    pub graph: RwLock<DepGraph>,
    /// Serializes binding and root enqueues.
    pub binder: Mutex<Binder>,
    pub roots: Arc<RootTable>,
    pub queue_capacity: usize,
}

impl Shared {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            id: SchedulerId::next(),
            workers: (0..config.worker_count)
                .map(|_| WorkerSlot::new())
                .collect(),
            overflow: Mutex::new(VecDeque::new()),
            graph: RwLock::new(DepGraph::new()),
            binder: Mutex::new(Binder::default()),
            roots: Arc::new(RootTable::default()),
            queue_capacity: config.worker_queue_capacity,
        }
    }

    /// Move `task` to `Queued` and hand it to a worker.
    ///
    /// Only `Idle` tasks and `DepUpWait` tasks with no remaining upstream
    /// wait qualify; anything else is a no-op returning `false`. When several
    /// threads offer the same ready task, exactly one of them wins.
    pub fn enqueue_priv(&self, task: &TaskRef) -> bool {
        let core = task.core();
        {
            let mut st = core.sched.lock();
            match st.state {
                TaskState::Idle => {}
                TaskState::DepUpWait if st.dep_up_wait == 0 => {}
                _ => return false,
            }
            st.state = TaskState::Queued;
        }

        // Best-effort balancing: the shortest queue at the time of the scan,
        // ties going to the lowest index.
        let chosen = self
            .workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.len() < self.queue_capacity)
            .min_by_key(|(_, w)| w.len())
            .map(|(i, _)| i);

        let pushed = chosen.filter(|&i| self.workers[i].push(task.clone(), self.queue_capacity));
        match pushed {
            Some(i) => trace!(
                task = %core.id(),
                worker = i,
                queue_len = self.workers[i].len(),
                "pushed to worker queue"
            ),
            None => {
                let mut overflow = self.overflow.lock();
                overflow.push_back(task.clone());
                debug!(
                    task = %core.id(),
                    queue_len = overflow.len(),
                    "worker queues full; pushed to scheduler queue"
                );
            }
        }

        let first = chosen.unwrap_or(0);
        let count = self.workers.len();
        for offset in 0..count {
            if self.workers[(first + offset) % count].wake_if_waiting() {
                break;
            }
        }
        true
    }

    pub fn pop_overflow(&self) -> Option<TaskRef> {
        self.overflow.lock().pop_front()
    }

    /// Mark the generations of `id`'s registered neighbours as dirty.
    fn dirty_neighbours(&self, graph: &DepGraph, id: &TaskId) {
        for link in [Link::Upstream, Link::Downstream] {
            for other in graph.links(id, link) {
                let st = other.core().sched.lock();
                if let Some(binding) = st.binding.as_ref().filter(|b| b.scheduler == self.id) {
                    binding.mark_root_dirty();
                }
            }
        }
    }
}

/// Schedules task graphs across a fixed pool of worker threads.
///
/// Dropping the scheduler stops its workers once they have drained every
/// queued task.
pub struct Scheduler {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Start `worker_count` workers, each with a private queue holding at
    /// most `worker_queue_capacity` tasks.
    pub fn new(worker_count: usize, worker_queue_capacity: usize) -> Result<Self> {
        Self::from_config(&SchedulerConfig::new(worker_count, worker_queue_capacity)?)
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;

        let mut scheduler = Self {
            shared: Arc::new(Shared::new(config)),
            threads: Vec::with_capacity(config.worker_count),
        };
        for index in 0..config.worker_count {
            let worker = Worker::new(index, Arc::clone(&scheduler.shared));
            let handle = thread::Builder::new()
                .name(format!("taskgraph-worker-{index}"))
                .spawn(move || worker.run())?;
            scheduler.threads.push(handle);
        }

        info!(
            scheduler = %scheduler.shared.id,
            workers = config.worker_count,
            queue_capacity = config.worker_queue_capacity,
            "scheduler started"
        );
        Ok(scheduler)
    }

    /// Process-wide scheduler built from [`SchedulerConfig::default`] on
    /// first use.
    pub fn global() -> Result<&'static Scheduler> {
        static GLOBAL: OnceLock<Scheduler> = OnceLock::new();
        if let Some(scheduler) = GLOBAL.get() {
            return Ok(scheduler);
        }
        let scheduler = Scheduler::from_config(&SchedulerConfig::default())?;
        Ok(GLOBAL.get_or_init(|| scheduler))
    }

    pub fn id(&self) -> SchedulerId {
        self.shared.id
    }

    pub fn worker_count(&self) -> usize {
        self.shared.workers.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.queue_capacity
    }

    /// Register `task` under its id.
    ///
    /// Returns `false` if the id is null or already registered here. A task
    /// may be registered with several schedulers at once.
    pub fn reg<R: Send + 'static>(&self, task: &Task<R>) -> bool {
        let task = task.task_ref();
        let core = task.core();
        let node = core.begin_register();
        let id = node.id().clone();

        let mut graph = self.shared.graph.write();
        if !graph.add(task.clone(), &node) {
            core.end_register();
            warn!(
                task = %id,
                scheduler = %self.shared.id,
                "registration rejected: null or duplicate id"
            );
            return false;
        }
        // New edges change the shape of subgraphs already bound here.
        self.shared.dirty_neighbours(&graph, &id);
        debug!(task = %id, scheduler = %self.shared.id, "registered");
        true
    }

    /// Remove `task` from this scheduler.
    ///
    /// Returns `false` if it is not registered here or is still active.
    pub fn unreg<R: Send + 'static>(&self, task: &Task<R>) -> bool {
        let task = task.task_ref();
        let core = task.core();
        let node = core.node_snapshot();
        let id = node.id().clone();

        let mut graph = self.shared.graph.write();
        {
            let mut st = core.sched.lock();
            if st.state.is_active() {
                warn!(task = %id, state = %st.state, "unregister rejected: task is active");
                return false;
            }
            if !graph.contains(&task) {
                debug!(task = %id, scheduler = %self.shared.id, "unregister ignored: not registered");
                return false;
            }
            if let Some(binding) = st.binding.take_if(|b| b.scheduler == self.shared.id) {
                binding.release(&id);
            }
        }
        self.shared.dirty_neighbours(&graph, &id);
        graph.remove(&task, &node);
        core.end_register();
        debug!(task = %id, scheduler = %self.shared.id, "unregistered");
        true
    }

    /// Run `task` and its upstream closure, with `task` as root.
    ///
    /// Returns `Ok(false)` if the task is already active. Binding errors
    /// (cycles, active upstream tasks, conflicts with a running subgraph)
    /// are returned before anything is queued.
    pub fn enqueue<R: Send + 'static>(&self, task: &Task<R>) -> Result<bool> {
        let task = task.task_ref();
        let core = task.core();
        let id = core.id();

        let mut binder = self.shared.binder.lock();
        if core.sched.lock().state.is_active() {
            debug!(task = %id, "enqueue ignored: task already active");
            return Ok(false);
        }

        let generation = {
            let graph = self.shared.graph.read();
            if !graph.contains(&task) {
                return Err(TaskGraphError::NotRegistered(id));
            }
            let reusable = core
                .sched
                .lock()
                .generation_on(self.shared.id)
                .filter(|&g| self.shared.roots.is_clean_root(g, &id));

            match reusable {
                Some(generation) => {
                    trace!(task = %id, generation, "reusing binding");
                    self.shared.roots.start(generation);
                    generation
                }
                None => {
                    let bound = self.shared.bind(&mut binder, &graph, &task)?;
                    if !bound.pinned {
                        self.shared.roots.start(bound.generation);
                    }
                    bound.generation
                }
            }
        };

        if self.shared.enqueue_priv(&task) {
            Ok(true)
        } else {
            self.shared.roots.finish(generation);
            Ok(false)
        }
    }

    /// Number of tasks registered here.
    pub fn task_count(&self) -> usize {
        self.shared.graph.read().len()
    }

    pub fn is_registered(&self, id: impl Into<TaskId>) -> bool {
        self.shared.graph.read().task(&id.into()).is_some()
    }

    /// Registered tasks `id` depends on, in declaration order.
    pub fn upstream_of(&self, id: impl Into<TaskId>) -> Vec<TaskId> {
        self.shared.graph.read().link_ids(&id.into(), Link::Upstream)
    }

    /// Registered tasks that depend on `id`.
    pub fn downstream_of(&self, id: impl Into<TaskId>) -> Vec<TaskId> {
        self.shared.graph.read().link_ids(&id.into(), Link::Downstream)
    }

    /// Tasks waiting in worker queues and the overflow queue.
    pub fn queued_len(&self) -> usize {
        let in_workers: usize = self.shared.workers.iter().map(|w| w.len()).sum();
        in_workers + self.shared.overflow.lock().len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for slot in &self.shared.workers {
            slot.stop();
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!(scheduler = %self.shared.id, "worker thread panicked");
            }
        }
        debug!(scheduler = %self.shared.id, "scheduler stopped");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.shared.id)
            .field("workers", &self.shared.workers.len())
            .field("queue_capacity", &self.shared.queue_capacity)
            .finish()
    }
}

// src/sched/worker.rs

//! Worker threads and the per-task execution protocol.
//!
//! For every task it obtains, a worker:
//! 1. offers the task's upstream neighbours to the scheduler, so dependency
//!    progress is seeded even if this task cannot run yet;
//! 2. parks the task in `DepUpWait` if upstream work remains, otherwise runs
//!    its functor outside the task lock;
//! 3. acknowledges its upstream neighbours, finalizing the ones waiting only
//!    on it;
//! 4. releases downstream neighbours of the same generation, queueing those
//!    that become ready;
//! 5. finalizes itself if it is a root with nothing left to wait for, or
//!    waits in `DepDownWait` for the last acknowledgement.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::dag::Link;
use crate::sched::scheduler::Shared;
use crate::task::record::{Binding, SchedState};
use crate::task::{TaskContext, TaskRef, TaskState};

pub(crate) struct WorkerQueue {
    tasks: VecDeque<TaskRef>,
    active: bool,
    /// Set while the worker is idle and may be signalled.
    cond_wait: bool,
}

/// Queue and wake-up state of one worker, owned by the scheduler.
pub(crate) struct WorkerSlot {
    queue: Mutex<WorkerQueue>,
    cond: Condvar,
    /// Mirror of the queue length, read without the lock when balancing.
    len: AtomicUsize,
}

impl WorkerSlot {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(WorkerQueue {
                tasks: VecDeque::new(),
                active: true,
                cond_wait: false,
            }),
            cond: Condvar::new(),
            len: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Push unless the queue reached `capacity` since it was last measured.
    pub fn push(&self, task: TaskRef, capacity: usize) -> bool {
        let mut queue = self.queue.lock();
        if queue.tasks.len() >= capacity {
            return false;
        }
        queue.tasks.push_back(task);
        self.len.store(queue.tasks.len(), Ordering::Relaxed);
        true
    }

    pub fn pop_front(&self) -> Option<TaskRef> {
        let mut queue = self.queue.lock();
        let task = queue.tasks.pop_front();
        self.len.store(queue.tasks.len(), Ordering::Relaxed);
        task
    }

    /// Signal the worker if it is idle. Returns whether it was.
    pub fn wake_if_waiting(&self) -> bool {
        let mut queue = self.queue.lock();
        if !queue.cond_wait {
            return false;
        }
        queue.cond_wait = false;
        self.cond.notify_one();
        true
    }

    pub fn stop(&self) {
        let mut queue = self.queue.lock();
        queue.active = false;
        queue.cond_wait = false;
        self.cond.notify_one();
    }
}

pub(crate) struct Worker {
    index: usize,
    shared: Arc<Shared>,
}

impl Worker {
    pub fn new(index: usize, shared: Arc<Shared>) -> Self {
        Self { index, shared }
    }

    /// Scheduling loop. Returns once the worker is stopped and no queued
    /// work is left anywhere.
    pub fn run(self) {
        debug!(worker = self.index, scheduler = %self.shared.id, "worker started");
        let slot = &self.shared.workers[self.index];
        loop {
            while let Some(task) = self.next() {
                self.process(&task);
            }

            let mut queue = slot.queue.lock();
            if !queue.active {
                break;
            }
            while queue.cond_wait {
                slot.cond.wait(&mut queue);
            }
            queue.cond_wait = true;
        }
        debug!(worker = self.index, scheduler = %self.shared.id, "worker stopped");
    }

    /// Own queue first, then the largest other queue, then the overflow
    /// queue.
    fn next(&self) -> Option<TaskRef> {
        let workers = &self.shared.workers;
        if let Some(task) = workers[self.index].pop_front() {
            return Some(task);
        }

        let victim = workers
            .iter()
            .enumerate()
            .filter(|(i, w)| *i != self.index && w.len() > 0)
            .max_by_key(|(_, w)| w.len());
        if let Some((from, slot)) = victim
            && let Some(task) = slot.pop_front()
        {
            trace!(
                task = %task.core().id(),
                worker = self.index,
                from,
                "stole task"
            );
            return Some(task);
        }

        self.shared.pop_overflow()
    }

    fn process(&self, task: &TaskRef) {
        let core = task.core();
        let id = core.id();

        let binding = core.sched.lock().binding.clone();
        let Some(binding) = binding else {
            warn!(task = %id, "dequeued task is not bound; dropping it");
            core.sched.lock().state = TaskState::Idle;
            return;
        };
        let (upstream, downstream) = {
            let graph = self.shared.graph.read();
            (
                graph.links(&id, Link::Upstream),
                graph.links(&id, Link::Downstream),
            )
        };

        for up in &upstream {
            if self.shared.is_pending(up, &binding) {
                self.shared.enqueue_priv(up);
            }
        }

        let epoch = {
            let mut st = core.sched.lock();
            if st.dep_up_wait > 0 {
                st.state = TaskState::DepUpWait;
                trace!(task = %id, waiting = st.dep_up_wait, "waiting for upstream");
                return;
            }
            st.state = TaskState::Exec;
            st.epoch
        };

        trace!(task = %id, worker = self.index, "executing");
        task.exec(&TaskContext::new(&id, self.index, self.shared.id));

        for up in &upstream {
            let mut st = up.core().sched.lock();
            let ran = matches!(st.state, TaskState::Exec | TaskState::DepDownWait);
            if ran && st.in_generation(&binding) && st.ack_downstream() {
                finalize(up, &mut st);
            }
        }

        for down in &downstream {
            let ready = {
                let mut st = down.core().sched.lock();
                st.in_generation(&binding) && st.ack_upstream() && st.state == TaskState::DepUpWait
            };
            if ready {
                self.shared.enqueue_priv(down);
            }
        }

        let mut st = core.sched.lock();
        if st.epoch != epoch {
            // The last downstream acknowledgement already finalized it.
            return;
        }
        let done = if binding.is_root(&id) {
            st.ack_downstream()
        } else {
            st.dep_down_wait == 0
        };
        if done {
            finalize(task, &mut st);
        } else {
            st.state = TaskState::DepDownWait;
            trace!(task = %id, waiting = st.dep_down_wait, "waiting for downstream");
        }
    }
}

impl Shared {
    /// `task` belongs to `binding`'s generation and has not already run in
    /// its current cycle.
    fn is_pending(&self, task: &TaskRef, binding: &Binding) -> bool {
        let st = task.core().sched.lock();
        if !st.in_generation(binding) {
            return false;
        }
        let cycle = self.roots.cycle(binding.generation);
        !(st.state == TaskState::Idle
            && cycle.is_some_and(|c| st.completed == Some((binding.generation, c))))
    }
}

/// Reset `task` for its next cycle and publish its result.
///
/// Must be called with the task's lock held, passed in as `st`.
pub(crate) fn finalize(task: &TaskRef, st: &mut SchedState) {
    let id = task.core().id();
    st.dep_up_wait = st.dep_up_wait_init;
    st.dep_down_wait = st.dep_down_wait_init;
    st.state = TaskState::Idle;
    st.epoch += 1;

    if let Some(binding) = st.binding.clone()
        && let Some(roots) = binding.roots.upgrade()
    {
        st.completed = roots
            .cycle(binding.generation)
            .map(|cycle| (binding.generation, cycle));
        if roots.is_root(binding.generation, &id) {
            roots.finish(binding.generation);
        }
    }

    task.publish();
    trace!(task = %id, "finalized");
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::SchedulerConfig;
    use crate::task::Task;

    /// Scheduler state with no worker threads, so queues only change when the
    /// test pops them.
    fn shared(workers: usize) -> Arc<Shared> {
        Arc::new(Shared::new(&SchedulerConfig::new(workers, 5).unwrap()))
    }

    fn push(shared: &Shared, slot: usize, name: &str) {
        let task = Task::new(name, || ()).task_ref();
        assert!(shared.workers[slot].push(task, 5));
    }

    fn push_overflow(shared: &Shared, name: &str) {
        shared
            .overflow
            .lock()
            .push_back(Task::new(name, || ()).task_ref());
    }

    fn next_id(worker: &Worker) -> Option<String> {
        worker.next().map(|t| t.core().id().as_str().to_string())
    }

    #[test]
    fn idle_worker_steals_from_the_largest_queue_before_overflow() {
        let shared = shared(3);
        push(&shared, 0, "a0");
        push(&shared, 0, "a1");
        push(&shared, 1, "b0");
        push_overflow(&shared, "spill");

        let worker = Worker::new(2, Arc::clone(&shared));
        assert_eq!(next_id(&worker).as_deref(), Some("a0"));

        // Both queues now hold one task; either may be stolen first.
        let stolen: HashSet<String> = (0..2).filter_map(|_| next_id(&worker)).collect();
        assert_eq!(stolen, HashSet::from(["a1".to_string(), "b0".to_string()]));
        assert_eq!(shared.workers[0].len(), 0);
        assert_eq!(shared.workers[1].len(), 0);

        assert_eq!(next_id(&worker).as_deref(), Some("spill"));
        assert!(worker.next().is_none());
    }

    #[test]
    fn worker_prefers_its_own_queue() {
        let shared = shared(2);
        push(&shared, 0, "a0");
        push(&shared, 0, "a1");
        push(&shared, 1, "own");
        push_overflow(&shared, "spill");

        let worker = Worker::new(1, Arc::clone(&shared));
        assert_eq!(next_id(&worker).as_deref(), Some("own"));
        assert_eq!(next_id(&worker).as_deref(), Some("a0"));
        assert_eq!(next_id(&worker).as_deref(), Some("a1"));
        assert_eq!(next_id(&worker).as_deref(), Some("spill"));
        assert!(worker.next().is_none());
    }
}

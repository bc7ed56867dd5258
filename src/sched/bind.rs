// src/sched/bind.rs

//! Binding: the pre-computation pass over a root's upstream closure.
//!
//! Binding walks the "depends on" edges depth-first with an explicit stack,
//! stamps every task with the scheduler and a bind generation, and computes
//! its wait counters:
//!
//! - `dep_up_wait_init` is the number of upstream tasks it waits for.
//! - `dep_down_wait_init` is the number of downstream acknowledgements it
//!   waits for before it may be recycled. The root counts itself once.
//!
//! Structural errors (cycles, active upstream tasks) abort the pass before
//! anything is queued.
//!
//! If part of the closure already belongs to a generation that is still
//! running, the root joins that generation instead of opening a new one.
//! Members that have not run yet pick up one more acknowledgement; members
//! that already ran in the current cycle count as satisfied.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::dag::{DepGraph, Link};
use crate::errors::{BindTrace, Result, RootName, TaskGraphError};
use crate::sched::scheduler::Shared;
use crate::sched::worker::finalize;
use crate::task::record::{Binding, SchedState};
use crate::task::{TaskRef, TaskState};
use crate::types::TaskId;

/// Scratch state for binding, guarded by the scheduler's binder lock.
#[derive(Default)]
pub(crate) struct Binder {
    generation: u64,
    pass: u64,
    stack: Vec<TaskRef>,
    /// Members of an adopted generation visited by the current pass.
    joined: HashSet<TaskId>,
    /// Acknowledgements added to joined members, undone if the pass fails.
    added_acks: Vec<TaskRef>,
    /// Tasks the current pass moved into its generation.
    rebound: Vec<TaskRef>,
}

pub(crate) struct Bound {
    pub generation: u64,
    /// The generation was already running; the root holds one of its pins.
    pub pinned: bool,
}

/// Outcome of checking one upstream neighbour during a first visit.
enum Upstream {
    /// Will be descended and waited for.
    Pending,
    /// Already ran in the adopted generation's current cycle.
    Satisfied,
    Active(RootName),
    OnStack,
}

/// A running generation the new root joins, and its current cycle.
#[derive(Clone, Copy)]
struct Adopted {
    generation: u64,
    cycle: u64,
}

impl Adopted {
    fn has_member(&self, st: &SchedState, shared: &Shared) -> bool {
        st.generation_on(shared.id) == Some(self.generation)
    }

    /// Finalized during the current cycle: it already ran and will not run
    /// again before the generation stops.
    fn completed(&self, st: &SchedState) -> bool {
        st.state == TaskState::Idle && st.completed == Some((self.generation, self.cycle))
    }
}

impl Shared {
    pub(crate) fn bind(
        &self,
        binder: &mut Binder,
        graph: &DepGraph,
        root: &TaskRef,
    ) -> Result<Bound> {
        let root_id = root.core().id();
        let adopted = self.running_generation(graph, root, &root_id)?;

        let generation = match adopted {
            Some(a) => a.generation,
            None => {
                binder.generation += 1;
                self.roots.open(binder.generation, root_id.clone());
                binder.generation
            }
        };
        binder.pass += 1;
        binder.stack.clear();
        binder.joined.clear();
        binder.added_acks.clear();
        binder.rebound.clear();
        binder.stack.push(Arc::clone(root));

        debug!(
            task = %root_id,
            generation,
            joined = adopted.is_some(),
            "binding root and its upstream"
        );

        let binding = Binding {
            scheduler: self.id,
            generation,
            roots: Arc::downgrade(&self.roots),
        };

        match self.bind_pass(binder, graph, &binding, adopted) {
            Ok(()) => {
                if adopted.is_some() {
                    self.roots.join(generation, root_id);
                }
                binder.stack.clear();
                binder.rebound.clear();
                Ok(Bound {
                    generation,
                    pinned: adopted.is_some(),
                })
            }
            Err(e) => {
                error!(task = %root_id, generation, error = %e, "bind failed");
                self.abort_pass(binder, generation, adopted.is_some());
                Err(e)
            }
        }
    }

    /// Find the running generation, if any, that part of `root`'s closure
    /// belongs to, and pin it so it keeps running for the rest of the bind.
    fn running_generation(
        &self,
        graph: &DepGraph,
        root: &TaskRef,
        root_id: &TaskId,
    ) -> Result<Option<Adopted>> {
        let mut seen = HashSet::new();
        let mut todo = vec![Arc::clone(root)];
        let mut found: Option<u64> = None;

        while let Some(task) = todo.pop() {
            let id = task.core().id();
            if !seen.insert(id.clone()) {
                continue;
            }
            let generation = task.core().sched.lock().generation_on(self.id);
            if let Some(g) = generation.filter(|&g| self.roots.is_running(g)) {
                let busy = || TaskGraphError::SubgraphBusy {
                    task: id.clone(),
                    root: RootName(self.roots.first_root(g)),
                };
                if &id == root_id {
                    return Err(busy());
                }
                match found {
                    None => found = Some(g),
                    Some(f) if f == g => {}
                    Some(_) => return Err(busy()),
                }
                // Its own upstream is part of the same generation.
                continue;
            }
            todo.extend(graph.links(&id, Link::Upstream));
        }

        let Some(generation) = found else {
            return Ok(None);
        };
        if !self.roots.pin(generation) {
            // Stopped since the scan; a fresh generation is safe.
            return Ok(None);
        }
        let cycle = self.roots.cycle(generation).unwrap_or_default();
        Ok(Some(Adopted { generation, cycle }))
    }

    fn bind_pass(
        &self,
        binder: &mut Binder,
        graph: &DepGraph,
        binding: &Binding,
        adopted: Option<Adopted>,
    ) -> Result<()> {
        let pass = binder.pass;

        while let Some(task) = binder.stack.last().cloned() {
            let core = task.core();
            let id = core.id();
            let mut st = core.sched.lock();

            if st.pass == pass && st.in_generation(binding) {
                // Already visited: one more downstream neighbour will
                // acknowledge it.
                st.dep_down_wait_init += 1;
                st.dep_down_wait += 1;
                st.on_stack = false;
                if binder.joined.contains(&id) {
                    binder.added_acks.push(Arc::clone(&task));
                }
                binder.stack.pop();
                continue;
            }

            if let Some(a) = adopted.filter(|a| a.has_member(&st, self)) {
                // Counters belong to the running generation; keep them.
                let state = st.state;
                match state {
                    TaskState::Idle | TaskState::Queued | TaskState::DepUpWait
                        if !a.completed(&st) =>
                    {
                        st.pass = pass;
                        st.on_stack = true;
                        binder.joined.insert(id.clone());
                        trace!(task = %id, generation = a.generation, "joined running generation");
                        continue;
                    }
                    _ => {
                        return Err(TaskGraphError::SubgraphBusy {
                            task: id,
                            root: RootName(st.binding.as_ref().and_then(|b| b.root())),
                        });
                    }
                }
            }

            if let Some(old) = st.binding.replace(binding.clone()) {
                old.release(&id);
            }
            st.pass = pass;
            st.dep_down_wait_init = 0;
            st.dep_down_wait = 0;
            st.on_stack = true;
            drop(st);
            binder.rebound.push(Arc::clone(&task));

            let mut pending = Vec::new();
            for up in graph.links(&id, Link::Upstream) {
                match self.check_upstream(&up, binding, pass, adopted) {
                    Upstream::Pending => pending.push(up),
                    Upstream::Satisfied => {}
                    Upstream::Active(root) => {
                        return Err(TaskGraphError::UpstreamActive {
                            task: up.core().id(),
                            root,
                            trace: self.trace(binder),
                        });
                    }
                    Upstream::OnStack => {
                        return Err(TaskGraphError::Cycle {
                            from: id.clone(),
                            to: up.core().id(),
                            trace: self.trace(binder),
                        });
                    }
                }
            }

            let mut st = core.sched.lock();
            st.dep_up_wait_init = pending.len();
            st.dep_up_wait = pending.len();
            drop(st);

            // Reverse order so the first declared edge is on top.
            binder.stack.extend(pending.into_iter().rev());
        }
        Ok(())
    }

    fn check_upstream(
        &self,
        up: &TaskRef,
        binding: &Binding,
        pass: u64,
        adopted: Option<Adopted>,
    ) -> Upstream {
        let st = up.core().sched.lock();
        if st.on_stack && st.pass == pass && st.in_generation(binding) {
            return Upstream::OnStack;
        }
        if let Some(a) = adopted.filter(|a| a.has_member(&st, self)) {
            // Members that have not run yet are joined, or rejected, when
            // the pass visits them.
            return if a.completed(&st) {
                Upstream::Satisfied
            } else {
                Upstream::Pending
            };
        }
        if st.state.is_active() {
            return Upstream::Active(RootName(st.binding.as_ref().and_then(|b| b.root())));
        }
        Upstream::Pending
    }

    /// Ids on the stack that are still being descended, innermost first.
    fn trace(&self, binder: &Binder) -> BindTrace {
        let mut seen = HashSet::new();
        let ids = binder
            .stack
            .iter()
            .rev()
            .filter(|t| t.core().sched.lock().on_stack)
            .map(|t| t.core().id())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        BindTrace(ids)
    }

    /// Undo the parts of a failed pass that other subgraphs can observe.
    fn abort_pass(&self, binder: &mut Binder, generation: u64, pinned: bool) {
        for task in binder.stack.drain(..) {
            task.core().sched.lock().on_stack = false;
        }
        binder.joined.clear();
        for task in binder.added_acks.drain(..) {
            let mut st = task.core().sched.lock();
            st.on_stack = false;
            st.dep_down_wait_init = st.dep_down_wait_init.saturating_sub(1);
            if st.ack_downstream() && st.state == TaskState::DepDownWait {
                finalize(&task, &mut st);
            }
        }
        for task in binder.rebound.drain(..) {
            let mut st = task.core().sched.lock();
            if st.generation_on(self.id) == Some(generation) {
                st.binding = None;
                st.on_stack = false;
                st.dep_up_wait_init = 0;
                st.dep_up_wait = 0;
                st.dep_down_wait_init = 0;
                st.dep_down_wait = 0;
            }
        }
        if pinned {
            self.roots.finish(generation);
        } else {
            self.roots.close(generation);
        }
    }
}

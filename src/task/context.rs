// src/task/context.rs

use std::fmt;

use tracing::info;

use crate::types::{SchedulerId, TaskId};

/// Handed to a task's functor while it runs: which task, on which worker of
/// which scheduler.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    task: &'a TaskId,
    worker: usize,
    scheduler: SchedulerId,
}

impl<'a> TaskContext<'a> {
    pub fn new(task: &'a TaskId, worker: usize, scheduler: SchedulerId) -> Self {
        Self {
            task,
            worker,
            scheduler,
        }
    }

    pub fn task_id(&self) -> &'a TaskId {
        self.task
    }

    pub fn worker_id(&self) -> usize {
        self.worker
    }

    pub fn scheduler_id(&self) -> SchedulerId {
        self.scheduler
    }

    /// Log a message tagged with the current task and worker.
    pub fn log(&self, msg: impl fmt::Display) {
        info!(
            task = %self.task,
            worker = self.worker,
            scheduler = %self.scheduler,
            "{msg}"
        );
    }
}

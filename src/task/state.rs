// src/task/state.rs

use std::fmt;

/// Lifecycle state of a task within one scheduling cycle.
///
/// `Idle -> Queued -> (DepUpWait -> Queued ->)* Exec -> DepDownWait -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Not active.
    #[default]
    Idle,
    /// Queued for execution.
    Queued,
    /// Queued but waiting for upstream tasks to complete.
    DepUpWait,
    /// Executing the functor.
    Exec,
    /// Functor done; waiting for downstream neighbours to acknowledge.
    DepDownWait,
}

impl TaskState {
    /// Every state except `Idle` counts as active.
    pub fn is_active(self) -> bool {
        self != TaskState::Idle
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Idle => "idle",
            TaskState::Queued => "queued",
            TaskState::DepUpWait => "depUpWait",
            TaskState::Exec => "exec",
            TaskState::DepDownWait => "depDownWait",
        };
        f.write_str(s)
    }
}

/// Snapshot of a task's wait counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitCounts {
    pub dep_up_wait_init: usize,
    pub dep_up_wait: usize,
    pub dep_down_wait_init: usize,
    pub dep_down_wait: usize,
}

impl WaitCounts {
    /// Whether both remaining counters are back at their initial values.
    pub fn is_reset(&self) -> bool {
        self.dep_up_wait == self.dep_up_wait_init && self.dep_down_wait == self.dep_down_wait_init
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_is_inactive() {
        assert!(!TaskState::Idle.is_active());
        for s in [
            TaskState::Queued,
            TaskState::DepUpWait,
            TaskState::Exec,
            TaskState::DepDownWait,
        ] {
            assert!(s.is_active(), "{s} should be active");
        }
    }
}

// src/errors.rs

//! Crate-wide error type and result alias.

use std::fmt;

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum TaskGraphError {
    #[error("bind failed: upstream cyclic dependency detected from task '{from}' to task '{to}'\ntask stack:\n{trace}")]
    Cycle {
        from: TaskId,
        to: TaskId,
        trace: BindTrace,
    },

    #[error("bind failed: upstream task '{task}' already active (its root: {root})\ntask stack:\n{trace}")]
    UpstreamActive {
        task: TaskId,
        root: RootName,
        trace: BindTrace,
    },

    #[error("task '{task}' belongs to a subgraph that is still running (its root: {root})")]
    SubgraphBusy { task: TaskId, root: RootName },

    #[error("task '{0}' is not registered with this scheduler")]
    NotRegistered(TaskId),

    #[error("task '{0}' must be unregistered prior to modifying")]
    TaskRegistered(TaskId),

    #[error("task '{0}' is active")]
    TaskActive(TaskId),

    #[error("future already retrieved")]
    FutureAlreadyRetrieved,

    #[error("promise already satisfied")]
    AlreadySatisfied,

    #[error("functor already invoked; reset required")]
    AlreadyInvoked,

    #[error("no shared state (result already taken)")]
    NoState,

    #[error("broken promise: dropped before a result was set")]
    BrokenPromise,

    #[error("task '{task}' panicked: {message}")]
    Panicked { task: TaskId, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl TaskGraphError {
    /// Structural errors are construction mistakes that retrying cannot fix.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TaskGraphError::Cycle { .. }
                | TaskGraphError::UpstreamActive { .. }
                | TaskGraphError::NotRegistered(_)
                | TaskGraphError::TaskRegistered(_)
        )
    }
}

/// Clones are needed to hand the same stored failure to several
/// [`SharedFuture`](crate::future::SharedFuture) readers.
impl Clone for TaskGraphError {
    fn clone(&self) -> Self {
        match self {
            Self::Cycle { from, to, trace } => Self::Cycle {
                from: from.clone(),
                to: to.clone(),
                trace: trace.clone(),
            },
            Self::UpstreamActive { task, root, trace } => Self::UpstreamActive {
                task: task.clone(),
                root: root.clone(),
                trace: trace.clone(),
            },
            Self::SubgraphBusy { task, root } => Self::SubgraphBusy {
                task: task.clone(),
                root: root.clone(),
            },
            Self::NotRegistered(id) => Self::NotRegistered(id.clone()),
            Self::TaskRegistered(id) => Self::TaskRegistered(id.clone()),
            Self::TaskActive(id) => Self::TaskActive(id.clone()),
            Self::FutureAlreadyRetrieved => Self::FutureAlreadyRetrieved,
            Self::AlreadySatisfied => Self::AlreadySatisfied,
            Self::AlreadyInvoked => Self::AlreadyInvoked,
            Self::NoState => Self::NoState,
            Self::BrokenPromise => Self::BrokenPromise,
            Self::Panicked { task, message } => Self::Panicked {
                task: task.clone(),
                message: message.clone(),
            },
            Self::ConfigError(msg) => Self::ConfigError(msg.clone()),
            Self::DagCycle(msg) => Self::DagCycle(msg.clone()),
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::TomlError(e) => Self::TomlError(e.clone()),
        }
    }
}

/// Ids of the tasks on the binding stack when a bind failed, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindTrace(pub Vec<TaskId>);

impl BindTrace {
    pub fn tasks(&self) -> &[TaskId] {
        &self.0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|t| t.as_str() == id)
    }
}

impl fmt::Display for BindTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            writeln!(f, "{i}. {id}")?;
        }
        Ok(())
    }
}

/// Root of an active task, which may be unknown when the task was bound by
/// another scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootName(pub Option<TaskId>);

impl fmt::Display for RootName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => write!(f, "'{id}'"),
            None => f.write_str("<unknown>"),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskGraphError>;

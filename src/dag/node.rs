// src/dag/node.rs

//! Edges declared by a single task.

use crate::types::TaskId;

/// A task's key plus the edges it declares.
///
/// - `upstream` ids are tasks this one depends on (they complete first).
/// - `downstream` ids are tasks that depend on this one.
///
/// Either side may name an id that is not registered yet; the edge becomes
/// live once both ends are registered with the same scheduler.
#[derive(Debug, Clone, Default)]
pub struct DepNode {
    id: TaskId,
    upstream: Vec<TaskId>,
    downstream: Vec<TaskId>,
}

impl DepNode {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            upstream: Vec::new(),
            downstream: Vec::new(),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: TaskId) {
        self.id = id;
    }

    /// Declare that this task depends on `upstream`.
    pub fn add(&mut self, upstream: impl Into<TaskId>) -> &mut Self {
        let id = upstream.into();
        if !self.upstream.contains(&id) {
            self.upstream.push(id);
        }
        self
    }

    /// Declare that `downstream` depends on this task.
    pub fn add_dependent(&mut self, downstream: impl Into<TaskId>) -> &mut Self {
        let id = downstream.into();
        if !self.downstream.contains(&id) {
            self.downstream.push(id);
        }
        self
    }

    /// Remove every declared edge to or from `id`. Returns whether any existed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.upstream.len() + self.downstream.len();
        self.upstream.retain(|t| t.as_str() != id);
        self.downstream.retain(|t| t.as_str() != id);
        before != self.upstream.len() + self.downstream.len()
    }

    pub fn clear(&mut self) {
        self.upstream.clear();
        self.downstream.clear();
    }

    /// Declared upstream ids, in declaration order.
    pub fn upstream(&self) -> &[TaskId] {
        &self.upstream
    }

    /// Declared downstream ids, in declaration order.
    pub fn downstream(&self) -> &[TaskId] {
        &self.downstream
    }
}

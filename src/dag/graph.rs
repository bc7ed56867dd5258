// src/dag/graph.rs

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::dag::node::DepNode;
use crate::task::TaskRef;
use crate::types::TaskId;

/// Which side of a vertex to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Tasks this one depends on (outgoing edges).
    Upstream,
    /// Tasks that depend on this one (incoming edges).
    Downstream,
}

impl From<Link> for Direction {
    fn from(link: Link) -> Self {
        match link {
            Link::Upstream => Direction::Outgoing,
            Link::Downstream => Direction::Incoming,
        }
    }
}

/// A vertex exists while a task is registered under its id or while some
/// registered task declares an edge to it.
struct Vertex {
    id: TaskId,
    task: Option<TaskRef>,
}

/// Edge `a -> b` means "a depends on b".
#[derive(Debug, Clone, Copy)]
struct DepEdge {
    /// How many declarations (from either end) hold this edge alive.
    refs: u32,
    /// Insertion order, so neighbours come back in declaration order.
    seq: u64,
}

/// Keyed dependency graph: the registration table of one scheduler.
///
/// Backed by a `petgraph` stable graph so vertex indices survive removals.
#[derive(Default)]
pub struct DepGraph {
    graph: StableDiGraph<Vertex, DepEdge>,
    index: HashMap<TaskId, NodeIndex>,
    next_seq: u64,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `task` keyed by `node.id()` and link its declared edges.
    ///
    /// Returns `false` on a null id or if the id is already registered.
    pub fn add(&mut self, task: TaskRef, node: &DepNode) -> bool {
        if node.id().is_null() {
            return false;
        }
        if self.task(node.id()).is_some() {
            return false;
        }

        let idx = self.ensure_vertex(node.id());
        self.graph[idx].task = Some(task);

        for up in node.upstream() {
            let up_idx = self.ensure_vertex(up);
            self.link(idx, up_idx);
        }
        for down in node.downstream() {
            let down_idx = self.ensure_vertex(down);
            self.link(down_idx, idx);
        }
        true
    }

    /// Remove `task` and the edges it declared. Returns `false` if this exact
    /// task is not registered here.
    pub fn remove(&mut self, task: &TaskRef, node: &DepNode) -> bool {
        let Some(&idx) = self.index.get(node.id()) else {
            return false;
        };
        match &self.graph[idx].task {
            Some(registered) if same_task(registered, task) => {}
            _ => return false,
        }
        self.graph[idx].task = None;

        let mut touched = vec![idx];
        for up in node.upstream() {
            if let Some(&up_idx) = self.index.get(up) {
                self.unlink(idx, up_idx);
                touched.push(up_idx);
            }
        }
        for down in node.downstream() {
            if let Some(&down_idx) = self.index.get(down) {
                self.unlink(down_idx, idx);
                touched.push(down_idx);
            }
        }
        for t in touched {
            self.prune(t);
        }
        true
    }

    /// The task registered under `id`, if any.
    pub fn task(&self, id: &TaskId) -> Option<&TaskRef> {
        let idx = self.index.get(id)?;
        self.graph.node_weight(*idx)?.task.as_ref()
    }

    /// Whether this exact task instance is registered here.
    pub fn contains(&self, task: &TaskRef) -> bool {
        let id = task.core().id();
        self.task(&id).is_some_and(|t| same_task(t, task))
    }

    /// Registered neighbours of `id` on the given side, in declaration order.
    pub fn links(&self, id: &TaskId, link: Link) -> Vec<TaskRef> {
        self.neighbours(id, link)
            .into_iter()
            .filter_map(|idx| self.graph[idx].task.clone())
            .collect()
    }

    /// Ids of registered neighbours of `id` on the given side.
    pub fn link_ids(&self, id: &TaskId, link: Link) -> Vec<TaskId> {
        self.neighbours(id, link)
            .into_iter()
            .filter(|idx| self.graph[*idx].task.is_some())
            .map(|idx| self.graph[idx].id.clone())
            .collect()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.graph
            .node_weights()
            .filter(|v| v.task.is_some())
            .count()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn neighbours(&self, id: &TaskId, link: Link) -> Vec<NodeIndex> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let direction = Direction::from(link);
        let mut found: Vec<(u64, NodeIndex)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (e.weight().seq, other)
            })
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, idx)| idx).collect()
    }

    fn ensure_vertex(&mut self, id: &TaskId) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(Vertex {
            id: id.clone(),
            task: None,
        });
        self.index.insert(id.clone(), idx);
        idx
    }

    fn link(&mut self, from: NodeIndex, to: NodeIndex) {
        if let Some(e) = self.graph.find_edge(from, to) {
            self.graph[e].refs += 1;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.graph.add_edge(from, to, DepEdge { refs: 1, seq });
    }

    fn unlink(&mut self, from: NodeIndex, to: NodeIndex) {
        let Some(e) = self.graph.find_edge(from, to) else {
            return;
        };
        let edge = &mut self.graph[e];
        edge.refs = edge.refs.saturating_sub(1);
        if edge.refs == 0 {
            self.graph.remove_edge(e);
        }
    }

    /// Drop a vertex nobody refers to anymore.
    fn prune(&mut self, idx: NodeIndex) {
        let Some(vertex) = self.graph.node_weight(idx) else {
            return;
        };
        if vertex.task.is_some() || self.graph.neighbors_undirected(idx).next().is_some() {
            return;
        }
        if let Some(vertex) = self.graph.remove_node(idx) {
            self.index.remove(&vertex.id);
        }
    }
}

/// Identity comparison on the task record, ignoring vtable pointers.
pub(crate) fn same_task(a: &TaskRef, b: &TaskRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn task(id: &str, deps: &[&str]) -> (Task<()>, DepNode) {
        let t = Task::new(id, || ());
        {
            let mut node = t.deps().unwrap();
            for d in deps {
                node.add(*d);
            }
        }
        let node = t.dep_node();
        (t, node)
    }

    fn ids(list: Vec<TaskId>) -> Vec<String> {
        list.into_iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn links_resolve_once_both_ends_are_registered() {
        let mut graph = DepGraph::new();
        let (a, a_node) = task("a", &["c", "b"]);
        let (b, b_node) = task("b", &[]);

        assert!(graph.add(a.task_ref(), &a_node));
        // "c" and "b" only exist as placeholders so far.
        assert!(graph.links(&TaskId::from("a"), Link::Upstream).is_empty());

        assert!(graph.add(b.task_ref(), &b_node));
        assert_eq!(ids(graph.link_ids(&TaskId::from("a"), Link::Upstream)), ["b"]);
        assert_eq!(ids(graph.link_ids(&TaskId::from("b"), Link::Downstream)), ["a"]);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn upstream_order_follows_declaration_order() {
        let mut graph = DepGraph::new();
        let (root, root_node) = task("root", &["x", "y", "z"]);
        for id in ["z", "y", "x"] {
            let (t, n) = task(id, &[]);
            assert!(graph.add(t.task_ref(), &n));
        }
        assert!(graph.add(root.task_ref(), &root_node));

        assert_eq!(
            ids(graph.link_ids(&TaskId::from("root"), Link::Upstream)),
            ["x", "y", "z"]
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut graph = DepGraph::new();
        let (a1, n1) = task("a", &[]);
        let (a2, n2) = task("a", &[]);
        assert!(graph.add(a1.task_ref(), &n1));
        assert!(!graph.add(a2.task_ref(), &n2));
        assert!(!graph.remove(&a2.task_ref(), &n2));
        assert!(graph.contains(&a1.task_ref()));
        assert!(!graph.contains(&a2.task_ref()));
    }

    #[test]
    fn edge_declared_from_both_ends_survives_one_removal() {
        let mut graph = DepGraph::new();
        let (a, a_node) = task("a", &["b"]);
        let b = Task::new("b", || ());
        b.deps().unwrap().add_dependent("a");
        let b_node = b.dep_node();

        assert!(graph.add(a.task_ref(), &a_node));
        assert!(graph.add(b.task_ref(), &b_node));
        assert!(graph.remove(&a.task_ref(), &a_node));
        assert!(graph.add(a.task_ref(), &DepNode::new("a")));

        // b still declares the edge.
        assert_eq!(ids(graph.link_ids(&TaskId::from("a"), Link::Upstream)), ["b"]);
    }

    #[test]
    fn removal_prunes_unreferenced_vertices() {
        let mut graph = DepGraph::new();
        let (a, a_node) = task("a", &["ghost"]);
        assert!(graph.add(a.task_ref(), &a_node));
        assert!(graph.remove(&a.task_ref(), &a_node));
        assert!(graph.is_empty());
        assert!(graph.index.is_empty());
        assert!(!graph.remove(&a.task_ref(), &a_node));
    }

    #[test]
    fn null_id_is_rejected() {
        let mut graph = DepGraph::new();
        let t = Task::new(TaskId::default(), || ());
        assert!(!graph.add(t.task_ref(), &t.dep_node()));
    }
}

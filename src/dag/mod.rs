// src/dag/mod.rs

//! Dependency graph representation.
//!
//! - [`node`] holds the edges a single task declares.
//! - [`graph`] is the keyed, petgraph-backed registration table each
//!   scheduler resolves those declarations through.

pub mod graph;
pub mod node;

pub use graph::{DepGraph, Link};
pub use node::DepNode;

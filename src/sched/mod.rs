// src/sched/mod.rs

//! The task scheduler.
//!
//! - [`scheduler`] owns the worker pool and the registration table and
//!   implements `reg` / `unreg` / `enqueue`.
//! - `bind` computes wait counters for a root's upstream closure.
//! - `roots` maps bind generations to their roots.
//! - `worker` runs the per-thread scheduling loop.

mod bind;
pub(crate) mod roots;
pub mod scheduler;
mod worker;

pub use scheduler::Scheduler;

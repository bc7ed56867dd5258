// src/future/mod.rs

//! Result channel between a task's functor and whoever waits on it.
//!
//! - [`promise`] holds the write side and the shared state both halves see.
//! - [`future`] holds the read side: a unique [`Future`] and a clonable
//!   [`SharedFuture`].
//! - [`packaged`] wraps a functor so that invoking it fills a promise; the
//!   scheduler invokes with a delayed ready and publishes on finalize.

pub mod future;
pub mod packaged;
pub mod promise;

pub use future::{Future, FutureStatus, SharedFuture};
pub use packaged::PackagedTask;
pub use promise::Promise;

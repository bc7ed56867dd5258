// src/future/future.rs

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::Result;
use crate::future::promise::State;

/// Outcome of a bounded wait on a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    /// The result is ready.
    Ready,
    /// The timeout expired first.
    Timeout,
}

/// Unique read side of the result channel.
pub struct Future<R> {
    state: Arc<State<R>>,
}

impl<R> Future<R> {
    pub(crate) fn new(state: Arc<State<R>>) -> Self {
        Self { state }
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Block until the result is ready.
    pub fn wait(&self) {
        self.state.wait_until(None);
    }

    pub fn wait_for(&self, timeout: Duration) -> FutureStatus {
        self.state.wait_until(Some(Instant::now() + timeout))
    }

    pub fn wait_until(&self, deadline: Instant) -> FutureStatus {
        self.state.wait_until(Some(deadline))
    }

    /// Wait for and take the result, returning any stored error.
    pub fn get(self) -> Result<R> {
        self.state.take()
    }

    /// Convert into a future that many readers can clone and wait on.
    pub fn share(self) -> SharedFuture<R> {
        SharedFuture { state: self.state }
    }
}

impl<R> fmt::Debug for Future<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Clonable read side; every clone observes the same result.
pub struct SharedFuture<R> {
    state: Arc<State<R>>,
}

impl<R> SharedFuture<R> {
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn wait(&self) {
        self.state.wait_until(None);
    }

    pub fn wait_for(&self, timeout: Duration) -> FutureStatus {
        self.state.wait_until(Some(Instant::now() + timeout))
    }

    pub fn get(&self) -> Result<R>
    where
        R: Clone,
    {
        self.state.peek()
    }
}

impl<R> Clone for SharedFuture<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<R> fmt::Debug for SharedFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::future::Promise;

    #[test]
    fn shared_future_serves_every_clone() {
        let promise = Promise::new();
        let shared = promise.future().unwrap().share();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let f = shared.clone();
                thread::spawn(move || f.get().unwrap())
            })
            .collect();

        promise.set_value(String::from("hello")).unwrap();
        for r in readers {
            assert_eq!(r.join().unwrap(), "hello");
        }
        assert_eq!(shared.get().unwrap(), "hello");
    }
}

use std::sync::Arc;

use parking_lot::Mutex;

/// Thread-safe log of task executions, shared by every functor of a test
/// graph. Clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.events.lock().push(name.to_string());
    }

    /// Everything recorded so far, oldest first.
    pub fn order(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|n| *n == name).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Index of the first record of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.events.lock().iter().position(|n| n == name)
    }

    /// Panics unless `first` was recorded before `then`.
    pub fn assert_before(&self, first: &str, then: &str) {
        let order = self.order();
        let a = order.iter().position(|n| n == first);
        let b = order.iter().position(|n| n == then);
        match (a, b) {
            (Some(a), Some(b)) => assert!(
                a < b,
                "expected '{first}' before '{then}', got {order:?}"
            ),
            _ => panic!("expected both '{first}' and '{then}' in {order:?}"),
        }
    }
}

#![allow(dead_code)]

use std::sync::mpsc::{self, Receiver, Sender};

use taskgraph::Scheduler;

pub use taskgraph_test_utils::builders::{Graph, GraphBuilder};
pub use taskgraph_test_utils::{Recorder, eventually, init_tracing, wait_ready};

/// Scheduler for a test, with tracing installed.
pub fn sched(workers: usize, capacity: usize) -> Scheduler {
    init_tracing();
    Scheduler::new(workers, capacity).expect("valid scheduler shape")
}

/// Holds a functor until the test lets it go. Dropping the gate releases
/// every blocked functor.
pub struct Gate {
    tx: Sender<()>,
}

impl Gate {
    /// Release one blocked (or future) call of the blocker.
    pub fn open(&self) {
        let _ = self.tx.send(());
    }
}

/// A gate and the functor body it controls.
pub fn gate() -> (Gate, impl FnMut() + Send + 'static) {
    let (tx, rx): (Sender<()>, Receiver<()>) = mpsc::channel();
    (Gate { tx }, move || {
        let _ = rx.recv();
    })
}

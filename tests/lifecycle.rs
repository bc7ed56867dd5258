mod common;

use std::sync::Arc;

use common::*;
use parking_lot::Mutex;
use taskgraph::{Scheduler, Task, TaskContext, TaskGraphError, TaskState};

#[test]
fn panicking_task_fails_only_its_own_future() {
    let rec = Recorder::new();
    let graph = GraphBuilder::new(&rec)
        .task("a", &[])
        .task_with("b", &["a"], || panic!("boom"))
        .task("c", &["b"])
        .build();
    let sched = sched(2, 5);
    graph.register(&sched);

    for _ in 0..2 {
        let b_done = graph.get("b").future().unwrap();
        let c_done = graph.get("c").future().unwrap();
        assert!(sched.enqueue(graph.get("c")).unwrap());

        assert_eq!(wait_ready(c_done).unwrap(), "c");
        match wait_ready(b_done) {
            Err(TaskGraphError::Panicked { task, message }) => {
                assert_eq!(task.as_str(), "b");
                assert_eq!(message, "boom");
            }
            other => panic!("expected a captured panic, got {other:?}"),
        }
        for task in graph.tasks() {
            assert_eq!(task.state(), TaskState::Idle);
            assert!(task.wait_counts().is_reset());
        }
    }
    assert_eq!(rec.order(), ["a", "b", "c", "a", "b", "c"]);
}

#[test]
fn edges_and_id_are_frozen_while_registered() {
    let sched = sched(1, 5);
    let a = Task::new("a", || 1);
    assert!(sched.reg(&a));

    assert!(matches!(a.deps(), Err(TaskGraphError::TaskRegistered(ref id)) if id.as_str() == "a"));
    assert!(matches!(a.set_id("b"), Err(TaskGraphError::TaskRegistered(_))));

    assert!(sched.unreg(&a));
    a.set_id("b").unwrap();
    assert!(sched.reg(&a));
    assert!(sched.is_registered("b"));
    assert!(!sched.is_registered("a"));
}

#[test]
fn registration_is_tracked_per_scheduler() {
    let first = sched(1, 5);
    let second = sched(1, 5);
    let a = Task::new("a", || ());

    assert!(first.reg(&a));
    assert!(second.reg(&a));
    assert!(second.unreg(&a));
    assert_eq!(first.task_count(), 1);
    assert_eq!(second.task_count(), 0);
    assert!(a.is_registered());
    assert!(a.deps().is_err());

    assert!(first.unreg(&a));
    assert!(!a.is_registered());
    assert!(a.deps().is_ok());
}

#[test]
fn graph_moves_to_another_scheduler() {
    let rec = Recorder::new();
    let graph = GraphBuilder::new(&rec).task("a", &[]).task("b", &["a"]).build();
    let first = sched(1, 5);
    graph.register(&first);
    assert_eq!(graph.names().collect::<Vec<_>>(), ["a", "b"]);
    assert!(graph.names().all(|name| first.is_registered(name)));

    graph.unregister(&first);
    assert_eq!(first.task_count(), 0);
    assert!(graph.tasks().all(|t| !t.is_registered() && t.deps().is_ok()));

    let second = sched(2, 5);
    graph.register(&second);
    let done = graph.get("b").future().unwrap();
    assert!(second.enqueue(graph.get("b")).unwrap());
    assert_eq!(wait_ready(done).unwrap(), "b");
    assert_eq!(rec.order(), ["a", "b"]);
}

#[test]
fn edges_may_be_declared_from_either_side() {
    let sched = sched(2, 5);
    let rec = Recorder::new();
    let (r1, r2) = (rec.clone(), rec.clone());
    let up = Task::new("up", move || r1.record("up"));
    let down = Task::new("down", move || r2.record("down"));
    up.deps().unwrap().add_dependent(&down);
    down.deps().unwrap().add(&up);

    assert!(sched.reg(&up));
    assert!(sched.reg(&down));
    assert_eq!(sched.upstream_of("down"), [taskgraph::TaskId::from("up")]);
    assert_eq!(sched.downstream_of("up"), [taskgraph::TaskId::from("down")]);

    // Dropping one declaration keeps the edge alive.
    assert!(sched.unreg(&up));
    up.deps().unwrap().clear();
    assert!(sched.reg(&up));
    assert_eq!(sched.upstream_of("down"), [taskgraph::TaskId::from("up")]);

    let done = down.future().unwrap();
    assert!(sched.enqueue(&down).unwrap());
    wait_ready(done).unwrap();
    assert_eq!(rec.order(), ["up", "down"]);
}

#[test]
fn unregistering_an_active_task_is_refused() {
    let rec = Recorder::new();
    let (gate, blocker) = gate();
    let graph = GraphBuilder::new(&rec).task_with("slow", &[], blocker).build();
    let sched = sched(1, 5);
    graph.register(&sched);

    let slow = graph.get("slow");
    let done = slow.future().unwrap();
    assert!(sched.enqueue(slow).unwrap());
    assert!(!sched.unreg(slow));
    assert!(matches!(
        slow.set_functor(|| String::from("other")),
        Err(TaskGraphError::TaskActive(_))
    ));

    gate.open();
    wait_ready(done).unwrap();
    assert!(sched.unreg(slow));
    assert!(matches!(
        sched.enqueue(slow),
        Err(TaskGraphError::NotRegistered(_))
    ));
}

#[test]
fn replaced_functor_is_used_on_the_next_cycle() {
    let sched = sched(1, 5);
    let task = Task::new("t", || 1);
    assert!(sched.reg(&task));

    let done = task.future().unwrap();
    assert!(sched.enqueue(&task).unwrap());
    assert_eq!(wait_ready(done).unwrap(), 1);

    task.set_functor(|| 2).unwrap();
    let done = task.future().unwrap();
    assert!(sched.enqueue(&task).unwrap());
    assert_eq!(wait_ready(done).unwrap(), 2);
}

#[test]
fn functor_sees_its_context() {
    let sched = sched(3, 5);
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let task = Task::with_context("ctx", move |ctx: &TaskContext<'_>| {
        ctx.log("checking context");
        *sink.lock() = Some((ctx.task_id().clone(), ctx.worker_id(), ctx.scheduler_id()));
    });
    assert!(sched.reg(&task));

    let done = task.future().unwrap();
    assert!(sched.enqueue(&task).unwrap());
    wait_ready(done).unwrap();

    let (id, worker, scheduler) = seen.lock().clone().expect("functor ran");
    assert_eq!(id.as_str(), "ctx");
    assert!(worker < sched.worker_count());
    assert_eq!(scheduler, sched.id());
}

#[test]
fn global_scheduler_uses_the_default_shape() {
    let global = Scheduler::global().unwrap();
    assert_eq!(global.worker_count(), 2);
    assert_eq!(global.queue_capacity(), 5);
    assert_eq!(Scheduler::global().unwrap().id(), global.id());

    let task = Task::new("lifecycle-global", || "done");
    assert!(global.reg(&task));
    let done = task.future().unwrap();
    assert!(global.enqueue(&task).unwrap());
    assert_eq!(wait_ready(done).unwrap(), "done");
    assert!(global.unreg(&task));
}

#[test]
fn invalid_scheduler_shape_is_rejected() {
    assert!(Scheduler::new(0, 5).is_err());
    assert!(Scheduler::new(2, 0).is_err());
}

// src/lib.rs

//! In-process task-graph scheduler.
//!
//! Tasks declare "depends on" edges, get registered with a [`Scheduler`],
//! and one of them is enqueued as a root. The scheduler binds the root's
//! upstream closure, runs every task in it exactly once on its worker pool
//! in dependency order, and resolves each task's [`Future`] as it finishes.
//!
//! ```no_run
//! use taskgraph::{Scheduler, Task};
//!
//! let sched = Scheduler::new(2, 5)?;
//! let fetch = Task::new("fetch", || 40);
//! let build = Task::new("build", || 2);
//! build.deps()?.add(&fetch);
//!
//! sched.reg(&fetch);
//! sched.reg(&build);
//! let done = build.future()?;
//! sched.enqueue(&build)?;
//! assert_eq!(done.get()?, 2);
//! # Ok::<(), taskgraph::TaskGraphError>(())
//! ```

pub mod cli;
pub mod config;
pub(crate) mod dag;
pub mod errors;
pub mod future;
pub mod logging;
pub mod sched;
pub mod task;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, bail};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub use dag::DepNode;
pub use errors::{Result, TaskGraphError};
pub use future::{Future, FutureStatus, PackagedTask, Promise, SharedFuture};
pub use sched::Scheduler;
pub use task::{Task, TaskContext, TaskState, WaitCounts};
pub use types::{SchedulerId, TaskId};

use crate::cli::CliArgs;
use crate::config::model::ConfigFile;

/// High-level entry point used by `main.rs`.
///
/// Builds one task per `[task.<name>]` section, registers them with a
/// scheduler shaped by `[scheduler]`, then enqueues the roots and waits for
/// them, `args.repeat` times.
pub fn run(args: &CliArgs, cfg: &ConfigFile) -> anyhow::Result<()> {
    let roots = select_roots(cfg, &args.roots)?;

    if args.dry_run {
        print_dry_run(cfg, &roots);
        return Ok(());
    }
    if cfg.task.is_empty() {
        bail!("config must contain at least one [task.<name>] section");
    }

    let scheduler = Scheduler::from_config(&cfg.scheduler)?;
    let order = Arc::new(Mutex::new(Vec::new()));
    let tasks = build_tasks(cfg, &order)?;
    for task in tasks.values() {
        if !scheduler.reg(task) {
            bail!("failed to register task '{}'", task.id());
        }
    }
    info!(?roots, tasks = tasks.len(), "task graph registered");

    for cycle in 1..=args.repeat.max(1) {
        run_roots(&scheduler, &tasks, &roots)?;
        let order = std::mem::take(&mut *order.lock());
        println!("run {cycle}: {}", order.join(" -> "));
    }
    Ok(())
}

/// Enqueue every root and wait for all of them.
///
/// A root whose upstream is shared with a subgraph that already started
/// running is retried once the roots before it finish.
fn run_roots(
    scheduler: &Scheduler,
    tasks: &BTreeMap<String, Task<String>>,
    roots: &[String],
) -> anyhow::Result<()> {
    let mut pending = Vec::new();
    for name in roots {
        let task = &tasks[name];
        let future = task.future()?;
        let queued = match scheduler.enqueue(task) {
            Err(TaskGraphError::SubgraphBusy { .. }) => {
                debug!(task = %name, "upstream busy; waiting for earlier roots");
                wait_all(std::mem::take(&mut pending));
                scheduler.enqueue(task)?
            }
            other => other?,
        };
        if queued {
            pending.push((name.clone(), future));
        } else {
            warn!(task = %name, "root already active; skipped");
        }
    }
    wait_all(pending);
    Ok(())
}

fn wait_all(pending: Vec<(String, Future<String>)>) {
    for (name, future) in pending {
        match future.get() {
            Ok(_) => debug!(task = %name, "root finished"),
            Err(e) => println!("{name}: {e}"),
        }
    }
}

fn build_tasks(
    cfg: &ConfigFile,
    order: &Arc<Mutex<Vec<String>>>,
) -> anyhow::Result<BTreeMap<String, Task<String>>> {
    let mut tasks = BTreeMap::new();
    for (name, tc) in cfg.task.iter() {
        let order = Arc::clone(order);
        let id = name.clone();
        let sleep = Duration::from_millis(tc.sleep_ms);
        let fail = tc.fail;

        let task = Task::with_context(name.as_str(), move |ctx: &TaskContext<'_>| {
            if !sleep.is_zero() {
                thread::sleep(sleep);
            }
            ctx.log("running");
            order.lock().push(id.clone());
            if fail {
                panic!("task '{id}' is configured to fail");
            }
            id.clone()
        });
        {
            let mut deps = task
                .deps()
                .with_context(|| format!("declaring dependencies of '{name}'"))?;
            for dep in &tc.after {
                deps.add(dep.as_str());
            }
        }
        tasks.insert(name.clone(), task);
    }
    Ok(tasks)
}

/// Requested roots, or every task nothing else depends on.
fn select_roots(cfg: &ConfigFile, requested: &[String]) -> anyhow::Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(cfg.sink_tasks().into_iter().map(str::to_string).collect());
    }
    for name in requested {
        if !cfg.task.contains_key(name) {
            bail!("unknown root task '{name}'");
        }
    }
    Ok(requested.to_vec())
}

/// Print the scheduler shape, tasks and roots without running anything.
fn print_dry_run(cfg: &ConfigFile, roots: &[String]) {
    println!("taskgraph dry-run");
    println!("  scheduler.worker_count = {}", cfg.scheduler.worker_count);
    println!(
        "  scheduler.worker_queue_capacity = {}",
        cfg.scheduler.worker_queue_capacity
    );
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name}");
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if task.sleep_ms > 0 {
            println!("      sleep_ms: {}", task.sleep_ms);
        }
        if task.fail {
            println!("      fail: true");
        }
    }
    println!();
    println!("roots: {roots:?}");

    debug!("dry-run complete (no execution)");
}

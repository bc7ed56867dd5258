use std::collections::BTreeMap;

use taskgraph::config::{ConfigFile, RawConfigFile, SchedulerConfig, TaskConfig};
use taskgraph::{Scheduler, Task};

use crate::recorder::Recorder;

/// Builder for a set of `Task<String>` whose functors record their own name
/// in a shared [`Recorder`] and return it.
pub struct GraphBuilder {
    recorder: Recorder,
    tasks: BTreeMap<String, Task<String>>,
}

impl GraphBuilder {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            tasks: BTreeMap::new(),
        }
    }

    /// Add `name`, depending on every task in `after`.
    pub fn task(self, name: &str, after: &[&str]) -> Self {
        self.task_with(name, after, || {})
    }

    /// Like [`task`](Self::task), but the functor runs `extra` after
    /// recording. Use it to block, sleep or panic.
    pub fn task_with<F>(mut self, name: &str, after: &[&str], mut extra: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let recorder = self.recorder.clone();
        let id = name.to_string();
        let task = Task::new(name, move || {
            recorder.record(&id);
            extra();
            id.clone()
        });
        {
            let mut deps = task.deps().expect("fresh task is unregistered");
            for dep in after {
                deps.add(*dep);
            }
        }
        self.tasks.insert(name.to_string(), task);
        self
    }

    pub fn build(self) -> Graph {
        Graph { tasks: self.tasks }
    }
}

/// Tasks built by [`GraphBuilder`], keyed by name.
pub struct Graph {
    tasks: BTreeMap<String, Task<String>>,
}

impl Graph {
    pub fn get(&self, name: &str) -> &Task<String> {
        self.tasks
            .get(name)
            .unwrap_or_else(|| panic!("no task named '{name}' in test graph"))
    }

    /// Register every task, panicking on rejection.
    pub fn register(&self, sched: &Scheduler) {
        for (name, task) in &self.tasks {
            assert!(sched.reg(task), "registration of '{name}' rejected");
        }
    }

    pub fn unregister(&self, sched: &Scheduler) {
        for (name, task) in &self.tasks {
            assert!(sched.unreg(task), "unregistration of '{name}' rejected");
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task<String>> {
        self.tasks.values()
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_workers(mut self, worker_count: usize, worker_queue_capacity: usize) -> Self {
        self.config.scheduler = SchedulerConfig {
            worker_count,
            worker_queue_capacity,
        };
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn sleep_ms(mut self, ms: u64) -> Self {
        self.task.sleep_ms = ms;
        self
    }

    pub fn fail(mut self) -> Self {
        self.task.fail = true;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

impl Default for TaskConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

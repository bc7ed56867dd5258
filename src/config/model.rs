// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::cli::LogLevel;

/// Configuration exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [scheduler]
/// worker_count = 4
/// worker_queue_capacity = 5
///
/// [logging]
/// level = "debug"
///
/// [task.build]
/// after = ["fetch"]
/// sleep_ms = 20
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingSection,

    /// All tasks from `[task.<name>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Build one with `ConfigFile::try_from(raw)` or
/// [`load_and_validate`](crate::config::load_and_validate).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerConfig,
    pub logging: LoggingSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        scheduler: SchedulerConfig,
        logging: LoggingSection,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            scheduler,
            logging,
            task,
        }
    }

    /// Tasks that no other task lists in `after`.
    pub fn sink_tasks(&self) -> Vec<&str> {
        self.task
            .keys()
            .filter(|name| !self.task.values().any(|t| t.after.contains(name)))
            .map(String::as_str)
            .collect()
    }
}

/// `[scheduler]` section: worker pool shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Number of worker threads, fixed for the scheduler's lifetime.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Tasks a worker queue holds before new work spills into the shared
    /// overflow queue.
    #[serde(default = "default_worker_queue_capacity")]
    pub worker_queue_capacity: usize,
}

fn default_worker_count() -> usize {
    2
}

fn default_worker_queue_capacity() -> usize {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            worker_queue_capacity: default_worker_queue_capacity(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSection {
    /// Used when no level is given on the command line.
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// `[task.<name>]` section, used by the demo runner.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// This task runs after every task listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Simulated work.
    #[serde(default)]
    pub sleep_ms: u64,

    /// Make the functor panic, to watch the failure reach only this task's
    /// future.
    #[serde(default)]
    pub fail: bool,
}

// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile, SchedulerConfig};
use crate::errors::{Result, TaskGraphError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskGraphError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.scheduler, raw.logging, raw.task))
    }
}

impl SchedulerConfig {
    /// Build a validated scheduler config.
    pub fn new(worker_count: usize, worker_queue_capacity: usize) -> Result<Self> {
        let cfg = Self {
            worker_count,
            worker_queue_capacity,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(TaskGraphError::ConfigError(
                "[scheduler].worker_count must be >= 1 (got 0)".to_string(),
            ));
        }
        if self.worker_queue_capacity == 0 {
            return Err(TaskGraphError::ConfigError(
                "[scheduler].worker_queue_capacity must be >= 1 (got 0)".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    cfg.scheduler.validate()?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if name.is_empty() {
            return Err(TaskGraphError::ConfigError(
                "task names must not be empty".to_string(),
            ));
        }
        for dep in task.after.iter() {
            if dep == name {
                return Err(TaskGraphError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(TaskGraphError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task, so
    //   [task.B]
    //   after = ["A"]
    // adds A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(TaskGraphError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_str;

    #[test]
    fn zero_workers_is_rejected() {
        let err = SchedulerConfig::new(0, 5).unwrap_err();
        assert!(err.to_string().contains("worker_count"));
        assert!(SchedulerConfig::new(1, 0).is_err());
        assert!(SchedulerConfig::new(3, 1).is_ok());
    }

    #[test]
    fn unknown_and_self_dependencies_are_rejected() {
        let unknown = "[task.a]\nafter = [\"ghost\"]\n";
        let err = ConfigFile::try_from(parse_str(unknown).unwrap()).unwrap_err();
        assert!(err.to_string().contains("ghost"));

        let selfish = "[task.a]\nafter = [\"a\"]\n";
        let err = ConfigFile::try_from(parse_str(selfish).unwrap()).unwrap_err();
        assert!(err.to_string().contains("itself"));
    }

    #[test]
    fn cycles_are_rejected() {
        let text = r#"
            [task.a]
            after = ["b"]
            [task.b]
            after = ["c"]
            [task.c]
            after = ["a"]
        "#;
        let err = ConfigFile::try_from(parse_str(text).unwrap()).unwrap_err();
        assert!(matches!(err, TaskGraphError::DagCycle(_)));
    }
}

// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::config::default_config_path;

/// Command-line arguments for the `taskgraph` demo runner.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskgraph",
    version,
    about = "Run a task dependency graph from a TOML file on a worker pool.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Taskgraph.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Enqueue this task as root. May be repeated.
    ///
    /// If omitted, every task that no other task depends on is a root.
    #[arg(long = "root", value_name = "NAME")]
    pub roots: Vec<String>,

    /// Run the graph this many times, reusing the same tasks.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub repeat: usize,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `[logging].level`, then `TASKGRAPH_LOG`, then a default
    /// level is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the graph, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI and in `[logging]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_may_be_repeated() {
        let args = CliArgs::parse_from([
            "taskgraph",
            "--root",
            "a",
            "--root",
            "b",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.roots, ["a", "b"]);
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert_eq!(args.config, PathBuf::from("Taskgraph.toml"));
        assert_eq!(args.repeat, 1);
        assert!(!args.dry_run);
    }
}

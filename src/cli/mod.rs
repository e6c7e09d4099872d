//! CLI command definitions for task-store
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod subtask;
pub mod task;

use crate::format::OutputFormat;
use crate::types::WorkflowState;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use subtask::SubtaskCommand;
use task::{CreateArgs, ListArgs, UpdateArgs};

/// File-backed task store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project root (overrides TASK_STORE_ROOT and the registry)
    #[arg(short, long, global = true, env = "TASK_STORE_ROOT")]
    pub root: Option<PathBuf>,

    /// Registered project name from the projects registry
    #[arg(short, long, global = true)]
    pub project: Option<String>,

    /// Path to the projects registry (default: ~/.task-store/config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format: markdown (default) or json
    #[arg(short, long, default_value = "markdown", global = true)]
    pub format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a task (in backlog unless --state is given)
    Create(CreateArgs),

    /// Show one task by id or unambiguous id prefix
    Show {
        id: String,
    },

    /// List tasks
    List(ListArgs),

    /// Change header fields or sections of a task
    Update(UpdateArgs),

    /// Move a task to another workflow state
    Move {
        id: String,

        /// Target state: backlog, current or archive
        #[arg(value_parser = parse_state)]
        state: WorkflowState,

        /// Do not mark open tasks done when archiving
        #[arg(long)]
        keep_status: bool,
    },

    /// Turn a simple task into a parent with an overview
    Promote {
        id: String,
    },

    /// Manage the subtasks of a parent
    #[command(subcommand)]
    Subtask(SubtaskCommand),

    /// Mark a checklist item of the Tasks section done (0-based index)
    Complete {
        id: String,
        index: usize,
    },

    /// Append a line to a task's log
    Log {
        id: String,
        entry: String,
    },

    /// Delete a task
    Delete {
        id: String,

        /// Also delete the subtasks of a parent
        #[arg(long)]
        cascade: bool,
    },

    /// Report duplicate ids, dangling parents, misplaced files and bad sequences
    Check,

    /// Show where each resource resolves for this checkout
    Paths,
}

/// Parse a workflow state name.
pub fn parse_state(s: &str) -> Result<WorkflowState, String> {
    WorkflowState::from_str(&s.trim().to_lowercase()).ok_or_else(|| {
        format!(
            "Invalid state '{}'. Valid options: backlog, current, archive",
            s
        )
    })
}

/// Parse a `NAME=TEXT` section argument.
pub fn parse_section(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, text)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), text.replace("\\n", "\n")))
        }
        _ => Err(format!("Invalid section '{}'. Expected NAME=TEXT", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("Archive"), Ok(WorkflowState::Archive));
        assert!(parse_state("done").is_err());
    }

    #[test]
    fn test_parse_section() {
        assert_eq!(
            parse_section("Notes=line one\\nline two"),
            Ok(("Notes".to_string(), "line one\nline two".to_string()))
        );
        assert!(parse_section("=text").is_err());
        assert!(parse_section("no separator").is_err());
    }

    #[test]
    fn test_cli_parses_move() {
        let cli = Cli::try_parse_from(["task-store", "move", "abc", "current", "--format", "json"])
            .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Move { id, state, keep_status } => {
                assert_eq!(id, "abc");
                assert_eq!(state, WorkflowState::Current);
                assert!(!keep_status);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}

//! task-store command-line front end.
//!
//! Resolves the project, opens the store and runs one subcommand.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use task_store::cli::subtask::{SubtaskCommand, parse_groups};
use task_store::cli::{Cli, Command};
use task_store::config::ProjectsConfig;
use task_store::format::{self, OutputFormat};
use task_store::paths::{PathContext, PathResolver, ResourceType, WorktreeCache};
use task_store::store::{CreateOptions, MoveOptions, TaskStore};
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Log level filter: `RUST_LOG` when set, else info (debug with --verbose).
fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

fn init_logging(log: &str, verbose: bool) -> Result<()> {
    match log {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter(verbose))
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter(verbose))
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)
                .with_context(|| format!("opening log file {}", filename))?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter(verbose))
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

/// Project root: `--project`, then `--root`/`TASK_STORE_ROOT`, then the
/// registry's default project. `None` falls through to the current directory.
fn project_root(cli: &Cli) -> Result<Option<PathBuf>> {
    if cli.project.is_none()
        && let Some(ref root) = cli.root
    {
        return Ok(Some(root.clone()));
    }
    let registry = ProjectsConfig::load(cli.config.as_deref())?;
    let root = registry.project_root(cli.project.as_deref())?;
    if let Some(ref root) = root {
        debug!(root = %root.display(), "using project root from registry");
    }
    Ok(root)
}

fn open_store(cli: &Cli) -> Result<TaskStore> {
    let root = project_root(cli)?;
    let context = PathContext::discover(root.as_deref(), &WorktreeCache::default())?;
    if context.is_worktree() {
        debug!(
            checkout = %context.execution_root.display(),
            main = %context.main_repo_root.display(),
            "running inside a linked worktree"
        );
    }
    Ok(TaskStore::open(Arc::new(PathResolver::new(context)))?)
}

/// Print JSON or the markdown rendering chosen by the caller.
fn emit<T: Serialize>(
    output: OutputFormat,
    value: &T,
    markdown: impl FnOnce(&T) -> String,
) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", format::to_json(value)?),
        OutputFormat::Markdown => print!("{}", markdown(value)),
    }
    Ok(())
}

#[derive(Serialize)]
struct SequenceCheck {
    parent: String,
    valid: bool,
}

fn run_paths(output: OutputFormat, store: &TaskStore) -> Result<()> {
    let resolver = store.resolver();
    let context = resolver.context();
    let mut paths = vec![
        ("execution_root".to_string(), context.execution_root.clone()),
        ("main_repo_root".to_string(), context.main_repo_root.clone()),
    ];
    for resource in ResourceType::ALL {
        let path = match resource {
            ResourceType::Templates => resolver.resolve_existing(resource)?,
            ResourceType::Config => resolver.config_dir()?,
            _ => resolver.resolve(resource)?,
        };
        paths.push((resource.as_str().to_string(), path));
    }
    paths.push(("worktrees".to_string(), resolver.worktree_base_path()));

    match output {
        OutputFormat::Json => {
            let map: BTreeMap<_, _> = paths.into_iter().collect();
            println!("{}", format::to_json(&map)?);
        }
        OutputFormat::Markdown => print!("{}", format::format_paths_markdown(&paths)),
    }
    Ok(())
}

fn run_subtask(output: OutputFormat, store: &TaskStore, command: SubtaskCommand) -> Result<()> {
    match command {
        SubtaskCommand::Add(args) => {
            let parent = args.parent.clone();
            let options = CreateOptions::from(args.into_create());
            let task = store.add_subtask(&parent, &options)?;
            emit(output, &task, format::format_task_markdown)
        }
        SubtaskCommand::Show { parent } => {
            let parent = store.load_parent(&parent)?;
            emit(output, &parent, format::format_parent_markdown)
        }
        SubtaskCommand::Parallel { parent, ids } => {
            let parent = store.parallelize(&parent, &ids)?;
            emit(output, &parent, format::format_parent_markdown)
        }
        SubtaskCommand::Insert { parent, after, id } => {
            let parent = store.insert_after(&parent, &after, &id)?;
            emit(output, &parent, format::format_parent_markdown)
        }
        SubtaskCommand::Reorder { parent, groups } => {
            let parent = store.reorder_subtasks(&parent, &parse_groups(&groups))?;
            emit(output, &parent, format::format_parent_markdown)
        }
        SubtaskCommand::Validate { parent } => {
            let valid = store.is_valid_sequence(&parent)?;
            if !valid {
                warn!(parent = %parent, "subtask sequence is inconsistent");
            }
            emit(output, &SequenceCheck { parent, valid }, |check| {
                format!("`{}` sequence valid: {}\n", check.parent, check.valid)
            })
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, cli.verbose)?;

    let store = open_store(&cli)?;
    let output = cli.format;

    match cli.command {
        Command::Create(args) => {
            let task = store.create(CreateOptions::from(args))?;
            emit(output, &task, format::format_task_markdown)?;
        }
        Command::Show { id } => {
            let task = store.get(&id)?;
            emit(output, &task, format::format_task_markdown)?;
        }
        Command::List(args) => {
            let tasks = store.list(&args.to_filter()?)?;
            emit(output, &tasks, |tasks| format::format_tasks_markdown(tasks))?;
        }
        Command::Update(args) => {
            let (id, patch) = args.into_patch();
            let task = store.update(&id, patch)?;
            emit(output, &task, format::format_task_markdown)?;
        }
        Command::Move {
            id,
            state,
            keep_status,
        } => {
            let options = MoveOptions {
                adjust_status: !keep_status,
            };
            let task = store.move_task(&id, state, options)?;
            emit(output, &task, format::format_task_markdown)?;
        }
        Command::Promote { id } => {
            let parent = store.promote_to_parent(&id)?;
            emit(output, &parent, format::format_parent_markdown)?;
        }
        Command::Subtask(command) => run_subtask(output, &store, command)?,
        Command::Complete { id, index } => {
            let task = store.complete_item(&id, index)?;
            emit(output, &task, format::format_task_markdown)?;
        }
        Command::Log { id, entry } => {
            let task = store.append_log(&id, &entry)?;
            emit(output, &task, format::format_task_markdown)?;
        }
        Command::Delete { id, cascade } => {
            let outcome = store.delete(&id, cascade)?;
            emit(output, &outcome, format::format_delete_markdown)?;
        }
        Command::Check => {
            let report = store.check_integrity()?;
            emit(output, &report, format::format_integrity_markdown)?;
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Command::Paths => run_paths(output, &store)?,
    }

    Ok(())
}

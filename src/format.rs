//! Output formatting utilities for markdown and JSON.

use crate::store::{DeleteOutcome, IntegrityReport};
use crate::types::{EnumField, ParentTask, Priority, Task, TaskSummary, WorkflowLocation};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!(
                "Invalid format '{}'. Valid options: markdown, json",
                s
            )),
        }
    }
}

/// Pretty JSON for any result value.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

/// Format a single task as markdown: metadata list, then the document body.
pub fn format_task_markdown(task: &Task) -> String {
    let mut md = String::new();

    md.push_str(&format!("## Task: {}\n", task.title));
    md.push_str(&format!("- **id**: `{}`\n", task.id));
    md.push_str(&format!("- **type**: {}\n", task.task_type.label()));
    md.push_str(&format!("- **status**: {}\n", task.status.label()));
    md.push_str(&format!("- **priority**: {}\n", task.priority.label()));
    md.push_str(&format!("- **location**: {}\n", task.location));

    if !task.area.is_empty() {
        md.push_str(&format!("- **area**: {}\n", task.area));
    }
    if !task.tags.is_empty() {
        let tags: Vec<&str> = task.tags.iter().map(String::as_str).collect();
        md.push_str(&format!("- **tags**: {}\n", tags.join(", ")));
    }
    if let Some(ref assignee) = task.assignee {
        md.push_str(&format!("- **assignee**: {}\n", assignee));
    }
    if let Some(ref parent_id) = task.parent_task_id {
        md.push_str(&format!("- **parent_task**: `{}`\n", parent_id));
    }
    if let Some(ref sequence) = task.sequence {
        md.push_str(&format!("- **sequence**: {}\n", sequence));
    }
    md.push_str(&format!(
        "- **updated**: {}\n",
        task.updated.format("%Y-%m-%d %H:%M")
    ));

    let content = task.document.to_content();
    if !content.trim().is_empty() {
        md.push('\n');
        md.push_str(&content);
        if !content.ends_with('\n') {
            md.push('\n');
        }
    }

    md
}

/// Format a list of tasks as markdown, grouped by workflow location.
pub fn format_tasks_markdown(tasks: &[Task]) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Tasks ({})\n\n", tasks.len()));

    let mut by_location: BTreeMap<&WorkflowLocation, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        by_location.entry(&task.location).or_default().push(task);
    }

    for (location, group) in by_location {
        md.push_str(&format!("## {}\n\n", location));
        for task in group {
            md.push_str(&format_task_short(&TaskSummary::from(task)));
        }
        md.push('\n');
    }

    md
}

/// Format a task in short form for lists.
fn format_task_short(task: &TaskSummary) -> String {
    let priority_marker = match task.priority {
        Priority::Highest => "!!! ",
        Priority::High => "! ",
        Priority::Medium | Priority::Low => "",
    };

    let sequence = task
        .sequence
        .as_ref()
        .map(|s| format!("{} ", s))
        .unwrap_or_default();

    format!(
        "- {}{}{} `{}` ({})\n",
        sequence,
        priority_marker,
        task.title,
        task.id,
        task.status.label(),
    )
}

/// Format a parent task: overview line, then subtasks by sequence group.
pub fn format_parent_markdown(parent: &ParentTask) -> String {
    let mut md = String::new();

    md.push_str(&format!("## Parent: {}\n", parent.overview.title));
    md.push_str(&format!("- **id**: `{}`\n", parent.id));
    md.push_str(&format!("- **location**: {}\n", parent.overview.location));
    md.push_str(&format!("- **subtasks**: {}\n\n", parent.subtasks.len()));

    for (sequence, ids) in parent.groups() {
        let ids: Vec<String> = ids.iter().map(|id| format!("`{}`", id)).collect();
        let marker = if ids.len() > 1 { " (parallel)" } else { "" };
        md.push_str(&format!("- {:02}{}: {}\n", sequence, marker, ids.join(", ")));
    }

    md
}

pub fn format_delete_markdown(outcome: &DeleteOutcome) -> String {
    let mut md = format!("Deleted `{}`\n", outcome.id);
    for path in &outcome.removed {
        md.push_str(&format!("- removed {}\n", path.display()));
    }
    for id in &outcome.repaired {
        md.push_str(&format!("- cleared parent reference on `{}`\n", id));
    }
    md
}

/// Format an integrity report as markdown.
pub fn format_integrity_markdown(report: &IntegrityReport) -> String {
    let mut md = String::new();

    md.push_str(&format!(
        "# Integrity: {} tasks checked, {} problems\n",
        report.tasks_checked,
        report.problem_count()
    ));

    if !report.duplicate_ids.is_empty() {
        md.push_str("\n## Duplicate ids\n\n");
        for dup in &report.duplicate_ids {
            let paths: Vec<String> = dup.paths.iter().map(|p| p.display().to_string()).collect();
            md.push_str(&format!("- `{}`: {}\n", dup.id, paths.join(", ")));
        }
    }
    if !report.dangling_parents.is_empty() {
        md.push_str("\n## Dangling parent references\n\n");
        for dangling in &report.dangling_parents {
            md.push_str(&format!(
                "- `{}` -> missing `{}`\n",
                dangling.id, dangling.parent_task
            ));
        }
    }
    if !report.location_mismatches.is_empty() {
        md.push_str("\n## Location mismatches\n\n");
        for mismatch in &report.location_mismatches {
            md.push_str(&format!(
                "- `{}`: header says {}, file is in {}\n",
                mismatch.id, mismatch.header, mismatch.actual
            ));
        }
    }
    if !report.invalid_sequences.is_empty() {
        md.push_str("\n## Invalid sequences\n\n");
        for invalid in &report.invalid_sequences {
            md.push_str(&format!("- `{}`: {}\n", invalid.parent, invalid.reason));
        }
    }
    if !report.unreadable.is_empty() {
        md.push_str("\n## Unreadable files\n\n");
        for unreadable in &report.unreadable {
            md.push_str(&format!(
                "- {}: {}\n",
                unreadable.path.display(),
                unreadable.error
            ));
        }
    }

    md
}

/// Format resolved resource locations.
pub fn format_paths_markdown(paths: &[(String, PathBuf)]) -> String {
    let mut md = String::from("# Paths\n\n");
    for (name, path) in paths {
        md.push_str(&format!("- **{}**: {}\n", name, path.display()));
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TaskDocument;
    use crate::types::{TaskStatus, WorkflowState};
    use chrono::Utc;

    fn task(id: &str, state: WorkflowState) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Title {}", id),
            task_type: Default::default(),
            status: TaskStatus::InProgress,
            priority: Priority::Highest,
            area: "api".to_string(),
            tags: ["perf".to_string()].into_iter().collect(),
            assignee: None,
            location: WorkflowLocation::new(state),
            parent_task_id: None,
            sequence: None,
            created: Utc::now(),
            updated: Utc::now(),
            document: TaskDocument::new(format!("Title {}", id)),
            extra: Default::default(),
            path: PathBuf::new(),
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("MD".parse::<OutputFormat>(), Ok(OutputFormat::Markdown));
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_task_markdown() {
        let md = format_task_markdown(&task("a-1016", WorkflowState::Current));
        assert!(md.contains("## Task: Title a-1016"));
        assert!(md.contains("- **status**: In Progress"));
        assert!(md.contains("- **tags**: perf"));
        assert!(md.contains("- **location**: current"));
    }

    #[test]
    fn test_tasks_grouped_by_location() {
        let tasks = vec![
            task("a", WorkflowState::Current),
            task("b", WorkflowState::Backlog),
            task("c", WorkflowState::Current),
        ];
        let md = format_tasks_markdown(&tasks);
        assert!(md.starts_with("# Tasks (3)"));
        let backlog = md.find("## backlog").unwrap();
        let current = md.find("## current").unwrap();
        assert!(backlog < current);
        assert!(md.contains("- !!! Title a `a` (In Progress)"));
    }
}

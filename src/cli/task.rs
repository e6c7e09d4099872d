//! Arguments for the task-level subcommands.

use super::{parse_section, parse_state};
use crate::document::normalize::{normalize_priority, normalize_status, normalize_type};
use crate::error::StoreResult;
use crate::store::{CreateOptions, ListFilter, TaskPatch};
use crate::types::WorkflowState;
use clap::Args;

/// Arguments for the create subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct CreateArgs {
    pub title: String,

    /// Task type (feature, bug, chore, ...; aliases accepted)
    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,

    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short = 'P', long)]
    pub priority: Option<String>,

    #[arg(short, long)]
    pub area: Option<String>,

    /// Tag (repeatable, or comma-separated)
    #[arg(long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,

    #[arg(long)]
    pub assignee: Option<String>,

    /// Initial workflow state (default: backlog)
    #[arg(long, value_parser = parse_state)]
    pub state: Option<WorkflowState>,

    /// Section content as NAME=TEXT (repeatable; \n for newlines)
    #[arg(long = "section", value_parser = parse_section)]
    pub sections: Vec<(String, String)>,

    /// Template name from the templates directories
    #[arg(long)]
    pub template: Option<String>,

    /// Create as a subtask of this task
    #[arg(long)]
    pub parent: Option<String>,

    /// With --parent: insert right after this subtask
    #[arg(long, requires = "parent")]
    pub after: Option<String>,
}

impl From<CreateArgs> for CreateOptions {
    fn from(args: CreateArgs) -> Self {
        CreateOptions {
            title: args.title,
            task_type: args.task_type,
            status: args.status,
            priority: args.priority,
            area: args.area,
            tags: args.tags,
            assignee: args.assignee,
            workflow_state: args.state,
            sections: args.sections,
            template: args.template,
            parent: args.parent,
            after: args.after,
        }
    }
}

/// Arguments for the update subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,

    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short = 'P', long)]
    pub priority: Option<String>,

    #[arg(short, long)]
    pub area: Option<String>,

    /// Replace all tags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,

    #[arg(long = "add-tag", value_delimiter = ',')]
    pub add_tags: Vec<String>,

    #[arg(long = "remove-tag", value_delimiter = ',')]
    pub remove_tags: Vec<String>,

    /// Assignee; an empty value clears it
    #[arg(long)]
    pub assignee: Option<String>,

    /// Replace a section as NAME=TEXT (repeatable)
    #[arg(long = "section", value_parser = parse_section)]
    pub sections: Vec<(String, String)>,

    #[arg(long = "remove-section")]
    pub remove_sections: Vec<String>,

    /// Append a line to the Log section
    #[arg(long = "append-log", value_name = "ENTRY")]
    pub log: Option<String>,
}

impl UpdateArgs {
    /// Split into the target id and the patch to apply.
    pub fn into_patch(self) -> (String, TaskPatch) {
        let patch = TaskPatch {
            title: self.title,
            task_type: self.task_type,
            status: self.status,
            priority: self.priority,
            area: self.area,
            tags: self.tags,
            add_tags: self.add_tags,
            remove_tags: self.remove_tags,
            assignee: self.assignee,
            sections: self.sections,
            remove_sections: self.remove_sections,
            log: self.log,
        };
        (self.id, patch)
    }
}

/// Arguments for the list subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only these workflow states (repeatable)
    #[arg(long = "state", value_parser = parse_state)]
    pub states: Vec<WorkflowState>,

    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,

    #[arg(short = 'P', long)]
    pub priority: Option<String>,

    #[arg(short, long)]
    pub area: Option<String>,

    #[arg(long)]
    pub tag: Option<String>,

    #[arg(long)]
    pub assignee: Option<String>,

    /// Only subtasks of this parent
    #[arg(long)]
    pub parent: Option<String>,

    /// Include subtasks in the listing
    #[arg(long)]
    pub all: bool,
}

impl ListArgs {
    /// Build a store filter, normalizing enumerable values.
    pub fn to_filter(&self) -> StoreResult<ListFilter> {
        Ok(ListFilter {
            states: self.states.clone(),
            status: self.status.as_deref().map(normalize_status).transpose()?,
            task_type: self.task_type.as_deref().map(normalize_type).transpose()?,
            priority: self.priority.as_deref().map(normalize_priority).transpose()?,
            area: self.area.clone(),
            tag: self.tag.clone(),
            assignee: self.assignee.clone(),
            parent: self.parent.clone(),
            include_subtasks: self.all,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    #[test]
    fn test_list_filter_normalizes() {
        let args = ListArgs {
            status: Some("wip".into()),
            ..Default::default()
        };
        assert_eq!(args.to_filter().unwrap().status, Some(TaskStatus::InProgress));

        let bad = ListArgs {
            priority: Some("nonsense".into()),
            ..Default::default()
        };
        assert!(bad.to_filter().is_err());
    }

    #[test]
    fn test_update_into_patch() {
        let args = UpdateArgs {
            id: "abc".into(),
            log: Some("note".into()),
            ..Default::default()
        };
        let (id, patch) = args.into_patch();
        assert_eq!(id, "abc");
        assert!(!patch.is_empty());
    }
}

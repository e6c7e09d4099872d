//! Subtask subcommands for task-store CLI
//!
//! Subtasks live inside a parent directory and are ordered by their
//! two-digit filename prefix; subtasks sharing a prefix run in parallel.

use super::task::CreateArgs;
use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum SubtaskCommand {
    /// Add a subtask, promoting the parent first if needed
    Add(AddArgs),

    /// Show a parent and its subtask groups
    Show { parent: String },

    /// Give the listed subtasks one shared sequence number
    Parallel {
        parent: String,

        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },

    /// Move an existing subtask into its own group right after another
    Insert {
        parent: String,
        after: String,
        id: String,
    },

    /// Renumber from explicit groups, e.g. `a b,c d` gives a=01, b=c=02, d=03
    Reorder {
        parent: String,

        /// Groups in order; comma-separate ids that run in parallel
        #[arg(required = true, num_args = 1..)]
        groups: Vec<String>,
    },

    /// Check that filenames and headers agree on the ordering
    Validate { parent: String },
}

/// Arguments for `subtask add`
#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    pub parent: String,

    #[command(flatten)]
    pub task: SubtaskFields,
}

/// Create fields a subtask accepts; location always follows the parent.
#[derive(Args, Debug, Clone, Default)]
pub struct SubtaskFields {
    pub title: String,

    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,

    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short = 'P', long)]
    pub priority: Option<String>,

    #[arg(long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,

    #[arg(long)]
    pub assignee: Option<String>,

    #[arg(long = "section", value_parser = super::parse_section)]
    pub sections: Vec<(String, String)>,

    #[arg(long)]
    pub template: Option<String>,

    /// Insert right after this subtask instead of at the end
    #[arg(long)]
    pub after: Option<String>,
}

impl AddArgs {
    pub fn into_create(self) -> CreateArgs {
        CreateArgs {
            title: self.task.title,
            task_type: self.task.task_type,
            status: self.task.status,
            priority: self.task.priority,
            tags: self.task.tags,
            assignee: self.task.assignee,
            sections: self.task.sections,
            template: self.task.template,
            parent: Some(self.parent),
            after: self.task.after,
            ..Default::default()
        }
    }
}

/// Split `a,b` group arguments into id lists.
pub fn parse_groups(groups: &[String]) -> Vec<Vec<String>> {
    groups
        .iter()
        .map(|group| {
            group
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .filter(|group| !group.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_groups() {
        let groups = parse_groups(&["a".into(), "b, c".into(), ",".into(), "d".into()]);
        assert_eq!(
            groups,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn test_add_sets_parent() {
        let args = AddArgs {
            parent: "p".into(),
            task: SubtaskFields {
                title: "Child".into(),
                after: Some("a".into()),
                ..Default::default()
            },
        };
        let create = args.into_create();
        assert_eq!(create.parent.as_deref(), Some("p"));
        assert_eq!(create.after.as_deref(), Some("a"));
    }
}

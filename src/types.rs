//! Core types for the task store.

use crate::document::TaskDocument;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Display metadata and accepted input spellings for one enum variant.
#[derive(Debug)]
pub struct VariantInfo {
    pub canonical: &'static str,
    pub label: &'static str,
    pub emoji: Option<&'static str>,
    pub aliases: &'static [&'static str],
}

/// An enumerable metadata field backed by a static alias table.
pub trait EnumField: Sized + Copy + PartialEq + 'static {
    /// Header key / field name used in messages.
    const FIELD: &'static str;

    /// Every variant, in declaration order.
    fn all() -> &'static [Self];

    fn info(&self) -> &'static VariantInfo;

    fn as_str(&self) -> &'static str {
        self.info().canonical
    }

    fn label(&self) -> &'static str {
        self.info().label
    }

    /// Canonical names of every variant.
    fn canonical_names() -> Vec<&'static str> {
        Self::all().iter().map(|v| v.as_str()).collect()
    }

    fn from_canonical(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|v| v.as_str() == name)
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Feature,
    Bug,
    Chore,
    Documentation,
    Test,
    Spike,
    Idea,
}

static TYPE_INFO: [VariantInfo; 7] = [
    VariantInfo {
        canonical: "feature",
        label: "Feature",
        emoji: Some("✨"),
        aliases: &["feat", "enhancement", "story"],
    },
    VariantInfo {
        canonical: "bug",
        label: "Bug",
        emoji: Some("🐛"),
        aliases: &["bugfix", "defect", "fix"],
    },
    VariantInfo {
        canonical: "chore",
        label: "Chore",
        emoji: Some("🔧"),
        aliases: &["maintenance", "refactor", "cleanup"],
    },
    VariantInfo {
        canonical: "documentation",
        label: "Documentation",
        emoji: Some("📝"),
        aliases: &["docs", "doc"],
    },
    VariantInfo {
        canonical: "test",
        label: "Test",
        emoji: Some("🧪"),
        aliases: &["tests", "testing", "qa"],
    },
    VariantInfo {
        canonical: "spike",
        label: "Spike",
        emoji: Some("🔬"),
        aliases: &["research", "investigation"],
    },
    VariantInfo {
        canonical: "idea",
        label: "Idea",
        emoji: Some("💡"),
        aliases: &["proposal", "brainstorm"],
    },
];

impl EnumField for TaskType {
    const FIELD: &'static str = "type";

    fn all() -> &'static [Self] {
        &[
            TaskType::Feature,
            TaskType::Bug,
            TaskType::Chore,
            TaskType::Documentation,
            TaskType::Test,
            TaskType::Spike,
            TaskType::Idea,
        ]
    }

    fn info(&self) -> &'static VariantInfo {
        &TYPE_INFO[*self as usize]
    }
}

/// Progress status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Done,
    Archived,
}

static STATUS_INFO: [VariantInfo; 5] = [
    VariantInfo {
        canonical: "todo",
        label: "To Do",
        emoji: Some("📋"),
        aliases: &["to-do", "open", "pending", "new"],
    },
    VariantInfo {
        canonical: "in_progress",
        label: "In Progress",
        emoji: Some("🚧"),
        aliases: &["wip", "in-progress", "inprogress", "doing", "started", "active"],
    },
    VariantInfo {
        canonical: "blocked",
        label: "Blocked",
        emoji: Some("⛔"),
        aliases: &["stuck", "waiting", "on-hold", "on hold"],
    },
    VariantInfo {
        canonical: "done",
        label: "Done",
        emoji: Some("✅"),
        aliases: &["complete", "completed", "finished", "closed", "resolved"],
    },
    VariantInfo {
        canonical: "archived",
        label: "Archived",
        emoji: Some("📦"),
        aliases: &["shelved"],
    },
];

impl EnumField for TaskStatus {
    const FIELD: &'static str = "status";

    fn all() -> &'static [Self] {
        &[
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Done,
            TaskStatus::Archived,
        ]
    }

    fn info(&self) -> &'static VariantInfo {
        &STATUS_INFO[*self as usize]
    }
}

impl TaskStatus {
    /// Whether the task needs no further work.
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Archived)
    }
}

/// Task priority, lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Highest,
}

static PRIORITY_INFO: [VariantInfo; 4] = [
    VariantInfo {
        canonical: "low",
        label: "Low",
        emoji: Some("🔽"),
        aliases: &["minor", "p3"],
    },
    VariantInfo {
        canonical: "medium",
        label: "Medium",
        emoji: Some("🔸"),
        aliases: &["normal", "med", "p2"],
    },
    VariantInfo {
        canonical: "high",
        label: "High",
        emoji: Some("🔼"),
        aliases: &["important", "p1"],
    },
    VariantInfo {
        canonical: "highest",
        label: "Highest",
        emoji: Some("⏫"),
        aliases: &["critical", "urgent", "p0"],
    },
];

impl EnumField for Priority {
    const FIELD: &'static str = "priority";

    fn all() -> &'static [Self] {
        &[
            Priority::Low,
            Priority::Medium,
            Priority::High,
            Priority::Highest,
        ]
    }

    fn info(&self) -> &'static VariantInfo {
        &PRIORITY_INFO[*self as usize]
    }
}

macro_rules! display_as_canonical {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_canonical!(TaskType, TaskStatus, Priority);

/// Coarse lifecycle stage, mirrored by the containing directory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Backlog,
    Current,
    Archive,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 3] = [
        WorkflowState::Backlog,
        WorkflowState::Current,
        WorkflowState::Archive,
    ];

    /// Directory name under the tasks root.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Backlog => "backlog",
            WorkflowState::Current => "current",
            WorkflowState::Archive => "archive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "backlog" => Some(WorkflowState::Backlog),
            "current" | "active" => Some(WorkflowState::Current),
            "archive" | "archived" => Some(WorkflowState::Archive),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a task lives: its workflow state plus the archive bucket when archived.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct WorkflowLocation {
    pub workflow_state: WorkflowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_bucket: Option<String>,
}

impl WorkflowLocation {
    pub fn new(workflow_state: WorkflowState) -> Self {
        Self {
            workflow_state,
            archive_bucket: None,
        }
    }

    /// Archive location bucketed by the month of `at`.
    pub fn archived_at(at: DateTime<Utc>) -> Self {
        Self {
            workflow_state: WorkflowState::Archive,
            archive_bucket: Some(archive_bucket(at)),
        }
    }

    /// Directory path relative to the tasks root.
    pub fn relative_dir(&self) -> PathBuf {
        let mut dir = PathBuf::from(self.workflow_state.as_str());
        if let Some(ref bucket) = self.archive_bucket {
            dir.push(bucket);
        }
        dir
    }
}

impl fmt::Display for WorkflowLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.archive_bucket {
            Some(ref bucket) => write!(f, "{}/{}", self.workflow_state, bucket),
            None => write!(f, "{}", self.workflow_state),
        }
    }
}

/// Year-month bucket name used under `archive/`.
pub fn archive_bucket(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

/// A single unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: Priority,
    pub area: String,
    pub tags: BTreeSet<String>,
    pub assignee: Option<String>,
    pub location: WorkflowLocation,
    pub parent_task_id: Option<String>,
    /// Two-digit sequence, present only on subtasks (and `00` on parent overviews).
    pub sequence: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub document: TaskDocument,
    /// Header keys this crate does not interpret, preserved on rewrite.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_yaml::Value>,
    /// File the task was read from or written to.
    #[serde(skip)]
    pub path: PathBuf,
}

impl Task {
    pub fn is_subtask(&self) -> bool {
        self.parent_task_id.is_some()
            && matches!(self.sequence.as_deref(), Some(seq) if seq != OVERVIEW_SEQUENCE)
    }
}

/// Sequence reserved for a parent task's overview document.
pub const OVERVIEW_SEQUENCE: &str = "00";

/// Highest sequence a subtask can hold.
pub const MAX_SEQUENCE: u8 = 99;

/// Format a sequence number as its two-digit filename prefix.
pub fn format_sequence(sequence: u8) -> String {
    format!("{:02}", sequence)
}

/// One subtask slot inside a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskEntry {
    pub sequence: u8,
    pub id: String,
    /// Path the subtask file currently has on disk.
    #[serde(skip)]
    pub path: PathBuf,
}

/// A task realised as a directory: an overview plus ordered subtasks.
///
/// `subtasks` is the source of truth for ordering while an operation is in
/// flight; filenames are rewritten from it on write-back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentTask {
    pub id: String,
    #[serde(skip)]
    pub dir: PathBuf,
    pub overview: Task,
    pub subtasks: Vec<SubtaskEntry>,
}

/// Compact task representation for list views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub location: WorkflowLocation,
    pub parent_task_id: Option<String>,
    pub sequence: Option<String>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
            priority: task.priority,
            location: task.location.clone(),
            parent_task_id: task.parent_task_id.clone(),
            sequence: task.sequence.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tables_line_up_with_variants() {
        for v in TaskType::all() {
            assert_eq!(TaskType::from_canonical(v.as_str()), Some(*v));
        }
        for v in TaskStatus::all() {
            assert_eq!(TaskStatus::from_canonical(v.as_str()), Some(*v));
        }
        for v in Priority::all() {
            assert_eq!(Priority::from_canonical(v.as_str()), Some(*v));
        }
    }

    #[test]
    fn test_serde_names_match_canonical() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let json = serde_json::to_string(&TaskType::Documentation).unwrap();
        assert_eq!(json, "\"documentation\"");
    }

    #[test]
    fn test_archive_bucket_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(archive_bucket(at), "2024-03");
        let loc = WorkflowLocation::archived_at(at);
        assert_eq!(loc.relative_dir(), PathBuf::from("archive/2024-03"));
        assert_eq!(loc.to_string(), "archive/2024-03");
    }

    #[test]
    fn test_workflow_state_parse() {
        assert_eq!(WorkflowState::from_str("Current"), Some(WorkflowState::Current));
        assert_eq!(WorkflowState::from_str("archived"), Some(WorkflowState::Archive));
        assert_eq!(WorkflowState::from_str("later"), None);
    }

    #[test]
    fn test_format_sequence() {
        assert_eq!(format_sequence(3), "03");
        assert_eq!(format_sequence(42), "42");
    }
}

//! Conversion between [`Task`] values and task files.

use super::locate::{Entry, EntryKind};
use crate::document::normalize::{
    normalize_or_default, normalize_priority, normalize_status, normalize_type,
};
use crate::document::{Frontmatter, TaskDocument, parse_task_file, serialize_task_file};
use crate::error::{IoContext, StoreError, StoreResult};
use crate::types::{OVERVIEW_SEQUENCE, Task, WorkflowLocation, WorkflowState, format_sequence};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Attach the file name to parse and validation failures.
fn in_file(err: StoreError, path: &Path) -> StoreError {
    match err {
        StoreError::Parse { message, line } => StoreError::Parse {
            message: format!("{}: {}", path.display(), message),
            line,
        },
        StoreError::Validation {
            message,
            field,
            allowed,
            code,
        } => StoreError::Validation {
            message: format!("{}: {}", path.display(), message),
            field,
            allowed,
            code,
        },
        other => other,
    }
}

/// Read and parse a task file without interpreting its header.
pub fn read_raw(path: &Path) -> StoreResult<(Frontmatter, TaskDocument)> {
    let raw = fs::read_to_string(path).at(path)?;
    parse_task_file(&raw).map_err(|e| in_file(e, path))
}

/// Workflow location recorded in a header, if any.
pub fn header_location(frontmatter: &Frontmatter) -> Option<WorkflowLocation> {
    let state = WorkflowState::from_str(frontmatter.workflow_state.as_deref()?)?;
    Some(WorkflowLocation {
        workflow_state: state,
        archive_bucket: frontmatter.archive_bucket.clone(),
    })
}

fn modified(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

/// Load the task behind a scanned entry.
///
/// Location, parent and sequence come from where the file sits; the header
/// supplies everything else.
pub fn load(entry: &Entry) -> StoreResult<Task> {
    let (frontmatter, document) = read_raw(&entry.path)?;
    build(frontmatter, document, entry).map_err(|e| in_file(e, &entry.path))
}

fn build(frontmatter: Frontmatter, document: TaskDocument, entry: &Entry) -> StoreResult<Task> {
    let task_type = normalize_or_default(frontmatter.task_type.as_deref(), normalize_type)?;
    let status = normalize_or_default(frontmatter.status.as_deref(), normalize_status)?;
    let priority = normalize_or_default(frontmatter.priority.as_deref(), normalize_priority)?;

    let (parent_task_id, sequence) = match &entry.kind {
        EntryKind::Simple => (frontmatter.parent_task.clone(), None),
        EntryKind::Parent => (None, Some(OVERVIEW_SEQUENCE.to_string())),
        EntryKind::Subtask {
            parent_id,
            sequence,
        } => (Some(parent_id.clone()), Some(format_sequence(*sequence))),
    };

    let fallback = || modified(&entry.path);
    let updated = frontmatter.updated.unwrap_or_else(fallback);
    let created = frontmatter.created.unwrap_or(updated);

    let title = frontmatter
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| document.title.clone());

    Ok(Task {
        id: entry.id.clone(),
        title,
        task_type,
        status,
        priority,
        area: frontmatter.area.unwrap_or_default(),
        tags: frontmatter.tags.into_iter().collect(),
        assignee: frontmatter.assignee,
        location: entry.location.clone(),
        parent_task_id,
        sequence,
        created,
        updated,
        document,
        extra: frontmatter.extra,
        path: entry.path.clone(),
    })
}

/// Header for a task.
pub fn to_frontmatter(task: &Task) -> Frontmatter {
    Frontmatter {
        id: Some(task.id.clone()),
        title: Some(task.title.clone()),
        task_type: Some(task.task_type.to_string()),
        status: Some(task.status.to_string()),
        priority: Some(task.priority.to_string()),
        area: (!task.area.is_empty()).then(|| task.area.clone()),
        tags: task.tags.iter().cloned().collect(),
        assignee: task.assignee.clone(),
        workflow_state: Some(task.location.workflow_state.to_string()),
        archive_bucket: task.location.archive_bucket.clone(),
        parent_task: task.parent_task_id.clone(),
        sequence: task.sequence.clone(),
        created: Some(task.created),
        updated: Some(task.updated),
        extra: task.extra.clone(),
    }
}

/// Full file text for a task.
pub fn render(task: &Task) -> StoreResult<String> {
    let mut document = task.document.clone();
    document.title = task.title.clone();
    serialize_task_file(&to_frontmatter(task), &document)
}

fn ensure_parent(path: &Path) -> StoreResult<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).at(dir)?;
    }
    Ok(())
}

/// Create a file that must not exist yet.
///
/// Fails with an `ALREADY_EXISTS` integrity error when another writer got
/// there first.
pub fn write_new(path: &Path, content: &str) -> StoreResult<()> {
    ensure_parent(path)?;
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(StoreError::already_exists(path));
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };
    file.write_all(content.as_bytes()).at(path)?;
    file.sync_all().at(path)
}

/// Replace a file's content through a sibling temporary and a rename.
///
/// Every call gets its own temporary, so concurrent writers to one path
/// never share it; the last rename wins with a complete file.
pub fn write_atomic(path: &Path, content: &str) -> StoreResult<()> {
    ensure_parent(path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".tmp")
        .tempfile_in(dir)
        .at(dir)?;
    temp.write_all(content.as_bytes()).at(temp.path())?;
    temp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

/// Rewrite a task at its own path.
pub fn save(task: &Task) -> StoreResult<()> {
    write_atomic(&task.path, &render(task)?)
}

/// Create a task file at its path, refusing to overwrite.
pub fn create(task: &Task) -> StoreResult<()> {
    write_new(&task.path, &render(task)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Priority, TaskStatus};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn entry(path: PathBuf, kind: EntryKind) -> Entry {
        Entry {
            id: "auth-1016".into(),
            kind,
            path,
            location: WorkflowLocation::new(WorkflowState::Current),
        }
    }

    #[test]
    fn test_load_normalizes_and_keeps_unknown_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("auth-1016.task.md");
        fs::write(
            &path,
            "---\nid: auth-1016\nstatus: WIP\npriority: p1\nestimate: 3\n---\n\n# Auth flow\n\n## Instruction\n\nDo it.\n",
        )
        .unwrap();

        let task = load(&entry(path.clone(), EntryKind::Simple)).unwrap();
        assert_eq!(task.title, "Auth flow");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.location.workflow_state, WorkflowState::Current);
        assert!(task.extra.contains_key("estimate"));

        save(&task).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("status: in_progress"));
        assert!(raw.contains("estimate: 3"));
        assert!(raw.contains("workflow_state: current"));
    }

    #[test]
    fn test_invalid_header_value_names_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("auth-1016.task.md");
        fs::write(&path, "---\nstatus: nonsense\n---\n# Auth\n").unwrap();
        let err = load(&entry(path, EntryKind::Simple)).unwrap_err();
        assert!(err.to_string().contains("auth-1016.task.md"));
        assert!(err.to_string().contains("in_progress"));
    }

    #[test]
    fn test_subtask_entry_supplies_parent_and_sequence() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("03_auth-1016.task.md");
        fs::write(&path, "---\nsequence: 1\n---\n# Auth\n").unwrap();
        let task = load(&entry(
            path,
            EntryKind::Subtask {
                parent_id: "p".into(),
                sequence: 3,
            },
        ))
        .unwrap();
        assert_eq!(task.parent_task_id.as_deref(), Some("p"));
        assert_eq!(task.sequence.as_deref(), Some("03"));
        assert!(task.is_subtask());
    }

    #[test]
    fn test_write_new_refuses_existing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x/a.task.md");
        write_new(&path, "one").unwrap();
        let err = write_new(&path, "two").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::AlreadyExists);
        assert_eq!(fs::read_to_string(&path).unwrap(), "one");

        write_atomic(&path, "three").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "three");
        assert_eq!(fs::read_dir(temp.path().join("x")).unwrap().count(), 1);
    }
}

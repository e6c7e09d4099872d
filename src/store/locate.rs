//! Directory scanning: which task files exist and where.
//!
//! Ids are read from filenames, so a scan never parses a document. The
//! containing directory is the source of a task's workflow location.

use crate::error::{IoContext, StoreResult};
use crate::identity::{OVERVIEW_FILE, TASK_EXT, parse_subtask_file_name};
use crate::types::{WorkflowLocation, WorkflowState};
use regex_lite::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static BUCKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}$").expect("bucket pattern is valid"));

/// What a located file is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// `<id>.task.md`
    Simple,
    /// `<id>/00_overview.task.md`
    Parent,
    /// `<parent>/NN_<id>.task.md`
    Subtask { parent_id: String, sequence: u8 },
}

/// One task file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub kind: EntryKind,
    /// Task file; the overview document for a parent.
    pub path: PathBuf,
    pub location: WorkflowLocation,
}

impl Entry {
    /// Directory of a parent task.
    pub fn parent_dir(&self) -> Option<&Path> {
        match self.kind {
            EntryKind::Parent => self.path.parent(),
            _ => None,
        }
    }

    pub fn is_subtask(&self) -> bool {
        matches!(self.kind, EntryKind::Subtask { .. })
    }
}

/// Directory holding tasks at `location`.
pub fn location_dir(root: &Path, location: &WorkflowLocation) -> PathBuf {
    root.join(location.relative_dir())
}

/// Child entries of `dir` sorted by name; empty when `dir` does not exist.
fn sorted_children(dir: &Path) -> StoreResult<Vec<(String, PathBuf, bool)>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(crate::error::StoreError::io(dir, e)),
    };

    let mut children = Vec::new();
    for entry in read {
        let entry = entry.at(dir)?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().at(&entry.path())?.is_dir();
        children.push((name, entry.path(), is_dir));
    }
    children.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(children)
}

/// Every task file in the given workflow states (all states when empty).
pub fn scan(root: &Path, states: &[WorkflowState]) -> StoreResult<Vec<Entry>> {
    let states: &[WorkflowState] = if states.is_empty() {
        &WorkflowState::ALL
    } else {
        states
    };

    let mut out = Vec::new();
    for state in states {
        let dir = root.join(state.as_str());
        let location = WorkflowLocation::new(*state);
        if *state == WorkflowState::Archive {
            for (name, path, is_dir) in sorted_children(&dir)? {
                if is_dir && BUCKET.is_match(&name) {
                    let bucket = WorkflowLocation {
                        workflow_state: WorkflowState::Archive,
                        archive_bucket: Some(name),
                    };
                    scan_dir(&path, &bucket, &mut out)?;
                }
            }
        }
        scan_dir(&dir, &location, &mut out)?;
    }
    debug!(root = %root.display(), count = out.len(), "scanned task store");
    Ok(out)
}

fn scan_dir(dir: &Path, location: &WorkflowLocation, out: &mut Vec<Entry>) -> StoreResult<()> {
    for (name, path, is_dir) in sorted_children(dir)? {
        if is_dir {
            if location.archive_bucket.is_none()
                && location.workflow_state == WorkflowState::Archive
                && BUCKET.is_match(&name)
            {
                continue;
            }
            scan_parent(&path, name, location, out)?;
        } else if let Some(id) = name.strip_suffix(TASK_EXT) {
            out.push(Entry {
                id: id.to_string(),
                kind: EntryKind::Simple,
                path,
                location: location.clone(),
            });
        }
    }
    Ok(())
}

fn scan_parent(
    dir: &Path,
    id: String,
    location: &WorkflowLocation,
    out: &mut Vec<Entry>,
) -> StoreResult<()> {
    let overview = dir.join(OVERVIEW_FILE);
    if !overview.is_file() {
        debug!(dir = %dir.display(), "skipping directory without overview");
        return Ok(());
    }
    out.push(Entry {
        id: id.clone(),
        kind: EntryKind::Parent,
        path: overview,
        location: location.clone(),
    });
    out.extend(subtask_entries(dir, &id, location)?);
    Ok(())
}

/// Subtask files of a parent directory in filename order.
pub fn subtask_entries(
    dir: &Path,
    parent_id: &str,
    location: &WorkflowLocation,
) -> StoreResult<Vec<Entry>> {
    let mut entries = Vec::new();
    for (name, path, is_dir) in sorted_children(dir)? {
        if is_dir {
            continue;
        }
        if let Some((sequence, id)) = parse_subtask_file_name(&name) {
            entries.push(Entry {
                id: id.to_string(),
                kind: EntryKind::Subtask {
                    parent_id: parent_id.to_string(),
                    sequence,
                },
                path,
                location: location.clone(),
            });
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_scan_layout() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(&root.join("backlog/a-1016.task.md"));
        touch(&root.join("current/p-1016/00_overview.task.md"));
        touch(&root.join("current/p-1016/01_b-1016.task.md"));
        touch(&root.join("current/p-1016/02_c-1016.task.md"));
        touch(&root.join("current/p-1016/notes.md"));
        touch(&root.join("current/stray/readme.md"));
        touch(&root.join("archive/2024-03/d-0301.task.md"));
        touch(&root.join("backlog/.hidden.task.md"));

        let entries = scan(root, &[]).unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a-1016", "p-1016", "b-1016", "c-1016", "d-0301"]);

        assert_eq!(entries[1].kind, EntryKind::Parent);
        assert_eq!(entries[1].parent_dir(), Some(root.join("current/p-1016").as_path()));
        assert_eq!(
            entries[3].kind,
            EntryKind::Subtask {
                parent_id: "p-1016".into(),
                sequence: 2
            }
        );
        assert_eq!(entries[4].location.to_string(), "archive/2024-03");
    }

    #[test]
    fn test_scan_selected_states_and_missing_root() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("backlog/a.task.md"));
        touch(&temp.path().join("current/b.task.md"));
        let entries = scan(temp.path(), &[WorkflowState::Current]).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "b");

        assert!(scan(&temp.path().join("missing"), &[]).unwrap().is_empty());
    }
}

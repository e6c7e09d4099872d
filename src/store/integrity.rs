//! Whole-store consistency check.

use super::locate::{self, Entry, EntryKind};
use super::{parent, record};
use crate::error::StoreResult;
use crate::types::WorkflowLocation;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DuplicateId {
    pub id: String,
    pub paths: Vec<PathBuf>,
}

/// A `parent_task` header naming a task that does not exist.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DanglingParent {
    pub id: String,
    pub parent_task: String,
    pub path: PathBuf,
}

/// Header location disagreeing with the directory the file sits in.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LocationMismatch {
    pub id: String,
    pub path: PathBuf,
    pub header: WorkflowLocation,
    pub actual: WorkflowLocation,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InvalidSequence {
    pub parent: String,
    pub dir: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Unreadable {
    pub path: PathBuf,
    pub error: String,
}

/// Findings of [`crate::store::TaskStore::check_integrity`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub tasks_checked: usize,
    pub duplicate_ids: Vec<DuplicateId>,
    pub dangling_parents: Vec<DanglingParent>,
    pub location_mismatches: Vec<LocationMismatch>,
    pub invalid_sequences: Vec<InvalidSequence>,
    pub unreadable: Vec<Unreadable>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_ids.is_empty()
            && self.dangling_parents.is_empty()
            && self.location_mismatches.is_empty()
            && self.invalid_sequences.is_empty()
            && self.unreadable.is_empty()
    }

    pub fn problem_count(&self) -> usize {
        self.duplicate_ids.len()
            + self.dangling_parents.len()
            + self.location_mismatches.len()
            + self.invalid_sequences.len()
            + self.unreadable.len()
    }
}

/// Check every task under `root`. Reads only; nothing is repaired.
pub fn check(root: &Path) -> StoreResult<IntegrityReport> {
    let entries = locate::scan(root, &[])?;
    let mut report = IntegrityReport {
        tasks_checked: entries.len(),
        ..Default::default()
    };

    let mut by_id: BTreeMap<&str, Vec<&Entry>> = BTreeMap::new();
    for entry in &entries {
        by_id.entry(entry.id.as_str()).or_default().push(entry);
    }
    report.duplicate_ids = by_id
        .iter()
        .filter(|(_, found)| found.len() > 1)
        .map(|(id, found)| DuplicateId {
            id: id.to_string(),
            paths: found.iter().map(|e| e.path.clone()).collect(),
        })
        .collect();
    let known: HashSet<&str> = by_id.keys().copied().collect();

    for entry in &entries {
        let (header, _) = match record::read_raw(&entry.path) {
            Ok(parsed) => parsed,
            Err(e) => {
                report.unreadable.push(Unreadable {
                    path: entry.path.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        if let Some(found) = record::header_location(&header)
            && found != entry.location
        {
            report.location_mismatches.push(LocationMismatch {
                id: entry.id.clone(),
                path: entry.path.clone(),
                header: found,
                actual: entry.location.clone(),
            });
        }

        if entry.kind == EntryKind::Simple
            && let Some(parent_id) = header.parent_task
            && !known.contains(parent_id.as_str())
        {
            report.dangling_parents.push(DanglingParent {
                id: entry.id.clone(),
                parent_task: parent_id,
                path: entry.path.clone(),
            });
        }

        if entry.kind == EntryKind::Parent {
            check_parent(entry, &mut report);
        }
    }

    if report.is_clean() {
        info!(tasks = report.tasks_checked, "integrity check clean");
    } else {
        warn!(
            tasks = report.tasks_checked,
            problems = report.problem_count(),
            "integrity check found problems"
        );
    }
    Ok(report)
}

fn check_parent(entry: &Entry, report: &mut IntegrityReport) {
    let dir = entry.parent_dir().map(Path::to_path_buf).unwrap_or_default();
    let reason = match parent::load(entry) {
        Err(e) => Some(e.to_string()),
        Ok(loaded) if !loaded.is_valid_sequence() => {
            Some("subtask prefixes are out of range or repeat an id".to_string())
        }
        Ok(loaded) => match parent::headers_match(&loaded) {
            Ok(true) => None,
            Ok(false) => Some("a subtask header disagrees with its filename".to_string()),
            Err(e) => Some(e.to_string()),
        },
    };
    if let Some(reason) = reason {
        report.invalid_sequences.push(InvalidSequence {
            parent: entry.id.clone(),
            dir,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_clean_store() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(
            &root.join("backlog/a.task.md"),
            "---\nworkflow_state: backlog\n---\n# A\n",
        );
        write(&root.join("current/p/00_overview.task.md"), "---\nid: p\n---\n# P\n");
        write(
            &root.join("current/p/01_b.task.md"),
            "---\nparent_task: p\nsequence: '01'\n---\n# B\n",
        );

        let report = check(root).unwrap();
        assert_eq!(report.tasks_checked, 3);
        assert!(report.is_clean(), "{:?}", report);
    }

    #[test]
    fn test_reports_each_problem() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("backlog/dup.task.md"), "# Dup\n");
        write(&root.join("current/dup.task.md"), "# Dup again\n");
        write(
            &root.join("backlog/orphan.task.md"),
            "---\nparent_task: gone\n---\n# Orphan\n",
        );
        write(
            &root.join("backlog/lost.task.md"),
            "---\nworkflow_state: current\n---\n# Lost\n",
        );
        write(&root.join("backlog/bad.task.md"), "---\nstatus: [\n# Bad\n");
        write(&root.join("backlog/p/00_overview.task.md"), "# P\n");
        write(
            &root.join("backlog/p/01_c.task.md"),
            "---\nparent_task: p\nsequence: '03'\n---\n# C\n",
        );

        let report = check(root).unwrap();
        assert_eq!(report.duplicate_ids.len(), 1);
        assert_eq!(report.duplicate_ids[0].id, "dup");
        assert_eq!(report.duplicate_ids[0].paths.len(), 2);
        assert_eq!(report.dangling_parents.len(), 1);
        assert_eq!(report.dangling_parents[0].parent_task, "gone");
        assert_eq!(report.location_mismatches.len(), 1);
        assert_eq!(report.location_mismatches[0].id, "lost");
        assert_eq!(report.unreadable.len(), 1);
        assert_eq!(report.invalid_sequences.len(), 1);
        assert_eq!(report.invalid_sequences[0].parent, "p");
        assert!(!report.is_clean());
    }
}

//! Parent task aggregates: load from a directory, write back after mutation.

use super::locate::{Entry, EntryKind, subtask_entries};
use super::record;
use crate::error::{IoContext, StoreError, StoreResult};
use crate::identity::subtask_file_name;
use crate::types::{ParentTask, SubtaskEntry, WorkflowLocation, format_sequence};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Build the in-memory aggregate for a parent entry.
pub fn load(entry: &Entry) -> StoreResult<ParentTask> {
    let Some(dir) = entry.parent_dir() else {
        return Err(StoreError::invalid_value(
            "parent",
            format!("{} is not a parent task", entry.id),
        ));
    };
    let overview = record::load(entry)?;
    let subtasks = subtask_entries(dir, &entry.id, &entry.location)?
        .into_iter()
        .filter_map(|sub| match sub.kind {
            EntryKind::Subtask { sequence, .. } => Some(SubtaskEntry {
                sequence,
                id: sub.id,
                path: sub.path,
            }),
            _ => None,
        })
        .collect();

    Ok(ParentTask {
        id: entry.id.clone(),
        dir: dir.to_path_buf(),
        overview,
        subtasks,
    })
}

/// Every subtask header records the parent and the sequence its filename carries.
pub fn headers_match(parent: &ParentTask) -> StoreResult<bool> {
    for sub in &parent.subtasks {
        let (frontmatter, _) = record::read_raw(&sub.path)?;
        let sequence = format_sequence(sub.sequence);
        if frontmatter.sequence.as_deref() != Some(sequence.as_str())
            || frontmatter.parent_task.as_deref() != Some(parent.id.as_str())
        {
            debug!(parent = %parent.id, subtask = %sub.id, "subtask header out of step with filename");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Make every subtask file agree with the aggregate's ordering.
///
/// Files whose prefix changed are renamed, then their header `sequence` is
/// rewritten. Stops at the first failure, reporting the files already
/// changed. Returns the changed files.
pub fn write_back(parent: &mut ParentTask) -> StoreResult<Vec<PathBuf>> {
    let mut changed = Vec::new();
    let location = parent.overview.location.clone();

    for sub in parent.subtasks.iter_mut() {
        let target = parent.dir.join(subtask_file_name(sub.sequence, &sub.id));
        let result = rewrite_one(sub, &target, &parent.id, &location, &mut changed);
        if let Err(e) = result {
            return Err(e.partial(changed));
        }
    }
    if !changed.is_empty() {
        debug!(parent = %parent.id, files = changed.len(), "renumbered subtasks");
    }
    Ok(changed)
}

fn rewrite_one(
    sub: &mut SubtaskEntry,
    target: &Path,
    parent_id: &str,
    location: &WorkflowLocation,
    changed: &mut Vec<PathBuf>,
) -> StoreResult<()> {
    if sub.path != target {
        if target.exists() {
            return Err(StoreError::already_exists(target));
        }
        fs::rename(&sub.path, target).at(&sub.path)?;
        sub.path = target.to_path_buf();
        changed.push(target.to_path_buf());
    }

    let entry = Entry {
        id: sub.id.clone(),
        kind: EntryKind::Subtask {
            parent_id: parent_id.to_string(),
            sequence: sub.sequence,
        },
        path: sub.path.clone(),
        location: location.clone(),
    };
    let (frontmatter, _) = record::read_raw(&sub.path)?;
    let sequence = format_sequence(sub.sequence);
    let header_current = frontmatter.sequence.as_deref() == Some(sequence.as_str())
        && frontmatter.parent_task.as_deref() == Some(parent_id);
    if header_current {
        return Ok(());
    }

    let mut task = record::load(&entry)?;
    task.updated = Utc::now();
    record::save(&task)?;
    if changed.last().map(PathBuf::as_path) != Some(target) {
        changed.push(target.to_path_buf());
    }
    Ok(())
}

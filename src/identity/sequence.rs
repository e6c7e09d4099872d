//! Subtask ordering inside a parent task.
//!
//! Ordering lives in [`ParentTask::subtasks`] while an operation runs; the
//! `NN_` filename prefixes are rewritten from it afterwards. Subtasks that
//! share a sequence number form a parallel group.

use crate::error::{StoreError, StoreResult};
use crate::types::{MAX_SEQUENCE, ParentTask, SubtaskEntry, format_sequence};
use regex_lite::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Extension of every task file.
pub const TASK_EXT: &str = ".task.md";

/// Overview document of a parent task directory.
pub const OVERVIEW_FILE: &str = "00_overview.task.md";

static SUBTASK_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2})_(.+)\.task\.md$").expect("subtask filename pattern is valid")
});

/// `NN_<id>.task.md`
pub fn subtask_file_name(sequence: u8, id: &str) -> String {
    format!("{}_{}{}", format_sequence(sequence), id, TASK_EXT)
}

/// Split a subtask filename into sequence and id. The overview never matches.
pub fn parse_subtask_file_name(name: &str) -> Option<(u8, &str)> {
    if name == OVERVIEW_FILE {
        return None;
    }
    let caps = SUBTASK_FILE.captures(name)?;
    let sequence: u8 = caps.get(1)?.as_str().parse().ok()?;
    if sequence == 0 {
        return None;
    }
    Some((sequence, caps.get(2)?.as_str()))
}

impl ParentTask {
    pub fn subtask(&self, id: &str) -> Option<&SubtaskEntry> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    fn require(&self, id: &str) -> StoreResult<u8> {
        self.subtask(id)
            .map(|s| s.sequence)
            .ok_or_else(|| StoreError::task_not_found(&format!("{} in parent {}", id, self.id)))
    }

    fn sort(&mut self) {
        self.subtasks.sort_by_key(|s| s.sequence);
    }

    fn max_sequence(&self) -> u8 {
        self.subtasks.iter().map(|s| s.sequence).max().unwrap_or(0)
    }

    /// One past the highest sequence in use.
    pub fn next_sequence_number(&self) -> StoreResult<u8> {
        let next = self.max_sequence() + 1;
        if next > MAX_SEQUENCE {
            return Err(StoreError::invalid_sequence(format!(
                "Parent {} has no sequence left after {}",
                self.id, MAX_SEQUENCE
            )));
        }
        Ok(next)
    }

    /// [`ParentTask::next_sequence_number`] as its two-digit string.
    pub fn next_sequence(&self) -> StoreResult<String> {
        self.next_sequence_number().map(format_sequence)
    }

    /// Append a subtask after every existing group.
    pub fn push_subtask(&mut self, id: &str, path: PathBuf) -> StoreResult<u8> {
        if self.subtask(id).is_some() {
            return Err(StoreError::invalid_sequence(format!(
                "{} is already a subtask of {}",
                id, self.id
            )));
        }
        let sequence = self.next_sequence_number()?;
        self.subtasks.push(SubtaskEntry {
            sequence,
            id: id.to_string(),
            path,
        });
        Ok(sequence)
    }

    pub fn remove_subtask(&mut self, id: &str) -> Option<SubtaskEntry> {
        let idx = self.subtasks.iter().position(|s| s.id == id)?;
        Some(self.subtasks.remove(idx))
    }

    /// Put the listed subtasks into one parallel group at their lowest sequence.
    pub fn make_parallel(&mut self, ids: &[String]) -> StoreResult<u8> {
        if ids.is_empty() {
            return Err(StoreError::invalid_sequence("No subtasks given to parallelize"));
        }
        let sequences = ids
            .iter()
            .map(|id| self.require(id))
            .collect::<StoreResult<Vec<_>>>()?;
        let min = sequences.into_iter().min().unwrap_or(1);

        for entry in self.subtasks.iter_mut().filter(|s| ids.contains(&s.id)) {
            entry.sequence = min;
        }
        self.sort();
        Ok(min)
    }

    /// Place `new_id` in its own group directly after `after_id`'s group.
    ///
    /// Every later group moves up by one, together, so parallel groups stay
    /// parallel. When `new_id` is already a subtask it is moved.
    pub fn insert_after(&mut self, after_id: &str, new_id: &str, path: PathBuf) -> StoreResult<u8> {
        if after_id == new_id {
            return Err(StoreError::invalid_sequence(format!(
                "Cannot insert {} after itself",
                new_id
            )));
        }
        let anchor = self.require(after_id)?;
        let sequence = anchor + 1;

        let moved = self.subtask(new_id).cloned();
        let highest = self
            .subtasks
            .iter()
            .filter(|s| s.id != new_id)
            .map(|s| s.sequence)
            .max()
            .unwrap_or(0);
        let highest_after = highest.max(anchor) + 1;
        if highest_after > MAX_SEQUENCE {
            return Err(StoreError::invalid_sequence(format!(
                "Inserting after {} would push parent {} past sequence {}",
                after_id, self.id, MAX_SEQUENCE
            )));
        }

        let path = match moved {
            Some(entry) => {
                self.remove_subtask(new_id);
                entry.path
            }
            None => path,
        };
        for entry in self.subtasks.iter_mut().filter(|s| s.sequence >= sequence) {
            entry.sequence += 1;
        }
        self.subtasks.push(SubtaskEntry {
            sequence,
            id: new_id.to_string(),
            path,
        });
        self.sort();
        Ok(sequence)
    }

    /// Renumber from an explicit list of groups, `01` upwards.
    ///
    /// Every subtask must appear exactly once.
    pub fn reorder(&mut self, groups: &[Vec<String>]) -> StoreResult<()> {
        let groups: Vec<&Vec<String>> = groups.iter().filter(|g| !g.is_empty()).collect();
        if groups.len() > MAX_SEQUENCE as usize {
            return Err(StoreError::invalid_sequence(format!(
                "{} groups exceed the {} available sequence numbers",
                groups.len(),
                MAX_SEQUENCE
            )));
        }

        let mut seen = HashSet::new();
        for id in groups.iter().flat_map(|g| g.iter()) {
            self.require(id)?;
            if !seen.insert(id.as_str()) {
                return Err(StoreError::invalid_sequence(format!(
                    "{} appears more than once in the new order",
                    id
                )));
            }
        }
        if seen.len() != self.subtasks.len() {
            let missing: Vec<&str> = self
                .subtasks
                .iter()
                .map(|s| s.id.as_str())
                .filter(|id| !seen.contains(id))
                .collect();
            return Err(StoreError::invalid_sequence(format!(
                "New order leaves out: {}",
                missing.join(", ")
            )));
        }

        for (idx, group) in groups.iter().enumerate() {
            let sequence = idx as u8 + 1;
            for entry in self.subtasks.iter_mut().filter(|s| group.contains(&s.id)) {
                entry.sequence = sequence;
            }
        }
        self.sort();
        Ok(())
    }

    /// Subtask ids grouped by sequence, in order.
    pub fn groups(&self) -> Vec<(u8, Vec<&str>)> {
        let mut groups: Vec<(u8, Vec<&str>)> = Vec::new();
        for entry in &self.subtasks {
            match groups.last_mut() {
                Some((sequence, ids)) if *sequence == entry.sequence => ids.push(entry.id.as_str()),
                _ => groups.push((entry.sequence, vec![entry.id.as_str()])),
            }
        }
        groups
    }

    /// Sequences are non-decreasing, within `01..=99`, and ids are unique.
    pub fn is_valid_sequence(&self) -> bool {
        let mut seen = HashSet::new();
        let mut previous = 0;
        for entry in &self.subtasks {
            if entry.sequence == 0
                || entry.sequence > MAX_SEQUENCE
                || entry.sequence < previous
                || !seen.insert(entry.id.as_str())
            {
                return false;
            }
            previous = entry.sequence;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TaskDocument;
    use crate::types::{Task, WorkflowLocation};
    use chrono::Utc;

    fn parent(ids: &[&str]) -> ParentTask {
        let now = Utc::now();
        let overview = Task {
            id: "p".into(),
            title: "P".into(),
            task_type: Default::default(),
            status: Default::default(),
            priority: Default::default(),
            area: String::new(),
            tags: Default::default(),
            assignee: None,
            location: WorkflowLocation::default(),
            parent_task_id: None,
            sequence: None,
            created: now,
            updated: now,
            document: TaskDocument::new("P"),
            extra: Default::default(),
            path: PathBuf::new(),
        };
        let mut parent = ParentTask {
            id: "p".into(),
            dir: PathBuf::new(),
            overview,
            subtasks: Vec::new(),
        };
        for id in ids {
            parent.push_subtask(id, PathBuf::new()).unwrap();
        }
        parent
    }

    fn sequences(parent: &ParentTask) -> Vec<(String, u8)> {
        parent
            .subtasks
            .iter()
            .map(|s| (s.id.clone(), s.sequence))
            .collect()
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_filename_helpers() {
        assert_eq!(subtask_file_name(3, "fix-1016"), "03_fix-1016.task.md");
        assert_eq!(parse_subtask_file_name("03_fix-1016.task.md"), Some((3, "fix-1016")));
        assert_eq!(parse_subtask_file_name(OVERVIEW_FILE), None);
        assert_eq!(parse_subtask_file_name("00_other.task.md"), None);
        assert_eq!(parse_subtask_file_name("3_fix.task.md"), None);
        assert_eq!(parse_subtask_file_name("notes.md"), None);
    }

    #[test]
    fn test_next_sequence() {
        let p = parent(&[]);
        assert_eq!(p.next_sequence().unwrap(), "01");
        let p = parent(&["a", "b"]);
        assert_eq!(p.next_sequence().unwrap(), "03");
    }

    #[test]
    fn test_parallel_then_insert_scenario() {
        let mut p = parent(&["a", "b", "c"]);
        assert_eq!(
            sequences(&p),
            vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]
        );

        assert_eq!(p.make_parallel(&ids(&["b", "c"])).unwrap(), 2);
        assert_eq!(
            sequences(&p),
            vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 2)]
        );

        assert_eq!(p.insert_after("a", "d", PathBuf::new()).unwrap(), 2);
        assert_eq!(
            sequences(&p),
            vec![
                ("a".into(), 1),
                ("d".into(), 2),
                ("b".into(), 3),
                ("c".into(), 3)
            ]
        );
        assert!(p.is_valid_sequence());
    }

    #[test]
    fn test_insert_after_parallel_member_starts_new_group() {
        let mut p = parent(&["a", "b", "c"]);
        p.make_parallel(&ids(&["a", "b"])).unwrap();
        p.insert_after("b", "d", PathBuf::new()).unwrap();
        assert_eq!(
            p.groups(),
            vec![(1, vec!["a", "b"]), (2, vec!["d"]), (4, vec!["c"])]
        );
    }

    #[test]
    fn test_insert_existing_subtask_moves_it() {
        let mut p = parent(&["a", "b", "c"]);
        p.insert_after("a", "c", PathBuf::new()).unwrap();
        assert_eq!(p.groups(), vec![(1, vec!["a"]), (2, vec!["c"]), (3, vec!["b"])]);
        assert_eq!(p.subtasks.len(), 3);
    }

    #[test]
    fn test_insert_rejects_unknown_anchor_and_self() {
        let mut p = parent(&["a"]);
        assert!(p.insert_after("zz", "d", PathBuf::new()).is_err());
        assert!(p.insert_after("a", "a", PathBuf::new()).is_err());
        assert_eq!(p.subtasks.len(), 1);
    }

    #[test]
    fn test_insert_past_limit_leaves_parent_untouched() {
        let mut p = parent(&["a"]);
        p.subtasks[0].sequence = MAX_SEQUENCE;
        let before = sequences(&p);
        let err = p.insert_after("a", "b", PathBuf::new()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidSequence);
        assert_eq!(sequences(&p), before);
    }

    #[test]
    fn test_make_parallel_unknown_id_is_not_found() {
        let mut p = parent(&["a", "b"]);
        let err = p.make_parallel(&ids(&["a", "nope"])).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::TaskNotFound);
        assert_eq!(sequences(&p), vec![("a".into(), 1), ("b".into(), 2)]);
    }

    #[test]
    fn test_reorder() {
        let mut p = parent(&["a", "b", "c", "d"]);
        p.reorder(&[ids(&["d"]), ids(&["b", "a"]), ids(&["c"])]).unwrap();
        assert_eq!(
            p.groups(),
            vec![(1, vec!["d"]), (2, vec!["a", "b"]), (3, vec!["c"])]
        );

        assert!(p.reorder(&[ids(&["a", "b", "c"])]).is_err());
        assert!(p.reorder(&[ids(&["a", "b"]), ids(&["c", "d", "a"])]).is_err());
    }

    #[test]
    fn test_is_valid_sequence_detects_disorder() {
        let mut p = parent(&["a", "b"]);
        assert!(p.is_valid_sequence());
        p.subtasks[0].sequence = 5;
        assert!(!p.is_valid_sequence());
    }

    #[test]
    fn test_push_duplicate_is_rejected() {
        let mut p = parent(&["a"]);
        assert!(p.push_subtask("a", PathBuf::new()).is_err());
    }
}

//! Workflow state store: create, read, update, move and list task files.
//!
//! Every operation runs to completion synchronously. There is no locking;
//! concurrent writers to the same file race and the last write wins. New
//! files are created exclusively, so two processes that pick the same id
//! cannot both succeed and the loser retries with a fresh id.

pub mod integrity;
mod locate;
mod parent;
mod record;

pub use integrity::IntegrityReport;

use crate::config::ProjectSettings;
use crate::document::TaskDocument;
use crate::document::frontmatter;
use crate::document::normalize::{
    normalize_or_default, normalize_priority, normalize_status, normalize_type,
};
use crate::error::{ErrorCode, IoContext, StoreError, StoreResult};
use crate::identity::{IdGenerator, OVERVIEW_FILE, TASK_EXT, subtask_file_name};
use crate::paths::{PathResolver, ResourceType};
use crate::types::{
    OVERVIEW_SEQUENCE, ParentTask, Priority, Task, TaskStatus, TaskType, WorkflowLocation,
    WorkflowState, format_sequence,
};
use chrono::{DateTime, Utc};
use locate::{Entry, EntryKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Exclusive-create attempts before `create` gives up.
const CREATE_ATTEMPTS: usize = 5;

/// Input for [`TaskStore::create`].
///
/// Enumerable fields are free-form and normalized; absent ones take their
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub title: String,
    pub task_type: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub area: Option<String>,
    pub tags: Vec<String>,
    pub assignee: Option<String>,
    /// Defaults to backlog.
    pub workflow_state: Option<WorkflowState>,
    /// Section name and text pairs, applied after the template.
    pub sections: Vec<(String, String)>,
    /// Template name, looked up as `<name>.md` in the templates locations.
    pub template: Option<String>,
    /// Create as a subtask of this task, promoting it if needed.
    pub parent: Option<String>,
    /// With `parent`: place the new subtask right after this one.
    pub after: Option<String>,
}

impl CreateOptions {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Changes for [`TaskStore::update`]. `None` and empty lists leave fields alone.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub task_type: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub area: Option<String>,
    /// Replace the whole tag set.
    pub tags: Option<Vec<String>>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    /// An empty string clears the assignee.
    pub assignee: Option<String>,
    /// Replace (or add) sections by name.
    pub sections: Vec<(String, String)>,
    pub remove_sections: Vec<String>,
    /// Line appended to the `Log` section.
    pub log: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.task_type.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.area.is_none()
            && self.tags.is_none()
            && self.add_tags.is_empty()
            && self.remove_tags.is_empty()
            && self.assignee.is_none()
            && self.sections.is_empty()
            && self.remove_sections.is_empty()
            && self.log.is_none()
    }
}

/// Options for [`TaskStore::move_task`].
#[derive(Debug, Clone, Copy)]
pub struct MoveOptions {
    /// Set status to `done` when archiving an open task.
    pub adjust_status: bool,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            adjust_status: true,
        }
    }
}

/// Filters for [`TaskStore::list`], applied after parsing.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Workflow states to scan; all when empty.
    pub states: Vec<WorkflowState>,
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
    pub priority: Option<Priority>,
    pub area: Option<String>,
    pub tag: Option<String>,
    pub assignee: Option<String>,
    /// Only subtasks of this parent.
    pub parent: Option<String>,
    /// Include subtasks when no parent is given.
    pub include_subtasks: bool,
}

impl ListFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if self.parent.is_none() && !self.include_subtasks && task.is_subtask() {
            return false;
        }
        if let Some(ref parent) = self.parent
            && task.parent_task_id.as_ref() != Some(parent)
        {
            return false;
        }
        self.status.is_none_or(|s| task.status == s)
            && self.task_type.is_none_or(|t| task.task_type == t)
            && self.priority.is_none_or(|p| task.priority == p)
            && self
                .area
                .as_ref()
                .is_none_or(|a| task.area.eq_ignore_ascii_case(a))
            && self.tag.as_ref().is_none_or(|t| task.tags.contains(t))
            && self
                .assignee
                .as_ref()
                .is_none_or(|a| task.assignee.as_ref() == Some(a))
    }
}

/// What [`TaskStore::delete`] removed and repaired.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteOutcome {
    pub id: String,
    pub removed: Vec<PathBuf>,
    /// Tasks whose `parent_task` pointed at the deleted task and was cleared.
    pub repaired: Vec<String>,
}

fn archive_default(status: TaskStatus, target: WorkflowState, options: MoveOptions) -> TaskStatus {
    if options.adjust_status && target == WorkflowState::Archive && !status.is_closed() {
        TaskStatus::Done
    } else {
        status
    }
}

fn location_for(state: WorkflowState, now: DateTime<Utc>) -> WorkflowLocation {
    match state {
        WorkflowState::Archive => WorkflowLocation::archived_at(now),
        other => WorkflowLocation::new(other),
    }
}

fn clean_tags(tags: &[String]) -> impl Iterator<Item = String> + '_ {
    tags.iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// The store for one project, rooted at the resolver's `tasks` location.
pub struct TaskStore {
    resolver: Arc<PathResolver>,
    ids: IdGenerator,
}

impl TaskStore {
    /// Open the store, reading per-project settings through the resolver.
    pub fn open(resolver: Arc<PathResolver>) -> StoreResult<Self> {
        let settings = ProjectSettings::load(&resolver)?;
        Ok(Self::with_settings(resolver, settings))
    }

    pub fn with_settings(resolver: Arc<PathResolver>, settings: ProjectSettings) -> Self {
        Self {
            resolver,
            ids: IdGenerator::new(settings.ids),
        }
    }

    /// Re-read `project.json`, e.g. after the resolver was reloaded.
    pub fn reload_settings(&mut self) -> StoreResult<()> {
        let settings = ProjectSettings::load(&self.resolver)?;
        self.ids = IdGenerator::new(settings.ids);
        Ok(())
    }

    pub fn resolver(&self) -> &Arc<PathResolver> {
        &self.resolver
    }

    /// Root holding `backlog/`, `current/` and `archive/`.
    pub fn tasks_root(&self) -> StoreResult<PathBuf> {
        self.resolver.tasks_dir()
    }

    fn scan(&self, states: &[WorkflowState]) -> StoreResult<Vec<Entry>> {
        locate::scan(&self.tasks_root()?, states)
    }

    /// Every id in every workflow state and parent directory.
    pub fn existing_ids(&self) -> StoreResult<HashSet<String>> {
        Ok(self.scan(&[])?.into_iter().map(|e| e.id).collect())
    }

    /// Find the file for an exact id or an unambiguous id prefix.
    fn resolve(&self, reference: &str) -> StoreResult<Entry> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(StoreError::task_not_found(reference));
        }
        let entries = self.scan(&[])?;

        let exact: Vec<&Entry> = entries.iter().filter(|e| e.id == reference).collect();
        match exact.len() {
            0 => {}
            1 => return Ok(exact[0].clone()),
            _ => {
                let paths: Vec<PathBuf> = exact.iter().map(|e| e.path.clone()).collect();
                return Err(StoreError::duplicate_id(reference, &paths));
            }
        }

        let prefixed: Vec<&Entry> = entries
            .iter()
            .filter(|e| e.id.starts_with(reference))
            .collect();
        let ids: BTreeSet<&str> = prefixed.iter().map(|e| e.id.as_str()).collect();
        match ids.len() {
            0 => Err(StoreError::task_not_found(reference)),
            1 if prefixed.len() == 1 => Ok(prefixed[0].clone()),
            1 => {
                let paths: Vec<PathBuf> = prefixed.iter().map(|e| e.path.clone()).collect();
                Err(StoreError::duplicate_id(prefixed[0].id.as_str(), &paths))
            }
            _ => {
                let candidates: Vec<String> = ids.into_iter().map(String::from).collect();
                Err(StoreError::ambiguous_id(reference, &candidates))
            }
        }
    }

    /// Find a template document, project-local first.
    pub fn load_template(&self, name: &str) -> StoreResult<TaskDocument> {
        let candidates = self.resolver.resolve_with_precedence(ResourceType::Templates)?;
        let file = format!("{}.md", name.trim_end_matches(".md"));
        let Some(path) = candidates.iter().map(|dir| dir.join(&file)).find(|p| p.is_file()) else {
            return Err(StoreError::template_not_found(name, &candidates));
        };

        let raw = fs::read_to_string(&path).at(&path)?;
        let (_, body, _) = frontmatter::split(&raw)?;
        let document = if body.trim_start().starts_with("# ") {
            TaskDocument::parse(&raw)?
        } else {
            TaskDocument::parse_content(body)?
        };
        debug!(template = name, path = %path.display(), "loaded template");
        Ok(document)
    }

    /// Build an unsaved task from creation options.
    fn draft(
        &self,
        options: &CreateOptions,
        location: WorkflowLocation,
        now: DateTime<Utc>,
    ) -> StoreResult<Task> {
        let title = options.title.trim();
        if title.is_empty() {
            return Err(StoreError::invalid_value("title", "Title must not be empty"));
        }
        let task_type = normalize_or_default(options.task_type.as_deref(), normalize_type)?;
        let status = normalize_or_default(options.status.as_deref(), normalize_status)?;
        let priority = normalize_or_default(options.priority.as_deref(), normalize_priority)?;

        let mut document = TaskDocument::new(title);
        if let Some(ref template) = options.template {
            document.fill_from(&self.load_template(template)?);
        }
        for (name, text) in &options.sections {
            document.set_section(name, text);
        }

        Ok(Task {
            id: String::new(),
            title: title.to_string(),
            task_type,
            status,
            priority,
            area: options.area.as_deref().map(str::trim).unwrap_or_default().to_string(),
            tags: clean_tags(&options.tags).collect(),
            assignee: options
                .assignee
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from),
            location,
            parent_task_id: None,
            sequence: None,
            created: now,
            updated: now,
            document,
            extra: Default::default(),
            path: PathBuf::new(),
        })
    }

    /// Create a task in the requested workflow state (backlog by default).
    pub fn create(&self, options: CreateOptions) -> StoreResult<Task> {
        if let Some(ref parent) = options.parent {
            return self.add_subtask(parent, &options);
        }

        let now = Utc::now();
        let location = location_for(options.workflow_state.unwrap_or_default(), now);
        let mut task = self.draft(&options, location, now)?;
        let dir = locate::location_dir(&self.tasks_root()?, &task.location);

        let mut existing = self.existing_ids()?;
        for _ in 0..CREATE_ATTEMPTS {
            task.id = self.ids.generate(&task.title, &existing)?;
            task.path = dir.join(format!("{}{}", task.id, TASK_EXT));
            match record::create(&task) {
                Ok(()) => {
                    info!(id = %task.id, location = %task.location, "created task");
                    return Ok(task);
                }
                Err(e) if e.code() == ErrorCode::AlreadyExists => {
                    warn!(id = %task.id, "id taken by a concurrent writer, retrying");
                    existing.insert(task.id.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Integrity {
            message: format!("Could not claim a unique id for '{}'", task.title),
            code: ErrorCode::DuplicateId,
        })
    }

    /// Load a task by exact id or unambiguous prefix.
    pub fn get(&self, id: &str) -> StoreResult<Task> {
        record::load(&self.resolve(id)?)
    }

    /// Merge header fields and sections; the file stays where it is.
    pub fn update(&self, id: &str, patch: TaskPatch) -> StoreResult<Task> {
        let mut task = self.get(id)?;
        if patch.is_empty() {
            return Ok(task);
        }

        // Validate everything before touching the task.
        let task_type = patch.task_type.as_deref().map(normalize_type).transpose()?;
        let status = patch.status.as_deref().map(normalize_status).transpose()?;
        let priority = patch.priority.as_deref().map(normalize_priority).transpose()?;
        let title = match patch.title.as_deref().map(str::trim) {
            Some("") => return Err(StoreError::invalid_value("title", "Title must not be empty")),
            other => other.map(String::from),
        };

        let now = Utc::now();
        if let Some(title) = title {
            task.document.title = title.clone();
            task.title = title;
        }
        if let Some(task_type) = task_type {
            task.task_type = task_type;
        }
        if let Some(status) = status {
            task.status = status;
        }
        if let Some(priority) = priority {
            task.priority = priority;
        }
        if let Some(area) = patch.area {
            task.area = area.trim().to_string();
        }
        if let Some(ref tags) = patch.tags {
            task.tags = clean_tags(tags).collect();
        }
        task.tags.extend(clean_tags(&patch.add_tags));
        for tag in clean_tags(&patch.remove_tags) {
            task.tags.remove(&tag);
        }
        if let Some(assignee) = patch.assignee {
            let assignee = assignee.trim();
            task.assignee = (!assignee.is_empty()).then(|| assignee.to_string());
        }
        for name in &patch.remove_sections {
            task.document.remove_section(name);
        }
        for (name, text) in &patch.sections {
            task.document.set_section(name, text);
        }
        if let Some(ref entry) = patch.log {
            task.document.append_log(entry, now);
        }

        task.updated = now;
        record::save(&task)?;
        info!(id = %task.id, "updated task");
        Ok(task)
    }

    /// Append a timestamped line to a task's log.
    pub fn append_log(&self, id: &str, entry: &str) -> StoreResult<Task> {
        self.update(
            id,
            TaskPatch {
                log: Some(entry.to_string()),
                ..Default::default()
            },
        )
    }

    /// Mark checklist item `index` of the `Tasks` section done.
    pub fn complete_item(&self, id: &str, index: usize) -> StoreResult<Task> {
        let mut task = self.get(id)?;
        let done = task.document.checklist().get(index).map(|item| item.done);
        if done != Some(true) {
            task.document.toggle_item(index)?;
            task.updated = Utc::now();
            record::save(&task)?;
            debug!(id = %task.id, index, "completed checklist item");
        }
        Ok(task)
    }

    /// Relocate a task (or a whole parent directory) to another workflow state.
    ///
    /// Archiving buckets by the current year-month and, unless
    /// `options.adjust_status` is off, sets open tasks to `done`. Subtasks
    /// move only with their parent.
    pub fn move_task(
        &self,
        id: &str,
        target: WorkflowState,
        options: MoveOptions,
    ) -> StoreResult<Task> {
        let entry = self.resolve(id)?;
        if let EntryKind::Subtask { ref parent_id, .. } = entry.kind {
            return Err(StoreError::invalid_value(
                "workflow_state",
                format!(
                    "{} is a subtask of {}; move the parent instead",
                    entry.id, parent_id
                ),
            ));
        }
        if entry.location.workflow_state == target {
            debug!(id = %entry.id, state = %target, "task already in target state");
            return record::load(&entry);
        }

        let now = Utc::now();
        let location = location_for(target, now);
        let dest_dir = locate::location_dir(&self.tasks_root()?, &location);
        fs::create_dir_all(&dest_dir).at(&dest_dir)?;

        let task = match entry.kind {
            EntryKind::Parent => self.move_parent(&entry, &dest_dir, &location, options, now)?,
            _ => {
                let mut task = record::load(&entry)?;
                let dest = dest_dir.join(format!("{}{}", entry.id, TASK_EXT));
                if dest.exists() {
                    return Err(StoreError::already_exists(&dest));
                }
                fs::rename(&entry.path, &dest).at(&entry.path)?;
                task.path = dest;
                task.location = location;
                task.status = archive_default(task.status, target, options);
                task.updated = now;
                record::save(&task).map_err(|e| e.partial(vec![task.path.clone()]))?;
                task
            }
        };

        info!(
            id = %task.id,
            from = %entry.location,
            to = %task.location,
            status = %task.status,
            "moved task"
        );
        Ok(task)
    }

    fn move_parent(
        &self,
        entry: &Entry,
        dest_dir: &Path,
        location: &WorkflowLocation,
        options: MoveOptions,
        now: DateTime<Utc>,
    ) -> StoreResult<Task> {
        let parent = parent::load(entry)?;
        let dest = dest_dir.join(&parent.id);
        if dest.exists() {
            return Err(StoreError::already_exists(&dest));
        }
        fs::rename(&parent.dir, &dest).at(&parent.dir)?;
        let mut changed = vec![dest.clone()];

        let mut overview = parent.overview;
        overview.path = dest.join(OVERVIEW_FILE);
        overview.location = location.clone();
        overview.status = archive_default(overview.status, location.workflow_state, options);
        overview.updated = now;
        record::save(&overview).map_err(|e| e.partial(changed.clone()))?;
        changed.push(overview.path.clone());

        // Subtask headers mirror the parent's location.
        for sub in &parent.subtasks {
            let sub_entry = Entry {
                id: sub.id.clone(),
                kind: EntryKind::Subtask {
                    parent_id: parent.id.clone(),
                    sequence: sub.sequence,
                },
                path: dest.join(subtask_file_name(sub.sequence, &sub.id)),
                location: location.clone(),
            };
            let result = record::load(&sub_entry).and_then(|mut task| {
                task.status = archive_default(task.status, location.workflow_state, options);
                task.updated = now;
                record::save(&task)
            });
            if let Err(e) = result {
                return Err(e.partial(changed));
            }
            changed.push(sub_entry.path);
        }
        Ok(overview)
    }

    /// Turn a simple task into a parent directory with an overview document.
    ///
    /// Already-parent tasks are returned as they are.
    pub fn promote_to_parent(&self, id: &str) -> StoreResult<ParentTask> {
        let entry = self.resolve(id)?;
        match entry.kind {
            EntryKind::Parent => return parent::load(&entry),
            EntryKind::Subtask { ref parent_id, .. } => {
                return Err(StoreError::invalid_value(
                    "parent",
                    format!("{} is a subtask of {} and cannot hold subtasks", entry.id, parent_id),
                ));
            }
            EntryKind::Simple => {}
        }

        let mut task = record::load(&entry)?;
        let dir = entry.path.with_file_name(&entry.id);
        if dir.exists() {
            return Err(StoreError::already_exists(&dir));
        }
        fs::create_dir(&dir).at(&dir)?;

        task.path = dir.join(OVERVIEW_FILE);
        task.sequence = Some(OVERVIEW_SEQUENCE.to_string());
        task.parent_task_id = None;
        task.updated = Utc::now();
        record::create(&task).map_err(|e| e.partial(vec![dir.clone()]))?;
        fs::remove_file(&entry.path)
            .at(&entry.path)
            .map_err(|e| e.partial(vec![dir.clone(), task.path.clone()]))?;

        info!(id = %task.id, dir = %dir.display(), "promoted task to parent");
        parent::load(&Entry {
            id: entry.id,
            kind: EntryKind::Parent,
            path: task.path,
            location: entry.location,
        })
    }

    /// Load a parent task with its ordered subtasks.
    pub fn load_parent(&self, id: &str) -> StoreResult<ParentTask> {
        let entry = self.resolve(id)?;
        match entry.kind {
            EntryKind::Parent => parent::load(&entry),
            _ => Err(StoreError::parent_not_found(&entry.id)),
        }
    }

    /// Exact id or unambiguous prefix among one parent's subtasks.
    fn subtask_id(parent: &ParentTask, reference: &str) -> StoreResult<String> {
        let reference = reference.trim();
        if parent.subtask(reference).is_some() {
            return Ok(reference.to_string());
        }
        let matches: Vec<String> = parent
            .subtasks
            .iter()
            .filter(|s| !reference.is_empty() && s.id.starts_with(reference))
            .map(|s| s.id.clone())
            .collect();
        match matches.len() {
            1 => Ok(matches[0].clone()),
            0 => Err(StoreError::task_not_found(&format!(
                "{} in parent {}",
                reference, parent.id
            ))),
            _ => Err(StoreError::ambiguous_id(reference, &matches)),
        }
    }

    fn subtask_ids(parent: &ParentTask, references: &[String]) -> StoreResult<Vec<String>> {
        references
            .iter()
            .map(|r| Self::subtask_id(parent, r))
            .collect()
    }

    /// Create a subtask, promoting a simple parent first.
    ///
    /// Without `options.after` the subtask goes after every existing group;
    /// with it, into its own group right after that subtask.
    pub fn add_subtask(&self, parent_id: &str, options: &CreateOptions) -> StoreResult<Task> {
        let entry = self.resolve(parent_id)?;
        let mut parent = match entry.kind {
            EntryKind::Parent => parent::load(&entry)?,
            EntryKind::Simple => self.promote_to_parent(&entry.id)?,
            EntryKind::Subtask { .. } => {
                return Err(StoreError::invalid_value(
                    "parent",
                    format!("{} is a subtask and cannot hold subtasks", entry.id),
                ));
            }
        };

        let now = Utc::now();
        let mut task = self.draft(options, parent.overview.location.clone(), now)?;
        task.parent_task_id = Some(parent.id.clone());
        let after = options
            .after
            .as_deref()
            .map(|after| Self::subtask_id(&parent, after))
            .transpose()?;

        let mut existing = self.existing_ids()?;
        for _ in 0..CREATE_ATTEMPTS {
            task.id = self.ids.generate(&task.title, &existing)?;
            let mut placed = parent.clone();
            let sequence = match after {
                Some(ref after) => placed.insert_after(after, &task.id, PathBuf::new())?,
                None => placed.push_subtask(&task.id, PathBuf::new())?,
            };
            task.path = placed.dir.join(subtask_file_name(sequence, &task.id));
            task.sequence = Some(format_sequence(sequence));
            if let Some(sub) = placed.subtasks.iter_mut().find(|s| s.id == task.id) {
                sub.path = task.path.clone();
            }

            match record::create(&task) {
                Ok(()) => {
                    parent = placed;
                    parent::write_back(&mut parent)
                        .map_err(|e| e.partial(vec![task.path.clone()]))?;
                    info!(id = %task.id, parent = %parent.id, sequence = %format_sequence(sequence), "added subtask");
                    return Ok(task);
                }
                Err(e) if e.code() == ErrorCode::AlreadyExists => {
                    warn!(id = %task.id, parent = %parent.id, "subtask id taken, retrying");
                    existing.insert(task.id.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Integrity {
            message: format!("Could not claim a unique subtask id for '{}'", task.title),
            code: ErrorCode::DuplicateId,
        })
    }

    fn rewrite_parent<F>(&self, parent_id: &str, action: &str, mutate: F) -> StoreResult<ParentTask>
    where
        F: FnOnce(&mut ParentTask) -> StoreResult<()>,
    {
        let mut parent = self.load_parent(parent_id)?;
        mutate(&mut parent)?;
        let changed = parent::write_back(&mut parent)?;
        info!(parent = %parent.id, files = changed.len(), "{}", action);
        Ok(parent)
    }

    /// Put the listed subtasks into one parallel group at their lowest sequence.
    pub fn parallelize(&self, parent_id: &str, ids: &[String]) -> StoreResult<ParentTask> {
        self.rewrite_parent(parent_id, "parallelized subtasks", |parent| {
            let ids = Self::subtask_ids(parent, ids)?;
            parent.make_parallel(&ids).map(|_| ())
        })
    }

    /// Move an existing subtask into its own group right after another.
    pub fn insert_after(
        &self,
        parent_id: &str,
        after_id: &str,
        subtask_id: &str,
    ) -> StoreResult<ParentTask> {
        self.rewrite_parent(parent_id, "moved subtask", |parent| {
            let after = Self::subtask_id(parent, after_id)?;
            let moved = Self::subtask_id(parent, subtask_id)?;
            parent.insert_after(&after, &moved, PathBuf::new()).map(|_| ())
        })
    }

    /// Renumber subtasks from explicit groups; every subtask must be listed once.
    pub fn reorder_subtasks(&self, parent_id: &str, groups: &[Vec<String>]) -> StoreResult<ParentTask> {
        self.rewrite_parent(parent_id, "reordered subtasks", |parent| {
            let groups = groups
                .iter()
                .map(|g| Self::subtask_ids(parent, g))
                .collect::<StoreResult<Vec<_>>>()?;
            parent.reorder(&groups)
        })
    }

    /// On-disk sequence check for one parent: filenames ordered and unique,
    /// headers in step with filenames.
    pub fn is_valid_sequence(&self, parent_id: &str) -> StoreResult<bool> {
        let parent = self.load_parent(parent_id)?;
        Ok(parent.is_valid_sequence() && parent::headers_match(&parent)?)
    }

    /// Tasks matching `filter`. Unreadable files are skipped with a warning.
    pub fn list(&self, filter: &ListFilter) -> StoreResult<Vec<Task>> {
        let mut tasks = Vec::new();
        for entry in self.scan(&filter.states)? {
            if entry.is_subtask() && filter.parent.is_none() && !filter.include_subtasks {
                continue;
            }
            match record::load(&entry) {
                Ok(task) if filter.matches(&task) => tasks.push(task),
                Ok(_) => {}
                Err(e) => warn!(path = %entry.path.display(), error = %e, "skipping unreadable task"),
            }
        }
        Ok(tasks)
    }

    /// Delete a task. A parent with subtasks needs `cascade`.
    ///
    /// Tasks whose `parent_task` header still names the deleted task have it
    /// cleared.
    pub fn delete(&self, id: &str, cascade: bool) -> StoreResult<DeleteOutcome> {
        let entry = self.resolve(id)?;
        let removed = match entry.kind {
            EntryKind::Parent => {
                let parent = parent::load(&entry)?;
                if !parent.subtasks.is_empty() && !cascade {
                    return Err(StoreError::invalid_value(
                        "cascade",
                        format!(
                            "{} has {} subtasks; delete with cascade to remove them too",
                            parent.id,
                            parent.subtasks.len()
                        ),
                    ));
                }
                fs::remove_dir_all(&parent.dir).at(&parent.dir)?;
                parent.dir
            }
            _ => {
                fs::remove_file(&entry.path).at(&entry.path)?;
                entry.path.clone()
            }
        };

        let mut outcome = DeleteOutcome {
            id: entry.id.clone(),
            removed: vec![removed],
            repaired: Vec::new(),
        };
        if !entry.is_subtask() {
            outcome.repaired = self
                .repair_references(&entry.id)
                .map_err(|e| e.partial(outcome.removed.clone()))?;
        }

        info!(id = %entry.id, repaired = outcome.repaired.len(), "deleted task");
        Ok(outcome)
    }

    fn repair_references(&self, deleted: &str) -> StoreResult<Vec<String>> {
        let mut repaired = Vec::new();
        for entry in self.scan(&[])? {
            if entry.kind != EntryKind::Simple {
                continue;
            }
            let mut task = match record::load(&entry) {
                Ok(task) => task,
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "cannot check references");
                    continue;
                }
            };
            if task.parent_task_id.as_deref() == Some(deleted) {
                task.parent_task_id = None;
                task.updated = Utc::now();
                record::save(&task)?;
                debug!(id = %task.id, parent = deleted, "cleared dangling parent reference");
                repaired.push(task.id);
            }
        }
        Ok(repaired)
    }

    /// Scan the whole store for broken invariants without changing anything.
    pub fn check_integrity(&self) -> StoreResult<IntegrityReport> {
        integrity::check(&self.tasks_root()?)
    }

    /// Directory of session records shared by every worktree.
    pub fn sessions_dir(&self) -> StoreResult<PathBuf> {
        self.resolver.sessions_dir()
    }

    /// Checkout location for work on one task.
    pub fn worktree_path(&self, task_id: &str) -> PathBuf {
        self.resolver.worktree_path(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathContext;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> TaskStore {
        let repo = temp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        let ctx = PathContext::new(&repo, &repo, temp.path().join("home"));
        TaskStore::with_settings(Arc::new(PathResolver::new(ctx)), ProjectSettings::default())
    }

    #[test]
    fn test_create_and_get_by_prefix() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let task = store.create(CreateOptions::new("Write release notes")).unwrap();
        assert!(task.path.starts_with(store.tasks_root().unwrap().join("backlog")));

        let prefix = &task.id[..6];
        assert_eq!(store.get(prefix).unwrap().id, task.id);
        assert_eq!(store.get("nope").unwrap_err().code(), ErrorCode::TaskNotFound);
    }

    #[test]
    fn test_ambiguous_prefix() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.create(CreateOptions::new("Fix")).unwrap();
        store.create(CreateOptions::new("Fix")).unwrap();
        assert_eq!(store.get("fix").unwrap_err().code(), ErrorCode::AmbiguousId);
    }

    #[test]
    fn test_invalid_status_rejected_before_write() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let err = store
            .create(CreateOptions {
                status: Some("nonsense".into()),
                ..CreateOptions::new("Thing")
            })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFieldValue);
        assert!(store.existing_ids().unwrap().is_empty());
    }

    #[test]
    fn test_update_patch() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let task = store
            .create(CreateOptions {
                tags: vec!["api".into(), " ".into()],
                ..CreateOptions::new("Cache tokens")
            })
            .unwrap();
        let updated = store
            .update(
                &task.id,
                TaskPatch {
                    status: Some("doing".into()),
                    add_tags: vec!["perf".into()],
                    remove_tags: vec!["api".into()],
                    sections: vec![("Notes".into(), "Check TTL.".into())],
                    log: Some("started".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.path, task.path);

        let reread = store.get(&task.id).unwrap();
        assert_eq!(reread.tags.iter().collect::<Vec<_>>(), vec!["perf"]);
        assert_eq!(reread.document.section_text("notes").unwrap(), "Check TTL.");
        assert!(reread.document.section_text("log").unwrap().contains("started"));
    }

    #[test]
    fn test_complete_item() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let task = store
            .create(CreateOptions {
                sections: vec![("Tasks".into(), "- [ ] one\n- [ ] two".into())],
                ..CreateOptions::new("Checklist")
            })
            .unwrap();
        store.complete_item(&task.id, 1).unwrap();
        // Completing twice keeps it done.
        let task = store.complete_item(&task.id, 1).unwrap();
        let items = task.document.checklist();
        assert!(!items[0].done);
        assert!(items[1].done);
        assert!(store.complete_item(&task.id, 5).is_err());
    }

    #[test]
    fn test_subtask_cannot_move_alone() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let parent = store.create(CreateOptions::new("Parent")).unwrap();
        let sub = store
            .create(CreateOptions {
                parent: Some(parent.id.clone()),
                ..CreateOptions::new("Child")
            })
            .unwrap();
        let err = store
            .move_task(&sub.id, WorkflowState::Current, MoveOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFieldValue);
    }

    #[test]
    fn test_template_seeds_sections() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let templates = temp.path().join("repo/.tasks/.templates");
        fs::create_dir_all(&templates).unwrap();
        fs::write(
            templates.join("bug.md"),
            "## Instruction\n\nReproduce first.\n\n## Deliverable\n\nA failing test.\n",
        )
        .unwrap();

        let task = store
            .create(CreateOptions {
                template: Some("bug".into()),
                sections: vec![("Deliverable".into(), "A fix.".into())],
                ..CreateOptions::new("Crash on save")
            })
            .unwrap();
        assert_eq!(
            task.document.section_text("instruction").unwrap(),
            "Reproduce first."
        );
        assert_eq!(task.document.section_text("deliverable").unwrap(), "A fix.");

        let err = store
            .create(CreateOptions {
                template: Some("missing".into()),
                ..CreateOptions::new("x")
            })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TemplateNotFound);
    }
}

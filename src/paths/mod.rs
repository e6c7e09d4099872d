//! Multi-strategy path resolution.
//!
//! Every resource type has a fixed, ordered list of strategies. A strategy is
//! a pure function of the [`PathContext`]; resolution never depends on the
//! process working directory once the context is built.
//!
//! | Resource  | Strategies (highest priority first)                         |
//! |-----------|-------------------------------------------------------------|
//! | tasks     | central: `~/.task-store/projects/<slug(main root)>/tasks`   |
//! | sessions  | central: `~/.task-store/projects/<slug(main root)>/sessions`|
//! | modes     | checkout: `<execution root>/.tasks/.modes`                  |
//! | templates | checkout: `<execution root>/.tasks/.templates`, then global `~/.task-store/templates` |
//! | config    | central: `~/.task-store/projects/<slug(main root)>`, then legacy `<execution root>/.tasks` |
//!
//! Tasks and sessions are keyed by the main repository root so every
//! worktree of a project shares one store.

pub mod encoding;
pub mod worktree;

pub use encoding::{decode_path, encode_path};
pub use worktree::{CheckoutInfo, WorktreeCache};

use crate::error::{StoreError, StoreResult};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Global user directory name under the home directory.
pub const APP_DIR: &str = ".task-store";

/// Project-carried directory under the execution root.
pub const PROJECT_DIR: &str = ".tasks";

/// Environment variable overriding the project root when none is passed.
pub const ROOT_ENV: &str = "TASK_STORE_ROOT";

/// Kinds of on-disk resources the engine can locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Templates,
    Modes,
    Tasks,
    Sessions,
    Config,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Templates,
        ResourceType::Modes,
        ResourceType::Tasks,
        ResourceType::Sessions,
        ResourceType::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Templates => "templates",
            ResourceType::Modes => "modes",
            ResourceType::Tasks => "tasks",
            ResourceType::Sessions => "sessions",
            ResourceType::Config => "config",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s.to_lowercase())
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything path resolution needs to know about the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContext {
    /// Checkout the process runs from (possibly a linked worktree).
    pub execution_root: PathBuf,
    /// Canonical project root, identical for every worktree of a project.
    pub main_repo_root: PathBuf,
    /// Set iff `execution_root != main_repo_root`.
    pub worktree_root: Option<PathBuf>,
    pub user_home: PathBuf,
}

impl PathContext {
    /// Build a context from already-known roots.
    pub fn new(
        execution_root: impl Into<PathBuf>,
        main_repo_root: impl Into<PathBuf>,
        user_home: impl Into<PathBuf>,
    ) -> Self {
        let execution_root = execution_root.into();
        let main_repo_root = main_repo_root.into();
        let worktree_root = (execution_root != main_repo_root).then(|| execution_root.clone());
        Self {
            execution_root,
            main_repo_root,
            worktree_root,
            user_home: user_home.into(),
        }
    }

    /// Discover the context for this process.
    ///
    /// Root precedence: `explicit_root`, then `$TASK_STORE_ROOT`, then the
    /// current directory. The home directory comes from the OS.
    pub fn discover(explicit_root: Option<&Path>, cache: &WorktreeCache) -> StoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| StoreError::no_project_root("home directory is unknown"))?;
        Self::discover_with_home(explicit_root, home, cache)
    }

    /// [`PathContext::discover`] with an injected home directory.
    pub fn discover_with_home(
        explicit_root: Option<&Path>,
        user_home: impl Into<PathBuf>,
        cache: &WorktreeCache,
    ) -> StoreResult<Self> {
        let root = match explicit_root {
            Some(root) => root.to_path_buf(),
            None => match std::env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
                Some(root) => PathBuf::from(root),
                None => std::env::current_dir().map_err(StoreError::no_project_root)?,
            },
        };

        let root = std::fs::canonicalize(&root)
            .map_err(|e| StoreError::no_project_root(format!("{}: {}", root.display(), e)))?;
        if !root.is_dir() {
            return Err(StoreError::no_project_root(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let ctx = match cache.discover(&root)? {
            Some(info) => Self::new(info.checkout_root, info.main_repo_root, user_home),
            None => Self::new(root.clone(), root, user_home),
        };
        debug!(
            execution_root = %ctx.execution_root.display(),
            main_repo_root = %ctx.main_repo_root.display(),
            worktree = ctx.is_worktree(),
            "discovered path context"
        );
        Ok(ctx)
    }

    pub fn is_worktree(&self) -> bool {
        self.worktree_root.is_some()
    }

    /// `~/.task-store`
    pub fn global_dir(&self) -> PathBuf {
        self.user_home.join(APP_DIR)
    }

    /// Directory slug identifying this project in central storage.
    pub fn project_key(&self) -> String {
        encode_path(&self.main_repo_root)
    }

    /// `~/.task-store/projects/<slug>`
    pub fn central_dir(&self) -> PathBuf {
        self.global_dir().join("projects").join(self.project_key())
    }

    /// `<execution root>/.tasks`
    pub fn checkout_dir(&self) -> PathBuf {
        self.execution_root.join(PROJECT_DIR)
    }
}

/// A named pure function from context to a candidate location.
#[derive(Clone, Copy)]
pub struct PathStrategy {
    pub name: &'static str,
    pub resolve: fn(&PathContext) -> PathBuf,
}

impl fmt::Debug for PathStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathStrategy").field("name", &self.name).finish()
    }
}

impl PathStrategy {
    pub const fn new(name: &'static str, resolve: fn(&PathContext) -> PathBuf) -> Self {
        Self { name, resolve }
    }
}

fn central_tasks(ctx: &PathContext) -> PathBuf {
    ctx.central_dir().join("tasks")
}

fn central_sessions(ctx: &PathContext) -> PathBuf {
    ctx.central_dir().join("sessions")
}

fn checkout_modes(ctx: &PathContext) -> PathBuf {
    ctx.checkout_dir().join(".modes")
}

fn checkout_templates(ctx: &PathContext) -> PathBuf {
    ctx.checkout_dir().join(".templates")
}

fn global_templates(ctx: &PathContext) -> PathBuf {
    ctx.global_dir().join("templates")
}

const CENTRAL_TASKS: PathStrategy = PathStrategy::new("central-tasks", central_tasks);
const CENTRAL_SESSIONS: PathStrategy = PathStrategy::new("central-sessions", central_sessions);
const CHECKOUT_MODES: PathStrategy = PathStrategy::new("checkout-modes", checkout_modes);
const CHECKOUT_TEMPLATES: PathStrategy =
    PathStrategy::new("checkout-templates", checkout_templates);
const GLOBAL_TEMPLATES: PathStrategy = PathStrategy::new("global-templates", global_templates);
const CENTRAL_CONFIG: PathStrategy = PathStrategy::new("central-config", PathContext::central_dir);
const LEGACY_CONFIG: PathStrategy = PathStrategy::new("legacy-config", PathContext::checkout_dir);

/// Built-in strategy list for a resource, highest priority first.
pub fn default_strategies(resource: ResourceType) -> &'static [PathStrategy] {
    match resource {
        ResourceType::Tasks => &[CENTRAL_TASKS],
        ResourceType::Sessions => &[CENTRAL_SESSIONS],
        ResourceType::Modes => &[CHECKOUT_MODES],
        ResourceType::Templates => &[CHECKOUT_TEMPLATES, GLOBAL_TEMPLATES],
        ResourceType::Config => &[CENTRAL_CONFIG, LEGACY_CONFIG],
    }
}

/// All candidates for `resource` in priority order.
pub fn resolve_with_precedence(resource: ResourceType, ctx: &PathContext) -> Vec<PathBuf> {
    candidates(default_strategies(resource), ctx)
}

/// Highest-priority candidate for `resource`.
pub fn resolve(resource: ResourceType, ctx: &PathContext) -> StoreResult<PathBuf> {
    first_candidate(resource, default_strategies(resource), ctx)
}

/// First candidate that exists on disk, else the highest-priority one.
pub fn resolve_existing(resource: ResourceType, ctx: &PathContext) -> StoreResult<PathBuf> {
    first_existing(resource, default_strategies(resource), ctx)
}

fn candidates(strategies: &[PathStrategy], ctx: &PathContext) -> Vec<PathBuf> {
    strategies.iter().map(|s| (s.resolve)(ctx)).collect()
}

fn first_candidate(
    resource: ResourceType,
    strategies: &[PathStrategy],
    ctx: &PathContext,
) -> StoreResult<PathBuf> {
    strategies
        .first()
        .map(|s| (s.resolve)(ctx))
        .ok_or_else(|| StoreError::no_strategy(resource))
}

fn first_existing(
    resource: ResourceType,
    strategies: &[PathStrategy],
    ctx: &PathContext,
) -> StoreResult<PathBuf> {
    let all = candidates(strategies, ctx);
    if all.is_empty() {
        return Err(StoreError::no_strategy(resource));
    }
    let existing = all.iter().position(|p| p.exists()).unwrap_or(0);
    Ok(all[existing].clone())
}

/// Explicitly constructed resolver shared by every store component.
///
/// Holds the current [`PathContext`] behind an [`ArcSwap`] so long-running
/// hosts can `reload` it when the project root changes, plus a process-local
/// cache of highest-priority resolutions. The cache lives until `clear()` or
/// `reload()`.
#[derive(Debug)]
pub struct PathResolver {
    context: ArcSwap<PathContext>,
    strategies: HashMap<ResourceType, Vec<PathStrategy>>,
    resolved: Mutex<HashMap<ResourceType, PathBuf>>,
}

impl PathResolver {
    pub fn new(context: PathContext) -> Self {
        let strategies = ResourceType::ALL
            .into_iter()
            .map(|r| (r, default_strategies(r).to_vec()))
            .collect();
        Self {
            context: ArcSwap::from_pointee(context),
            strategies,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the strategy list for one resource type.
    pub fn with_strategies(mut self, resource: ResourceType, strategies: Vec<PathStrategy>) -> Self {
        self.strategies.insert(resource, strategies);
        self.resolved.lock().remove(&resource);
        self
    }

    /// Snapshot of the current context.
    pub fn context(&self) -> Arc<PathContext> {
        self.context.load_full()
    }

    /// Swap in a new context and drop every cached resolution.
    pub fn reload(&self, context: PathContext) {
        info!(
            main_repo_root = %context.main_repo_root.display(),
            "reloading path context"
        );
        self.context.store(Arc::new(context));
        self.clear();
    }

    /// Drop cached resolutions.
    pub fn clear(&self) {
        self.resolved.lock().clear();
    }

    fn strategies_for(&self, resource: ResourceType) -> &[PathStrategy] {
        self.strategies
            .get(&resource)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn resolve(&self, resource: ResourceType) -> StoreResult<PathBuf> {
        if let Some(path) = self.resolved.lock().get(&resource) {
            return Ok(path.clone());
        }
        let path = first_candidate(resource, self.strategies_for(resource), &self.context())?;
        self.resolved.lock().insert(resource, path.clone());
        Ok(path)
    }

    pub fn resolve_with_precedence(&self, resource: ResourceType) -> StoreResult<Vec<PathBuf>> {
        let all = candidates(self.strategies_for(resource), &self.context());
        if all.is_empty() {
            return Err(StoreError::no_strategy(resource));
        }
        Ok(all)
    }

    /// Existence is checked on every call; the answer is never cached.
    pub fn resolve_existing(&self, resource: ResourceType) -> StoreResult<PathBuf> {
        first_existing(resource, self.strategies_for(resource), &self.context())
    }

    /// First candidate directory that holds `file_name`, else the
    /// highest-priority one.
    pub fn resolve_containing(&self, resource: ResourceType, file_name: &str) -> StoreResult<PathBuf> {
        let all = self.resolve_with_precedence(resource)?;
        let found = all.iter().position(|dir| dir.join(file_name).is_file()).unwrap_or(0);
        Ok(all[found].clone())
    }

    // Convenience accessors

    pub fn tasks_dir(&self) -> StoreResult<PathBuf> {
        self.resolve(ResourceType::Tasks)
    }

    pub fn sessions_dir(&self) -> StoreResult<PathBuf> {
        self.resolve(ResourceType::Sessions)
    }

    pub fn modes_dir(&self) -> StoreResult<PathBuf> {
        self.resolve(ResourceType::Modes)
    }

    pub fn templates_dir(&self) -> StoreResult<PathBuf> {
        self.resolve_existing(ResourceType::Templates)
    }

    pub fn config_dir(&self) -> StoreResult<PathBuf> {
        self.resolve_containing(ResourceType::Config, crate::config::SETTINGS_FILE)
    }

    /// Directory holding per-task worktree checkouts for this project.
    pub fn worktree_base_path(&self) -> PathBuf {
        self.context().central_dir().join("worktrees")
    }

    /// Worktree checkout location dedicated to one task.
    pub fn worktree_path(&self, task_id: &str) -> PathBuf {
        self.worktree_base_path().join(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(exec: &str, main: &str) -> PathContext {
        PathContext::new(exec, main, "/home/tester")
    }

    #[test]
    fn test_worktree_root_only_when_roots_differ() {
        assert!(ctx("/srv/app", "/srv/app").worktree_root.is_none());
        let wt = ctx("/srv/app-wt", "/srv/app");
        assert_eq!(wt.worktree_root, Some(PathBuf::from("/srv/app-wt")));
        assert!(wt.is_worktree());
    }

    #[test]
    fn test_tasks_keyed_by_main_root() {
        let main = ctx("/nonexistent-srv/app", "/nonexistent-srv/app");
        let linked = ctx("/nonexistent-srv/app-wt/feature", "/nonexistent-srv/app");
        assert_eq!(
            resolve(ResourceType::Tasks, &main).unwrap(),
            resolve(ResourceType::Tasks, &linked).unwrap()
        );
        assert_eq!(
            resolve(ResourceType::Tasks, &main).unwrap(),
            PathBuf::from("/home/tester/.task-store/projects/nonexistent-srv-app/tasks")
        );
        assert_eq!(
            resolve(ResourceType::Sessions, &main).unwrap(),
            resolve(ResourceType::Sessions, &linked).unwrap()
        );
    }

    #[test]
    fn test_modes_follow_execution_root() {
        let linked = ctx("/nonexistent-srv/app-wt", "/nonexistent-srv/app");
        assert_eq!(
            resolve(ResourceType::Modes, &linked).unwrap(),
            PathBuf::from("/nonexistent-srv/app-wt/.tasks/.modes")
        );
    }

    #[test]
    fn test_templates_precedence() {
        let c = ctx("/nonexistent-srv/app", "/nonexistent-srv/app");
        assert_eq!(
            resolve_with_precedence(ResourceType::Templates, &c),
            vec![
                PathBuf::from("/nonexistent-srv/app/.tasks/.templates"),
                PathBuf::from("/home/tester/.task-store/templates"),
            ]
        );
    }

    #[test]
    fn test_resolve_existing_falls_back() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(home.join(".task-store/templates")).unwrap();
        std::fs::create_dir_all(&repo).unwrap();
        let c = PathContext::new(&repo, &repo, &home);

        // Only the global templates dir exists.
        assert_eq!(
            resolve_existing(ResourceType::Templates, &c).unwrap(),
            home.join(".task-store/templates")
        );

        // Project-local override wins once present.
        std::fs::create_dir_all(repo.join(".tasks/.templates")).unwrap();
        assert_eq!(
            resolve_existing(ResourceType::Templates, &c).unwrap(),
            repo.join(".tasks/.templates")
        );

        // Nothing exists: highest priority candidate.
        assert_eq!(
            resolve_existing(ResourceType::Config, &c).unwrap(),
            c.central_dir()
        );
    }

    #[test]
    fn test_resolver_without_strategy_is_configuration_error() {
        let resolver = PathResolver::new(ctx("/a", "/a")).with_strategies(ResourceType::Modes, vec![]);
        let err = resolver.resolve(ResourceType::Modes).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::NoStrategy);
        assert!(resolver.resolve_existing(ResourceType::Modes).is_err());
        assert!(resolver.resolve_with_precedence(ResourceType::Modes).is_err());
    }

    #[test]
    fn test_resolver_cache_cleared_on_reload() {
        let resolver = PathResolver::new(ctx("/nonexistent-a", "/nonexistent-a"));
        let first = resolver.tasks_dir().unwrap();
        resolver.reload(ctx("/nonexistent-b", "/nonexistent-b"));
        let second = resolver.tasks_dir().unwrap();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().contains("nonexistent-b"));
    }

    #[test]
    fn test_custom_strategy_override() {
        let resolver = PathResolver::new(ctx("/nonexistent-a", "/nonexistent-a")).with_strategies(
            ResourceType::Sessions,
            vec![PathStrategy::new("local-sessions", |c| {
                c.execution_root.join("sessions")
            })],
        );
        assert_eq!(
            resolver.sessions_dir().unwrap(),
            PathBuf::from("/nonexistent-a/sessions")
        );
    }

    #[test]
    fn test_worktree_accessors() {
        let resolver = PathResolver::new(ctx("/nonexistent-a", "/nonexistent-a"));
        assert_eq!(
            resolver.worktree_path("abc-1"),
            resolver.worktree_base_path().join("abc-1")
        );
        assert!(resolver.worktree_base_path().starts_with("/home/tester/.task-store/projects"));
    }

    #[test]
    fn test_discover_with_explicit_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("proj");
        std::fs::create_dir_all(root.join(".git")).unwrap();
        let cache = WorktreeCache::default();
        let c = PathContext::discover_with_home(Some(root.as_path()), temp.path(), &cache).unwrap();
        let canonical = std::fs::canonicalize(&root).unwrap();
        assert_eq!(c.main_repo_root, canonical);
        assert_eq!(c.execution_root, canonical);
        assert!(!c.is_worktree());
    }

    #[test]
    fn test_discover_missing_root_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let cache = WorktreeCache::default();
        let err = PathContext::discover_with_home(
            Some(temp.path().join("missing").as_path()),
            temp.path(),
            &cache,
        )
        .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::NoProjectRoot);
    }
}

//! Integration tests for path resolution across checkouts.

use proptest::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use task_store::config::ProjectSettings;
use task_store::error::ErrorCode;
use task_store::paths::{
    PathContext, PathResolver, ResourceType, WorktreeCache, decode_path, encode_path, resolve,
    resolve_existing, resolve_with_precedence,
};
use task_store::store::{CreateOptions, TaskStore};
use tempfile::TempDir;

/// Lay out a main repository plus one linked worktree the way git does.
fn git_layout(base: &Path) -> (PathBuf, PathBuf) {
    let main = base.join("main");
    let worktree = base.join("feature-wt");
    let admin = main.join(".git/worktrees/feature-wt");
    fs::create_dir_all(&admin).unwrap();
    fs::create_dir_all(&worktree).unwrap();
    fs::write(admin.join("commondir"), "../..\n").unwrap();
    fs::write(
        worktree.join(".git"),
        format!("gitdir: {}\n", admin.display()),
    )
    .unwrap();
    (main, worktree)
}

fn store_for(ctx: PathContext) -> TaskStore {
    TaskStore::with_settings(Arc::new(PathResolver::new(ctx)), ProjectSettings::default())
}

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

proptest! {
    #[test]
    fn shared_resources_follow_main_root(
        main in prop::collection::vec(segment(), 1..4),
        exec_a in prop::collection::vec(segment(), 1..4),
        exec_b in prop::collection::vec(segment(), 1..4),
    ) {
        let root = |parts: &[String]| {
            let mut path = PathBuf::from("/nonexistent-root");
            path.extend(parts);
            path
        };
        let home = PathBuf::from("/nonexistent-home");
        let a = PathContext::new(root(&exec_a), root(&main), &home);
        let b = PathContext::new(root(&exec_b), root(&main), &home);

        for resource in [ResourceType::Tasks, ResourceType::Sessions, ResourceType::Config] {
            prop_assert_eq!(resolve(resource, &a).unwrap(), resolve(resource, &b).unwrap());
        }
        prop_assert_eq!(
            resolve_with_precedence(ResourceType::Config, &a)[0].clone(),
            resolve_with_precedence(ResourceType::Config, &b)[0].clone()
        );
        if exec_a != exec_b {
            prop_assert_ne!(
                resolve(ResourceType::Modes, &a).unwrap(),
                resolve(ResourceType::Modes, &b).unwrap()
            );
        }
    }
}

#[test]
fn worktree_discovery_maps_to_main_root() {
    let temp = TempDir::new().unwrap();
    let (main, worktree) = git_layout(temp.path());
    let home = temp.path().join("home");
    let cache = WorktreeCache::default();

    let from_wt = PathContext::discover_with_home(Some(&worktree), &home, &cache).unwrap();
    let from_main = PathContext::discover_with_home(Some(&main), &home, &cache).unwrap();

    assert!(from_wt.is_worktree());
    assert!(!from_main.is_worktree());
    assert_eq!(from_wt.main_repo_root, fs::canonicalize(&main).unwrap());
    assert_eq!(
        resolve(ResourceType::Tasks, &from_wt).unwrap(),
        resolve(ResourceType::Tasks, &from_main).unwrap()
    );
    assert_ne!(
        resolve(ResourceType::Modes, &from_wt).unwrap(),
        resolve(ResourceType::Modes, &from_main).unwrap()
    );
    assert_eq!(cache.len(), 2);
}

#[test]
fn task_created_in_worktree_is_visible_from_main() {
    let temp = TempDir::new().unwrap();
    let (main, worktree) = git_layout(temp.path());
    let home = temp.path().join("home");
    let cache = WorktreeCache::default();

    let wt_store =
        store_for(PathContext::discover_with_home(Some(&worktree), &home, &cache).unwrap());
    let main_store =
        store_for(PathContext::discover_with_home(Some(&main), &home, &cache).unwrap());

    let task = wt_store.create(CreateOptions::new("Shared work")).unwrap();
    assert_eq!(main_store.get(&task.id).unwrap().title, "Shared work");
    assert!(task.path.starts_with(home.join(".task-store/projects")));
}

#[test]
fn missing_root_is_a_configuration_error() {
    let temp = TempDir::new().unwrap();
    let err = PathContext::discover_with_home(
        Some(&temp.path().join("missing")),
        temp.path(),
        &WorktreeCache::default(),
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoProjectRoot);
}

#[test]
fn templates_prefer_project_then_global() {
    let temp = TempDir::new().unwrap();
    let repo = temp.path().join("repo");
    let home = temp.path().join("home");
    fs::create_dir_all(&repo).unwrap();
    let ctx = PathContext::new(&repo, &repo, &home);

    let candidates = resolve_with_precedence(ResourceType::Templates, &ctx);
    assert_eq!(
        candidates,
        vec![repo.join(".tasks/.templates"), home.join(".task-store/templates")]
    );

    // Only the global directory exists.
    fs::create_dir_all(&candidates[1]).unwrap();
    assert_eq!(resolve_existing(ResourceType::Templates, &ctx).unwrap(), candidates[1]);

    fs::create_dir_all(&candidates[0]).unwrap();
    assert_eq!(resolve_existing(ResourceType::Templates, &ctx).unwrap(), candidates[0]);
}

#[test]
fn resolver_reload_switches_project() {
    let temp = TempDir::new().unwrap();
    let home = temp.path().join("home");
    let one = temp.path().join("one");
    let two = temp.path().join("two");
    fs::create_dir_all(&one).unwrap();
    fs::create_dir_all(&two).unwrap();

    let resolver = PathResolver::new(PathContext::new(&one, &one, &home));
    let first = resolver.tasks_dir().unwrap();
    resolver.reload(PathContext::new(&two, &two, &home));
    let second = resolver.tasks_dir().unwrap();

    assert_ne!(first, second);
    assert!(second.to_string_lossy().contains(&encode_path(&two)));
    assert_eq!(
        resolver.worktree_path("abc-1016"),
        resolver.worktree_base_path().join("abc-1016")
    );
}

#[test]
fn encoding_is_deterministic_and_lossy() {
    let a = encode_path(Path::new("/work/My Project"));
    assert_eq!(a, encode_path(Path::new("/work/My Project")));
    assert_eq!(a, "work-my_project");
    assert_eq!(
        encode_path(Path::new("/a/b-c")),
        encode_path(Path::new("/a-b/c"))
    );
    assert_eq!(decode_path("work-src"), PathBuf::from("/work/src"));
}

//! Working-tree discovery.
//!
//! A linked git worktree has a `.git` *file* (`gitdir: <path>`) instead of a
//! directory; the referenced git dir holds a `commondir` file pointing at the
//! main repository's git dir. Reading those two files is enough to map any
//! checkout back to its main repository root without shelling out to git.

use super::encoding::normalize_path_components;
use crate::error::{IoContext, StoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default lifetime of cached discovery results.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Which checkout a directory belongs to and the repository it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutInfo {
    /// Root of the checkout containing the start directory.
    pub checkout_root: PathBuf,
    /// Root of the main (non-linked) working tree.
    pub main_repo_root: PathBuf,
}

impl CheckoutInfo {
    pub fn is_worktree(&self) -> bool {
        self.checkout_root != self.main_repo_root
    }
}

/// Walk up from `start` to the nearest `.git` entry and resolve the main root.
///
/// Returns `Ok(None)` when `start` is not inside a git checkout.
pub fn discover(start: &Path) -> StoreResult<Option<CheckoutInfo>> {
    for dir in start.ancestors() {
        let dot_git = dir.join(".git");
        let meta = match fs::metadata(&dot_git) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(crate::error::StoreError::io(dot_git, e)),
        };

        if meta.is_dir() {
            return Ok(Some(CheckoutInfo {
                checkout_root: dir.to_path_buf(),
                main_repo_root: dir.to_path_buf(),
            }));
        }

        let main_repo_root = main_root_from_git_file(dir, &dot_git)?;
        return Ok(Some(CheckoutInfo {
            checkout_root: dir.to_path_buf(),
            main_repo_root: main_repo_root.unwrap_or_else(|| dir.to_path_buf()),
        }));
    }
    Ok(None)
}

/// Follow `.git` file → git dir → `commondir` to the main repository root.
///
/// `None` when the git dir has no `commondir` (e.g. a submodule), meaning the
/// checkout is its own main root.
fn main_root_from_git_file(checkout: &Path, dot_git: &Path) -> StoreResult<Option<PathBuf>> {
    let content = fs::read_to_string(dot_git).at(dot_git)?;
    let Some(gitdir) = content
        .lines()
        .find_map(|line| line.trim().strip_prefix("gitdir:"))
        .map(str::trim)
    else {
        return Ok(None);
    };

    let gitdir = absolutize(checkout, Path::new(gitdir));
    let commondir_file = gitdir.join("commondir");
    let common = match fs::read_to_string(&commondir_file) {
        Ok(common) => common,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(crate::error::StoreError::io(commondir_file, e)),
    };
    let common_dir = absolutize(&gitdir, Path::new(common.trim()));

    let root = if common_dir.file_name().is_some_and(|n| n == ".git") {
        common_dir.parent().map(Path::to_path_buf).unwrap_or(common_dir)
    } else {
        // Bare main repository: the git dir itself is the stable key.
        common_dir
    };
    debug!(checkout = %checkout.display(), main = %root.display(), "resolved worktree");
    Ok(Some(root))
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    fs::canonicalize(&joined).unwrap_or_else(|_| normalize_path_components(&joined))
}

/// Process-local cache of discovery results with a time-to-live.
///
/// Entries expire after `ttl` so a long-running host notices worktrees that
/// were added or removed by external git commands; `clear()` drops
/// everything immediately.
#[derive(Debug)]
pub struct WorktreeCache {
    ttl: Duration,
    entries: Mutex<HashMap<PathBuf, (Instant, Option<CheckoutInfo>)>>,
}

impl Default for WorktreeCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl WorktreeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached [`discover`].
    pub fn discover(&self, start: &Path) -> StoreResult<Option<CheckoutInfo>> {
        if let Some((at, info)) = self.entries.lock().get(start)
            && at.elapsed() < self.ttl
        {
            return Ok(info.clone());
        }

        let info = discover(start)?;
        self.entries
            .lock()
            .insert(start.to_path_buf(), (Instant::now(), info.clone()));
        Ok(info)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

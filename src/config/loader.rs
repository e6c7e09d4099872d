//! Loading and saving of the projects registry and per-project settings.

use super::types::{ProjectEntry, ProjectSettings, ProjectsConfig};
use crate::error::{IoContext, StoreError, StoreResult};
use crate::paths::{APP_DIR, PathResolver, ResourceType};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Registry file name under `~/.task-store/`.
pub const CONFIG_FILE: &str = "config.json";

/// Per-project settings file name under the `config` resource location.
pub const SETTINGS_FILE: &str = "project.json";

/// Read a JSON file, returning `None` when it does not exist.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::invalid_config(path, e))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| StoreError::invalid_config(path, e))?;
    fs::write(path, format!("{}\n", json)).at(path)
}

impl ProjectsConfig {
    /// Fixed registry location for a home directory.
    pub fn path_in(home: &Path) -> PathBuf {
        home.join(APP_DIR).join(CONFIG_FILE)
    }

    /// Registry location under the OS home directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| Self::path_in(&home))
    }

    /// Load the registry from `path`, or defaults when the file is absent.
    pub fn load_from(path: &Path) -> StoreResult<Self> {
        let config: Option<Self> = read_json(path)?;
        debug!(path = %path.display(), found = config.is_some(), "loaded projects registry");
        Ok(config.unwrap_or_default())
    }

    /// Load from an explicit override or the fixed home location.
    pub fn load(override_path: Option<&Path>) -> StoreResult<Self> {
        match override_path {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) => Self::load_from(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn save(&self, path: &Path) -> StoreResult<()> {
        write_json(path, self)
    }

    pub fn find(&self, name: &str) -> Option<&ProjectEntry> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Entry named by `defaultProject`, if any.
    pub fn default_entry(&self) -> Option<&ProjectEntry> {
        self.default_project
            .as_deref()
            .and_then(|name| self.find(name))
    }

    /// Insert or replace an entry by name.
    pub fn upsert(&mut self, entry: ProjectEntry) {
        match self.projects.iter_mut().find(|p| p.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.projects.push(entry),
        }
    }

    /// Root of the named project, or of the default project when `name` is `None`.
    pub fn project_root(&self, name: Option<&str>) -> StoreResult<Option<PathBuf>> {
        match name {
            Some(name) => self
                .find(name)
                .map(|p| Some(p.path.clone()))
                .ok_or_else(|| StoreError::no_project_root(format!("unknown project '{}'", name))),
            None => Ok(self.default_entry().map(|p| p.path.clone())),
        }
    }
}

impl ProjectSettings {
    /// Load `project.json` from the `config` resource location.
    ///
    /// The central file wins; the in-checkout legacy file is read only when
    /// there is no central one.
    pub fn load(resolver: &PathResolver) -> StoreResult<Self> {
        let dir = resolver.config_dir()?;
        let path = dir.join(SETTINGS_FILE);
        if dir == resolver.context().checkout_dir() && path.exists() {
            warn!(
                path = %path.display(),
                "Using legacy in-checkout project settings; move them to the central project directory."
            );
        }
        Ok(read_json(&path)?.unwrap_or_default())
    }

    /// Save to the central (highest-priority) config location.
    pub fn save(&self, resolver: &PathResolver) -> StoreResult<PathBuf> {
        let dir = resolver.resolve(ResourceType::Config)?;
        let path = dir.join(SETTINGS_FILE);
        write_json(&path, self)?;
        Ok(path)
    }
}

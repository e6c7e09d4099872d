//! Configuration types and structures.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Current version of the projects registry format.
pub const CONFIG_VERSION: u32 = 1;

/// Global projects registry (`~/.task-store/config.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Name of the project used when none is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_project: Option<String>,

    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            default_project: None,
            projects: Vec::new(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

/// One registered project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub name: String,
    pub path: PathBuf,

    /// Named directory overrides carried for external tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directories: Option<BTreeMap<String, PathBuf>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ProjectEntry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            directories: None,
            description: None,
            tags: Vec::new(),
        }
    }
}

/// Per-project settings (`project.json` in the `config` resource location).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    #[serde(default)]
    pub ids: IdSettings,
}

/// How task ids are suffixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStyle {
    /// `MMDD` of the creation date, randomized on collision.
    #[default]
    Date,
    /// Short random base-36 suffix.
    Random,
}

/// Task id generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdSettings {
    /// Words dropped from titles before building the id context.
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,

    /// Maximum number of significant title words in the id.
    #[serde(default = "default_max_context_words")]
    pub max_context_words: usize,

    /// Characters kept from each significant word.
    #[serde(default = "default_token_width")]
    pub token_width: usize,

    #[serde(default)]
    pub style: IdStyle,

    /// Suffix regenerations before falling back to a fully random suffix.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for IdSettings {
    fn default() -> Self {
        Self {
            stop_words: default_stop_words(),
            max_context_words: default_max_context_words(),
            token_width: default_token_width(),
            style: IdStyle::default(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_stop_words() -> Vec<String> {
    [
        "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "for", "with", "at", "by",
        "from", "into", "as", "is", "be", "it", "this", "that",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_context_words() -> usize {
    3
}

fn default_token_width() -> usize {
    4
}

fn default_max_retries() -> usize {
    5
}

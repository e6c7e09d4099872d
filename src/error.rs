//! Structured error types for store operations.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    InvalidFieldValue,
    MalformedDocument,
    InvalidSequence,

    // Not found errors
    TaskNotFound,
    ParentNotFound,
    TemplateNotFound,
    AmbiguousId,

    // Integrity errors
    DuplicateId,
    DanglingParent,
    AlreadyExists,

    // Configuration errors
    NoProjectRoot,
    NoStrategy,
    InvalidConfig,

    // Filesystem
    IoError,
    PartialWrite,
}

/// Every failure a public store operation can report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Illegal enum value, invalid sequence or other rejected input.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
        /// Legal canonical values, when the field is enumerable.
        allowed: Vec<String>,
        code: ErrorCode,
    },

    /// Malformed on-disk document.
    #[error("{message}")]
    Parse { message: String, line: Option<usize> },

    #[error("{message}")]
    NotFound { message: String, code: ErrorCode },

    /// Operation aborted to keep store invariants intact.
    #[error("{message}")]
    Integrity { message: String, code: ErrorCode },

    #[error("{message}")]
    Configuration { message: String, code: ErrorCode },

    #[error("{}: {source}", display_path(.path))]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// A multi-file operation stopped at its first failure.
    #[error("{source} (already changed: {})", join_paths(.changed))]
    PartialWrite {
        changed: Vec<PathBuf>,
        #[source]
        source: Box<StoreError>,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "I/O error".to_string(),
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "none".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl StoreError {
    /// Machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::Validation { code, .. }
            | StoreError::NotFound { code, .. }
            | StoreError::Integrity { code, .. }
            | StoreError::Configuration { code, .. } => *code,
            StoreError::Parse { .. } => ErrorCode::MalformedDocument,
            StoreError::Io { .. } => ErrorCode::IoError,
            StoreError::PartialWrite { .. } => ErrorCode::PartialWrite,
        }
    }

    /// True for errors the caller can fix by changing its input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::Validation { .. } | StoreError::Parse { .. } | StoreError::NotFound { .. }
        )
    }

    // Convenience constructors

    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            message: reason.into(),
            field: Some(field.to_string()),
            allowed: Vec::new(),
            code: ErrorCode::InvalidFieldValue,
        }
    }

    pub fn not_allowed(field: &str, input: &str, allowed: &[&str]) -> Self {
        StoreError::Validation {
            message: format!(
                "Invalid {} '{}'. Allowed values: {}",
                field,
                input,
                allowed.join(", ")
            ),
            field: Some(field.to_string()),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            code: ErrorCode::InvalidFieldValue,
        }
    }

    pub fn invalid_sequence(reason: impl Into<String>) -> Self {
        StoreError::Validation {
            message: reason.into(),
            field: Some("sequence".to_string()),
            allowed: Vec::new(),
            code: ErrorCode::InvalidSequence,
        }
    }

    pub fn parse(message: impl Into<String>, line: Option<usize>) -> Self {
        StoreError::Parse {
            message: message.into(),
            line,
        }
    }

    pub fn task_not_found(task_id: &str) -> Self {
        StoreError::NotFound {
            message: format!("Task not found: {}", task_id),
            code: ErrorCode::TaskNotFound,
        }
    }

    pub fn parent_not_found(parent_id: &str) -> Self {
        StoreError::NotFound {
            message: format!("Parent task not found: {}", parent_id),
            code: ErrorCode::ParentNotFound,
        }
    }

    pub fn template_not_found(name: &str, searched: &[PathBuf]) -> Self {
        StoreError::NotFound {
            message: format!(
                "Template '{}' not found in: {}",
                name,
                join_paths(searched)
            ),
            code: ErrorCode::TemplateNotFound,
        }
    }

    pub fn ambiguous_id(prefix: &str, candidates: &[String]) -> Self {
        StoreError::NotFound {
            message: format!(
                "Task id '{}' is ambiguous, matches: {}",
                prefix,
                candidates.join(", ")
            ),
            code: ErrorCode::AmbiguousId,
        }
    }

    pub fn duplicate_id(task_id: &str, paths: &[PathBuf]) -> Self {
        StoreError::Integrity {
            message: format!(
                "Duplicate task id {} found at: {}",
                task_id,
                join_paths(paths)
            ),
            code: ErrorCode::DuplicateId,
        }
    }

    pub fn dangling_parent(task_id: &str, parent_id: &str) -> Self {
        StoreError::Integrity {
            message: format!(
                "Task {} references missing parent {}",
                task_id, parent_id
            ),
            code: ErrorCode::DanglingParent,
        }
    }

    pub fn already_exists(path: &Path) -> Self {
        StoreError::Integrity {
            message: format!("Refusing to overwrite existing {}", path.display()),
            code: ErrorCode::AlreadyExists,
        }
    }

    pub fn no_project_root(reason: impl fmt::Display) -> Self {
        StoreError::Configuration {
            message: format!("No project root could be resolved: {}", reason),
            code: ErrorCode::NoProjectRoot,
        }
    }

    pub fn no_strategy(resource: impl fmt::Display) -> Self {
        StoreError::Configuration {
            message: format!("No path strategy defined for resource type {}", resource),
            code: ErrorCode::NoStrategy,
        }
    }

    pub fn invalid_config(path: &Path, reason: impl fmt::Display) -> Self {
        StoreError::Configuration {
            message: format!("Invalid configuration {}: {}", path.display(), reason),
            code: ErrorCode::InvalidConfig,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: Some(path.into()),
            source,
        }
    }

    /// Wrap a failure with the files a multi-file operation already touched.
    ///
    /// Wrapping an existing partial failure merges the lists, earlier
    /// changes first.
    pub fn partial(self, mut changed: Vec<PathBuf>) -> Self {
        if changed.is_empty() {
            return self;
        }
        match self {
            StoreError::PartialWrite {
                changed: inner,
                source,
            } => {
                changed.extend(inner);
                StoreError::PartialWrite { changed, source }
            }
            other => StoreError::PartialWrite {
                changed,
                source: Box::new(other),
            },
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        StoreError::Io { path: None, source }
    }
}

/// Extension for attaching the offending path to I/O results.
pub trait IoContext<T> {
    fn at(self, path: &Path) -> StoreResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> StoreResult<T> {
        self.map_err(|e| StoreError::io(path, e))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_allowed_lists_values() {
        let err = StoreError::not_allowed("status", "nonsense", &["todo", "done"]);
        assert_eq!(err.code(), ErrorCode::InvalidFieldValue);
        assert!(err.to_string().contains("todo, done"));
        match err {
            StoreError::Validation { allowed, .. } => assert_eq!(allowed, vec!["todo", "done"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_partial_without_changes_is_unwrapped() {
        let err = StoreError::task_not_found("abc").partial(Vec::new());
        assert_eq!(err.code(), ErrorCode::TaskNotFound);
    }

    #[test]
    fn test_partial_reports_changed_files() {
        let err = StoreError::task_not_found("abc").partial(vec![PathBuf::from("/tmp/01_a.task.md")]);
        assert_eq!(err.code(), ErrorCode::PartialWrite);
        assert!(err.to_string().contains("/tmp/01_a.task.md"));
        assert!(err.to_string().contains("Task not found: abc"));
    }

    #[test]
    fn test_nested_partial_merges_paths() {
        let err = StoreError::task_not_found("abc")
            .partial(vec![PathBuf::from("b")])
            .partial(vec![PathBuf::from("a")]);
        match err {
            StoreError::PartialWrite { changed, source } => {
                assert_eq!(changed, vec![PathBuf::from("a"), PathBuf::from("b")]);
                assert_eq!(source.code(), ErrorCode::TaskNotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(StoreError::task_not_found("x").is_recoverable());
        assert!(!StoreError::no_strategy("tasks").is_recoverable());
        assert!(!StoreError::dangling_parent("a", "b").is_recoverable());
    }
}

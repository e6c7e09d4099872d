//! Normalization of enumerable metadata fields.
//!
//! Each enum variant owns a canonical name, a display label, an optional emoji
//! and a list of aliases (see [`crate::types::VariantInfo`]). The tables below
//! are built once and matched case-insensitively: exact match first, then
//! substring containment in declaration order.

use crate::error::{StoreError, StoreResult};
use crate::types::{EnumField, Priority, TaskStatus, TaskType};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// The enumerable header fields that accept free-form input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaField {
    Status,
    Type,
    Priority,
}

impl MetaField {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "status" => Some(MetaField::Status),
            "type" | "task_type" => Some(MetaField::Type),
            "priority" => Some(MetaField::Priority),
            _ => None,
        }
    }
}

impl fmt::Display for MetaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaField::Status => f.write_str(TaskStatus::FIELD),
            MetaField::Type => f.write_str(TaskType::FIELD),
            MetaField::Priority => f.write_str(Priority::FIELD),
        }
    }
}

/// Case-insensitive lookup table for one enum.
struct AliasTable {
    exact: HashMap<String, usize>,
    /// Keys in declaration order, for containment matching.
    ordered: Vec<(String, usize)>,
}

impl AliasTable {
    fn build<T: EnumField>() -> Self {
        let mut exact = HashMap::new();
        let mut ordered = Vec::new();

        for (index, variant) in T::all().iter().enumerate() {
            let info = variant.info();
            let mut keys = vec![
                info.canonical.to_lowercase(),
                info.canonical.replace('_', " "),
                info.canonical.replace('_', "-"),
                info.label.to_lowercase(),
            ];
            keys.extend(info.emoji.map(str::to_string));
            keys.extend(info.aliases.iter().map(|a| a.to_lowercase()));

            for key in keys {
                if exact.contains_key(&key) {
                    continue;
                }
                exact.insert(key.clone(), index);
                ordered.push((key, index));
            }
        }

        Self { exact, ordered }
    }

    fn lookup(&self, input: &str) -> Option<usize> {
        let needle = input.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        if let Some(&index) = self.exact.get(&needle) {
            return Some(index);
        }

        // Single characters would match nearly every key.
        if needle.chars().count() < 2 {
            return None;
        }

        self.ordered
            .iter()
            .find(|(key, _)| needle.contains(key.as_str()) || key.contains(needle.as_str()))
            .map(|(_, index)| *index)
    }
}

static STATUS_TABLE: LazyLock<AliasTable> = LazyLock::new(AliasTable::build::<TaskStatus>);
static TYPE_TABLE: LazyLock<AliasTable> = LazyLock::new(AliasTable::build::<TaskType>);
static PRIORITY_TABLE: LazyLock<AliasTable> = LazyLock::new(AliasTable::build::<Priority>);

fn lookup_variant<T: EnumField>(table: &AliasTable, input: &str) -> StoreResult<T> {
    table
        .lookup(input)
        .map(|index| T::all()[index])
        .ok_or_else(|| StoreError::not_allowed(T::FIELD, input, &T::canonical_names()))
}

/// Normalize free-form input to a task status.
pub fn normalize_status(input: &str) -> StoreResult<TaskStatus> {
    lookup_variant(&STATUS_TABLE, input)
}

/// Normalize free-form input to a task type.
pub fn normalize_type(input: &str) -> StoreResult<TaskType> {
    lookup_variant(&TYPE_TABLE, input)
}

/// Normalize free-form input to a priority.
pub fn normalize_priority(input: &str) -> StoreResult<Priority> {
    lookup_variant(&PRIORITY_TABLE, input)
}

/// Normalize `input` for `field`, returning the canonical name.
pub fn normalize(field: MetaField, input: &str) -> StoreResult<&'static str> {
    match field {
        MetaField::Status => normalize_status(input).map(|v| v.as_str()),
        MetaField::Type => normalize_type(input).map(|v| v.as_str()),
        MetaField::Priority => normalize_priority(input).map(|v| v.as_str()),
    }
}

/// Normalize optional input, falling back to the default only when absent.
pub fn normalize_or_default<T, F>(input: Option<&str>, parse: F) -> StoreResult<T>
where
    T: Default,
    F: Fn(&str) -> StoreResult<T>,
{
    match input {
        Some(value) => parse(value),
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_exact_alias() {
        assert_eq!(normalize(MetaField::Status, "wip").unwrap(), "in_progress");
        assert_eq!(normalize(MetaField::Status, "In Progress").unwrap(), "in_progress");
        assert_eq!(normalize(MetaField::Status, "DONE").unwrap(), "done");
        assert_eq!(normalize(MetaField::Type, "docs").unwrap(), "documentation");
        assert_eq!(normalize(MetaField::Priority, "p0").unwrap(), "highest");
    }

    #[test]
    fn test_emoji_and_label() {
        assert_eq!(normalize(MetaField::Status, "✅").unwrap(), "done");
        assert_eq!(normalize(MetaField::Status, "to do").unwrap(), "todo");
        assert_eq!(normalize(MetaField::Type, "🐛").unwrap(), "bug");
    }

    #[test]
    fn test_substring_fallback() {
        assert_eq!(normalize(MetaField::Status, "🚧 In Progress").unwrap(), "in_progress");
        assert_eq!(normalize(MetaField::Priority, "very high").unwrap(), "high");
        assert_eq!(normalize(MetaField::Type, "bugs").unwrap(), "bug");
    }

    #[test]
    fn test_exact_beats_substring() {
        // "highest" contains "high" but must resolve exactly.
        assert_eq!(normalize(MetaField::Priority, "highest").unwrap(), "highest");
    }

    #[test]
    fn test_total_miss_lists_values() {
        let err = normalize(MetaField::Status, "nonsense").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFieldValue);
        match err {
            StoreError::Validation { allowed, .. } => {
                assert_eq!(allowed, vec!["todo", "in_progress", "blocked", "done", "archived"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(normalize_status("   ").is_err());
        assert!(normalize_priority("x").is_err());
    }

    #[test]
    fn test_absent_input_defaults() {
        let status = normalize_or_default(None, normalize_status).unwrap();
        assert_eq!(status, TaskStatus::Todo);
        let priority = normalize_or_default(Some("urgent"), normalize_priority).unwrap();
        assert_eq!(priority, Priority::Highest);
        assert!(normalize_or_default(Some("bogus"), normalize_type).is_err());
    }

    #[test]
    fn test_meta_field_parse() {
        assert_eq!(MetaField::from_str("Status"), Some(MetaField::Status));
        assert_eq!(MetaField::from_str("type"), Some(MetaField::Type));
        assert_eq!(MetaField::from_str("owner"), None);
        assert_eq!(MetaField::Priority.to_string(), "priority");
    }
}

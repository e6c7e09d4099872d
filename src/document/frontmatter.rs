//! The delimited YAML header block at the top of a task file.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Header delimiter line.
pub const DELIMITER: &str = "---";

/// Raw header fields as written on disk.
///
/// Enumerable fields stay strings here; the store normalizes them. Keys this
/// struct does not name are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub task_type: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub workflow_state: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub archive_bucket: Option<String>,
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub parent_task: Option<String>,
    #[serde(default, deserialize_with = "sequence_string", skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime", skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime", skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Split raw text into its header block (if any) and the remaining body.
///
/// Returns the header text, the body text and the 1-based line number the
/// body starts on.
pub fn split(raw: &str) -> StoreResult<(Option<&str>, &str, usize)> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let first_line_end = raw.find('\n').unwrap_or(raw.len());
    if raw[..first_line_end].trim_end() != DELIMITER {
        return Ok((None, raw, 1));
    }

    let header_start = (first_line_end + 1).min(raw.len());
    let mut offset = header_start;
    let mut line_no = 2;
    for line in raw[header_start..].split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == DELIMITER || trimmed == "..." {
            let header = &raw[header_start..offset];
            let body = &raw[offset + line.len()..];
            return Ok((Some(header), body, line_no + 1));
        }
        offset += line.len();
        line_no += 1;
    }

    Err(StoreError::parse("Unterminated header block: missing closing '---'", Some(1)))
}

impl Frontmatter {
    /// Parse header text (without delimiters).
    pub fn parse(header: &str) -> StoreResult<Self> {
        if header.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(header).map_err(|e| {
            let line = e.location().map(|loc| loc.line() + 1);
            StoreError::parse(format!("Malformed header block: {}", e), line)
        })
    }

    /// Render the header including both delimiter lines.
    pub fn render(&self) -> StoreResult<String> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| StoreError::parse(format!("Cannot serialize header: {}", e), None))?;
        let yaml = if yaml.trim() == "{}" { String::new() } else { yaml };
        Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n"))
    }
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => serde_yaml::to_string(&other)
            .ok()
            .map(|s| s.trim().to_string()),
    }
}

/// Accept any scalar (hand-edited files write `id: 42` or `area: true`).
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_string))
}

/// Accept `02`, `2` or `"02"`, always yielding the two-digit form.
fn sequence_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().map(|n| format!("{:02}", n)),
        Some(other) => value_to_string(other).map(|s| match s.parse::<u8>() {
            Ok(n) => format!("{:02}", n),
            Err(_) => s,
        }),
        None => None,
    })
}

/// Accept a YAML list or a comma-separated string.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Sequence(items)) => items
            .into_iter()
            .filter_map(value_to_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(other) => value_to_string(other)
            .map(|s| {
                s.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        None => Vec::new(),
    })
}

/// Accept RFC 3339 timestamps or bare `YYYY-MM-DD` dates.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Value>::deserialize(deserializer)?.and_then(value_to_string) else {
        return Ok(None);
    };
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        && let Some(dt) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(Some(dt.and_utc()));
    }

    Err(serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_without_header() {
        let (header, body, line) = split("# Title\n").unwrap();
        assert!(header.is_none());
        assert_eq!(body, "# Title\n");
        assert_eq!(line, 1);
    }

    #[test]
    fn test_split_with_header() {
        let raw = "---\nid: abc\n---\n# Title\n";
        let (header, body, line) = split(raw).unwrap();
        assert_eq!(header, Some("id: abc\n"));
        assert_eq!(body, "# Title\n");
        assert_eq!(line, 4);
    }

    #[test]
    fn test_split_unterminated() {
        let err = split("---\nid: abc\n# Title\n").unwrap_err();
        assert!(err.to_string().contains("Unterminated"));
    }

    #[test]
    fn test_lenient_fields() {
        let fm = Frontmatter::parse(
            "id: 42\nsequence: 3\ntags: a, b ,c\ncreated: 2024-01-05\ncustom_key: keep me\n",
        )
        .unwrap();
        assert_eq!(fm.id.as_deref(), Some("42"));
        assert_eq!(fm.sequence.as_deref(), Some("03"));
        assert_eq!(fm.tags, vec!["a", "b", "c"]);
        assert!(fm.created.is_some());
        assert_eq!(
            fm.extra.get("custom_key"),
            Some(&Value::String("keep me".to_string()))
        );
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let err = Frontmatter::parse("id: [unterminated\n").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::MalformedDocument);
    }

    #[test]
    fn test_render_round_trip() {
        let fm = Frontmatter {
            id: Some("abc-1".to_string()),
            sequence: Some("02".to_string()),
            tags: vec!["x".to_string()],
            ..Default::default()
        };
        let rendered = fm.render().unwrap();
        assert!(rendered.starts_with("---\n"));
        let (header, _, _) = split(&rendered).unwrap();
        let parsed = Frontmatter::parse(header.unwrap()).unwrap();
        assert_eq!(parsed, fm);
    }
}

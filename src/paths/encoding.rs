//! Path → directory slug encoding for centralized per-project storage.
//!
//! The slug is deterministic but lossy: `/a/b-c` and `/a-b/c` both encode to
//! `a-b-c`. [`decode_path`] is a best-effort inverse for display only.

use std::path::{Component, Path, PathBuf};

/// Encode a project path as a single directory name.
///
/// The path is made absolute and canonical (falling back to lexical
/// normalization when it does not exist), split into components, every
/// character outside `[A-Za-z0-9-]` becomes `_`, components are joined with
/// `-` and the result is lower-cased.
pub fn encode_path(path: &Path) -> String {
    let absolute = canonical_or_normalized(path);

    absolute
        .components()
        .filter_map(|component| match component {
            Component::Prefix(prefix) => Some(prefix.as_os_str().to_string_lossy().into_owned()),
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .map(|part| {
            part.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Best-effort inverse of [`encode_path`]: every `-` is read as a separator.
pub fn decode_path(slug: &str) -> PathBuf {
    let mut path = PathBuf::from(std::path::MAIN_SEPARATOR_STR);
    for part in slug.split('-').filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path
}

/// Canonicalize when the path exists, otherwise make it absolute and
/// resolve `.`/`..` lexically.
pub fn canonical_or_normalized(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    normalize_path_components(&absolute)
}

/// Normalize path components without requiring the file to exist.
/// Handles `.` and `..` components.
pub fn normalize_path_components(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                components.push(component)
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                } else if !matches!(components.last(), Some(Component::RootDir)) {
                    components.push(Component::ParentDir);
                }
            }
        }
    }

    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_replaces_and_lowercases() {
        let slug = encode_path(Path::new("/nonexistent-root/Users/Jo Doe/My.Project"));
        assert_eq!(slug, "nonexistent-root-users-jo_doe-my_project");
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = encode_path(Path::new("/nonexistent-root/work/app"));
        let b = encode_path(Path::new("/nonexistent-root/work/./tmp/../app"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_encoding_is_lossy() {
        let a = encode_path(Path::new("/nonexistent-root/a/b-c"));
        let b = encode_path(Path::new("/nonexistent-root/a-b/c"));
        assert_eq!(a, b);
    }

    #[cfg(unix)]
    #[test]
    fn test_decode_best_effort() {
        assert_eq!(decode_path("home-me-app"), PathBuf::from("/home/me/app"));
    }

    #[test]
    fn test_normalize_path_components() {
        let normalized = normalize_path_components(Path::new("/foo/bar/../baz/./qux"));
        assert_eq!(normalized, PathBuf::from("/foo/baz/qux"));
        let above_root = normalize_path_components(Path::new("/../foo"));
        assert_eq!(above_root, PathBuf::from("/foo"));
    }
}

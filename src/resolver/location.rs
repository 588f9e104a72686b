//! Base URL handling for external references
//!
//! Absolute URLs replace the base, relative references combine with it.
//! Bases that are not URLs are treated as filesystem-style paths.

use std::path::{Component, Path, PathBuf};

use url::Url;

/// Resolve `reference` (a `$ref` without its fragment) against `base`
pub fn resolve_location(base: Option<&str>, reference: &str) -> String {
    if Url::parse(reference).is_ok() {
        return reference.to_string();
    }
    let Some(base) = base else {
        return normalize_path(Path::new(reference));
    };
    if let Ok(base_url) = Url::parse(base) {
        if let Ok(joined) = base_url.join(reference) {
            return joined.to_string();
        }
    }
    let reference_path = Path::new(reference);
    if reference_path.is_absolute() {
        return normalize_path(reference_path);
    }
    let parent = Path::new(base).parent().unwrap_or(Path::new(""));
    normalize_path(&parent.join(reference_path))
}

/// Absolute base URL declared by a root `$id`, if any
pub fn base_from_id(id: &str) -> Option<String> {
    Url::parse(id).ok().map(|u| u.to_string())
}

/// Collapse `.` and `..` segments, keeping a leading root
fn normalize_path(path: &Path) -> String {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(segment) => {
                out.push(segment);
                depth += 1;
            }
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
            Component::CurDir => {}
        }
    }
    out.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_against_url() {
        assert_eq!(
            resolve_location(Some("https://example.com/schemas/root.json"), "common/address.json"),
            "https://example.com/schemas/common/address.json"
        );
        assert_eq!(
            resolve_location(Some("https://example.com/schemas/v1/root.json"), "../shared.json"),
            "https://example.com/schemas/shared.json"
        );
    }

    #[test]
    fn test_absolute_replaces_base() {
        assert_eq!(
            resolve_location(Some("https://example.com/root.json"), "https://other.org/x.json"),
            "https://other.org/x.json"
        );
    }

    #[test]
    fn test_relative_against_path() {
        assert_eq!(resolve_location(Some("schemas/root.json"), "./defs/a.json"), "schemas/defs/a.json");
        assert_eq!(resolve_location(Some("schemas/v1/root.json"), "../b.json"), "schemas/b.json");
        assert_eq!(resolve_location(Some("/srv/root.json"), "c.json"), "/srv/c.json");
        assert_eq!(resolve_location(Some("root.json"), "../up.json"), "../up.json");
    }

    #[test]
    fn test_without_base() {
        assert_eq!(resolve_location(None, "./a/../b.json"), "b.json");
    }

    #[test]
    fn test_base_from_id() {
        assert_eq!(
            base_from_id("https://example.com/schemas/root.json").as_deref(),
            Some("https://example.com/schemas/root.json")
        );
        assert_eq!(base_from_id("root.json"), None);
    }
}

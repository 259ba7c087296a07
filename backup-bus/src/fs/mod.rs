//! Filesystem helpers shared by the client drivers and the storage tiers.

pub mod walker;

use crate::utils::errors::PathError;
use std::path::{Component, Path, PathBuf};

/// Turn a `/`-separated relative key into a path that stays below any root
/// it is joined onto.
///
/// Rejects empty keys, absolute paths and any `.` or `..` component.
pub fn relative_key_to_path(key: &str) -> Result<PathBuf, PathError> {
    if key.trim().is_empty() {
        return Err(PathError::Empty);
    }
    let path = Path::new(key);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            _ => return Err(PathError::Escapes(key.to_string())),
        }
    }
    if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(PathError::BadSegment(key.to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_nested_keys() {
        assert_eq!(
            relative_key_to_path("dir/sub/a.txt").unwrap(),
            PathBuf::from("dir").join("sub").join("a.txt")
        );
    }

    #[test]
    fn test_rejects_escaping_keys() {
        for key in ["", "  ", "/etc/passwd", "../a", "a/../../b", "./a", "a//b", "a/"] {
            assert!(relative_key_to_path(key).is_err(), "{:?} should be rejected", key);
        }
        assert_eq!(relative_key_to_path(" "), Err(PathError::Empty));
        assert_eq!(
            relative_key_to_path("../a"),
            Err(PathError::Escapes("../a".to_string()))
        );
    }
}

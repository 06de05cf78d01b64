use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::Result;

/// Expands glob patterns into a sorted, deduplicated list of existing file
/// paths. Directories and other non-files are filtered out; matches are
/// canonicalized so the same file reached through two patterns appears once.
pub fn resolve_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut resolved = BTreeSet::new();
    for pattern in patterns {
        for entry in glob::glob(pattern)? {
            let path = entry.map_err(|e| e.into_error())?;
            if path.is_file() {
                resolved.insert(path.canonicalize()?);
            }
        }
    }
    Ok(resolved.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolves_sorted_files_only() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.store"), "").unwrap();
        std::fs::write(dir.path().join("a.store"), "").unwrap();
        std::fs::create_dir(dir.path().join("c.store")).unwrap();

        let pattern = dir.path().join("*.store").to_string_lossy().into_owned();
        let paths = resolve_patterns(&[pattern]).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("a.store"));
        assert!(paths[1].ends_with("b.store"));
    }

    #[test]
    fn test_overlapping_patterns_deduplicate() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.store"), "").unwrap();

        let star = dir.path().join("*.store").to_string_lossy().into_owned();
        let exact = dir.path().join("a.store").to_string_lossy().into_owned();
        let paths = resolve_patterns(&[star, exact]).unwrap();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_zero_matches_is_empty_not_error() {
        let dir = tempdir().unwrap();
        let pattern = dir.path().join("*.nothing").to_string_lossy().into_owned();
        assert!(resolve_patterns(&[pattern]).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        assert!(resolve_patterns(&["[".to_string()]).is_err());
    }
}

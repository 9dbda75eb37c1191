//! Locating the built artifact and publishing it under the item's name.

use crate::types::ItemError;
use std::fs;
use std::path::{Path, PathBuf};

/// Artifact chosen from the Gradle output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSelection {
    pub selected: PathBuf,
    /// Every matching file, in directory-listing order. More than one entry
    /// means the selection was ambiguous.
    pub candidates: Vec<PathBuf>,
}

impl ArtifactSelection {
    pub fn is_ambiguous(&self) -> bool {
        self.candidates.len() > 1
    }
}

/// Finds files with `extension` (case-insensitive) directly inside `dir`.
///
/// The first match in directory-listing order is selected. Listing order is
/// platform dependent, so with several matches (split APKs, a leftover
/// artifact) the choice is arbitrary; a warning names all candidates.
pub fn locate_artifact(dir: &Path, extension: &str) -> Result<ArtifactSelection, ItemError> {
    let not_found = || ItemError::ArtifactNotFound {
        dir: dir.to_path_buf(),
        extension: extension.to_string(),
    };

    let entries = fs::read_dir(dir).map_err(|_| not_found())?;
    let candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extension))
        .collect();

    let selected = candidates.first().cloned().ok_or_else(not_found)?;
    if candidates.len() > 1 {
        tracing::warn!(
            "{} .{} files in {}; using {}",
            candidates.len(),
            extension,
            dir.display(),
            selected.display()
        );
        for candidate in &candidates {
            tracing::warn!("  candidate: {}", candidate.display());
        }
    }

    Ok(ArtifactSelection {
        selected,
        candidates,
    })
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Published file name for an item: `<prefix><item>.<extension>`.
pub fn published_name(item: &str, extension: &str, prefix: &str) -> String {
    format!("{}{}.{}", prefix, item, extension)
}

/// Copies `artifact` to `dest_dir/<prefix><item>.<extension>`, replacing any
/// earlier file of that name.
pub fn publish_artifact(
    artifact: &Path,
    dest_dir: &Path,
    item: &str,
    extension: &str,
    prefix: &str,
) -> Result<PathBuf, ItemError> {
    let dest = dest_dir.join(published_name(item, extension, prefix));
    let copy_failed = |source| ItemError::ArtifactCopyFailed {
        from: artifact.to_path_buf(),
        to: dest.clone(),
        source,
    };

    if !artifact.is_file() {
        return Err(copy_failed(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "artifact disappeared before it could be published",
        )));
    }
    fs::copy(artifact, &dest).map_err(copy_failed)?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_single_artifact() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app-release.apk"), "apk").unwrap();
        fs::write(dir.path().join("output-metadata.json"), "{}").unwrap();

        let selection = locate_artifact(dir.path(), "apk").unwrap();
        assert_eq!(selection.selected, dir.path().join("app-release.apk"));
        assert!(!selection.is_ambiguous());
    }

    #[test]
    fn test_locate_extension_case_insensitive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("APP.APK"), "apk").unwrap();
        assert!(locate_artifact(dir.path(), "apk").is_ok());
    }

    #[test]
    fn test_locate_ignores_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested.apk")).unwrap();
        let err = locate_artifact(dir.path(), "apk").unwrap_err();
        assert_eq!(err.kind(), "ArtifactNotFound");
    }

    #[test]
    fn test_locate_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = locate_artifact(&dir.path().join("release"), "apk").unwrap_err();
        assert_eq!(err.kind(), "ArtifactNotFound");
    }

    #[test]
    fn test_multiple_artifacts_are_flagged() {
        // Listing order is not defined, so only assert that the pick is one of
        // the candidates and that the ambiguity is visible to the caller.
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app-arm64-v8a-release.apk"), "arm").unwrap();
        fs::write(dir.path().join("app-x86_64-release.apk"), "x86").unwrap();

        let selection = locate_artifact(dir.path(), "apk").unwrap();
        assert!(selection.is_ambiguous());
        assert_eq!(selection.candidates.len(), 2);
        assert!(selection.candidates.contains(&selection.selected));
    }

    #[test]
    fn test_publish_overwrites() {
        let build = TempDir::new().unwrap();
        let items = TempDir::new().unwrap();
        let artifact = build.path().join("app-release.apk");
        fs::write(&artifact, "fresh").unwrap();
        fs::write(items.path().join("acme.apk"), "stale").unwrap();

        let dest = publish_artifact(&artifact, items.path(), "acme", "apk", "").unwrap();
        assert_eq!(dest, items.path().join("acme.apk"));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "fresh");
    }

    #[test]
    fn test_publish_with_prefix() {
        let build = TempDir::new().unwrap();
        let artifact = build.path().join("app-release.apk");
        fs::write(&artifact, "apk").unwrap();

        let dest = publish_artifact(&artifact, build.path(), "38", "apk", "test_").unwrap();
        assert!(dest.ends_with("test_38.apk"));
    }

    #[test]
    fn test_publish_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = publish_artifact(&dir.path().join("gone.apk"), dir.path(), "a", "apk", "")
            .unwrap_err();
        assert_eq!(err.kind(), "ArtifactCopyFailed");
    }
}

//! Resource mapping: which item file replaces which project file.
//!
//! A [`ResourceMapping`] is an ordered table of `(resource name, target path)`
//! pairs. The resource name is a plain file name looked up inside each item
//! directory; the target path is relative to the working tree.

use crate::types::BuildError;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// One row of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// File name inside an item directory (e.g. `config.xml`).
    pub name: String,
    /// Path relative to the working tree (e.g. `app/src/main/res/values/config.xml`).
    pub target: PathBuf,
}

impl ResourceEntry {
    /// Basename of the target path; the key the backup stores it under.
    pub fn backup_key(&self) -> &str {
        self.target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(self.name.as_str())
    }
}

/// Ordered, validated resource mapping. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMapping {
    entries: Vec<ResourceEntry>,
}

impl ResourceMapping {
    /// Builds a mapping from `(name, target)` pairs, preserving their order.
    ///
    /// Validation is structural only:
    /// - names are non-empty single path components
    /// - targets are relative and do not climb out of the working tree
    /// - names and target basenames are unique
    pub fn new<I, N, T>(pairs: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<PathBuf>,
    {
        let entries: Vec<ResourceEntry> = pairs
            .into_iter()
            .map(|(name, target)| ResourceEntry {
                name: name.into(),
                target: target.into(),
            })
            .collect();

        if entries.is_empty() {
            return Err(BuildError::InvalidMapping(
                "the mapping must contain at least one resource".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for entry in &entries {
            validate_name(&entry.name)?;
            validate_target(&entry.target)?;
            if !names.insert(entry.name.as_str()) {
                return Err(BuildError::InvalidMapping(format!(
                    "resource '{}' is listed more than once",
                    entry.name
                )));
            }
            if !keys.insert(entry.backup_key()) {
                return Err(BuildError::InvalidMapping(format!(
                    "two targets share the file name '{}'; backups are keyed by file name",
                    entry.backup_key()
                )));
            }
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ResourceEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.entries.iter()
    }
}

impl Default for ResourceMapping {
    /// The four branded resources of the detector app.
    fn default() -> Self {
        Self {
            entries: DEFAULT_RESOURCES
                .iter()
                .map(|(name, target)| ResourceEntry {
                    name: (*name).to_string(),
                    target: PathBuf::from(target),
                })
                .collect(),
        }
    }
}

/// Default `(resource name, target path)` table.
pub const DEFAULT_RESOURCES: &[(&str, &str)] = &[
    ("config.xml", "app/src/main/res/values/config.xml"),
    (
        "detection_sound.wav",
        "app/src/main/assets/res/detection_sound.wav",
    ),
    ("ic_launcher.png", "app/src/main/res/mipmap/ic_launcher.png"),
    ("splash.png", "app/src/main/assets/res/splash.png"),
];

fn validate_name(name: &str) -> Result<(), BuildError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(BuildError::InvalidMapping(format!(
            "resource name '{}' must be a plain file name",
            name
        ))),
    }
}

fn validate_target(target: &Path) -> Result<(), BuildError> {
    if target.as_os_str().is_empty() {
        return Err(BuildError::InvalidMapping(
            "target path must not be empty".to_string(),
        ));
    }
    for component in target.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(BuildError::InvalidMapping(format!(
                    "target '{}' must be a relative path inside the working tree",
                    target.display()
                )));
            }
        }
    }
    if target.file_name().is_none() {
        return Err(BuildError::InvalidMapping(format!(
            "target '{}' does not name a file",
            target.display()
        )));
    }
    Ok(())
}

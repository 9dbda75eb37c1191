//! Snapshot and restore of the working tree's mapped resources.
//!
//! A [`BackupSet`] copies every mapped target that exists into the `files/`
//! subdirectory of a backup directory and records what it saw in a
//! `manifest.json` next to it. Restoring puts each
//! file back and deletes targets that did not exist when the snapshot was
//! taken, so the working tree ends up byte-for-byte as it started.
//!
//! The set is a guard: if it is dropped without [`BackupSet::restore`] having
//! been called (early return, panic unwinding through the batch loop), `Drop`
//! restores it. Restoration is attempted at most once per set.
//!
//! The manifest doubles as a crash marker. It is removed only after a
//! successful restore, so a manifest found at the start of a run means the
//! previous run never restored; [`BackupSet::create`] refuses to overwrite it
//! and [`BackupSet::open`] loads it for recovery.

use crate::mapping::ResourceMapping;
use crate::types::BuildError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the manifest inside the backup directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Subdirectory holding the copied files, kept apart from the manifest.
const FILES_DIR: &str = "files";

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    /// Target path relative to the working tree.
    target: PathBuf,
    /// File name inside `files/`; `None` if the target was absent.
    stored: Option<String>,
}

/// Counts from a completed restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Targets copied back from the backup.
    pub restored: usize,
    /// Targets deleted because they did not exist before the run.
    pub removed: usize,
}

/// Scoped snapshot of the working tree's mapped resources.
#[derive(Debug)]
pub struct BackupSet {
    working_tree: PathBuf,
    dir: PathBuf,
    manifest: Manifest,
    restored: bool,
}

impl BackupSet {
    /// Takes a snapshot of every mapped target under `working_tree`.
    ///
    /// # Errors
    ///
    /// * [`BuildError::StaleBackup`] if `dir` already holds a manifest
    /// * [`BuildError::Backup`] if a file cannot be copied or the manifest
    ///   cannot be written
    pub fn create(
        working_tree: &Path,
        mapping: &ResourceMapping,
        dir: &Path,
    ) -> Result<Self, BuildError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if manifest_path.exists() {
            return Err(BuildError::StaleBackup {
                dir: dir.to_path_buf(),
            });
        }

        let files_dir = dir.join(FILES_DIR);
        fs::create_dir_all(&files_dir).map_err(|e| {
            BuildError::Backup(format!(
                "Failed to create backup directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut entries = Vec::with_capacity(mapping.entries().len());
        for entry in mapping.iter() {
            let target = working_tree.join(&entry.target);
            let stored = if target.is_file() {
                let key = entry.backup_key().to_string();
                let backup_path = files_dir.join(&key);
                fs::copy(&target, &backup_path).map_err(|e| {
                    BuildError::Backup(format!(
                        "Failed to back up {} -> {}: {}",
                        target.display(),
                        backup_path.display(),
                        e
                    ))
                })?;
                tracing::debug!("backed up {} -> {}", target.display(), backup_path.display());
                Some(key)
            } else {
                tracing::debug!("{} does not exist yet; it will be removed on restore", target.display());
                None
            };
            entries.push(ManifestEntry {
                target: entry.target.clone(),
                stored,
            });
        }

        let manifest = Manifest {
            version: MANIFEST_VERSION,
            entries,
        };
        write_manifest(dir, &manifest)?;

        tracing::info!(
            "backed up {} of {} resource files to {}",
            manifest.entries.iter().filter(|e| e.stored.is_some()).count(),
            manifest.entries.len(),
            dir.display()
        );

        Ok(Self {
            working_tree: working_tree.to_path_buf(),
            dir: dir.to_path_buf(),
            manifest,
            restored: false,
        })
    }

    /// Loads a backup left behind by an interrupted run.
    ///
    /// Returns `Ok(None)` when `dir` has no manifest.
    pub fn open(working_tree: &Path, dir: &Path) -> Result<Option<Self>, BuildError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&manifest_path)?;
        let manifest: Manifest = serde_json::from_str(&contents)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(BuildError::Restore(format!(
                "unsupported backup manifest version {} in {}",
                manifest.version,
                manifest_path.display()
            )));
        }
        Ok(Some(Self {
            working_tree: working_tree.to_path_buf(),
            dir: dir.to_path_buf(),
            manifest,
            restored: false,
        }))
    }

    /// Backup directory holding the manifest.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of targets that existed and were copied into the backup.
    pub fn stored_count(&self) -> usize {
        self.manifest
            .entries
            .iter()
            .filter(|e| e.stored.is_some())
            .count()
    }

    /// Restores the working tree and removes the backup directory.
    ///
    /// Only the first call does any work; later calls return an empty report.
    /// Every entry is attempted even if an earlier one fails. On failure the
    /// backup directory is kept so the restore can be retried with
    /// [`BackupSet::open`].
    pub fn restore(&mut self) -> Result<RestoreReport, BuildError> {
        if self.restored {
            return Ok(RestoreReport::default());
        }
        self.restored = true;

        let mut report = RestoreReport::default();
        let mut failures = Vec::new();

        for entry in &self.manifest.entries {
            let target = self.working_tree.join(&entry.target);
            match &entry.stored {
                Some(key) => {
                    let backup_path = self.dir.join(FILES_DIR).join(key);
                    let result = target
                        .parent()
                        .map_or(Ok(()), fs::create_dir_all)
                        .and_then(|_| fs::copy(&backup_path, &target).map(|_| ()));
                    match result {
                        Ok(()) => {
                            tracing::debug!("restored {} -> {}", backup_path.display(), target.display());
                            report.restored += 1;
                        }
                        Err(e) => failures.push(format!("{}: {}", target.display(), e)),
                    }
                }
                None => {
                    if target.exists() {
                        match fs::remove_file(&target) {
                            Ok(()) => {
                                tracing::debug!("removed {}", target.display());
                                report.removed += 1;
                            }
                            Err(e) => failures.push(format!("{}: {}", target.display(), e)),
                        }
                    }
                }
            }
        }

        if !failures.is_empty() {
            return Err(BuildError::Restore(format!(
                "{} file(s) could not be restored; backup kept at {}\n  {}",
                failures.len(),
                self.dir.display(),
                failures.join("\n  ")
            )));
        }

        if let Err(e) = fs::remove_dir_all(&self.dir) {
            tracing::warn!(
                "restored working tree but could not remove backup directory {}: {}",
                self.dir.display(),
                e
            );
        }

        tracing::info!(
            "restored {} resource files ({} removed)",
            report.restored,
            report.removed
        );
        Ok(report)
    }
}

impl Drop for BackupSet {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        tracing::warn!("backup released without an explicit restore; restoring now");
        if let Err(e) = self.restore() {
            tracing::error!("{}", e);
        }
    }
}

fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<(), BuildError> {
    let json = serde_json::to_string_pretty(manifest)?;
    let tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
    let path = dir.join(MANIFEST_FILE);
    fs::write(&tmp, json)
        .and_then(|_| fs::rename(&tmp, &path))
        .map_err(|e| {
            BuildError::Backup(format!(
                "Failed to write backup manifest {}: {}",
                path.display(),
                e
            ))
        })
}

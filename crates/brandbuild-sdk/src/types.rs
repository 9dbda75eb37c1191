//! Core types for brandbuild-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`BuildError`] - Run-level errors that abort a batch before any item is built
//! - [`ItemError`] - Per-item errors that fail a single item and nothing else
//! - [`Stage`] - The pipeline stage an item was in when it failed
//! - [`BuildResult`] / [`ItemReport`] - Per-item outcome
//! - [`RunSummary`] - Aggregated outcome of a batch run

use serde::Serialize;
use std::path::PathBuf;

/// Run-level errors.
///
/// Any of these aborts the whole run. Everything except [`BuildError::Restore`]
/// is raised before the working tree has been touched.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A directory or file the run depends on is absent.
    ///
    /// Raised for a missing items root, a missing working tree, or a missing
    /// Gradle wrapper script.
    #[error("prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    /// The items root contains no eligible item directories.
    #[error("no item directories found under {}", root.display())]
    NoItems {
        /// The items root that was scanned.
        root: PathBuf,
    },

    /// A backup manifest from an earlier run is still present.
    ///
    /// The working tree may still hold swapped resources from that run, so a
    /// fresh backup would capture the wrong originals.
    #[error(
        "a backup from an interrupted run exists at {}\n\n\
         The working tree may still contain branded resources.\n\
         Run `brandbuild restore` to put the original files back first.",
        dir.display()
    )]
    StaleBackup {
        /// Backup directory holding the stale manifest.
        dir: PathBuf,
    },

    /// The resource mapping is unusable.
    #[error("invalid resource mapping: {0}")]
    InvalidMapping(String),

    /// Taking the backup snapshot failed.
    #[error("backup failed: {0}")]
    Backup(String),

    /// Restoring the backup snapshot failed.
    ///
    /// The backup directory is left in place so `brandbuild restore` can retry.
    #[error("restore failed: {0}")]
    Restore(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// Reading or writing the backup manifest failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that fail a single item.
///
/// These never escape the per-item boundary; they end up inside
/// [`BuildResult::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("item directory does not exist: {}", .0.display())]
    ItemDirectoryMissing(PathBuf),

    /// Only raised in strict mode; the default pipeline skips missing files.
    #[error("missing resource files: {}", .0.join(", "))]
    MissingResources(Vec<String>),

    #[error("failed to copy {} -> {}: {source}", from.display(), to.display())]
    SwapFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start `{command}`: {source}")]
    ToolLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{task}` exited with {}{}", describe_code(*code), describe_stderr(stderr))]
    ExternalToolNonZeroExit {
        task: String,
        /// `None` when the process was terminated by a signal.
        code: Option<i32>,
        /// Tail of captured stderr; empty when output was not captured.
        stderr: String,
    },

    #[error("no .{extension} artifact found in {}", dir.display())]
    ArtifactNotFound { dir: PathBuf, extension: String },

    #[error("failed to publish {} -> {}: {source}", from.display(), to.display())]
    ArtifactCopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!("\n\nStderr:\n{}", stderr)
    }
}

impl ItemError {
    /// Stable identifier for the error class, used in summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::ItemDirectoryMissing(_) => "ItemDirectoryMissing",
            ItemError::MissingResources(_) => "SourceFileMissing",
            ItemError::SwapFailed { .. } => "SwapFailed",
            ItemError::ToolLaunch { .. } => "ToolLaunchFailed",
            ItemError::ExternalToolNonZeroExit { .. } => "ExternalToolNonZeroExit",
            ItemError::ArtifactNotFound { .. } => "ArtifactNotFound",
            ItemError::ArtifactCopyFailed { .. } => "ArtifactCopyFailed",
            ItemError::Unexpected(_) => "UnexpectedException",
        }
    }
}

/// Pipeline stage of a single item.
///
/// Items move through the stages in declaration order; a failure in any stage
/// ends the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Swapping,
    Cleaning,
    Building,
    Locating,
    Publishing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Swapping => "swapping",
            Stage::Cleaning => "cleaning",
            Stage::Building => "building",
            Stage::Locating => "locating",
            Stage::Publishing => "publishing",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one item's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BuildResult {
    /// The artifact was published to `artifact`.
    Succeeded { artifact: PathBuf },
    /// The pipeline stopped at `stage`.
    Failed {
        stage: Stage,
        /// See [`ItemError::kind`].
        kind: String,
        message: String,
    },
}

impl BuildResult {
    pub fn failed(stage: Stage, error: &ItemError) -> Self {
        BuildResult::Failed {
            stage,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildResult::Succeeded { .. })
    }
}

/// Per-item report collected by the batch builder.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    /// Item identifier (directory name under the items root).
    pub item: String,
    pub outcome: BuildResult,
    /// Resource names that were absent from the item directory and skipped.
    pub skipped_resources: Vec<String>,
}

/// Aggregated result of a batch run.
///
/// # Example
///
/// ```ignore
/// let summary = builder.run()?;
/// println!("{} succeeded, {} failed", summary.succeeded(), summary.failed());
/// for item in summary.failed_items() {
///     eprintln!("  failed: {}", item);
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Run start time in RFC 3339 format.
    pub started_at: String,
    pub duration_ms: u64,
    pub items: Vec<ItemReport>,
    /// Whether the working tree was restored from the backup.
    pub restored: bool,
    /// Set when the restore failed; the backup directory is kept for recovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_error: Option<String>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    /// Identifiers of the failed items, in processing order.
    pub fn failed_items(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|r| !r.outcome.is_success())
            .map(|r| r.item.as_str())
            .collect()
    }

    pub fn report(&self, item: &str) -> Option<&ItemReport> {
        self.items.iter().find(|r| r.item == item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(item: &str, outcome: BuildResult) -> ItemReport {
        ItemReport {
            item: item.to_string(),
            outcome,
            skipped_resources: Vec::new(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let err = ItemError::ExternalToolNonZeroExit {
            task: "assembleRelease".into(),
            code: Some(1),
            stderr: String::new(),
        };
        let summary = RunSummary {
            started_at: "2026-01-01T00:00:00Z".into(),
            duration_ms: 10,
            items: vec![
                report("a", BuildResult::Succeeded { artifact: "a.apk".into() }),
                report("d", BuildResult::failed(Stage::Building, &err)),
                report("e", BuildResult::Succeeded { artifact: "e.apk".into() }),
            ],
            restored: true,
            restore_error: None,
        };
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failed_items(), vec!["d"]);
        assert!(summary.report("e").is_some());
        assert!(summary.report("z").is_none());
    }

    #[test]
    fn test_failed_result_carries_kind() {
        let err = ItemError::ArtifactNotFound {
            dir: "app/build/outputs/apk/release".into(),
            extension: "apk".into(),
        };
        match BuildResult::failed(Stage::Locating, &err) {
            BuildResult::Failed {
                stage,
                kind,
                message,
            } => {
                assert_eq!(stage, Stage::Locating);
                assert_eq!(kind, "ArtifactNotFound");
                assert!(message.contains("no .apk artifact"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_nonzero_exit_message() {
        let err = ItemError::ExternalToolNonZeroExit {
            task: "clean".into(),
            code: Some(3),
            stderr: "FAILURE: Build failed".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("`clean` exited with status 3"));
        assert!(msg.contains("FAILURE: Build failed"));

        let killed = ItemError::ExternalToolNonZeroExit {
            task: "clean".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("terminated by signal"));
        assert!(!killed.to_string().contains("Stderr"));
    }

    #[test]
    fn test_summary_serialization() {
        let summary = RunSummary {
            started_at: "2026-01-01T00:00:00Z".into(),
            duration_ms: 5,
            items: vec![report(
                "b",
                BuildResult::Succeeded {
                    artifact: "userInfos/b.apk".into(),
                },
            )],
            restored: true,
            restore_error: None,
        };
        let json = serde_json::to_value(&summary).expect("serialization should work");
        assert_eq!(json["items"][0]["outcome"]["status"], "succeeded");
        assert_eq!(json["items"][0]["item"], "b");
        assert_eq!(json["restored"], true);
    }
}

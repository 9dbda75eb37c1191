//! Batch builder: one branded APK per item directory.
//!
//! For every item under the items root the builder runs a fixed pipeline
//! against the shared working tree:
//!
//! 1. **Swap** - copy the item's resource files over the mapped project files
//! 2. **Clean** - `gradlew clean`
//! 3. **Build** - `gradlew assembleRelease`
//! 4. **Locate** - pick the APK from the Gradle output directory
//! 5. **Publish** - copy it to `<items root>/<item>.apk`
//!
//! The first failing stage ends that item only; the batch moves on. Before the
//! first item the mapped project files are snapshotted into a [`BackupSet`],
//! and after the last item (or when the batch unwinds) they are restored.
//!
//! Swaps accumulate across items: a resource an item does not provide keeps
//! whatever the previous item swapped in. The working tree only returns to its
//! original state at the end of the run.
//!
//! ## Example
//!
//! ```ignore
//! use brandbuild_sdk::BatchBuilder;
//!
//! let summary = BatchBuilder::new("userInfos", ".")
//!     .strict(false)
//!     .run()?;
//! println!("{} succeeded, {} failed", summary.succeeded(), summary.failed());
//! # Ok::<(), brandbuild_sdk::BuildError>(())
//! ```

use crate::artifact::{locate_artifact, publish_artifact};
use crate::backup::BackupSet;
use crate::gradle::GradleWrapper;
use crate::mapping::ResourceMapping;
use crate::types::{BuildError, BuildResult, ItemError, ItemReport, RunSummary, Stage};
use std::any::Any;
use std::cell::Cell;
use std::ffi::OsStr;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

/// Gradle output directory for release APKs, relative to the working tree.
pub const DEFAULT_OUTPUT_DIR: &str = "app/build/outputs/apk/release";
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "apk";
/// Backup location, relative to the working tree.
pub const DEFAULT_BACKUP_DIR: &str = ".brandbuild/backup";
/// Item directories starting with this prefix are ignored.
pub const DEFAULT_RESERVED_PREFIX: &str = ".";
pub const DEFAULT_CLEAN_TASK: &str = "clean";
pub const DEFAULT_BUILD_TASK: &str = "assembleRelease";

/// Read-only view of one item, produced by [`BatchBuilder::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCheck {
    pub item: String,
    /// Whether the item directory exists.
    pub exists: bool,
    pub present: Vec<String>,
    pub missing: Vec<String>,
}

impl ItemCheck {
    pub fn is_complete(&self) -> bool {
        self.exists && self.missing.is_empty()
    }
}

/// Swaps branded resources into a working tree and builds one APK per item.
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    items_root: PathBuf,
    working_tree: PathBuf,
    mapping: ResourceMapping,
    output_dir: PathBuf,
    artifact_extension: String,
    backup_dir: Option<PathBuf>,
    reserved_prefix: String,
    publish_prefix: String,
    clean_task: String,
    build_task: String,
    extra_args: Vec<String>,
    capture_output: bool,
    strict: bool,
    only: Vec<String>,
    #[cfg(test)]
    fail_at: Option<(String, Stage)>,
}

impl BatchBuilder {
    /// Creates a builder with the default mapping and Gradle settings.
    ///
    /// # Arguments
    ///
    /// * `items_root` - Directory holding one subdirectory per item
    /// * `working_tree` - Android project root containing the Gradle wrapper
    pub fn new(items_root: impl Into<PathBuf>, working_tree: impl Into<PathBuf>) -> Self {
        Self {
            items_root: items_root.into(),
            working_tree: working_tree.into(),
            mapping: ResourceMapping::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_string(),
            backup_dir: None,
            reserved_prefix: DEFAULT_RESERVED_PREFIX.to_string(),
            publish_prefix: String::new(),
            clean_task: DEFAULT_CLEAN_TASK.to_string(),
            build_task: DEFAULT_BUILD_TASK.to_string(),
            extra_args: Vec::new(),
            capture_output: false,
            strict: false,
            only: Vec::new(),
            #[cfg(test)]
            fail_at: None,
        }
    }

    pub fn mapping(mut self, mapping: ResourceMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Gradle output directory, relative to the working tree.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn artifact_extension(mut self, extension: impl Into<String>) -> Self {
        self.artifact_extension = extension.into();
        self
    }

    /// Backup location. Relative paths are resolved against the working tree.
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn reserved_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_prefix = prefix.into();
        self
    }

    /// Prefix for published artifact names (`test_` gives `test_<item>.apk`).
    pub fn publish_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.publish_prefix = prefix.into();
        self
    }

    pub fn clean_task(mut self, task: impl Into<String>) -> Self {
        self.clean_task = task.into();
        self
    }

    pub fn build_task(mut self, task: impl Into<String>) -> Self {
        self.build_task = task.into();
        self
    }

    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// In strict mode an item missing any mapped resource fails before its
    /// files are swapped. By default missing resources are skipped with a
    /// warning.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Restricts the run to the named items instead of scanning the items
    /// root. Named items whose directory is absent fail individually.
    pub fn only(mut self, items: Vec<String>) -> Self {
        self.only = items;
        self
    }

    /// Panics inside `item`'s pipeline when it reaches `stage`.
    #[cfg(test)]
    fn fail_at(mut self, item: &str, stage: Stage) -> Self {
        self.fail_at = Some((item.to_string(), stage));
        self
    }

    pub fn items_root(&self) -> &Path {
        &self.items_root
    }

    pub fn working_tree(&self) -> &Path {
        &self.working_tree
    }

    /// Resolved backup directory.
    pub fn resolved_backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.working_tree.join(dir),
            None => self.working_tree.join(DEFAULT_BACKUP_DIR),
        }
    }

    /// Lists the items to process, sorted by name.
    ///
    /// # Errors
    ///
    /// * [`BuildError::PrerequisiteMissing`] if the items root is not a directory,
    ///   or a name given to [`BatchBuilder::only`] is not a plain directory name
    /// * [`BuildError::NoItems`] if it holds no eligible subdirectory
    pub fn discover_items(&self) -> Result<Vec<String>, BuildError> {
        if !self.items_root.is_dir() {
            return Err(BuildError::PrerequisiteMissing(format!(
                "items directory does not exist: {}",
                self.items_root.display()
            )));
        }

        if !self.only.is_empty() {
            for item in &self.only {
                self.validate_item_name(item)?;
            }
            return Ok(self.only.clone());
        }

        let mut items: Vec<String> = fs::read_dir(&self.items_root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| match entry.file_name().into_string() {
                Ok(name) => Some(name),
                Err(raw) => {
                    tracing::warn!(
                        "skipping item directory with a non-UTF-8 name: {}",
                        raw.to_string_lossy()
                    );
                    None
                }
            })
            .filter(|name| !self.is_reserved(name))
            .collect();
        items.sort();

        if items.is_empty() {
            return Err(BuildError::NoItems {
                root: self.items_root.clone(),
            });
        }
        Ok(items)
    }

    fn is_reserved(&self, name: &str) -> bool {
        !self.reserved_prefix.is_empty() && name.starts_with(&self.reserved_prefix)
    }

    /// An item is a single directory name under the items root.
    fn validate_item_name(&self, item: &str) -> Result<(), BuildError> {
        let mut components = Path::new(item).components();
        let plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(name)), None) if name == OsStr::new(item)
        );
        if !plain || self.is_reserved(item) {
            return Err(BuildError::PrerequisiteMissing(format!(
                "'{}' is not an item: expected the name of a directory directly under {}",
                item,
                self.items_root.display()
            )));
        }
        Ok(())
    }

    /// Checks every prerequisite without touching the working tree.
    fn preflight(&self) -> Result<(GradleWrapper, Vec<String>), BuildError> {
        if !self.working_tree.is_dir() {
            return Err(BuildError::PrerequisiteMissing(format!(
                "working tree does not exist: {}",
                self.working_tree.display()
            )));
        }
        let items = self.discover_items()?;
        let gradle = GradleWrapper::locate(&self.working_tree)?
            .extra_args(self.extra_args.clone())
            .capture_output(self.capture_output);
        Ok((gradle, items))
    }

    /// Reports which resource files each item provides. Nothing is modified.
    pub fn check(&self) -> Result<Vec<ItemCheck>, BuildError> {
        let (_, items) = self.preflight()?;
        Ok(items
            .into_iter()
            .map(|item| {
                let item_dir = self.items_root.join(&item);
                let exists = item_dir.is_dir();
                let (present, missing): (Vec<String>, Vec<String>) = self
                    .mapping
                    .iter()
                    .map(|entry| entry.name.clone())
                    .partition(|name| exists && item_dir.join(name).is_file());
                ItemCheck {
                    item,
                    exists,
                    present,
                    missing,
                }
            })
            .collect())
    }

    /// Runs the whole batch.
    ///
    /// Prerequisite failures are returned before anything is written. Once the
    /// backup exists, per-item failures are recorded in the summary and the
    /// batch always reaches the restore step. A failed restore is reported in
    /// [`RunSummary::restore_error`] rather than as an `Err`, so the item
    /// outcomes are not lost.
    pub fn run(&self) -> Result<RunSummary, BuildError> {
        let started_at = now_rfc3339();
        let clock = Instant::now();

        let (gradle, items) = self.preflight()?;
        tracing::debug!("using Gradle wrapper {}", gradle.script().display());
        tracing::info!(
            "found {} item(s) in {}: {}",
            items.len(),
            self.items_root.display(),
            items.join(", ")
        );

        let mut backup = BackupSet::create(
            &self.working_tree,
            &self.mapping,
            &self.resolved_backup_dir(),
        )?;

        let mut reports = Vec::with_capacity(items.len());
        for item in &items {
            let report = self.process_item(&gradle, item);
            match &report.outcome {
                BuildResult::Succeeded { artifact } => {
                    tracing::info!("[{}] done: {}", item, artifact.display());
                }
                BuildResult::Failed { stage, message, .. } => {
                    tracing::error!("[{}] failed while {}: {}", item, stage, message);
                }
            }
            reports.push(report);
        }

        tracing::info!("restoring original resource files");
        let restore_error = backup.restore().err().map(|e| {
            tracing::error!("{}", e);
            e.to_string()
        });

        Ok(RunSummary {
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            items: reports,
            restored: restore_error.is_none(),
            restore_error,
        })
    }

    /// Runs the pipeline for one item.
    ///
    /// Never fails: every error, including a panic inside the pipeline, ends
    /// up in the returned report. Does not take a backup; [`BatchBuilder::run`]
    /// owns that.
    pub fn process_item(&self, gradle: &GradleWrapper, item: &str) -> ItemReport {
        let stage = Cell::new(Stage::Swapping);
        let mut skipped = Vec::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.pipeline(gradle, item, &stage, &mut skipped)
        }));
        let outcome = match result {
            Ok(Ok(artifact)) => BuildResult::Succeeded { artifact },
            Ok(Err(e)) => BuildResult::failed(stage.get(), &e),
            Err(payload) => {
                BuildResult::failed(stage.get(), &ItemError::Unexpected(panic_message(payload)))
            }
        };
        ItemReport {
            item: item.to_string(),
            outcome,
            skipped_resources: skipped,
        }
    }

    fn pipeline(
        &self,
        gradle: &GradleWrapper,
        item: &str,
        stage: &Cell<Stage>,
        skipped: &mut Vec<String>,
    ) -> Result<PathBuf, ItemError> {
        tracing::info!("[{}] swapping resources", item);
        self.enter(item, stage, Stage::Swapping);
        self.swap_resources(item, skipped)?;

        tracing::info!("[{}] cleaning build outputs", item);
        self.enter(item, stage, Stage::Cleaning);
        gradle.run_task(&self.clean_task)?;

        tracing::info!("[{}] building ({})", item, self.build_task);
        self.enter(item, stage, Stage::Building);
        gradle.run_task(&self.build_task)?;

        self.enter(item, stage, Stage::Locating);
        let artifact_dir = self.working_tree.join(&self.output_dir);
        let selection = locate_artifact(&artifact_dir, &self.artifact_extension)?;
        tracing::info!("[{}] found {}", item, selection.selected.display());

        self.enter(item, stage, Stage::Publishing);
        publish_artifact(
            &selection.selected,
            &self.items_root,
            item,
            &self.artifact_extension,
            &self.publish_prefix,
        )
    }

    fn enter(&self, item: &str, stage: &Cell<Stage>, next: Stage) {
        stage.set(next);
        tracing::debug!("[{}] entering stage {}", item, next);
        #[cfg(test)]
        {
            if let Some((target, at)) = &self.fail_at
                && target == item
                && *at == next
            {
                panic!("injected failure for {} while {}", item, next);
            }
        }
    }

    fn swap_resources(&self, item: &str, skipped: &mut Vec<String>) -> Result<(), ItemError> {
        let item_dir = self.items_root.join(item);
        if !item_dir.is_dir() {
            return Err(ItemError::ItemDirectoryMissing(item_dir));
        }

        if self.strict {
            let missing: Vec<String> = self
                .mapping
                .iter()
                .filter(|entry| !item_dir.join(&entry.name).is_file())
                .map(|entry| entry.name.clone())
                .collect();
            if !missing.is_empty() {
                return Err(ItemError::MissingResources(missing));
            }
        }

        for entry in self.mapping.iter() {
            let source = item_dir.join(&entry.name);
            if !source.is_file() {
                tracing::warn!("[{}] source file missing, skipping: {}", item, source.display());
                skipped.push(entry.name.clone());
                continue;
            }

            let target = self.working_tree.join(&entry.target);
            let copy = |target: &Path| -> std::io::Result<()> {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&source, target)?;
                Ok(())
            };
            copy(&target).map_err(|e| ItemError::SwapFailed {
                from: source.clone(),
                to: target.clone(),
                source: e,
            })?;
            tracing::debug!("[{}] replaced {} -> {}", item, source.display(), target.display());
        }
        Ok(())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

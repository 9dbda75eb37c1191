//! Configuration file support for brandbuild.
//!
//! Project settings live in a `brandbuild.toml` so the CLI can be run without
//! repeating flags.
//!
//! ## Configuration File Location
//!
//! Unless `--config` is given, the file is searched for in:
//! 1. Current working directory (`./brandbuild.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! Relative paths inside the file are resolved against the directory that
//! contains it.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! working_tree = "."
//! items_dir = "userInfos"
//!
//! [gradle]
//! build_task = "assembleRelease"
//! output_dir = "app/build/outputs/apk/release"
//! artifact_extension = "apk"
//!
//! [[resources]]
//! name = "config.xml"
//! target = "app/src/main/res/values/config.xml"
//! ```

use anyhow::{Context, Result};
use brandbuild_sdk::ResourceMapping;
use brandbuild_sdk::builder::{
    DEFAULT_ARTIFACT_EXTENSION, DEFAULT_BACKUP_DIR, DEFAULT_BUILD_TASK, DEFAULT_CLEAN_TASK,
    DEFAULT_OUTPUT_DIR, DEFAULT_RESERVED_PREFIX,
};
use brandbuild_sdk::mapping::DEFAULT_RESOURCES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "brandbuild.toml";

/// Items directory used when neither the CLI nor the config names one,
/// relative to the working tree.
pub const DEFAULT_ITEMS_DIR: &str = "userInfos";

/// Root configuration structure for `brandbuild.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandbuildConfig {
    /// Project locations.
    pub project: ProjectConfig,

    /// Gradle invocation and artifact settings.
    pub gradle: GradleConfig,

    /// Resource mapping, in swap order. Empty means the built-in mapping.
    pub resources: Vec<ResourceConfig>,
}

/// Project locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Android project root containing the Gradle wrapper.
    ///
    /// Defaults to the directory containing the config file.
    pub working_tree: Option<PathBuf>,

    /// Directory with one subdirectory per brand.
    ///
    /// Defaults to `userInfos/` inside the working tree.
    pub items_dir: Option<PathBuf>,

    /// Backup location, relative to the working tree.
    ///
    /// Defaults to `.brandbuild/backup`.
    pub backup_dir: Option<PathBuf>,

    /// Item directories starting with this prefix are skipped.
    ///
    /// Defaults to `"."`.
    pub reserved_prefix: Option<String>,
}

/// Gradle invocation and artifact settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradleConfig {
    /// Task run before every build. Defaults to `clean`.
    pub clean_task: String,

    /// Task that produces the artifact. Defaults to `assembleRelease`.
    pub build_task: String,

    /// Arguments appended to every Gradle invocation (e.g. `["--offline"]`).
    pub extra_args: Vec<String>,

    /// Capture Gradle output instead of streaming it. Defaults to `false`.
    pub capture_output: bool,

    /// Where the artifact appears, relative to the working tree.
    pub output_dir: PathBuf,

    /// Artifact file extension. Defaults to `apk`.
    pub artifact_extension: String,
}

impl Default for GradleConfig {
    fn default() -> Self {
        Self {
            clean_task: DEFAULT_CLEAN_TASK.to_string(),
            build_task: DEFAULT_BUILD_TASK.to_string(),
            extra_args: Vec::new(),
            capture_output: false,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_string(),
        }
    }
}

/// One `[[resources]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// File name inside each item directory.
    pub name: String,
    /// Destination, relative to the working tree.
    pub target: PathBuf,
}

impl BrandbuildConfig {
    /// Loads configuration from the specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: BrandbuildConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Finds and loads `brandbuild.toml` from the current directory or a parent.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Finds and loads `brandbuild.toml`, starting at `start_dir`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Builds the validated resource mapping, falling back to the built-in one.
    pub fn resource_mapping(&self) -> Result<ResourceMapping> {
        if self.resources.is_empty() {
            return Ok(ResourceMapping::default());
        }
        ResourceMapping::new(
            self.resources
                .iter()
                .map(|r| (r.name.clone(), r.target.clone())),
        )
        .context("Invalid [[resources]] table in configuration")
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// Every value matches the built-in default, so the file only documents
    /// what can be changed.
    pub fn generate_starter_toml() -> String {
        let resources: String = DEFAULT_RESOURCES
            .iter()
            .map(|(name, target)| {
                format!(
                    "[[resources]]\nname = \"{}\"\ntarget = \"{}\"\n\n",
                    name, target
                )
            })
            .collect();

        format!(
            r#"# brandbuild configuration file
# CLI flags override these settings when provided.
# Relative paths are resolved against the directory containing this file.

[project]
# Android project root containing gradlew (default: this directory)
# working_tree = "."

# One subdirectory per brand (default: userInfos inside the working tree)
items_dir = "{items_dir}"

# Backup of the original resources, relative to the working tree
backup_dir = "{backup_dir}"

# Item directories starting with this prefix are ignored
reserved_prefix = "{reserved_prefix}"

[gradle]
clean_task = "{clean_task}"
build_task = "{build_task}"

# Extra arguments for every Gradle call, e.g. ["--offline", "--stacktrace"]
extra_args = []

# Capture Gradle output and only show stderr when a task fails
capture_output = false

# Where the build task leaves its artifact, relative to the working tree
output_dir = "{output_dir}"
artifact_extension = "{artifact_extension}"

# Resource files copied from each brand directory into the project, in order.
# `name` is the file inside the brand directory, `target` the project path.
{resources}"#,
            items_dir = DEFAULT_ITEMS_DIR,
            backup_dir = DEFAULT_BACKUP_DIR,
            reserved_prefix = DEFAULT_RESERVED_PREFIX,
            clean_task = DEFAULT_CLEAN_TASK,
            build_task = DEFAULT_BUILD_TASK,
            output_dir = DEFAULT_OUTPUT_DIR,
            artifact_extension = DEFAULT_ARTIFACT_EXTENSION,
            resources = resources.trim_end_matches('\n'),
        ) + "\n"
    }
}

/// Merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<BrandbuildConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Loads the config named by `--config`, or discovers one.
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let config = BrandbuildConfig::load_from_file(path)?;
            return Ok(Self {
                config: Some(config),
                config_path: Some(path.to_path_buf()),
            });
        }
        match BrandbuildConfig::discover()? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    /// Directory that relative config paths are resolved against.
    fn base_dir(&self) -> Option<&Path> {
        self.config_path.as_deref().and_then(Path::parent)
    }

    fn from_base(&self, path: &Path) -> PathBuf {
        match self.base_dir() {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Working tree: CLI, then config, then the config's directory, then `.`.
    pub fn working_tree(&self, cli_value: Option<PathBuf>) -> PathBuf {
        if let Some(path) = cli_value {
            return path;
        }
        match self
            .config
            .as_ref()
            .and_then(|c| c.project.working_tree.as_deref())
        {
            Some(path) => self.from_base(path),
            None => self
                .base_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Items directory: CLI, then config, then `userInfos/` in the working tree.
    pub fn items_dir(&self, cli_value: Option<PathBuf>, working_tree: &Path) -> PathBuf {
        if let Some(path) = cli_value {
            return path;
        }
        match self
            .config
            .as_ref()
            .and_then(|c| c.project.items_dir.as_deref())
        {
            Some(path) => self.from_base(path),
            None => working_tree.join(DEFAULT_ITEMS_DIR),
        }
    }

    /// Backup directory as configured (relative to the working tree).
    pub fn backup_dir(&self) -> PathBuf {
        self.config
            .as_ref()
            .and_then(|c| c.project.backup_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR))
    }

    pub fn reserved_prefix(&self) -> String {
        self.config
            .as_ref()
            .and_then(|c| c.project.reserved_prefix.clone())
            .unwrap_or_else(|| DEFAULT_RESERVED_PREFIX.to_string())
    }

    /// Returns the Gradle configuration.
    pub fn gradle(&self) -> GradleConfig {
        self.config
            .as_ref()
            .map(|c| c.gradle.clone())
            .unwrap_or_default()
    }

    pub fn resource_mapping(&self) -> Result<ResourceMapping> {
        match &self.config {
            Some(config) => config.resource_mapping(),
            None => Ok(ResourceMapping::default()),
        }
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// The resolved value prefers CLI over config over default.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&BrandbuildConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }
}

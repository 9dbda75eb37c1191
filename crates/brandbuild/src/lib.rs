//! # brandbuild
//!
//! Command-line tool that builds one branded APK per resource set from a
//! single Android project.
//!
//! ## Overview
//!
//! A *brand* is a directory of resource files (app config, launcher icon,
//! splash image, sounds) under the items directory, `userInfos/` by default.
//! For each brand, `brandbuild build` copies those files over the project's
//! own, runs `gradlew clean` and `gradlew assembleRelease`, and copies the
//! resulting APK to `userInfos/<brand>.apk`. The project's original files are
//! backed up before the first brand and restored after the last one.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter brandbuild.toml in the Android project root
//! brandbuild init
//!
//! # See which brands are complete, without building anything
//! brandbuild check
//!
//! # Trial build for a single brand (published as userInfos/test_<brand>.apk)
//! brandbuild test acme
//!
//! # Build every brand
//! brandbuild build --summary target/brandbuild-summary.json
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Build every brand (or those given with `--item`) |
//! | `test` | Strict trial build of one brand |
//! | `check` | Report present/missing resource files per brand |
//! | `restore` | Restore project files left swapped by an interrupted run |
//! | `init` | Write a starter `brandbuild.toml` |
//!
//! ## Exit Status
//!
//! `build` exits non-zero only when the run cannot start (missing items
//! directory, no brands, missing Gradle wrapper, stale backup) or when the
//! final restore fails. Individual brand failures are listed in the summary.

use anyhow::{Context, Result, bail};
use brandbuild_sdk::{BackupSet, BatchBuilder, BuildResult, ItemCheck, RunSummary};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub mod config;

use config::{BrandbuildConfig, CONFIG_FILE_NAME, ConfigResolver};

/// Builds one branded APK per resource set from a single Android project.
#[derive(Parser, Debug)]
#[command(name = "brandbuild", author, version, about = "Branded batch APK builder", long_about = None)]
struct Cli {
    /// Path to brandbuild.toml (default: discovered from the current directory)
    #[arg(long, global = true, env = "BRANDBUILD_CONFIG")]
    config: Option<PathBuf>,

    /// Show debug output, including every copied file and Gradle command
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct ProjectArgs {
    /// Android project root containing gradlew
    #[arg(long, env = "BRANDBUILD_WORKING_TREE")]
    working_tree: Option<PathBuf>,

    /// Directory with one subdirectory per brand
    #[arg(long, env = "BRANDBUILD_ITEMS_DIR")]
    items_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an APK for every brand directory.
    Build {
        #[command(flatten)]
        project: ProjectArgs,
        /// Only build the named brand (repeatable)
        #[arg(long = "item", value_name = "NAME")]
        items: Vec<String>,
        /// Fail a brand that is missing any resource file instead of skipping the file
        #[arg(long)]
        strict: bool,
        /// Capture Gradle output and only print stderr of failed tasks
        #[arg(long)]
        capture_output: bool,
        /// Write the run summary as JSON to this path
        #[arg(long, value_name = "PATH")]
        summary: Option<PathBuf>,
    },
    /// Trial build of a single brand; requires every resource file.
    Test {
        /// Brand directory name
        item: String,
        #[command(flatten)]
        project: ProjectArgs,
        /// Prefix for the published artifact name
        #[arg(long, default_value = "test_")]
        prefix: String,
    },
    /// Report which resource files each brand provides. Changes nothing.
    Check {
        #[command(flatten)]
        project: ProjectArgs,
        /// Only check the named brand (repeatable)
        #[arg(long = "item", value_name = "NAME")]
        items: Vec<String>,
    },
    /// Restore project files from a backup left by an interrupted run.
    Restore {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Write a starter brandbuild.toml.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Build {
            project,
            items,
            strict,
            capture_output,
            summary,
        } => cmd_build(
            cli.config.as_deref(),
            project,
            items,
            strict,
            capture_output,
            summary,
        ),
        Command::Test {
            item,
            project,
            prefix,
        } => cmd_test(cli.config.as_deref(), project, item, prefix),
        Command::Check { project, items } => cmd_check(cli.config.as_deref(), project, items),
        Command::Restore { project } => cmd_restore(cli.config.as_deref(), project),
        Command::Init { output, force } => cmd_init(&output, force),
    }
}

/// Loads `.env.local` so variables such as `JAVA_HOME` and `ANDROID_HOME`
/// reach the Gradle subprocess.
fn load_dotenv() {
    let _ = dotenvy::from_path(".env.local");
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Builds a [`BatchBuilder`] from config and CLI overrides.
fn configure_builder(resolver: &ConfigResolver, project: ProjectArgs) -> Result<BatchBuilder> {
    let working_tree = resolver.working_tree(project.working_tree);
    let items_dir = resolver.items_dir(project.items_dir, &working_tree);
    let gradle = resolver.gradle();
    let mapping = resolver.resource_mapping()?;

    tracing::debug!(
        "working tree {}, items {}",
        working_tree.display(),
        items_dir.display()
    );

    Ok(BatchBuilder::new(items_dir, working_tree)
        .mapping(mapping)
        .backup_dir(resolver.backup_dir())
        .reserved_prefix(resolver.reserved_prefix())
        .clean_task(gradle.clean_task)
        .build_task(gradle.build_task)
        .extra_args(gradle.extra_args)
        .capture_output(gradle.capture_output)
        .output_dir(gradle.output_dir)
        .artifact_extension(gradle.artifact_extension))
}

fn load_resolver(config: Option<&Path>) -> Result<ConfigResolver> {
    let resolver = ConfigResolver::new(config)?;
    if let Some(path) = &resolver.config_path {
        println!("Using config file: {:?}", path);
    }
    Ok(resolver)
}

fn cmd_build(
    config: Option<&Path>,
    project: ProjectArgs,
    items: Vec<String>,
    strict: bool,
    capture_output: bool,
    summary_path: Option<PathBuf>,
) -> Result<()> {
    let resolver = load_resolver(config)?;
    let capture_output = resolver.resolve(
        capture_output.then_some(true),
        |c| Some(c.gradle.capture_output),
        false,
    );
    let builder = configure_builder(&resolver, project)?
        .only(items)
        .strict(strict)
        .capture_output(capture_output);

    print!("{}", render_build_header(&builder, strict));

    let summary = builder.run().context("Batch build could not start")?;
    print!("{}", render_summary(&summary));

    if let Some(path) = summary_path {
        write_summary_json(&path, &summary)?;
        println!("Summary written to {:?}", path);
    }

    if let Some(err) = &summary.restore_error {
        bail!(
            "original resource files were not restored: {}\nRun `brandbuild restore` after fixing the cause.",
            err
        );
    }
    Ok(())
}

fn cmd_test(config: Option<&Path>, project: ProjectArgs, item: String, prefix: String) -> Result<()> {
    let resolver = load_resolver(config)?;
    let builder = configure_builder(&resolver, project)?
        .only(vec![item.clone()])
        .strict(true)
        .capture_output(true)
        .publish_prefix(prefix);

    println!("Trial build for brand '{}'", item);
    let summary = builder.run().context("Trial build could not start")?;
    print!("{}", render_summary(&summary));

    if let Some(err) = &summary.restore_error {
        bail!("original resource files were not restored: {}", err);
    }
    match summary.report(&item).map(|r| &r.outcome) {
        Some(BuildResult::Succeeded { artifact }) => {
            println!("\n✓ Trial build succeeded: {:?}", artifact);
            println!("  Run 'brandbuild build' to build every brand.");
            Ok(())
        }
        Some(BuildResult::Failed { stage, message, .. }) => {
            bail!("trial build for '{}' failed while {}: {}", item, stage, message)
        }
        None => bail!("trial build for '{}' produced no result", item),
    }
}

fn cmd_check(config: Option<&Path>, project: ProjectArgs, items: Vec<String>) -> Result<()> {
    let resolver = load_resolver(config)?;
    let builder = configure_builder(&resolver, project)?.only(items);
    let checks = builder.check().context("Preflight check failed")?;
    print!("{}", render_checks(&checks));
    Ok(())
}

fn cmd_restore(config: Option<&Path>, project: ProjectArgs) -> Result<()> {
    let resolver = load_resolver(config)?;
    let builder = configure_builder(&resolver, project)?;
    let backup_dir = builder.resolved_backup_dir();

    match BackupSet::open(builder.working_tree(), &backup_dir)? {
        None => {
            println!("No backup found at {:?}; nothing to restore.", backup_dir);
        }
        Some(mut backup) => {
            println!("Restoring from {:?}", backup.dir());
            let report = backup.restore()?;
            println!(
                "Restored {} file(s) and removed {} file(s) in {:?}",
                report.restored,
                report.removed,
                builder.working_tree()
            );
        }
    }
    Ok(())
}

fn cmd_init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "refusing to overwrite existing file: {:?} (use --force)",
            output
        );
    }
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory {:?}", parent))?;
    }
    fs::write(output, BrandbuildConfig::generate_starter_toml())
        .with_context(|| format!("Failed to write {:?}", output))?;

    println!("Wrote {:?}", output);
    println!("\nNext steps:");
    println!("  1. Put one directory per brand under userInfos/");
    println!("  2. Run 'brandbuild check' to see which brands are complete");
    println!("  3. Run 'brandbuild build'");
    Ok(())
}

fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(summary).context("serializing run summary")?;
    fs::write(path, json).with_context(|| format!("writing summary {:?}", path))
}

fn render_build_header(builder: &BatchBuilder, strict: bool) -> String {
    let mut out = String::from("Building branded APKs...\n");
    out.push_str(&format!("  Working tree: {:?}\n", builder.working_tree()));
    out.push_str(&format!("  Items: {:?}\n", builder.items_root()));
    if strict {
        out.push_str("  Mode: strict (brands missing a resource file are failed)\n");
    }
    out
}

fn render_summary(summary: &RunSummary) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();
    out.push_str(&format!("\n{}\n", rule));
    out.push_str("Batch build finished\n");
    out.push_str(&format!("  Succeeded: {}\n", summary.succeeded()));
    out.push_str(&format!("  Failed:    {}\n", summary.failed()));

    for report in &summary.items {
        match &report.outcome {
            BuildResult::Succeeded { artifact } => {
                out.push_str(&format!("  ✓ {} -> {}\n", report.item, artifact.display()));
            }
            BuildResult::Failed { stage, kind, .. } => {
                out.push_str(&format!("  ✗ {} ({} while {})\n", report.item, kind, stage));
            }
        }
        if !report.skipped_resources.is_empty() {
            out.push_str(&format!(
                "      skipped: {}\n",
                report.skipped_resources.join(", ")
            ));
        }
    }

    let failed = summary.failed_items();
    if !failed.is_empty() {
        out.push_str(&format!("Failed items: {}\n", failed.join(", ")));
    }
    if !summary.restored {
        out.push_str("WARNING: original resource files were NOT restored\n");
    }
    out.push_str(&format!("{}\n", rule));
    out
}

fn render_checks(checks: &[ItemCheck]) -> String {
    let mut out = String::new();
    for check in checks {
        if !check.exists {
            out.push_str(&format!("✗ {}: directory does not exist\n", check.item));
        } else if check.missing.is_empty() {
            out.push_str(&format!(
                "✓ {}: all {} resource files present\n",
                check.item,
                check.present.len()
            ));
        } else {
            out.push_str(&format!(
                "! {}: missing {} (will be skipped)\n",
                check.item,
                check.missing.join(", ")
            ));
        }
    }
    let complete = checks.iter().filter(|c| c.is_complete()).count();
    out.push_str(&format!("\n{} of {} brands complete\n", complete, checks.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandbuild_sdk::{ItemError, ItemReport, Stage};
    use clap::CommandFactory;
    use tempfile::TempDir;

    fn report(item: &str, outcome: BuildResult, skipped: &[&str]) -> ItemReport {
        ItemReport {
            item: item.to_string(),
            outcome,
            skipped_resources: skipped.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn sample_summary() -> RunSummary {
        let err = ItemError::ExternalToolNonZeroExit {
            task: "assembleRelease".into(),
            code: Some(1),
            stderr: String::new(),
        };
        RunSummary {
            started_at: "2026-01-01T00:00:00Z".into(),
            duration_ms: 1200,
            items: vec![
                report(
                    "A",
                    BuildResult::Succeeded {
                        artifact: "userInfos/A.apk".into(),
                    },
                    &["config.xml"],
                ),
                report("D", BuildResult::failed(Stage::Building, &err), &[]),
            ],
            restored: true,
            restore_error: None,
        }
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_build_flags() {
        let cli = Cli::try_parse_from([
            "brandbuild",
            "build",
            "--item",
            "acme",
            "--item",
            "globex",
            "--strict",
            "--working-tree",
            "android",
        ])
        .unwrap();
        match cli.command {
            Command::Build {
                project,
                items,
                strict,
                ..
            } => {
                assert_eq!(items, vec!["acme".to_string(), "globex".to_string()]);
                assert!(strict);
                assert_eq!(project.working_tree, Some(PathBuf::from("android")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_command_defaults_prefix() {
        let cli = Cli::try_parse_from(["brandbuild", "test", "38"]).unwrap();
        match cli.command {
            Command::Test { item, prefix, .. } => {
                assert_eq!(item, "38");
                assert_eq!(prefix, "test_");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn strict_header_says_incomplete_brands_fail() {
        let builder = BatchBuilder::new("userInfos", ".");
        let header = render_build_header(&builder, true);
        assert!(header.contains("are failed"));
        assert!(!header.contains("skipped"));
        assert!(!render_build_header(&builder, false).contains("strict"));
    }

    #[test]
    fn renders_summary() {
        let text = render_summary(&sample_summary());
        assert!(text.contains("Succeeded: 1"));
        assert!(text.contains("Failed:    1"));
        assert!(text.contains("✗ D (ExternalToolNonZeroExit while building)"));
        assert!(text.contains("skipped: config.xml"));
        assert!(text.contains("Failed items: D"));
        assert!(!text.contains("NOT restored"));
    }

    #[test]
    fn renders_checks() {
        let checks = vec![
            ItemCheck {
                item: "A".into(),
                exists: true,
                present: vec!["config.xml".into()],
                missing: vec![],
            },
            ItemCheck {
                item: "C".into(),
                exists: true,
                present: vec![],
                missing: vec!["config.xml".into()],
            },
            ItemCheck {
                item: "ghost".into(),
                exists: false,
                present: vec![],
                missing: vec!["config.xml".into()],
            },
        ];
        let text = render_checks(&checks);
        assert!(text.contains("✓ A"));
        assert!(text.contains("! C: missing config.xml"));
        assert!(text.contains("✗ ghost: directory does not exist"));
        assert!(text.contains("1 of 3 brands complete"));
    }

    #[test]
    fn writes_summary_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/summary.json");
        write_summary_json(&path, &sample_summary()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["items"][1]["outcome"]["kind"], "ExternalToolNonZeroExit");
        assert_eq!(value["items"][1]["outcome"]["stage"], "building");
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        cmd_init(&path, false).unwrap();
        assert!(cmd_init(&path, false).is_err());
        cmd_init(&path, true).unwrap();
        let config = BrandbuildConfig::load_from_file(&path).unwrap();
        assert_eq!(config.gradle.build_task, "assembleRelease");
    }

    #[test]
    fn builder_uses_config_overrides() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &config_path,
            "[project]\nitems_dir = \"brands\"\nbackup_dir = \"bk\"\n",
        )
        .unwrap();
        let resolver = ConfigResolver::new(Some(&config_path)).unwrap();

        let builder = configure_builder(&resolver, ProjectArgs::default()).unwrap();
        assert_eq!(builder.working_tree(), dir.path());
        assert_eq!(builder.items_root(), dir.path().join("brands"));
        assert_eq!(builder.resolved_backup_dir(), dir.path().join("bk"));
    }
}

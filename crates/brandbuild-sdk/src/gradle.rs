//! Gradle wrapper invocation.
//!
//! The project is built through its checked-in wrapper script: `gradlew.bat` on
//! Windows hosts and `gradlew` everywhere else. Tasks run with the working tree
//! as the current directory; exit status 0 is the only success signal.

use crate::types::{BuildError, ItemError};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Name of the wrapper script for the host OS.
pub fn wrapper_script_name() -> &'static str {
    if cfg!(windows) { "gradlew.bat" } else { "gradlew" }
}

/// Number of stderr lines kept in [`ItemError::ExternalToolNonZeroExit`].
const STDERR_TAIL_LINES: usize = 40;

/// Handle on the Gradle wrapper of one working tree.
#[derive(Debug, Clone)]
pub struct GradleWrapper {
    working_tree: PathBuf,
    script: PathBuf,
    extra_args: Vec<String>,
    capture_output: bool,
}

impl GradleWrapper {
    /// Locates the host wrapper script in `working_tree`.
    ///
    /// # Errors
    ///
    /// [`BuildError::PrerequisiteMissing`] if the script is absent.
    pub fn locate(working_tree: &Path) -> Result<Self, BuildError> {
        // Absolute but not canonical: cmd.exe rejects a `\\?\` verbatim cwd.
        let working_tree = std::path::absolute(working_tree).map_err(|e| {
            BuildError::PrerequisiteMissing(format!(
                "working tree {}: {}",
                working_tree.display(),
                e
            ))
        })?;
        let script = working_tree.join(wrapper_script_name());
        if !script.is_file() {
            return Err(BuildError::PrerequisiteMissing(format!(
                "Gradle wrapper not found: {}\n\n\
                 Point --working-tree at the Android project root, or generate the\n\
                 wrapper there with `gradle wrapper`.",
                script.display()
            )));
        }
        Ok(Self::with_script(&working_tree, script))
    }

    /// Uses an explicit launcher instead of the wrapper script.
    pub fn with_script(working_tree: &Path, script: impl Into<PathBuf>) -> Self {
        Self {
            working_tree: working_tree.to_path_buf(),
            script: script.into(),
            extra_args: Vec::new(),
            capture_output: false,
        }
    }

    /// Extra arguments appended after every task (e.g. `--offline`).
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Captures stdout/stderr instead of streaming them to the console.
    ///
    /// Captured stderr is attached to [`ItemError::ExternalToolNonZeroExit`].
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    fn command(&self, task: &str) -> Command {
        let mut cmd = Command::new(&self.script);
        cmd.arg(task)
            .args(&self.extra_args)
            .current_dir(&self.working_tree);
        cmd
    }

    /// Runs one Gradle task to completion.
    ///
    /// There is no timeout: a hung Gradle daemon hangs the caller.
    pub fn run_task(&self, task: &str) -> Result<(), ItemError> {
        let mut cmd = self.command(task);
        let command_line = format!("{} {}", self.script.display(), task);
        tracing::debug!("running `{}` in {}", command_line, self.working_tree.display());

        if self.capture_output {
            let output = cmd
                .stdin(Stdio::null())
                .output()
                .map_err(|source| ItemError::ToolLaunch {
                    command: command_line.clone(),
                    source,
                })?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(ItemError::ExternalToolNonZeroExit {
                    task: task.to_string(),
                    code: output.status.code(),
                    stderr: tail_lines(&stderr, STDERR_TAIL_LINES),
                });
            }
        } else {
            let status = cmd
                .status()
                .map_err(|source| ItemError::ToolLaunch {
                    command: command_line.clone(),
                    source,
                })?;
            if !status.success() {
                return Err(ItemError::ExternalToolNonZeroExit {
                    task: task.to_string(),
                    code: status.code(),
                    stderr: String::new(),
                });
            }
        }
        Ok(())
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

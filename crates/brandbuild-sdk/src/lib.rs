//! Branded batch builds for Android projects.
//!
//! `brandbuild-sdk` produces one APK per brand from a single Android project.
//! Each brand (an *item*) is a directory of resource files - app config, icon,
//! splash image, sounds. For every item the builder swaps those files into the
//! project, runs the Gradle wrapper, and publishes the resulting APK under the
//! item's name. The project's own resources are backed up first and restored
//! when the batch ends, whatever happened to the individual builds.
//!
//! # Layout
//!
//! ```text
//! userInfos/                  items root
//! ├── acme/                   one item
//! │   ├── config.xml
//! │   ├── detection_sound.wav
//! │   ├── ic_launcher.png
//! │   └── splash.png
//! ├── acme.apk                published artifact
//! └── globex/
//!
//! project/                    working tree
//! ├── gradlew
//! └── app/src/main/...        mapped resource targets
//! ```
//!
//! # Example
//!
//! ```ignore
//! use brandbuild_sdk::{BatchBuilder, ResourceMapping};
//!
//! let mapping = ResourceMapping::new([
//!     ("config.xml", "app/src/main/res/values/config.xml"),
//!     ("ic_launcher.png", "app/src/main/res/mipmap/ic_launcher.png"),
//! ])?;
//!
//! let summary = BatchBuilder::new("userInfos", "project")
//!     .mapping(mapping)
//!     .run()?;
//!
//! for item in summary.failed_items() {
//!     eprintln!("failed: {}", item);
//! }
//! # Ok::<(), brandbuild_sdk::BuildError>(())
//! ```
//!
//! # Modules
//!
//! - [`builder`] - The batch pipeline ([`BatchBuilder`])
//! - [`backup`] - Snapshot/restore guard for the working tree ([`BackupSet`])
//! - [`mapping`] - Resource name to project path table ([`ResourceMapping`])
//! - [`gradle`] - Gradle wrapper invocation ([`GradleWrapper`])
//! - [`artifact`] - Artifact discovery and publishing
//! - [`types`] - Errors, outcomes and the run summary

pub mod artifact;
pub mod backup;
pub mod builder;
pub mod gradle;
pub mod mapping;
pub mod types;

pub use backup::{BackupSet, RestoreReport};
pub use builder::{BatchBuilder, ItemCheck};
pub use gradle::GradleWrapper;
pub use mapping::{ResourceEntry, ResourceMapping};
pub use types::{BuildError, BuildResult, ItemError, ItemReport, RunSummary, Stage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

//! # upstage-updater
//!
//! Self-update engine for desktop applications published to a package feed.
//!
//! This crate handles:
//! - Version resolution against a folder, HTTP or in-memory feed
//! - Package download with de-duplicated progress reporting
//! - Versioned application directories (`{base}/app-{version}`)
//! - Start-menu shortcuts, declared by an `upstage.xml` or one per executable
//! - Uninstall registration
//!
//! The steps live on [`UpdateManager`]; [`UpdatePipeline`] chains them on a
//! background task and streams [`PipelineEvent`]s back to the caller.

pub mod config;
pub mod error;
pub mod instructions;
pub mod manager;
pub mod package;
pub mod paths;
pub mod pipeline;
#[cfg(test)]
mod proptests;
pub mod repository;
pub mod shortcuts;
pub mod uninstall;
pub mod version;

// Re-export main types for convenience
pub use config::{LoggingConfig, NetworkConfig, UpdateConfig};
pub use error::UpdateError;
pub use instructions::{ShortcutSpec, UpdateInstructions, INSTRUCTIONS_FILE_NAME};
pub use manager::{
    AppliedVersion, DownloadedPackage, ProgressFilter, ProgressSink, UpdateCheck, UpdateManager,
    UpdateState,
};
pub use package::{FileEntry, PackageContents, PackageFile, PackageRecord, UpdateInfo};
pub use paths::{app_path, PathLayout};
pub use pipeline::{FailurePolicy, PipelineEvent, PipelineOutcome, PipelineStep, UpdatePipeline};
pub use repository::{
    open_repository, FallbackRepository, FolderRepository, HttpRepository, MemoryRepository,
    PackageBundle, PackageQuery, PackageRepository, ProgressEvent,
};
pub use shortcuts::{desired_shortcuts, ShellLink, ShortcutReport, ShortcutSynchronizer, ShortcutWriter};
pub use uninstall::{FileUninstallRegistry, RegistryValue, UninstallEntry, UninstallRegistry};
#[cfg(target_os = "windows")]
pub use uninstall::WindowsUninstallRegistry;
pub use version::parse_version;

//! Upstage patcher
//!
//! Stamps an installer executable after it was built:
//!
//! ```text
//! upstage-patcher patch <installer> <package-id> <package-source> [<baseline>]
//! upstage-patcher bundle <feed-dir> <package-id> <version> <out>
//! ```
//!
//! `patch` writes slot 1711 always and slot 1712 only when a baseline is
//! given. `bundle` snapshots one published version of a folder feed into a
//! file suitable as that baseline.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{info, warn};
use upstage_resources::{EmbeddedResources, InstallerConfig, ResourceError, ResourceStore};
use upstage_updater::{PackageBundle, UpdateError};

/// Exit codes of the patcher process.
///
/// - 0: Success
/// - 1: Usage - wrong arguments
/// - 2: File not found - a referenced file does not exist; nothing was changed
/// - 3: Patch failed - the resource update or bundle could not be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Usage = 1,
    FileNotFound = 2,
    PatchFailed = 3,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }
}

/// Upstage patcher - stamps installers with their package configuration
#[derive(Parser, Debug)]
#[command(name = "upstage-patcher")]
#[command(version, about = "Stamps installers with their package configuration")]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the package id, source and optional baseline into an installer
    Patch {
        /// Installer executable to modify
        installer: PathBuf,
        /// Package id on the feed
        package_id: String,
        /// Feed location (directory or http(s) URL)
        package_source: String,
        /// Baseline package bundle to embed
        baseline: Option<PathBuf>,
    },
    /// Snapshot one version of a folder feed as a baseline bundle
    Bundle {
        /// Folder feed root
        feed_dir: PathBuf,
        /// Package id on the feed
        package_id: String,
        /// Version to snapshot
        version: String,
        /// Output file
        out: PathBuf,
    },
}

/// Errors of a patcher command.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PatchError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            PatchError::NotFound(_) => ExitCode::FileNotFound,
            PatchError::Resource(e) if e.is_not_found() => ExitCode::FileNotFound,
            _ => ExitCode::PatchFailed,
        }
    }
}

fn require_file(path: &Path) -> Result<(), PatchError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PatchError::NotFound(path.to_path_buf()))
    }
}

/// Stamp `installer` through `store`.
///
/// Every referenced file is checked before anything is written.
pub fn patch_installer(
    store: &dyn ResourceStore,
    installer: &Path,
    config: InstallerConfig,
    baseline: Option<&Path>,
) -> Result<(), PatchError> {
    require_file(installer)?;
    if let Some(baseline) = baseline {
        require_file(baseline)?;
    }

    let baseline_package = match baseline {
        Some(path) => {
            let bytes = std::fs::read(path)?;
            if let Err(e) = PackageBundle::decode(&bytes) {
                warn!("{} is not a package bundle and will be ignored at install: {}", path.display(), e);
            }
            Some(bytes)
        }
        None => None,
    };

    info!("Patching {} with {}", installer.display(), config.to_record());
    EmbeddedResources {
        installer_config: Some(config),
        baseline_package,
    }
    .write(store, installer)?;
    Ok(())
}

/// Write a baseline bundle of `package_id` `version` from `feed_dir` to `out`.
pub async fn write_bundle(feed_dir: &Path, package_id: &str, version: &str, out: &Path) -> Result<u64, PatchError> {
    if !feed_dir.is_dir() {
        return Err(PatchError::NotFound(feed_dir.to_path_buf()));
    }
    let bundle = PackageBundle::from_feed_dir(feed_dir, package_id, version).await?;
    let encoded = bundle.encode()?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, &encoded)?;
    info!(
        "Wrote {} {} ({} files, {} bytes) to {}",
        package_id,
        bundle.record().version,
        bundle.files().len(),
        encoded.len(),
        out.display()
    );
    Ok(encoded.len() as u64)
}

impl Cli {
    /// Run the parsed command with `store`.
    pub fn execute(&self, store: &dyn ResourceStore) -> Result<(), PatchError> {
        match &self.command {
            Commands::Patch {
                installer,
                package_id,
                package_source,
                baseline,
            } => patch_installer(
                store,
                installer,
                InstallerConfig::new(package_id.as_str(), package_source.as_str()),
                baseline.as_deref(),
            ),
            Commands::Bundle {
                feed_dir,
                package_id,
                version,
                out,
            } => {
                let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
                runtime.block_on(write_bundle(feed_dir, package_id, version, out))?;
                Ok(())
            }
        }
    }
}

/// Parse `args` and run, reporting failures on stderr.
pub fn run_from<I, T>(args: I, store: &dyn ResourceStore) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => run(&cli, store),
        Err(e) => usage_failure(e),
    }
}

/// Run a parsed command, reporting failures on stderr.
pub fn run(cli: &Cli, store: &dyn ResourceStore) -> ExitCode {
    match cli.execute(store) {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    }
}

/// Print a parse failure; help and version requests are not failures.
pub fn usage_failure(error: clap::Error) -> ExitCode {
    use clap::error::ErrorKind;

    let _ = error.print();
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
        _ => ExitCode::Usage,
    }
}

//! Update manager - the individual steps of an update.
//!
//! Each step is an independent async call that takes the previous step's
//! result and returns its own:
//!
//! ```text
//! check_for_updates -> UpdateCheck
//! download(&UpdateInfo) -> DownloadedPackage
//! apply(DownloadedPackage) -> AppliedVersion
//! sync_shortcuts(&AppliedVersion) -> ShortcutReport
//! register_uninstall(&AppliedVersion) -> UninstallEntry
//! ```
//!
//! Nothing about a run is stored on the manager; [`crate::pipeline`] chains
//! the steps and tracks [`UpdateState`].

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::UpdateConfig;
use crate::error::UpdateError;
use crate::package::{join_below, PackageContents, UpdateInfo};
use crate::paths::PathLayout;
use crate::repository::{open_repository, PackageQuery, PackageRepository, ProgressEvent};
use crate::shortcuts::{ShortcutReport, ShortcutSynchronizer};
use crate::uninstall::{estimate_installed_size, platform_registry, UninstallEntry, UninstallRegistry};

/// Receives download progress.
pub type ProgressSink = dyn Fn(ProgressEvent) + Send + Sync;

/// Library framework folder installed by default.
pub const DEFAULT_TARGET_FRAMEWORK: &str = "net40";

/// Stage of an update run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdateState {
    /// Nothing started
    #[default]
    Idle,
    /// Querying the feed
    Checking,
    /// No newer version exists
    NoUpdate,
    /// A newer version was selected
    UpdateAvailable,
    /// Retrieving package content
    Downloading,
    /// Package content retrieved
    Downloaded,
    /// Writing the versioned directory
    Applying,
    /// Versioned directory in place
    Applied,
    /// Creating shortcuts
    SyncingShortcuts,
    /// Writing the uninstall entry
    RegisteringUninstall,
    /// Run finished
    Complete,
    /// Run aborted
    Failed(String),
}

impl UpdateState {
    /// Whether the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NoUpdate | Self::Complete | Self::Failed(_))
    }

    /// Whether `next` directly follows this state.
    ///
    /// Transitions are forward-only; `Failed` is reachable from every
    /// non-terminal state.
    pub fn can_advance_to(&self, next: &UpdateState) -> bool {
        use UpdateState::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed(_))
                | (Idle, Checking)
                | (Checking, NoUpdate)
                | (Checking, UpdateAvailable)
                | (UpdateAvailable, Downloading)
                | (Downloading, Downloaded)
                | (Downloaded, Applying)
                | (Applying, Applied)
                | (Applied, SyncingShortcuts)
                | (SyncingShortcuts, RegisteringUninstall)
                | (RegisteringUninstall, Complete)
        )
    }

    /// Move to `next`, rejecting out-of-order transitions.
    pub fn advance(&self, next: UpdateState) -> Result<UpdateState, UpdateError> {
        if self.can_advance_to(&next) {
            Ok(next)
        } else {
            Err(UpdateError::InvalidState {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Checking => write!(f, "Checking"),
            Self::NoUpdate => write!(f, "NoUpdate"),
            Self::UpdateAvailable => write!(f, "UpdateAvailable"),
            Self::Downloading => write!(f, "Downloading"),
            Self::Downloaded => write!(f, "Downloaded"),
            Self::Applying => write!(f, "Applying"),
            Self::Applied => write!(f, "Applied"),
            Self::SyncingShortcuts => write!(f, "SyncingShortcuts"),
            Self::RegisteringUninstall => write!(f, "RegisteringUninstall"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// Result of an update check: candidates newest first.
#[derive(Debug, Clone, Default)]
pub struct UpdateCheck {
    candidates: Vec<UpdateInfo>,
}

impl UpdateCheck {
    /// Sort `candidates` by version, newest first.
    pub fn new(mut candidates: Vec<UpdateInfo>) -> Self {
        candidates.sort_by(|a, b| b.version().cmp(a.version()));
        Self { candidates }
    }

    /// The selected version, if any.
    pub fn latest(&self) -> Option<&UpdateInfo> {
        self.candidates.first()
    }

    pub fn candidates(&self) -> &[UpdateInfo] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// A retrieved package, ready to apply.
#[derive(Debug, Clone)]
pub struct DownloadedPackage {
    pub info: UpdateInfo,
    pub contents: PackageContents,
}

/// A version swapped into its application directory.
#[derive(Debug, Clone)]
pub struct AppliedVersion {
    pub info: UpdateInfo,
    pub app_dir: PathBuf,
    /// Installed files, relative to `app_dir` with `/` separators
    pub files: Vec<String>,
}

/// Drops consecutive identical percentages.
#[derive(Debug, Default)]
pub struct ProgressFilter {
    last: Option<u8>,
}

impl ProgressFilter {
    /// Whether `percent` differs from the last accepted value.
    pub fn accept(&mut self, percent: u8) -> bool {
        if self.last == Some(percent) {
            return false;
        }
        self.last = Some(percent);
        true
    }
}

/// Runs the update steps for one package.
pub struct UpdateManager {
    package_id: String,
    repository: Arc<dyn PackageRepository>,
    layout: PathLayout,
    current_version: Option<Version>,
    target_framework: String,
    shortcuts: Option<ShortcutSynchronizer>,
    registry: Arc<dyn UninstallRegistry>,
    installer_path: PathBuf,
    /// Serializes applies within this process
    apply_lock: Mutex<()>,
}

impl UpdateManager {
    /// Create a manager for `package_id` served by `repository`.
    pub fn new(
        package_id: impl Into<String>,
        repository: Arc<dyn PackageRepository>,
        layout: PathLayout,
    ) -> Self {
        let package_id = package_id.into();
        let installer_path = layout.installer_path();
        Self {
            package_id,
            repository,
            layout,
            current_version: None,
            target_framework: DEFAULT_TARGET_FRAMEWORK.to_string(),
            shortcuts: None,
            registry: platform_registry(),
            installer_path,
            apply_lock: Mutex::new(()),
        }
        .logged()
    }

    /// Create a manager from configuration, opening the configured feed.
    pub fn from_config(config: &UpdateConfig) -> Result<Self, UpdateError> {
        config.validate()?;
        let layout = config.layout();
        let repository = open_repository(&config.package_source, layout.cache_path(), &config.network)?;
        Ok(Self::new(config.package_id.clone(), repository, layout)
            .with_target_framework(config.target_framework.clone()))
    }

    fn logged(self) -> Self {
        info!("Package id: {}", self.package_id);
        info!("Package source: {}", self.repository.source());
        info!("Target folder: {}", self.layout.app_path_base().display());
        info!("Cache folder: {}", self.layout.cache_path().display());
        self
    }

    /// Only versions newer than `version` are candidates.
    pub fn with_current_version(mut self, version: Option<Version>) -> Self {
        match &version {
            Some(v) => info!("Current version: {}", v),
            None => info!("Current version: none"),
        }
        self.current_version = version;
        self
    }

    pub fn with_target_framework(mut self, target_framework: impl Into<String>) -> Self {
        self.target_framework = target_framework.into();
        self
    }

    pub fn with_shortcut_synchronizer(mut self, shortcuts: ShortcutSynchronizer) -> Self {
        self.shortcuts = Some(shortcuts);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn UninstallRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_installer_path(mut self, installer_path: impl Into<PathBuf>) -> Self {
        self.installer_path = installer_path.into();
        self
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn current_version(&self) -> Option<&Version> {
        self.current_version.as_ref()
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    pub fn repository(&self) -> &Arc<dyn PackageRepository> {
        &self.repository
    }

    pub fn installer_path(&self) -> &Path {
        &self.installer_path
    }

    /// Versions currently installed under the base directory, newest first.
    pub fn installed_versions(&self) -> Result<Vec<Version>, UpdateError> {
        Ok(self.layout.installed_versions()?)
    }

    /// Query the feed for versions newer than the current one.
    ///
    /// Selection is by version precedence alone; the newest candidate is
    /// [`UpdateCheck::latest`]. Unlisted versions are candidates too.
    pub async fn check_for_updates(&self, include_prereleases: bool) -> Result<UpdateCheck, UpdateError> {
        info!("Checking for updates...");
        let query = PackageQuery::new(&self.package_id)
            .with_min_version_exclusive(self.current_version.clone())
            .with_prereleases(include_prereleases)
            .with_unlisted(true);

        let records = self.repository.find_packages(&query).await?;
        let check = UpdateCheck::new(query.filter(records).into_iter().map(UpdateInfo::new).collect());

        match check.latest() {
            None => info!("No updates found"),
            Some(latest) => info!("Found {} updates, latest is {}", check.len(), latest.version()),
        }
        Ok(check)
    }

    /// Retrieve the content of `info`, forwarding de-duplicated progress.
    pub async fn download(
        &self,
        info: &UpdateInfo,
        progress: Option<&ProgressSink>,
    ) -> Result<DownloadedPackage, UpdateError> {
        info!("Downloading {} {}", info.package_id(), info.version());
        let mut filter = ProgressFilter::default();
        let mut forward = |event: ProgressEvent| {
            if !filter.accept(event.percent) {
                return;
            }
            info!("{}: {}", event.operation, event.percent);
            if let Some(sink) = progress {
                sink(event);
            }
        };

        let contents = self.repository.fetch(info.record(), &mut forward).await?;
        debug!("Retrieved {} files", contents.files().len());
        Ok(DownloadedPackage {
            info: info.clone(),
            contents,
        })
    }

    /// Replace the versioned directory with the package's files.
    ///
    /// Files are written to a staging directory first, which is renamed over
    /// the previous directory once complete.
    pub async fn apply(&self, package: DownloadedPackage) -> Result<AppliedVersion, UpdateError> {
        let _guard = self.apply_lock.lock().await;

        let DownloadedPackage { info, contents } = package;
        let layout = self.layout.clone();
        let version = info.version().clone();
        let target_framework = self.target_framework.clone();

        let (app_dir, files) = tokio::task::spawn_blocking(move || {
            apply_contents(&layout, &version, &contents, &target_framework)
        })
        .await??;

        info!("Applied {} {} to {}", info.package_id(), info.version(), app_dir.display());
        Ok(AppliedVersion { info, app_dir, files })
    }

    /// Create the shortcuts of an applied version.
    pub async fn sync_shortcuts(&self, applied: &AppliedVersion) -> Result<ShortcutReport, UpdateError> {
        let synchronizer = match &self.shortcuts {
            Some(synchronizer) => synchronizer.clone(),
            None => ShortcutSynchronizer::for_platform()?,
        };
        let app_dir = applied.app_dir.clone();
        let report = tokio::task::spawn_blocking(move || synchronizer.synchronize(&app_dir)).await?;
        info!(
            "Shortcuts: {} created, {} failed",
            report.created.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Write the uninstall entry of an applied version.
    pub async fn register_uninstall(&self, applied: &AppliedVersion) -> Result<UninstallEntry, UpdateError> {
        let registry = self.registry.clone();
        let layout = self.layout.clone();
        let installer_path = self.installer_path.clone();
        let applied = applied.clone();

        tokio::task::spawn_blocking(move || -> Result<UninstallEntry, UpdateError> {
            let size = estimate_installed_size(&applied.app_dir, layout.cache_path(), &installer_path)?;
            let entry = UninstallEntry::build(
                &applied.info,
                &layout,
                &installer_path,
                size,
                chrono::Local::now().date_naive(),
            );
            entry.register(registry.as_ref())?;
            info!("Registered uninstall information for {}", entry.key);
            Ok(entry)
        })
        .await?
    }
}

fn extraction_error(action: &str, path: &Path, e: std::io::Error) -> UpdateError {
    UpdateError::ExtractionFailure(format!("failed to {} {}: {}", action, path.display(), e))
}

/// Write `contents` into the versioned directory of `version`.
fn apply_contents(
    layout: &PathLayout,
    version: &Version,
    contents: &PackageContents,
    target_framework: &str,
) -> Result<(PathBuf, Vec<String>), UpdateError> {
    let staging = layout.staging_path(version);
    let target = layout.app_path(version);

    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| extraction_error("remove", &staging, e))?;
    }
    std::fs::create_dir_all(&staging).map_err(|e| extraction_error("create", &staging, e))?;

    let mut installed = Vec::new();
    for (file, relative) in contents.install_entries(target_framework) {
        let dest = join_below(&staging, &relative).ok_or_else(|| {
            UpdateError::ExtractionFailure(format!(
                "package path {:?} leaves the application directory",
                relative
            ))
        })?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| extraction_error("create", parent, e))?;
        }

        debug!("Extracting {} to {}", file.path(), dest.display());
        let mut reader = file.open().map_err(|e| extraction_error("read", Path::new(file.path()), e))?;
        let mut writer = File::create(&dest).map_err(|e| extraction_error("create", &dest, e))?;
        std::io::copy(&mut reader, &mut writer).map_err(|e| extraction_error("write", &dest, e))?;
        installed.push(relative);
    }

    if target.exists() {
        std::fs::remove_dir_all(&target).map_err(|e| extraction_error("remove", &target, e))?;
    }
    std::fs::rename(&staging, &target).map_err(|e| extraction_error("rename", &staging, e))?;

    installed.sort();
    Ok((target, installed))
}

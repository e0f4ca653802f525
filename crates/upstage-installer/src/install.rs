//! Installer run: configuration merge, self-copy and the update pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use upstage_resources::{EmbeddedResources, InstallerConfig, ResourceError, ResourceStore};
use upstage_updater::{
    open_repository, FallbackRepository, PackageBundle, PackageRepository, PipelineEvent,
    PipelineOutcome, ShortcutSynchronizer, UninstallRegistry, UpdateConfig, UpdateError,
    UpdateManager, UpdatePipeline,
};

/// Source name reported by the repository built from the embedded baseline.
pub const BASELINE_SOURCE: &str = "embedded baseline";

/// Settings taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub include_prereleases: bool,
    pub app_path_base: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

/// Merge the embedded record, an optional config file and the flags.
///
/// The embedded record always decides the package id and source; the file
/// supplies everything else, and flags override the file.
pub fn resolve_config(
    embedded: &InstallerConfig,
    options: &InstallOptions,
) -> Result<UpdateConfig, UpdateError> {
    let mut config = match &options.config_file {
        Some(path) => {
            debug!("Loading config from {:?}", path);
            UpdateConfig::load_from_file(path)?
        }
        None => UpdateConfig::default(),
    };

    config.package_id = embedded.package_id.clone();
    config.package_source = embedded.package_source.clone();
    if options.include_prereleases {
        config.include_prereleases = true;
    }
    if let Some(base) = &options.app_path_base {
        config.app_path_base = Some(base.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Load the slot table of `executable`, turning an unusable table into
/// [`UpdateError::InvalidInstaller`].
pub fn load_resources(store: &dyn ResourceStore, executable: &Path) -> Result<EmbeddedResources, UpdateError> {
    EmbeddedResources::load(store, executable).map_err(|e| match e {
        ResourceError::FileAccess { .. } => UpdateError::FileAccessFailure(e.to_string()),
        other => UpdateError::InvalidInstaller(other.to_string()),
    })
}

/// One installer launch.
pub struct Installer {
    config: UpdateConfig,
    executable: PathBuf,
    baseline: Option<PackageBundle>,
    registry: Option<Arc<dyn UninstallRegistry>>,
    shortcuts: Option<ShortcutSynchronizer>,
}

impl Installer {
    /// Build from the resources embedded in `executable`.
    ///
    /// Without an installer config slot the executable is not an installer.
    /// A baseline slot that does not decode is ignored.
    pub fn from_resources(
        resources: EmbeddedResources,
        executable: impl Into<PathBuf>,
        options: &InstallOptions,
    ) -> Result<Self, UpdateError> {
        let executable = executable.into();
        let embedded = resources.installer_config.ok_or_else(|| {
            UpdateError::InvalidInstaller(format!("{} carries no package configuration", executable.display()))
        })?;
        let config = resolve_config(&embedded, options)?;

        let baseline = match resources.baseline_package.as_deref() {
            Some(bytes) => match PackageBundle::decode(bytes) {
                Ok(bundle) => {
                    info!(
                        "Embedded baseline: {} {}",
                        bundle.record().id,
                        bundle.record().version
                    );
                    Some(bundle)
                }
                Err(e) => {
                    warn!("Ignoring embedded baseline: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            config,
            executable,
            baseline,
            registry: None,
            shortcuts: None,
        })
    }

    pub fn with_registry(mut self, registry: Arc<dyn UninstallRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_shortcut_synchronizer(mut self, shortcuts: ShortcutSynchronizer) -> Self {
        self.shortcuts = Some(shortcuts);
        self
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Copy the running executable to `{base}/install.exe`.
    ///
    /// Nothing is copied when the installer already runs from there.
    pub fn copy_installer(&self) -> Result<PathBuf, UpdateError> {
        let target = self.config.layout().installer_path();
        if same_file(&self.executable, &target) {
            debug!("Installer already at {:?}", target);
            return Ok(target);
        }

        let access = |e: std::io::Error, path: &Path| {
            UpdateError::FileAccessFailure(format!("{}: {}", path.display(), e))
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| access(e, parent))?;
        }
        std::fs::copy(&self.executable, &target).map_err(|e| access(e, &self.executable))?;
        info!("Copied installer to {}", target.display());
        Ok(target)
    }

    /// Open the feed and configure a manager for this install.
    ///
    /// With an embedded baseline the feed is wrapped so an unreachable feed
    /// falls back to the baseline package.
    pub fn build_manager(&self) -> Result<UpdateManager, UpdateError> {
        let layout = self.config.layout();
        let primary = open_repository(&self.config.package_source, layout.cache_path(), &self.config.network)?;
        let repository: Arc<dyn PackageRepository> = match &self.baseline {
            Some(bundle) => Arc::new(FallbackRepository::new(
                primary,
                Arc::new(bundle.clone().into_repository(BASELINE_SOURCE)),
            )),
            None => primary,
        };

        let installer_path = layout.installer_path();
        let mut manager = UpdateManager::new(self.config.package_id.clone(), repository, layout)
            .with_target_framework(self.config.target_framework.clone())
            .with_installer_path(installer_path);

        if let Some(registry) = &self.registry {
            manager = manager.with_registry(registry.clone());
        }
        let shortcuts = match &self.shortcuts {
            Some(shortcuts) => Some(shortcuts.clone()),
            None => match ShortcutSynchronizer::for_platform() {
                Ok(shortcuts) => Some(shortcuts),
                Err(e) => {
                    warn!("Shortcuts disabled: {}", e);
                    None
                }
            },
        };
        if let Some(shortcuts) = shortcuts {
            manager = manager.with_shortcut_synchronizer(shortcuts);
        }
        Ok(manager)
    }

    /// Copy the installer, then run the pipeline on a background task and
    /// hand every event to `on_event` on the calling task.
    pub async fn run<F>(&self, mut on_event: F) -> Result<PipelineOutcome, UpdateError>
    where
        F: FnMut(&PipelineEvent),
    {
        self.copy_installer()?;
        let manager = Arc::new(self.build_manager()?);
        let pipeline = UpdatePipeline::new(manager).with_prereleases(self.config.include_prereleases);

        let (handle, mut events) = pipeline.spawn();
        while let Some(event) = events.recv().await {
            on_event(&event);
        }
        Ok(handle.await?)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

//! Shortcut synchronization.
//!
//! After a version is applied, the synchronizer works out which shortcuts
//! the application wants (from its `upstage.xml`, or one per executable)
//! and writes a shell link for each into the start-menu folder. Creation
//! is best-effort per shortcut: a failure is logged, recorded in the
//! [`ShortcutReport`] and the next shortcut is attempted.

mod desktop;
#[cfg(target_os = "windows")]
mod shell_link;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::UpdateError;
use crate::instructions::{ShortcutSpec, UpdateInstructions, INSTRUCTIONS_FILE_NAME};

pub use desktop::DesktopEntryWriter;
#[cfg(target_os = "windows")]
pub use shell_link::ShellLinkWriter;

/// A resolved shell link, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellLink {
    pub target: PathBuf,
    pub description: Option<String>,
    pub arguments: Option<String>,
    pub icon_path: Option<PathBuf>,
    pub icon_index: i32,
    pub working_directory: Option<PathBuf>,
}

impl ShellLink {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            description: None,
            arguments: None,
            icon_path: None,
            icon_index: 0,
            working_directory: None,
        }
    }
}

/// Writes shell links in a platform format.
pub trait ShortcutWriter: Send + Sync {
    /// Extension of link files, without the dot.
    fn link_extension(&self) -> &str;

    /// Create or overwrite the link at `link_path`.
    fn write(&self, link_path: &Path, link: &ShellLink) -> Result<(), UpdateError>;
}

/// The native writer for this platform.
pub fn platform_writer() -> Arc<dyn ShortcutWriter> {
    #[cfg(target_os = "windows")]
    {
        Arc::new(ShellLinkWriter)
    }
    #[cfg(not(target_os = "windows"))]
    {
        Arc::new(DesktopEntryWriter)
    }
}

/// The per-user start-menu folder.
///
/// `%APPDATA%\Microsoft\Windows\Start Menu` on Windows, the XDG
/// `applications` directory elsewhere.
pub fn default_shortcut_dir() -> Option<PathBuf> {
    let dirs = directories::BaseDirs::new()?;
    #[cfg(target_os = "windows")]
    {
        Some(dirs.config_dir().join("Microsoft").join("Windows").join("Start Menu"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Some(dirs.data_dir().join("applications"))
    }
}

/// Outcome of one synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortcutReport {
    /// Link files written
    pub created: Vec<PathBuf>,
    /// Shortcut titles that failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl ShortcutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The shortcuts wanted for the application in `app_dir`.
///
/// The instructions document's list when it declares at least one
/// shortcut, otherwise one shortcut per executable directly inside
/// `app_dir`, ordered by file name.
pub fn desired_shortcuts(app_dir: &Path) -> Vec<ShortcutSpec> {
    if let Some(instructions) = UpdateInstructions::load(&app_dir.join(INSTRUCTIONS_FILE_NAME)) {
        if instructions.has_shortcuts() {
            return instructions.shortcuts;
        }
    }

    info!("No shortcut instructions found, creating a shortcut for each executable");
    let entries = match std::fs::read_dir(app_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to list {}: {}", app_dir.display(), e);
            return Vec::new();
        }
    };

    let mut executables: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_executable(path))
        .collect();
    executables.sort();

    executables
        .iter()
        .filter_map(|path| {
            let title = path.file_stem()?.to_string_lossy().into_owned();
            let target = path.file_name()?.to_string_lossy().into_owned();
            Some(ShortcutSpec::new(title, target))
        })
        .collect()
}

/// `.exe` files on every platform, plus files with an execute bit on Unix.
pub fn is_executable(path: &Path) -> bool {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return false,
    };

    let has_exe_extension = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("exe"))
        .unwrap_or(false);
    if has_exe_extension {
        return true;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        false
    }
}

/// Resolve a `\` or `/` separated relative path below `base`; absolute
/// paths are kept as given.
fn resolve_relative(base: &Path, relative: &str) -> PathBuf {
    if Path::new(relative).is_absolute() {
        return PathBuf::from(relative);
    }
    relative
        .split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .fold(base.to_path_buf(), |path, part| path.join(part))
}

/// Creates shortcuts for applied versions.
#[derive(Clone)]
pub struct ShortcutSynchronizer {
    writer: Arc<dyn ShortcutWriter>,
    shortcut_dir: PathBuf,
}

impl ShortcutSynchronizer {
    pub fn new(writer: Arc<dyn ShortcutWriter>, shortcut_dir: impl Into<PathBuf>) -> Self {
        Self {
            writer,
            shortcut_dir: shortcut_dir.into(),
        }
    }

    /// The native writer and start-menu folder of this platform.
    pub fn for_platform() -> Result<Self, UpdateError> {
        let dir = default_shortcut_dir().ok_or_else(|| {
            UpdateError::ShortcutCreationFailure("no start menu folder for this user".to_string())
        })?;
        Ok(Self::new(platform_writer(), dir))
    }

    pub fn shortcut_dir(&self) -> &Path {
        &self.shortcut_dir
    }

    /// Link file path for `spec`.
    pub fn link_path(&self, spec: &ShortcutSpec) -> PathBuf {
        self.shortcut_dir
            .join(format!("{}.{}", spec.title, self.writer.link_extension()))
    }

    /// Write the shortcut for `spec`, pointing into `app_dir`.
    pub fn materialize(&self, spec: &ShortcutSpec, app_dir: &Path) -> Result<PathBuf, UpdateError> {
        if spec.title.trim().is_empty() || spec.title.contains(['/', '\\']) {
            return Err(UpdateError::ShortcutCreationFailure(format!(
                "invalid shortcut title {:?}",
                spec.title
            )));
        }

        let target = resolve_relative(app_dir, &spec.target_path);
        if !target.exists() {
            warn!(
                "File {} does not exist, creating the shortcut anyway",
                target.display()
            );
        }

        let link = ShellLink {
            target: target.clone(),
            description: spec.description.clone(),
            arguments: spec.arguments.clone(),
            icon_path: spec.icon_path.as_deref().map(|icon| resolve_relative(app_dir, icon)),
            icon_index: spec.icon_index,
            working_directory: Some(app_dir.to_path_buf()),
        };

        std::fs::create_dir_all(&self.shortcut_dir).map_err(|e| {
            UpdateError::ShortcutCreationFailure(format!(
                "failed to create {}: {}",
                self.shortcut_dir.display(),
                e
            ))
        })?;

        let link_path = self.link_path(spec);
        self.writer.write(&link_path, &link)?;
        info!("Created shortcut for {} at {}", target.display(), link_path.display());
        Ok(link_path)
    }

    /// Create every desired shortcut for `app_dir`.
    pub fn synchronize(&self, app_dir: &Path) -> ShortcutReport {
        let mut report = ShortcutReport::default();
        for spec in desired_shortcuts(app_dir) {
            match self.materialize(&spec, app_dir) {
                Ok(path) => report.created.push(path),
                Err(e) => {
                    error!("Creating shortcut for {} failed: {}", spec.target_path, e);
                    report.failed.push((spec.title.clone(), e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records links instead of writing them.
    #[derive(Default)]
    struct RecordingWriter {
        written: Mutex<Vec<(PathBuf, ShellLink)>>,
    }

    impl ShortcutWriter for RecordingWriter {
        fn link_extension(&self) -> &str {
            "lnk"
        }

        fn write(&self, link_path: &Path, link: &ShellLink) -> Result<(), UpdateError> {
            if link.target.ends_with("Broken.exe") {
                return Err(UpdateError::ShortcutCreationFailure("refused".to_string()));
            }
            self.written
                .lock()
                .unwrap()
                .push((link_path.to_path_buf(), link.clone()));
            Ok(())
        }
    }

    #[test]
    fn test_default_shortcuts_per_executable() {
        let app = tempfile::tempdir().unwrap();
        std::fs::write(app.path().join("Zeta.EXE"), b"MZ").unwrap();
        std::fs::write(app.path().join("Alpha.exe"), b"MZ").unwrap();
        std::fs::write(app.path().join("readme.txt"), b"hi").unwrap();
        std::fs::create_dir(app.path().join("tools.exe")).unwrap();

        let specs = desired_shortcuts(app.path());
        assert_eq!(
            specs,
            vec![
                ShortcutSpec::new("Alpha", "Alpha.exe"),
                ShortcutSpec::new("Zeta", "Zeta.EXE"),
            ]
        );
    }

    #[test]
    fn test_instructions_override_defaults() {
        let app = tempfile::tempdir().unwrap();
        std::fs::write(app.path().join("Ledger.exe"), b"MZ").unwrap();
        std::fs::write(
            app.path().join(INSTRUCTIONS_FILE_NAME),
            "<Instructions><Shortcut><Title>Books</Title><TargetPath>Ledger.exe</TargetPath></Shortcut></Instructions>",
        )
        .unwrap();

        assert_eq!(desired_shortcuts(app.path()), vec![ShortcutSpec::new("Books", "Ledger.exe")]);
    }

    #[test]
    fn test_empty_instructions_fall_back() {
        let app = tempfile::tempdir().unwrap();
        std::fs::write(app.path().join("Ledger.exe"), b"MZ").unwrap();
        std::fs::write(app.path().join(INSTRUCTIONS_FILE_NAME), "<Instructions/>").unwrap();

        assert_eq!(desired_shortcuts(app.path()), vec![ShortcutSpec::new("Ledger", "Ledger.exe")]);
    }

    #[test]
    fn test_missing_dir_has_no_shortcuts() {
        let app = tempfile::tempdir().unwrap();
        assert!(desired_shortcuts(&app.path().join("gone")).is_empty());
    }

    #[test]
    fn test_synchronize_is_best_effort() {
        let app = tempfile::tempdir().unwrap();
        let menu = tempfile::tempdir().unwrap();
        std::fs::write(app.path().join("Broken.exe"), b"MZ").unwrap();
        std::fs::write(app.path().join("Ledger.exe"), b"MZ").unwrap();

        let writer = Arc::new(RecordingWriter::default());
        let sync = ShortcutSynchronizer::new(writer.clone(), menu.path());
        let report = sync.synchronize(app.path());

        assert_eq!(report.created, vec![menu.path().join("Ledger.lnk")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Broken");
        assert!(!report.is_complete());

        let written = writer.written.lock().unwrap();
        assert_eq!(written[0].1.target, app.path().join("Ledger.exe"));
        assert_eq!(written[0].1.working_directory.as_deref(), Some(app.path()));
    }

    #[test]
    fn test_materialize_resolves_paths_and_tolerates_missing_target() {
        let app = tempfile::tempdir().unwrap();
        let menu = tempfile::tempdir().unwrap();
        let writer = Arc::new(RecordingWriter::default());
        let sync = ShortcutSynchronizer::new(writer.clone(), menu.path().join("Programs"));

        let mut spec = ShortcutSpec::new("Ledger", "bin\\Ledger.exe");
        spec.icon_path = Some("res/ledger.ico".to_string());
        spec.icon_index = 3;
        let path = sync.materialize(&spec, app.path()).unwrap();
        assert_eq!(path, menu.path().join("Programs").join("Ledger.lnk"));

        let written = writer.written.lock().unwrap();
        let link = &written[0].1;
        assert_eq!(link.target, app.path().join("bin").join("Ledger.exe"));
        assert_eq!(link.icon_path, Some(app.path().join("res").join("ledger.ico")));
        assert_eq!(link.icon_index, 3);
    }

    #[test]
    fn test_materialize_keeps_absolute_paths() {
        let app = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        let writer = Arc::new(RecordingWriter::default());
        let sync = ShortcutSynchronizer::new(writer.clone(), app.path().join("menu"));

        let target = shared.path().join("Tool.exe");
        let icon = shared.path().join("icons").join("ledger.png");
        let mut spec = ShortcutSpec::new("Tool", target.to_str().unwrap());
        spec.icon_path = Some(icon.to_str().unwrap().to_string());
        sync.materialize(&spec, app.path()).unwrap();

        let written = writer.written.lock().unwrap();
        assert_eq!(written[0].1.target, target);
        assert_eq!(written[0].1.icon_path, Some(icon));
    }

    #[test]
    fn test_materialize_rejects_bad_titles() {
        let app = tempfile::tempdir().unwrap();
        let sync = ShortcutSynchronizer::new(Arc::new(RecordingWriter::default()), app.path());
        for title in ["", "  ", "a/b", "a\\b"] {
            let err = sync
                .materialize(&ShortcutSpec::new(title, "Ledger.exe"), app.path())
                .unwrap_err();
            assert!(matches!(err, UpdateError::ShortcutCreationFailure(_)));
        }
    }
}

//! Uninstall registration.
//!
//! Records the installed application where the OS lists removable programs.
//! On Windows that is `HKCU\Software\Microsoft\Windows\CurrentVersion\Uninstall\{id}`;
//! other platforms keep an equivalent TOML document per package.
//!
//! Registration is idempotent: writing the same entry twice leaves the same
//! values behind.

mod file;
#[cfg(target_os = "windows")]
mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::UpdateError;
use crate::package::UpdateInfo;
use crate::paths::PathLayout;

pub use file::FileUninstallRegistry;
#[cfg(target_os = "windows")]
pub use registry::WindowsUninstallRegistry;

/// Registry path of the per-user uninstall entries, relative to HKCU.
pub const UNINSTALL_KEY_ROOT: &str = r"Software\Microsoft\Windows\CurrentVersion\Uninstall";

/// A typed uninstall value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RegistryValue {
    String(String),
    /// String with `%VAR%` references expanded by the reader
    ExpandString(String),
    DWord(u32),
}

impl RegistryValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::ExpandString(s) => Some(s),
            Self::DWord(_) => None,
        }
    }

    pub fn as_dword(&self) -> Option<u32> {
        match self {
            Self::DWord(v) => Some(*v),
            _ => None,
        }
    }
}

/// Where uninstall entries are written.
pub trait UninstallRegistry: Send + Sync {
    /// Create `key` if needed and set `values`, leaving other values alone.
    fn write_entry(&self, key: &str, values: &[(&str, RegistryValue)]) -> Result<(), UpdateError>;

    /// Read one value back.
    fn read_value(&self, key: &str, name: &str) -> Result<Option<RegistryValue>, UpdateError>;

    /// Human-readable location of `key`, for logs.
    fn location(&self, key: &str) -> String;
}

/// The native registry for this platform.
pub fn platform_registry() -> Arc<dyn UninstallRegistry> {
    #[cfg(target_os = "windows")]
    {
        Arc::new(WindowsUninstallRegistry::current_user())
    }
    #[cfg(not(target_os = "windows"))]
    {
        Arc::new(FileUninstallRegistry::new(
            crate::paths::default_data_root().join("upstage").join("uninstall"),
        ))
    }
}

/// The values registered for one installed application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallEntry {
    /// Registry key name (the package id)
    pub key: String,
    pub display_icon: String,
    pub display_name: String,
    pub display_version: String,
    /// `yyyyMMdd`
    pub install_date: String,
    pub uninstall_string: String,
    pub install_location: String,
    pub publisher: String,
    pub version_major: u32,
    pub version_minor: u32,
    /// KiB
    pub estimated_size: u32,
}

impl UninstallEntry {
    /// Compute the entry for `info` installed under `layout`.
    pub fn build(
        info: &UpdateInfo,
        layout: &PathLayout,
        installer_path: &Path,
        estimated_size_kb: u64,
        install_date: NaiveDate,
    ) -> Self {
        let installer = installer_path.display().to_string();
        let display_icon = match info.icon_url() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("{},0", installer),
        };

        Self {
            key: info.package_id().to_string(),
            display_icon,
            display_name: info.package_id().to_string(),
            display_version: info.version().to_string(),
            install_date: install_date.format("%Y%m%d").to_string(),
            uninstall_string: format!("{} /uninstall", installer),
            install_location: layout.app_path_base().display().to_string(),
            publisher: info.authors().join(", "),
            version_major: clamp_dword(info.version().major),
            version_minor: clamp_dword(info.version().minor),
            estimated_size: clamp_dword(estimated_size_kb),
        }
    }

    /// Values in registration order.
    pub fn values(&self) -> Vec<(&'static str, RegistryValue)> {
        vec![
            ("DisplayIcon", RegistryValue::String(self.display_icon.clone())),
            ("DisplayName", RegistryValue::String(self.display_name.clone())),
            ("DisplayVersion", RegistryValue::String(self.display_version.clone())),
            ("InstallDate", RegistryValue::String(self.install_date.clone())),
            ("UninstallString", RegistryValue::ExpandString(self.uninstall_string.clone())),
            ("InstallLocation", RegistryValue::ExpandString(self.install_location.clone())),
            ("Publisher", RegistryValue::String(self.publisher.clone())),
            ("VersionMajor", RegistryValue::DWord(self.version_major)),
            ("VersionMinor", RegistryValue::DWord(self.version_minor)),
            ("EstimatedSize", RegistryValue::DWord(self.estimated_size)),
            ("NoModify", RegistryValue::DWord(1)),
        ]
    }

    /// Write this entry to `registry`.
    pub fn register(&self, registry: &dyn UninstallRegistry) -> Result<(), UpdateError> {
        registry.write_entry(&self.key, &self.values())?;
        debug!("Registered uninstall entry at {}", registry.location(&self.key));
        Ok(())
    }
}

fn clamp_dword(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Total size in bytes of the files below `path`; 0 if it does not exist.
pub fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Installed size in KiB: the app directory, the package cache and the
/// installer executable.
pub fn estimate_installed_size(
    app_dir: &Path,
    cache_dir: &Path,
    installer_path: &Path,
) -> Result<u64, UpdateError> {
    let installer_size = std::fs::metadata(installer_path)
        .map_err(|e| {
            UpdateError::UninstallRegistrationFailure(format!(
                "installer {} is not accessible: {}",
                installer_path.display(),
                e
            ))
        })?
        .len();

    let total = directory_size(app_dir) + directory_size(cache_dir) + installer_size;
    Ok(total >> 10)
}

/// Path of the TOML document for `key` under `dir`.
fn entry_file(dir: &Path, key: &str) -> Result<PathBuf, UpdateError> {
    if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
        return Err(UpdateError::UninstallRegistrationFailure(format!(
            "invalid uninstall key {:?}",
            key
        )));
    }
    Ok(dir.join(format!("{}.toml", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageRecord;
    use semver::Version;

    fn info(icon_url: Option<&str>) -> UpdateInfo {
        let mut record = PackageRecord::new("Ledger", Version::parse("2.5.1-beta").unwrap());
        record.icon_url = icon_url.map(str::to_string);
        record.authors = vec!["Ada".to_string(), "Grace".to_string()];
        UpdateInfo::new(record)
    }

    #[test]
    fn test_build_entry() {
        let layout = PathLayout::resolve("Ledger", Some(PathBuf::from("/home/u/Ledger")), None);
        let installer = layout.installer_path();
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        let entry = UninstallEntry::build(&info(None), &layout, &installer, 4096, date);

        assert_eq!(entry.key, "Ledger");
        assert_eq!(entry.display_icon, format!("{},0", installer.display()));
        assert_eq!(entry.display_version, "2.5.1-beta");
        assert_eq!(entry.install_date, "20260307");
        assert_eq!(entry.uninstall_string, format!("{} /uninstall", installer.display()));
        assert_eq!(entry.install_location, "/home/u/Ledger");
        assert_eq!(entry.publisher, "Ada, Grace");
        assert_eq!((entry.version_major, entry.version_minor), (2, 5));
        assert_eq!(entry.estimated_size, 4096);

        let values = entry.values();
        let names: Vec<&str> = values.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            [
                "DisplayIcon",
                "DisplayName",
                "DisplayVersion",
                "InstallDate",
                "UninstallString",
                "InstallLocation",
                "Publisher",
                "VersionMajor",
                "VersionMinor",
                "EstimatedSize",
                "NoModify"
            ]
        );
        assert!(matches!(values[4].1, RegistryValue::ExpandString(_)));
        assert_eq!(values[10].1, RegistryValue::DWord(1));
    }

    #[test]
    fn test_icon_url_wins() {
        let layout = PathLayout::resolve("Ledger", Some(PathBuf::from("/base")), None);
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let entry = UninstallEntry::build(
            &info(Some("https://example.com/ledger.ico")),
            &layout,
            &layout.installer_path(),
            0,
            date,
        );
        assert_eq!(entry.display_icon, "https://example.com/ledger.ico");
    }

    #[test]
    fn test_estimate_installed_size() {
        let base = tempfile::tempdir().unwrap();
        let app = base.path().join("app-1.0.0");
        let cache = base.path().join("packages");
        std::fs::create_dir_all(app.join("sub")).unwrap();
        std::fs::write(app.join("a.bin"), vec![0u8; 1024]).unwrap();
        std::fs::write(app.join("sub").join("b.bin"), vec![0u8; 1024]).unwrap();
        let installer = base.path().join("install.exe");

        let err = estimate_installed_size(&app, &cache, &installer).unwrap_err();
        assert!(matches!(err, UpdateError::UninstallRegistrationFailure(_)));

        std::fs::write(&installer, vec![0u8; 2048]).unwrap();
        assert_eq!(estimate_installed_size(&app, &cache, &installer).unwrap(), 4);
    }

    #[test]
    fn test_entry_file_rejects_paths() {
        let dir = Path::new("/r");
        assert_eq!(entry_file(dir, "Ledger").unwrap(), dir.join("Ledger.toml"));
        assert!(entry_file(dir, "../x").is_err());
        assert!(entry_file(dir, "").is_err());
    }
}

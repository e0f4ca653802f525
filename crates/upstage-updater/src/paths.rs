//! Install layout: where versions, the package cache and the installer live.
//!
//! ```text
//! {data_local_dir}/{package_id}/      <- app_path_base
//! ├── app-1.1.0/                      <- one directory per applied version
//! ├── app-1.2.0-beta/
//! ├── packages/                       <- cache_path (downloaded package files)
//! ├── install.exe                     <- installer copy used for uninstall
//! └── install.log
//! ```
//!
//! Resolution is pure path composition; nothing here touches the filesystem
//! except [`PathLayout::installed_versions`].

use std::path::{Path, PathBuf};

use semver::Version;

/// Prefix of every versioned application directory.
pub const APP_DIR_PREFIX: &str = "app-";

/// Suffix of the directory a version is extracted into before it is swapped in.
pub const STAGING_SUFFIX: &str = ".staging";

/// Name of the package cache directory under the install base.
const CACHE_DIR_NAME: &str = "packages";

/// File name of the installer copy kept in the install base.
pub const INSTALLER_FILE_NAME: &str = "install.exe";

/// File name of the installer log.
pub const LOG_FILE_NAME: &str = "install.log";

/// Filesystem locations derived from a package id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    app_path_base: PathBuf,
    cache_path: PathBuf,
}

impl PathLayout {
    /// Resolve the layout for `package_id`.
    ///
    /// Without overrides the base is the per-user local application data
    /// directory joined with the package id, and the cache lives under
    /// `{base}/packages`.
    pub fn resolve(
        package_id: &str,
        app_path_base: Option<PathBuf>,
        cache_path: Option<PathBuf>,
    ) -> Self {
        let app_path_base =
            app_path_base.unwrap_or_else(|| default_data_root().join(package_id));
        let cache_path = cache_path.unwrap_or_else(|| app_path_base.join(CACHE_DIR_NAME));
        Self {
            app_path_base,
            cache_path,
        }
    }

    /// Directory holding every installed version.
    pub fn app_path_base(&self) -> &Path {
        &self.app_path_base
    }

    /// Directory holding downloaded package files.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Directory dedicated to exactly one version.
    pub fn app_path(&self, version: &Version) -> PathBuf {
        app_path(&self.app_path_base, version)
    }

    /// Directory a version is extracted into before being swapped in.
    pub fn staging_path(&self, version: &Version) -> PathBuf {
        self.app_path_base
            .join(format!("{}{}{}", APP_DIR_PREFIX, version, STAGING_SUFFIX))
    }

    /// Installer copy referenced by the uninstall registration.
    pub fn installer_path(&self) -> PathBuf {
        self.app_path_base.join(INSTALLER_FILE_NAME)
    }

    /// Installer log file.
    pub fn log_path(&self) -> PathBuf {
        self.app_path_base.join(LOG_FILE_NAME)
    }

    /// Versions with a swapped-in application directory, newest first.
    ///
    /// Staging directories and entries whose suffix is not a version are
    /// ignored. A missing base directory yields an empty list.
    pub fn installed_versions(&self) -> std::io::Result<Vec<Version>> {
        let entries = match std::fs::read_dir(&self.app_path_base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(STAGING_SUFFIX) {
                continue;
            }
            if let Some(version) = name
                .strip_prefix(APP_DIR_PREFIX)
                .and_then(|v| Version::parse(v).ok())
            {
                versions.push(version);
            }
        }

        versions.sort_by(|a, b| b.cmp(a));
        Ok(versions)
    }
}

/// `{base}/app-{version}`.
pub fn app_path(app_path_base: &Path, version: &Version) -> PathBuf {
    app_path_base.join(format!("{}{}", APP_DIR_PREFIX, version))
}

/// Per-user local application data root.
pub fn default_data_root() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_given_base() {
        let base = std::env::temp_dir();
        let layout = PathLayout::resolve("testapp", Some(base.clone()), None);
        assert_eq!(layout.app_path_base(), base.as_path());
    }

    #[test]
    fn test_defaults_under_local_app_data() {
        let layout = PathLayout::resolve("testapp", None, None);
        assert_eq!(layout.app_path_base(), default_data_root().join("testapp"));
        assert_eq!(
            layout.cache_path(),
            default_data_root().join("testapp").join("packages")
        );
    }

    #[test]
    fn test_cache_override() {
        let layout = PathLayout::resolve(
            "testapp",
            Some(PathBuf::from("/opt/testapp")),
            Some(PathBuf::from("/var/cache/testapp")),
        );
        assert_eq!(layout.cache_path(), Path::new("/var/cache/testapp"));
    }

    #[test]
    fn test_versioned_path() {
        let layout = PathLayout::resolve("testapp", None, None);
        let version = Version::parse("1.2.3-beta").unwrap();
        assert_eq!(
            layout.app_path(&version),
            default_data_root().join("testapp").join("app-1.2.3-beta")
        );
        assert_eq!(
            layout.staging_path(&version),
            default_data_root().join("testapp").join("app-1.2.3-beta.staging")
        );
    }

    #[test]
    fn test_installer_and_log_paths() {
        let layout = PathLayout::resolve("testapp", Some(PathBuf::from("/opt/testapp")), None);
        assert_eq!(layout.installer_path(), Path::new("/opt/testapp/install.exe"));
        assert_eq!(layout.log_path(), Path::new("/opt/testapp/install.log"));
    }

    #[test]
    fn test_installed_versions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["app-1.0.0", "app-1.2.0-beta", "app-1.1.0", "app-2.0.0.staging", "app-junk", "packages"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("app-3.0.0"), b"a file, not a version").unwrap();

        let layout = PathLayout::resolve("testapp", Some(dir.path().to_path_buf()), None);
        let versions: Vec<String> = layout
            .installed_versions()
            .unwrap()
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(versions, vec!["1.2.0-beta", "1.1.0", "1.0.0"]);
    }

    #[test]
    fn test_installed_versions_missing_base() {
        let layout = PathLayout::resolve("testapp", Some(PathBuf::from("/nonexistent/upstage")), None);
        assert!(layout.installed_versions().unwrap().is_empty());
    }
}

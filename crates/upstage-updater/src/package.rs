//! Package model: records published on a feed, their files, and the
//! read-only [`UpdateInfo`] view handed to callers.

use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UpdateError;
use crate::version::is_prerelease;

/// Root folder of library files.
const LIB_PREFIX: &str = "lib/";

/// Root folder of content files.
const CONTENT_PREFIX: &str = "content/";

/// One published version of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package identifier, stable across versions
    pub id: String,
    /// Published version
    #[serde(with = "crate::version::lenient")]
    pub version: Version,
    /// Publication timestamp
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    /// Release notes
    #[serde(default)]
    pub release_notes: Option<String>,
    /// Whether the package is listed on the feed
    #[serde(default = "default_true")]
    pub listed: bool,
    /// Icon shown in the uninstall entry
    #[serde(default)]
    pub icon_url: Option<String>,
    /// Package authors
    #[serde(default)]
    pub authors: Vec<String>,
    /// Files carried by the package
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

/// A file listed in a package record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path inside the package, `/`-separated
    pub path: String,
    /// Size in bytes, if the feed publishes it
    #[serde(default)]
    pub size: Option<u64>,
}

impl FileEntry {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: normalize_package_path(path.as_ref()),
            size: None,
        }
    }
}

impl PackageRecord {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            published: None,
            release_notes: None,
            listed: true,
            icon_url: None,
            authors: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Whether this is a release (non-prerelease) version.
    pub fn is_release_version(&self) -> bool {
        !is_prerelease(&self.version)
    }
}

fn default_true() -> bool {
    true
}

/// Normalize a package path to `/` separators without a leading slash.
pub fn normalize_package_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Join a package path below `base`.
///
/// `None` when a segment is anything but a plain name (`..`, `.`, a root or
/// a drive prefix), so the result never leaves `base`.
pub fn join_below(base: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = base.to_path_buf();
    for part in relative.split(['/', '\\']).filter(|p| !p.is_empty()) {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => path.push(part),
            _ => return None,
        }
    }
    Some(path)
}

/// Check that a package id can name a single directory.
pub fn validate_package_id(id: &str) -> Result<(), UpdateError> {
    let trimmed = id.trim();
    let mut components = Path::new(trimmed).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !plain || trimmed.contains(['/', '\\', ':']) {
        return Err(UpdateError::PackageFormat(format!("invalid package id {:?}", id)));
    }
    Ok(())
}

/// Where the bytes of a package file live.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Held in memory
    Memory(Bytes),
    /// Stored on disk (feed folder or download cache)
    Disk(PathBuf),
}

/// Kind of a package file, derived from its root folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Library,
    Content,
    Other,
}

/// A file of a retrieved package.
#[derive(Debug, Clone)]
pub struct PackageFile {
    path: String,
    source: FileSource,
}

impl PackageFile {
    pub fn new(path: impl AsRef<str>, source: FileSource) -> Self {
        Self {
            path: normalize_package_path(path.as_ref()),
            source,
        }
    }

    pub fn from_bytes(path: impl AsRef<str>, data: impl Into<Bytes>) -> Self {
        Self::new(path, FileSource::Memory(data.into()))
    }

    /// Path inside the package, `/`-separated.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn kind(&self) -> FileKind {
        if self.path.starts_with(LIB_PREFIX) {
            FileKind::Library
        } else if self.path.starts_with(CONTENT_PREFIX) {
            FileKind::Content
        } else {
            FileKind::Other
        }
    }

    /// Open a reader over the file contents.
    pub fn open(&self) -> std::io::Result<Box<dyn Read + Send>> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(Box::new(std::io::Cursor::new(bytes.clone()))),
            FileSource::Disk(path) => Ok(Box::new(std::fs::File::open(path)?)),
        }
    }

    /// Read the whole file.
    pub fn read_all(&self) -> std::io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open()?.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// The retrieved files of one package.
#[derive(Debug, Clone, Default)]
pub struct PackageContents {
    files: Vec<PackageFile>,
}

impl PackageContents {
    pub fn new(files: Vec<PackageFile>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[PackageFile] {
        &self.files
    }

    pub fn lib_files(&self) -> impl Iterator<Item = &PackageFile> {
        self.files.iter().filter(|f| f.kind() == FileKind::Library)
    }

    pub fn content_files(&self) -> impl Iterator<Item = &PackageFile> {
        self.files.iter().filter(|f| f.kind() == FileKind::Content)
    }

    /// Content file whose path below `content/` equals `relative`.
    pub fn content_file(&self, relative: &str) -> Option<&PackageFile> {
        self.content_files()
            .find(|f| f.path()[CONTENT_PREFIX.len()..].eq_ignore_ascii_case(relative))
    }

    /// Files to install and their paths relative to the version directory.
    ///
    /// A package without library and content files is installed verbatim.
    /// Otherwise library files for `target_framework` (or directly under
    /// `lib/`) lose their `lib/{framework}/` prefix, content files lose
    /// `content/`, and everything else is left out.
    pub fn install_entries(&self, target_framework: &str) -> Vec<(&PackageFile, String)> {
        let has_lib = self.lib_files().next().is_some();
        let has_content = self.content_files().next().is_some();

        if !has_lib && !has_content {
            return self
                .files
                .iter()
                .map(|f| (f, f.path().to_string()))
                .collect();
        }

        let framework_prefix = format!("{}{}/", LIB_PREFIX, target_framework);
        let mut entries = Vec::new();

        for file in self.lib_files() {
            let below_lib = &file.path()[LIB_PREFIX.len()..];
            if let Some(relative) = strip_prefix_ignore_case(file.path(), &framework_prefix) {
                entries.push((file, relative.to_string()));
            } else if !below_lib.contains('/') {
                entries.push((file, below_lib.to_string()));
            } else {
                debug!("Skipping {} (other target framework)", file.path());
            }
        }

        for file in self.content_files() {
            entries.push((file, file.path()[CONTENT_PREFIX.len()..].to_string()));
        }

        entries.retain(|(_, relative)| !relative.is_empty());
        entries
    }
}

fn strip_prefix_ignore_case<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if path.len() >= prefix.len()
        && path.is_char_boundary(prefix.len())
        && path[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&path[prefix.len()..])
    } else {
        None
    }
}

/// Read-only view over one candidate package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    record: Arc<PackageRecord>,
}

impl UpdateInfo {
    pub fn new(record: PackageRecord) -> Self {
        Self {
            record: Arc::new(record),
        }
    }

    pub fn package_id(&self) -> &str {
        &self.record.id
    }

    pub fn version(&self) -> &Version {
        &self.record.version
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.record.published
    }

    pub fn release_notes(&self) -> Option<&str> {
        self.record.release_notes.as_deref()
    }

    pub fn is_release_version(&self) -> bool {
        self.record.is_release_version()
    }

    pub fn icon_url(&self) -> Option<&str> {
        self.record.icon_url.as_deref()
    }

    pub fn authors(&self) -> &[String] {
        &self.record.authors
    }

    /// The underlying package record.
    pub fn record(&self) -> &PackageRecord {
        &self.record
    }
}

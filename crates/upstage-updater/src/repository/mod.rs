//! Package repository capability.
//!
//! The orchestrator only sees [`PackageRepository`]: a source of package
//! records and of their file contents. Concrete feeds:
//!
//! - [`FolderRepository`]: a local or network directory
//! - [`HttpRepository`]: the same layout served over HTTP(S)
//! - [`MemoryRepository`]: records held in process (tests, baseline snapshots)
//! - [`FallbackRepository`]: a primary feed backed by an offline one
//!
//! # Feed layout
//!
//! ```text
//! {source}/{package_id}/index.json          <- JSON array of package records
//! {source}/{package_id}/{version}/{path}    <- bytes of each listed file
//! ```

mod bundle;
mod fallback;
mod folder;
mod http;
mod memory;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;

use crate::config::NetworkConfig;
use crate::error::UpdateError;
use crate::package::{join_below, validate_package_id, PackageContents, PackageRecord};
use crate::version::is_prerelease;

pub use bundle::PackageBundle;
pub use fallback::FallbackRepository;
pub use folder::FolderRepository;
pub use http::HttpRepository;
pub use memory::MemoryRepository;

/// Name of the per-package index document.
pub const FEED_INDEX_FILE: &str = "index.json";

/// Progress reported by a repository while it retrieves package content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// What is in progress, e.g. "Downloading Ledger 1.2.0"
    pub operation: String,
    /// Percent complete, 0 to 100
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(operation: impl Into<String>, percent: u8) -> Self {
        Self {
            operation: operation.into(),
            percent: percent.min(100),
        }
    }

    /// Progress for `done` of `total` units.
    pub fn fraction(operation: impl Into<String>, done: u64, total: u64) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (done.min(total) * 100 / total) as u8
        };
        Self::new(operation, percent)
    }
}

/// Which records a query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageQuery {
    pub package_id: String,
    /// Only versions strictly greater than this one
    pub min_version_exclusive: Option<Version>,
    pub include_prereleases: bool,
    pub allow_unlisted: bool,
}

impl PackageQuery {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            min_version_exclusive: None,
            include_prereleases: false,
            allow_unlisted: false,
        }
    }

    pub fn with_min_version_exclusive(mut self, version: Option<Version>) -> Self {
        self.min_version_exclusive = version;
        self
    }

    pub fn with_prereleases(mut self, include: bool) -> Self {
        self.include_prereleases = include;
        self
    }

    pub fn with_unlisted(mut self, allow: bool) -> Self {
        self.allow_unlisted = allow;
        self
    }

    /// Whether `record` is selected. Ids compare case-insensitively.
    pub fn matches(&self, record: &PackageRecord) -> bool {
        if !record.id.eq_ignore_ascii_case(&self.package_id) {
            return false;
        }
        if !self.allow_unlisted && !record.listed {
            return false;
        }
        if !self.include_prereleases && is_prerelease(&record.version) {
            return false;
        }
        match &self.min_version_exclusive {
            Some(min) => record.version > *min,
            None => true,
        }
    }

    /// Keep the selected records, each version once.
    pub fn filter(&self, records: Vec<PackageRecord>) -> Vec<PackageRecord> {
        let mut selected: Vec<PackageRecord> = Vec::new();
        for record in records {
            if self.matches(&record) && !selected.iter().any(|r| r.version == record.version) {
                selected.push(record);
            }
        }
        selected
    }
}

/// A source of package records and their contents.
#[async_trait]
pub trait PackageRepository: Send + Sync {
    /// Human-readable source location.
    fn source(&self) -> &str;

    /// Records matching `query`, in feed order.
    async fn find_packages(&self, query: &PackageQuery) -> Result<Vec<PackageRecord>, UpdateError>;

    /// Retrieve the files of `record`, reporting progress as it goes.
    ///
    /// Retrieving the contents is what triggers the download.
    async fn fetch(
        &self,
        record: &PackageRecord,
        progress: &mut (dyn FnMut(ProgressEvent) + Send),
    ) -> Result<PackageContents, UpdateError>;
}

/// Open the repository for `source`.
///
/// `http://` and `https://` sources are served by [`HttpRepository`], which
/// downloads into `cache_dir`. Anything else (optionally `file://`-prefixed)
/// is a directory read by [`FolderRepository`].
pub fn open_repository(
    source: &str,
    cache_dir: &Path,
    network: &NetworkConfig,
) -> Result<Arc<dyn PackageRepository>, UpdateError> {
    let lower = source.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(Arc::new(HttpRepository::new(source, cache_dir, network)?));
    }

    let path = source.strip_prefix("file://").unwrap_or(source);
    Ok(Arc::new(FolderRepository::new(PathBuf::from(path))))
}

/// Parse an index document, normalizing file paths.
pub(crate) fn parse_index(bytes: &[u8], origin: &str) -> Result<Vec<PackageRecord>, UpdateError> {
    let mut records: Vec<PackageRecord> = serde_json::from_slice(bytes)
        .map_err(|e| UpdateError::FeedUnreachable(format!("invalid index {}: {}", origin, e)))?;
    for record in &mut records {
        for file in &mut record.files {
            file.path = crate::package::normalize_package_path(&file.path);
        }
    }
    Ok(records)
}

/// Location of each file of `record` below `dir`.
///
/// Fails before anything is touched when the id or any file path would
/// leave `dir`.
pub(crate) fn file_locations(dir: &Path, record: &PackageRecord) -> Result<Vec<PathBuf>, UpdateError> {
    validate_package_id(&record.id)?;
    record
        .files
        .iter()
        .map(|entry| {
            join_below(dir, &entry.path).ok_or_else(|| {
                UpdateError::PackageFormat(format!(
                    "package file {:?} of {} {} leaves {}",
                    entry.path,
                    record.id,
                    record.version,
                    dir.display()
                ))
            })
        })
        .collect()
}

/// Operation name reported while retrieving `record`.
pub(crate) fn download_operation(record: &PackageRecord) -> String {
    format!("Downloading {} {}", record.id, record.version)
}

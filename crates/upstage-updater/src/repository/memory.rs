//! In-process feed.

use std::sync::RwLock;

use async_trait::async_trait;

use super::{download_operation, PackageQuery, PackageRepository, ProgressEvent};
use crate::error::UpdateError;
use crate::package::{FileEntry, FileSource, PackageContents, PackageFile, PackageRecord};

struct StoredPackage {
    record: PackageRecord,
    files: Vec<PackageFile>,
}

/// Packages held in memory.
///
/// Backs the embedded baseline snapshot and tests.
pub struct MemoryRepository {
    source: String,
    packages: RwLock<Vec<StoredPackage>>,
}

impl MemoryRepository {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            packages: RwLock::new(Vec::new()),
        }
    }

    /// Publish `record` with `files`.
    ///
    /// The record's file list is replaced by the given files. Publishing an
    /// existing id and version replaces it.
    pub fn add(&self, mut record: PackageRecord, files: Vec<PackageFile>) {
        record.files = files
            .iter()
            .map(|f| {
                let mut entry = FileEntry::new(f.path());
                if let FileSource::Memory(bytes) = f.source() {
                    entry.size = Some(bytes.len() as u64);
                }
                entry
            })
            .collect();

        let mut packages = match self.packages.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        packages.retain(|p| {
            !(p.record.id.eq_ignore_ascii_case(&record.id) && p.record.version == record.version)
        });
        packages.push(StoredPackage { record, files });
    }

    /// Builder form of [`add`](Self::add).
    pub fn with_package(self, record: PackageRecord, files: Vec<PackageFile>) -> Self {
        self.add(record, files);
        self
    }

    pub fn len(&self) -> usize {
        self.packages.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PackageRepository for MemoryRepository {
    fn source(&self) -> &str {
        &self.source
    }

    async fn find_packages(&self, query: &PackageQuery) -> Result<Vec<PackageRecord>, UpdateError> {
        let packages = self
            .packages
            .read()
            .map_err(|_| UpdateError::FeedUnreachable(format!("{} is poisoned", self.source)))?;
        Ok(query.filter(packages.iter().map(|p| p.record.clone()).collect()))
    }

    async fn fetch(
        &self,
        record: &PackageRecord,
        progress: &mut (dyn FnMut(ProgressEvent) + Send),
    ) -> Result<PackageContents, UpdateError> {
        let files = {
            let packages = self
                .packages
                .read()
                .map_err(|_| UpdateError::FeedUnreachable(format!("{} is poisoned", self.source)))?;
            packages
                .iter()
                .find(|p| p.record.id.eq_ignore_ascii_case(&record.id) && p.record.version == record.version)
                .map(|p| p.files.clone())
                .ok_or_else(|| {
                    UpdateError::FeedUnreachable(format!(
                        "{} {} is not in {}",
                        record.id, record.version, self.source
                    ))
                })?
        };

        let operation = download_operation(record);
        progress(ProgressEvent::new(&operation, 0));
        progress(ProgressEvent::new(&operation, 100));
        Ok(PackageContents::new(files))
    }
}

//! Directory feed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{download_operation, file_locations, parse_index, PackageQuery, PackageRepository, ProgressEvent, FEED_INDEX_FILE};
use crate::error::UpdateError;
use crate::package::{validate_package_id, FileSource, PackageContents, PackageFile, PackageRecord};

/// A feed laid out in a local or network directory.
///
/// Files are not copied: the returned contents point at the feed directory.
#[derive(Debug, Clone)]
pub struct FolderRepository {
    root: PathBuf,
    source: String,
}

impl FolderRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let source = root.display().to_string();
        Self { root, source }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the files of one package version.
    pub fn version_dir(&self, record: &PackageRecord) -> PathBuf {
        self.root.join(&record.id).join(record.version.to_string())
    }
}

#[async_trait]
impl PackageRepository for FolderRepository {
    fn source(&self) -> &str {
        &self.source
    }

    async fn find_packages(&self, query: &PackageQuery) -> Result<Vec<PackageRecord>, UpdateError> {
        if !tokio::fs::metadata(&self.root).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(UpdateError::FeedUnreachable(format!(
                "feed directory {} is not accessible",
                self.source
            )));
        }

        validate_package_id(&query.package_id)?;
        let index = self.root.join(&query.package_id).join(FEED_INDEX_FILE);
        let bytes = match tokio::fs::read(&index).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No index for {} in {}", query.package_id, self.source);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(UpdateError::FeedUnreachable(format!(
                    "failed to read {}: {}",
                    index.display(),
                    e
                )))
            }
        };

        let records = parse_index(&bytes, &index.display().to_string())?;
        Ok(query.filter(records))
    }

    async fn fetch(
        &self,
        record: &PackageRecord,
        progress: &mut (dyn FnMut(ProgressEvent) + Send),
    ) -> Result<PackageContents, UpdateError> {
        let operation = download_operation(record);
        let dir = self.version_dir(record);
        let locations = file_locations(&dir, record)?;
        let total = record.files.len() as u64;
        let mut files = Vec::with_capacity(record.files.len());

        progress(ProgressEvent::new(&operation, 0));
        for (done, (entry, path)) in record.files.iter().zip(locations).enumerate() {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {
                    if let Some(expected) = entry.size {
                        if meta.len() != expected {
                            warn!(
                                "{} is {} bytes, index lists {}",
                                path.display(),
                                meta.len(),
                                expected
                            );
                        }
                    }
                }
                _ => {
                    return Err(UpdateError::FeedUnreachable(format!(
                        "package file {} is missing",
                        path.display()
                    )))
                }
            }
            files.push(PackageFile::new(&entry.path, FileSource::Disk(path)));
            progress(ProgressEvent::fraction(&operation, done as u64 + 1, total));
        }
        progress(ProgressEvent::new(&operation, 100));

        Ok(PackageContents::new(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::FileEntry;
    use crate::version::parse_version;

    fn publish(root: &Path, id: &str, version: &str, files: &[(&str, &[u8])]) -> PackageRecord {
        let mut record = PackageRecord::new(id, parse_version(version).unwrap());
        let dir = root.join(id).join(record.version.to_string());
        for (path, data) in files {
            let target = dir.join(path);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(&target, data).unwrap();
            let mut entry = FileEntry::new(path);
            entry.size = Some(data.len() as u64);
            record.files.push(entry);
        }
        record
    }

    #[tokio::test]
    async fn test_find_and_fetch() {
        let feed = tempfile::tempdir().unwrap();
        let record = publish(feed.path(), "App", "1.0", &[("lib/net40/App.exe", &b"exe"[..])]);
        std::fs::write(
            feed.path().join("App").join(FEED_INDEX_FILE),
            serde_json::to_vec(&vec![record.clone()]).unwrap(),
        )
        .unwrap();

        let repo = FolderRepository::new(feed.path());
        let found = repo.find_packages(&PackageQuery::new("App")).await.unwrap();
        assert_eq!(found.len(), 1);

        let mut events = Vec::new();
        let contents = repo.fetch(&found[0], &mut |e: ProgressEvent| events.push(e.percent)).await.unwrap();
        assert_eq!(contents.files().len(), 1);
        assert_eq!(contents.files()[0].read_all().unwrap(), b"exe");
        assert_eq!(events.first(), Some(&0));
        assert_eq!(events.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_unknown_package_is_empty() {
        let feed = tempfile::tempdir().unwrap();
        let repo = FolderRepository::new(feed.path());
        assert!(repo.find_packages(&PackageQuery::new("Nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_unreachable() {
        let feed = tempfile::tempdir().unwrap();
        let repo = FolderRepository::new(feed.path().join("gone"));
        let err = repo.find_packages(&PackageQuery::new("App")).await.unwrap_err();
        assert!(matches!(err, UpdateError::FeedUnreachable(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_unreachable() {
        let feed = tempfile::tempdir().unwrap();
        let mut record = PackageRecord::new("App", parse_version("1.0").unwrap());
        record.files.push(FileEntry::new("lib/App.exe"));

        let repo = FolderRepository::new(feed.path());
        let err = repo.fetch(&record, &mut |_| {}).await.unwrap_err();
        assert!(matches!(err, UpdateError::FeedUnreachable(_)));
    }

    #[tokio::test]
    async fn test_fetch_refuses_paths_outside_feed() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("secret.txt"), b"private").unwrap();
        let feed = root.path().join("feed");
        let mut record = publish(&feed, "App", "1.0", &[("lib/App.exe", &b"MZ"[..])]);
        record.files.push(FileEntry::new("../../../secret.txt"));

        let repo = FolderRepository::new(&feed);
        let err = repo.fetch(&record, &mut |_| {}).await.unwrap_err();
        assert!(matches!(err, UpdateError::PackageFormat(_)));

        let err = repo.find_packages(&PackageQuery::new("../feed")).await.unwrap_err();
        assert!(matches!(err, UpdateError::PackageFormat(_)));
    }
}

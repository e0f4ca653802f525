//! Self-contained package snapshot.
//!
//! A bundle carries one package record and the bytes of all its files in a
//! single blob, so an installer can embed a baseline version and install it
//! when the feed cannot be reached.
//!
//! Format:
//! - 4 bytes: magic ("UPSB")
//! - 1 byte: format version
//! - 4 bytes: manifest length (big-endian)
//! - N bytes: manifest (JSON package record, every file sized)
//! - file bytes, concatenated in manifest order

use std::path::Path;

use bytes::Bytes;
use tracing::{debug, info};

use super::{FolderRepository, MemoryRepository, PackageQuery, PackageRepository};
use crate::error::UpdateError;
use crate::package::{PackageContents, PackageFile, PackageRecord};
use crate::version::parse_version;

const BUNDLE_MAGIC: &[u8; 4] = b"UPSB";

const BUNDLE_VERSION: u8 = 1;

const HEADER_LEN: usize = 9;

const MAX_MANIFEST_LEN: usize = 10 * 1024 * 1024;

/// One package with its file contents.
#[derive(Debug, Clone)]
pub struct PackageBundle {
    record: PackageRecord,
    files: Vec<PackageFile>,
}

impl PackageBundle {
    /// Bundle `record` with in-memory `files`; the record's file list is
    /// rebuilt from them.
    pub fn new(record: PackageRecord, files: Vec<(String, Bytes)>) -> Self {
        let files: Vec<PackageFile> = files
            .into_iter()
            .map(|(path, data)| PackageFile::from_bytes(path, data))
            .collect();
        let mut record = record;
        record.files = files
            .iter()
            .map(|f| {
                let mut entry = crate::package::FileEntry::new(f.path());
                entry.size = f.read_all().ok().map(|d| d.len() as u64);
                entry
            })
            .collect();
        Self { record, files }
    }

    /// Snapshot one version out of a feed directory.
    pub async fn from_feed_dir(feed_dir: &Path, package_id: &str, version: &str) -> Result<Self, UpdateError> {
        let version = parse_version(version)?;
        let repo = FolderRepository::new(feed_dir);
        let query = PackageQuery::new(package_id)
            .with_prereleases(true)
            .with_unlisted(true);
        let record = repo
            .find_packages(&query)
            .await?
            .into_iter()
            .find(|r| r.version == version)
            .ok_or_else(|| {
                UpdateError::PackageFormat(format!(
                    "{} {} is not published in {}",
                    package_id,
                    version,
                    feed_dir.display()
                ))
            })?;

        let contents = repo.fetch(&record, &mut |_| {}).await?;
        Self::from_contents(record, &contents)
    }

    /// Snapshot retrieved contents into memory.
    pub fn from_contents(record: PackageRecord, contents: &PackageContents) -> Result<Self, UpdateError> {
        let mut files = Vec::with_capacity(contents.files().len());
        for file in contents.files() {
            files.push((file.path().to_string(), Bytes::from(file.read_all()?)));
        }
        Ok(Self::new(record, files))
    }

    pub fn record(&self) -> &PackageRecord {
        &self.record
    }

    pub fn files(&self) -> &[PackageFile] {
        &self.files
    }

    /// Serialize into the bundle format.
    pub fn encode(&self) -> Result<Vec<u8>, UpdateError> {
        let manifest = serde_json::to_vec(&self.record)?;
        let manifest_len = u32::try_from(manifest.len())
            .map_err(|_| UpdateError::PackageFormat("bundle manifest too large".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + manifest.len());
        out.extend_from_slice(BUNDLE_MAGIC);
        out.push(BUNDLE_VERSION);
        out.extend_from_slice(&manifest_len.to_be_bytes());
        out.extend_from_slice(&manifest);
        for file in &self.files {
            out.extend_from_slice(&file.read_all()?);
        }

        debug!(
            "Encoded bundle {} {}: {} files, {} bytes",
            self.record.id,
            self.record.version,
            self.files.len(),
            out.len()
        );
        Ok(out)
    }

    /// Parse a bundle produced by [`encode`](Self::encode).
    pub fn decode(data: &[u8]) -> Result<Self, UpdateError> {
        if data.len() < HEADER_LEN {
            return Err(UpdateError::PackageFormat("bundle too small".to_string()));
        }
        if &data[0..4] != BUNDLE_MAGIC {
            return Err(UpdateError::PackageFormat("wrong bundle magic bytes".to_string()));
        }
        if data[4] != BUNDLE_VERSION {
            return Err(UpdateError::PackageFormat(format!(
                "unsupported bundle version: {} (expected {})",
                data[4], BUNDLE_VERSION
            )));
        }

        let manifest_len = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) as usize;
        if manifest_len > MAX_MANIFEST_LEN || HEADER_LEN + manifest_len > data.len() {
            return Err(UpdateError::PackageFormat("bundle manifest length out of range".to_string()));
        }
        let record: PackageRecord = serde_json::from_slice(&data[HEADER_LEN..HEADER_LEN + manifest_len])?;

        let body = Bytes::copy_from_slice(&data[HEADER_LEN + manifest_len..]);
        let mut offset = 0usize;
        let mut files = Vec::with_capacity(record.files.len());
        for entry in &record.files {
            let size = entry.size.ok_or_else(|| {
                UpdateError::PackageFormat(format!("bundle entry {} has no size", entry.path))
            })? as usize;
            if offset + size > body.len() {
                return Err(UpdateError::PackageFormat(format!(
                    "bundle entry {} runs past the end of the data",
                    entry.path
                )));
            }
            files.push(PackageFile::from_bytes(&entry.path, body.slice(offset..offset + size)));
            offset += size;
        }
        if offset != body.len() {
            return Err(UpdateError::PackageFormat(format!(
                "{} trailing bytes after the last bundle entry",
                body.len() - offset
            )));
        }

        Ok(Self { record, files })
    }

    /// Serve the bundled package from memory.
    pub fn into_repository(self, source: impl Into<String>) -> MemoryRepository {
        info!("Using bundled {} {}", self.record.id, self.record.version);
        let repo = MemoryRepository::new(source);
        repo.add(self.record, self.files);
        repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn sample() -> PackageBundle {
        PackageBundle::new(
            PackageRecord::new("Ledger", Version::new(1, 0, 0)),
            vec![
                ("lib/net40/Ledger.exe".to_string(), Bytes::from_static(b"MZ-ledger")),
                ("content/upstage.xml".to_string(), Bytes::from_static(b"<Instructions/>")),
                ("lib/net40/empty.txt".to_string(), Bytes::new()),
            ],
        )
    }

    #[test]
    fn test_decode_restores_files() {
        let decoded = PackageBundle::decode(&sample().encode().unwrap()).unwrap();
        assert_eq!(decoded.record().version, Version::new(1, 0, 0));
        assert_eq!(decoded.files().len(), 3);
        assert_eq!(decoded.files()[0].read_all().unwrap(), b"MZ-ledger");
        assert!(decoded.files()[2].read_all().unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_damage() {
        let encoded = sample().encode().unwrap();

        let mut bad_magic = encoded.clone();
        bad_magic[0] = b'X';
        assert!(matches!(PackageBundle::decode(&bad_magic), Err(UpdateError::PackageFormat(_))));

        let truncated = &encoded[..encoded.len() - 1];
        assert!(matches!(PackageBundle::decode(truncated), Err(UpdateError::PackageFormat(_))));

        let mut trailing = encoded.clone();
        trailing.push(0);
        assert!(matches!(PackageBundle::decode(&trailing), Err(UpdateError::PackageFormat(_))));

        assert!(PackageBundle::decode(b"UPSB").is_err());
    }

    #[tokio::test]
    async fn test_into_repository_serves_package() {
        let repo = sample().into_repository("baseline");
        let found = repo.find_packages(&PackageQuery::new("ledger")).await.unwrap();
        assert_eq!(found.len(), 1);
        let contents = repo.fetch(&found[0], &mut |_| {}).await.unwrap();
        assert!(contents.content_file("upstage.xml").is_some());
    }
}

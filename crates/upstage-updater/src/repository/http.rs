//! HTTP(S) feed.
//!
//! Serves the same layout as [`FolderRepository`](super::FolderRepository)
//! over HTTP. Package files are streamed into the package cache, one
//! directory per package version, and interrupted downloads resume with a
//! `Range` request when the index lists the file size.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::{download_operation, file_locations, parse_index, PackageQuery, PackageRepository, ProgressEvent, FEED_INDEX_FILE};
use crate::config::NetworkConfig;
use crate::error::UpdateError;
use crate::package::{validate_package_id, FileSource, PackageContents, PackageFile, PackageRecord};

/// A feed served over HTTP(S).
pub struct HttpRepository {
    client: reqwest::Client,
    source: String,
    cache_dir: PathBuf,
}

impl HttpRepository {
    /// Create a repository for `source`, downloading into `cache_dir`.
    pub fn new(source: &str, cache_dir: &Path, network: &NetworkConfig) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(network.timeout_seconds))
            .read_timeout(Duration::from_secs(network.read_timeout_seconds))
            .user_agent(&network.user_agent)
            .build()
            .map_err(|e| UpdateError::ConfigError(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            source: source.trim_end_matches('/').to_string(),
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    pub fn index_url(&self, package_id: &str) -> String {
        format!("{}/{}/{}", self.source, package_id, FEED_INDEX_FILE)
    }

    pub fn file_url(&self, record: &PackageRecord, path: &str) -> String {
        format!("{}/{}/{}/{}", self.source, record.id, record.version, path)
    }

    /// Cache directory for one package version.
    pub fn package_cache_dir(&self, record: &PackageRecord) -> Result<PathBuf, UpdateError> {
        validate_package_id(&record.id)?;
        Ok(self.cache_dir.join(format!("{}.{}", record.id, record.version)))
    }

    /// Stream `url` into `dest`, calling `on_bytes` with each chunk length.
    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        expected_size: Option<u64>,
        on_bytes: &mut (dyn FnMut(u64) + Send),
    ) -> Result<(), UpdateError> {
        debug!("Downloading {} -> {}", url, dest.display());

        let existing = dest.metadata().map(|m| m.len()).unwrap_or(0);
        if let Some(expected) = expected_size {
            if existing == expected && dest.is_file() {
                debug!("{} already cached ({} bytes)", dest.display(), existing);
                on_bytes(expected);
                return Ok(());
            }
        }
        let start_byte = match expected_size {
            Some(expected) if existing > 0 && existing < expected => existing,
            _ => 0,
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut request = self.client.get(url);
        if start_byte > 0 {
            request = request.header("Range", format!("bytes={}-", start_byte));
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::FeedUnreachable(format!(
                "GET {} returned {}",
                url,
                status.as_u16()
            )));
        }

        let mut file = if start_byte > 0 && status == StatusCode::PARTIAL_CONTENT {
            on_bytes(start_byte);
            OpenOptions::new().append(true).open(dest)?
        } else {
            if start_byte > 0 {
                warn!("Server ignored range request, restarting {}", url);
            }
            File::create(dest)?
        };

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)?;
            on_bytes(chunk.len() as u64);
        }
        file.sync_all()?;

        if let Some(expected) = expected_size {
            let actual = dest.metadata()?.len();
            if actual != expected {
                return Err(UpdateError::FeedUnreachable(format!(
                    "{} is {} bytes, index lists {}",
                    url, actual, expected
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PackageRepository for HttpRepository {
    fn source(&self) -> &str {
        &self.source
    }

    async fn find_packages(&self, query: &PackageQuery) -> Result<Vec<PackageRecord>, UpdateError> {
        validate_package_id(&query.package_id)?;
        let url = self.index_url(&query.package_id);
        debug!("Fetching index: {}", url);

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("No index for {} at {}", query.package_id, self.source);
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(UpdateError::FeedUnreachable(format!(
                "GET {} returned {}",
                url,
                response.status().as_u16()
            )));
        }

        let bytes = response.bytes().await?;
        let records = parse_index(&bytes, &url)?;
        Ok(query.filter(records))
    }

    async fn fetch(
        &self,
        record: &PackageRecord,
        progress: &mut (dyn FnMut(ProgressEvent) + Send),
    ) -> Result<PackageContents, UpdateError> {
        let operation = download_operation(record);
        let dir = self.package_cache_dir(record)?;
        let locations = file_locations(&dir, record)?;
        info!("Downloading {} {} into {}", record.id, record.version, dir.display());

        // Byte-accurate progress needs every size; otherwise count files.
        let total_bytes: Option<u64> = record.files.iter().map(|f| f.size).sum();
        let file_count = record.files.len() as u64;

        progress(ProgressEvent::new(&operation, 0));
        let mut files = Vec::with_capacity(record.files.len());
        let mut downloaded = 0u64;
        for (index, (entry, dest)) in record.files.iter().zip(locations).enumerate() {
            let url = self.file_url(record, &entry.path);
            {
                let mut on_bytes = |n: u64| {
                    downloaded += n;
                    if let Some(total) = total_bytes {
                        progress(ProgressEvent::fraction(&operation, downloaded, total));
                    }
                };
                self.download_file(&url, &dest, entry.size, &mut on_bytes).await?;
            }
            if total_bytes.is_none() {
                progress(ProgressEvent::fraction(&operation, index as u64 + 1, file_count));
            }
            files.push(PackageFile::new(&entry.path, FileSource::Disk(dest)));
        }
        progress(ProgressEvent::new(&operation, 100));

        Ok(PackageContents::new(files))
    }
}

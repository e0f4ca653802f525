//! Primary feed with an offline fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{PackageQuery, PackageRepository, ProgressEvent};
use crate::error::UpdateError;
use crate::package::{PackageContents, PackageRecord};

/// Serves from `primary`, switching to `fallback` when the primary feed is
/// unreachable.
pub struct FallbackRepository {
    primary: Arc<dyn PackageRepository>,
    fallback: Arc<dyn PackageRepository>,
}

impl FallbackRepository {
    pub fn new(primary: Arc<dyn PackageRepository>, fallback: Arc<dyn PackageRepository>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PackageRepository for FallbackRepository {
    fn source(&self) -> &str {
        self.primary.source()
    }

    async fn find_packages(&self, query: &PackageQuery) -> Result<Vec<PackageRecord>, UpdateError> {
        match self.primary.find_packages(query).await {
            Err(UpdateError::FeedUnreachable(reason)) => {
                warn!(
                    "{} unreachable ({}), using {}",
                    self.primary.source(),
                    reason,
                    self.fallback.source()
                );
                self.fallback.find_packages(query).await
            }
            result => result,
        }
    }

    async fn fetch(
        &self,
        record: &PackageRecord,
        progress: &mut (dyn FnMut(ProgressEvent) + Send),
    ) -> Result<PackageContents, UpdateError> {
        let primary = self.primary.fetch(record, progress).await;
        match primary {
            Err(UpdateError::FeedUnreachable(reason)) => {
                warn!(
                    "Fetching {} {} from {} failed ({}), trying {}",
                    record.id,
                    record.version,
                    self.primary.source(),
                    reason,
                    self.fallback.source()
                );
                self.fallback
                    .fetch(record, progress)
                    .await
                    .map_err(|_| UpdateError::FeedUnreachable(reason))
            }
            result => result,
        }
    }
}

//! Error types for resource slot access.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing resource slots.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The executable could not be opened (missing, locked, permission denied)
    #[error("cannot open {path:?} for resource access: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The resource update could not be committed
    #[error("resource update failed for {path:?}: {reason}")]
    UpdateFailed { path: PathBuf, reason: String },

    /// A slot exists but its payload cannot be decoded
    #[error("slot {slot} holds a malformed payload: {reason}")]
    Malformed { slot: u16, reason: String },

    /// The slot table itself is damaged
    #[error("resource table in {path:?} is corrupt: {reason}")]
    CorruptTable { path: PathBuf, reason: String },

    /// Serialization of a typed payload failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResourceError {
    pub(crate) fn file_access(path: &std::path::Path, source: std::io::Error) -> Self {
        ResourceError::FileAccess {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn update_failed(path: &std::path::Path, reason: impl Into<String>) -> Self {
        ResourceError::UpdateFailed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the file itself could not be reached.
    pub fn is_file_access(&self) -> bool {
        matches!(self, ResourceError::FileAccess { .. })
    }

    /// Whether the file does not exist, as opposed to being locked or denied.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ResourceError::FileAccess { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

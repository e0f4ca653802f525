//! Error types for the update system.

use thiserror::Error;

/// Errors that can occur during update operations.
///
/// An update check that finds nothing is not an error; it yields an empty
/// [`crate::manager::UpdateCheck`].
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The package feed could not be queried or read
    #[error("package feed unreachable: {0}")]
    FeedUnreachable(String),

    /// The running installer carries no valid configuration
    #[error("not a valid installer: {0}")]
    InvalidInstaller(String),

    /// Staging a versioned directory failed
    #[error("extraction failed: {0}")]
    ExtractionFailure(String),

    /// Committing an embedded resource update failed
    #[error("resource update failed: {0}")]
    ResourceUpdateFailure(String),

    /// A file could not be opened for update
    #[error("file access failed: {0}")]
    FileAccessFailure(String),

    /// A single shortcut could not be created
    #[error("shortcut creation failed: {0}")]
    ShortcutCreationFailure(String),

    /// Writing the uninstall registration failed
    #[error("uninstall registration failed: {0}")]
    UninstallRegistrationFailure(String),

    /// A package or bundle document is not in the expected format
    #[error("package format error: {0}")]
    PackageFormat(String),

    /// A pipeline step was requested out of order
    #[error("invalid state transition: {from} -> {to}")]
    InvalidState { from: String, to: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Version parsing error
    #[error("version parse error: {0}")]
    VersionParseError(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        UpdateError::FeedUnreachable(err.to_string())
    }
}

impl From<semver::Error> for UpdateError {
    fn from(err: semver::Error) -> Self {
        UpdateError::VersionParseError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for UpdateError {
    fn from(err: tokio::task::JoinError) -> Self {
        UpdateError::IoError(std::io::Error::other(err.to_string()))
    }
}

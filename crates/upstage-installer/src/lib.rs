//! Upstage installer
//!
//! A single generic executable that learns what to install from its own
//! embedded resources: slot 1711 names the package and its feed, slot 1712
//! may carry a baseline package used when the feed is unreachable.
//!
//! The installer copies itself into the install base (so the uninstall
//! entry can refer to it), then runs the update pipeline on a background
//! task while the console shows progress.

pub mod cli;
pub mod install;
pub mod logging;
pub mod output;

pub use cli::Cli;
pub use install::{resolve_config, InstallOptions, Installer};
pub use output::ConsoleRenderer;

use upstage_updater::{PipelineOutcome, PipelineStep, UpdateError};

/// Exit codes of the installer process.
///
/// - 0: Success - installed, or already up to date
/// - 1: General error - unspecified error occurred
/// - 2: Invalid installer - no usable package configuration embedded
/// - 3: Feed unreachable - the package feed could not be queried
/// - 4: Install failed - download, apply or registration failed
/// - 5: Unsupported - the requested operation is not provided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidInstaller = 2,
    FeedUnreachable = 3,
    InstallFailed = 4,
    Unsupported = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Exit code for a finished pipeline run.
    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        match outcome {
            PipelineOutcome::NoUpdate | PipelineOutcome::Complete { .. } => ExitCode::Success,
            PipelineOutcome::Failed {
                step: PipelineStep::Check,
                ..
            } => ExitCode::FeedUnreachable,
            PipelineOutcome::Failed { .. } => ExitCode::InstallFailed,
        }
    }

    /// Exit code for a failure outside the pipeline.
    pub fn from_error(error: &UpdateError) -> Self {
        match error {
            UpdateError::InvalidInstaller(_) | UpdateError::ConfigError(_) => ExitCode::InvalidInstaller,
            UpdateError::FeedUnreachable(_) => ExitCode::FeedUnreachable,
            UpdateError::FileAccessFailure(_) | UpdateError::IoError(_) => ExitCode::InstallFailed,
            _ => ExitCode::GeneralError,
        }
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::InvalidInstaller => "INVALID_INSTALLER",
            ExitCode::FeedUnreachable => "FEED_UNREACHABLE",
            ExitCode::InstallFailed => "INSTALL_FAILED",
            ExitCode::Unsupported => "UNSUPPORTED",
        }
    }
}

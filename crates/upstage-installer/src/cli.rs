//! Command line of the installer.

use std::path::PathBuf;

use clap::Parser;

use crate::install::InstallOptions;

/// Command line argument the uninstall entry registers.
pub const UNINSTALL_ARG: &str = "/uninstall";

/// Upstage installer - installs or updates the package it was stamped for
#[derive(Parser, Debug)]
#[command(name = "upstage-installer")]
#[command(version, about = "Installs or updates the package this installer was stamped for")]
pub struct Cli {
    /// Include prerelease versions
    #[arg(long, env = "UPSTAGE_PRERELEASE")]
    pub prerelease: bool,

    /// Install base directory (defaults to the local app data folder)
    #[arg(long)]
    pub base: Option<PathBuf>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Read the embedded configuration from this executable instead of the running one
    #[arg(long, hide = true)]
    pub installer: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging
    #[arg(long)]
    pub debug: bool,

    /// Windows-style command, e.g. `/uninstall`
    #[arg(hide = true)]
    pub command: Option<String>,
}

impl Cli {
    /// Whether the uninstall command was requested.
    pub fn is_uninstall(&self) -> bool {
        self.command
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(UNINSTALL_ARG) || c.eq_ignore_ascii_case("uninstall"))
            .unwrap_or(false)
    }

    pub fn install_options(&self) -> InstallOptions {
        InstallOptions {
            include_prereleases: self.prerelease,
            app_path_base: self.base.clone(),
            config_file: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from(["upstage-installer", "--prerelease", "--base", "/opt/ledger", "-v"]);
        assert!(cli.prerelease);
        assert!(cli.verbose);
        assert!(!cli.is_uninstall());

        let options = cli.install_options();
        assert!(options.include_prereleases);
        assert_eq!(options.app_path_base, Some(PathBuf::from("/opt/ledger")));
    }

    #[test]
    fn test_uninstall_command() {
        let cli = Cli::parse_from(["upstage-installer", "/uninstall"]);
        assert!(cli.is_uninstall());
    }
}

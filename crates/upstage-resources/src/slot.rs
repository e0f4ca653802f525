//! The slot table reserved by the installer and the payloads stored in it.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ResourceError;
use crate::store::ResourceStore;

/// Separator between package id and package source in the config record.
const RECORD_SEPARATOR: char = '|';

/// Slots reserved in an installer executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// `"{packageId}|{packageSource}"`; its absence marks a file as not an installer
    InstallerConfig,
    /// Optional baseline package snapshot, stored as raw bytes
    BaselinePackage,
}

impl Slot {
    /// Every reserved slot, in id order.
    pub const ALL: [Slot; 2] = [Slot::InstallerConfig, Slot::BaselinePackage];

    /// Numeric resource id.
    pub fn id(self) -> u16 {
        match self {
            Slot::InstallerConfig => 1711,
            Slot::BaselinePackage => 1712,
        }
    }

    /// Logical name used in logs and tooling.
    pub fn name(self) -> &'static str {
        match self {
            Slot::InstallerConfig => "installer-config",
            Slot::BaselinePackage => "baseline-package",
        }
    }

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.id() == id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.name() == name)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

/// Target package and feed an installer was stamped with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerConfig {
    pub package_id: String,
    pub package_source: String,
}

impl InstallerConfig {
    pub fn new(package_id: impl Into<String>, package_source: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            package_source: package_source.into(),
        }
    }

    /// Encode as the delimited text record.
    pub fn to_record(&self) -> String {
        format!(
            "{}{}{}",
            self.package_id, RECORD_SEPARATOR, self.package_source
        )
    }

    /// Decode the raw slot bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ResourceError> {
        let text = std::str::from_utf8(bytes).map_err(|e| ResourceError::Malformed {
            slot: Slot::InstallerConfig.id(),
            reason: format!("record is not UTF-8: {}", e),
        })?;
        text.parse()
    }
}

impl FromStr for InstallerConfig {
    type Err = ResourceError;

    /// Split on the first separator; the source may itself contain `|`.
    fn from_str(record: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| ResourceError::Malformed {
            slot: Slot::InstallerConfig.id(),
            reason: reason.to_string(),
        };

        let record = record.trim_end_matches('\0');
        let (package_id, package_source) = record
            .split_once(RECORD_SEPARATOR)
            .ok_or_else(|| malformed("missing '|' separator"))?;

        let package_id = package_id.trim();
        if package_id.is_empty() {
            return Err(malformed("empty package id"));
        }

        Ok(Self::new(package_id, package_source.trim()))
    }
}

/// Resolved contents of every reserved slot of one executable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedResources {
    pub installer_config: Option<InstallerConfig>,
    pub baseline_package: Option<Vec<u8>>,
}

impl EmbeddedResources {
    /// Resolve the slot table of `executable`.
    ///
    /// A malformed installer config is an error; absent slots are `None`.
    pub fn load(store: &dyn ResourceStore, executable: &Path) -> Result<Self, ResourceError> {
        let installer_config = match store.read_slot(executable, Slot::InstallerConfig.id())? {
            Some(bytes) => Some(InstallerConfig::from_bytes(&bytes)?),
            None => {
                warn!("{} slot absent in {:?}", Slot::InstallerConfig, executable);
                None
            }
        };

        let baseline_package = store.read_slot(executable, Slot::BaselinePackage.id())?;
        if let Some(baseline) = &baseline_package {
            debug!("{} slot holds {} bytes", Slot::BaselinePackage, baseline.len());
        }

        Ok(Self {
            installer_config,
            baseline_package,
        })
    }

    /// Stamp the present slots into `executable`.
    ///
    /// The config slot is always written when set; the baseline slot only
    /// when a baseline is present.
    pub fn write(&self, store: &dyn ResourceStore, executable: &Path) -> Result<(), ResourceError> {
        if let Some(config) = &self.installer_config {
            store.write_slot(
                executable,
                Slot::InstallerConfig.id(),
                config.to_record().as_bytes(),
            )?;
        }
        if let Some(baseline) = &self.baseline_package {
            store.write_slot(executable, Slot::BaselinePackage.id(), baseline)?;
        }
        Ok(())
    }

    /// Whether the executable is a valid installer.
    pub fn is_installer(&self) -> bool {
        self.installer_config.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_ids() {
        assert_eq!(Slot::InstallerConfig.id(), 1711);
        assert_eq!(Slot::BaselinePackage.id(), 1712);
        assert_eq!(Slot::from_id(1712), Some(Slot::BaselinePackage));
        assert_eq!(Slot::from_id(1), None);
        assert_eq!(Slot::from_name("installer-config"), Some(Slot::InstallerConfig));
    }

    #[test]
    fn test_record_format() {
        let config = InstallerConfig::new("DemoApp", "http://localhost:8084/nuget/");
        assert_eq!(config.to_record(), "DemoApp|http://localhost:8084/nuget/");
        assert_eq!(config.to_record().parse::<InstallerConfig>().unwrap(), config);
    }

    #[test]
    fn test_record_splits_on_first_separator() {
        let config: InstallerConfig = "App|\\\\server\\feed|odd".parse().unwrap();
        assert_eq!(config.package_id, "App");
        assert_eq!(config.package_source, "\\\\server\\feed|odd");
    }

    #[test]
    fn test_record_rejects_malformed() {
        assert!("no separator".parse::<InstallerConfig>().is_err());
        assert!("|source-only".parse::<InstallerConfig>().is_err());
        assert!(InstallerConfig::from_bytes(&[0xff, 0xfe, b'|']).is_err());
    }

    #[test]
    fn test_record_ignores_trailing_nul() {
        let config = InstallerConfig::from_bytes(b"App|C:\\feed\0").unwrap();
        assert_eq!(config.package_source, "C:\\feed");
    }
}

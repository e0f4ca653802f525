//! TOML-backed uninstall records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{entry_file, RegistryValue, UninstallRegistry};
use crate::error::UpdateError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct EntryDocument {
    #[serde(default)]
    values: BTreeMap<String, RegistryValue>,
}

/// One TOML document per key in a directory.
#[derive(Debug, Clone)]
pub struct FileUninstallRegistry {
    dir: PathBuf,
}

impl FileUninstallRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(&self, path: &Path) -> Result<EntryDocument, UpdateError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                UpdateError::UninstallRegistrationFailure(format!("{}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EntryDocument::default()),
            Err(e) => Err(failure(path, e)),
        }
    }
}

fn failure(path: &Path, e: impl std::fmt::Display) -> UpdateError {
    UpdateError::UninstallRegistrationFailure(format!("{}: {}", path.display(), e))
}

impl UninstallRegistry for FileUninstallRegistry {
    fn write_entry(&self, key: &str, values: &[(&str, RegistryValue)]) -> Result<(), UpdateError> {
        let path = entry_file(&self.dir, key)?;
        let mut document = self.load(&path)?;
        for (name, value) in values {
            document.values.insert((*name).to_string(), value.clone());
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| failure(&self.dir, e))?;
        let content = toml::to_string_pretty(&document).map_err(|e| failure(&path, e))?;
        std::fs::write(&path, content).map_err(|e| failure(&path, e))
    }

    fn read_value(&self, key: &str, name: &str) -> Result<Option<RegistryValue>, UpdateError> {
        let path = entry_file(&self.dir, key)?;
        Ok(self.load(&path)?.values.remove(name))
    }

    fn location(&self, key: &str) -> String {
        self.dir.join(format!("{}.toml", key)).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_merges_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileUninstallRegistry::new(dir.path().join("uninstall"));

        registry
            .write_entry(
                "Ledger",
                &[
                    ("DisplayName", RegistryValue::String("Ledger".into())),
                    ("NoModify", RegistryValue::DWord(1)),
                ],
            )
            .unwrap();
        registry
            .write_entry(
                "Ledger",
                &[("UninstallString", RegistryValue::ExpandString("%X% /uninstall".into()))],
            )
            .unwrap();

        assert_eq!(
            registry.read_value("Ledger", "DisplayName").unwrap(),
            Some(RegistryValue::String("Ledger".into()))
        );
        assert_eq!(
            registry.read_value("Ledger", "UninstallString").unwrap(),
            Some(RegistryValue::ExpandString("%X% /uninstall".into()))
        );
        assert_eq!(registry.read_value("Ledger", "NoModify").unwrap(), Some(RegistryValue::DWord(1)));
        assert_eq!(registry.read_value("Ledger", "Missing").unwrap(), None);
        assert_eq!(registry.read_value("Other", "DisplayName").unwrap(), None);
    }

    #[test]
    fn test_corrupt_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Ledger.toml"), "values = 3").unwrap();
        let registry = FileUninstallRegistry::new(dir.path());
        let err = registry.read_value("Ledger", "DisplayName").unwrap_err();
        assert!(matches!(err, UpdateError::UninstallRegistrationFailure(_)));
    }
}

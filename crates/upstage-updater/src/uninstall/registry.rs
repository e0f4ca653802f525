//! Windows registry backend.

use winreg::enums::*;
use winreg::types::{FromRegValue, ToRegValue};
use winreg::RegKey;

use super::{RegistryValue, UninstallRegistry, UNINSTALL_KEY_ROOT};
use crate::error::UpdateError;

/// Uninstall entries under `HKCU\...\Uninstall`.
#[derive(Debug, Clone)]
pub struct WindowsUninstallRegistry {
    root: String,
}

impl WindowsUninstallRegistry {
    pub fn current_user() -> Self {
        Self {
            root: UNINSTALL_KEY_ROOT.to_string(),
        }
    }

    fn subkey(&self, key: &str) -> String {
        format!(r"{}\{}", self.root, key)
    }
}

fn failure(path: &str, e: std::io::Error) -> UpdateError {
    UpdateError::UninstallRegistrationFailure(format!(r"HKCU\{}: {}", path, e))
}

impl UninstallRegistry for WindowsUninstallRegistry {
    fn write_entry(&self, key: &str, values: &[(&str, RegistryValue)]) -> Result<(), UpdateError> {
        let path = self.subkey(key);
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let (entry, _) = hkcu.create_subkey(&path).map_err(|e| failure(&path, e))?;

        for (name, value) in values {
            let result = match value {
                RegistryValue::String(s) => entry.set_value(name, s),
                RegistryValue::DWord(v) => entry.set_value(name, v),
                RegistryValue::ExpandString(s) => {
                    let mut raw = s.to_reg_value();
                    raw.vtype = REG_EXPAND_SZ;
                    entry.set_raw_value(name, &raw)
                }
            };
            result.map_err(|e| failure(&path, e))?;
        }
        Ok(())
    }

    fn read_value(&self, key: &str, name: &str) -> Result<Option<RegistryValue>, UpdateError> {
        let path = self.subkey(key);
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let entry = match hkcu.open_subkey(&path) {
            Ok(entry) => entry,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(failure(&path, e)),
        };
        let raw = match entry.get_raw_value(name) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(failure(&path, e)),
        };

        let value = match raw.vtype {
            REG_DWORD => RegistryValue::DWord(u32::from_reg_value(&raw).map_err(|e| failure(&path, e))?),
            REG_EXPAND_SZ => {
                RegistryValue::ExpandString(String::from_reg_value(&raw).map_err(|e| failure(&path, e))?)
            }
            _ => RegistryValue::String(String::from_reg_value(&raw).map_err(|e| failure(&path, e))?),
        };
        Ok(Some(value))
    }

    fn location(&self, key: &str) -> String {
        format!(r"HKCU\{}", self.subkey(key))
    }
}

//! The slot store abstraction and typed helpers.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ResourceError;

/// Access to numbered binary slots embedded in an executable.
pub trait ResourceStore: Send + Sync {
    /// Read the raw bytes of a slot.
    ///
    /// Returns `Ok(None)` when the executable carries no such slot. A slot
    /// that exists with zero bytes yields `Ok(Some(vec![]))`.
    fn read_slot(&self, executable: &Path, slot: u16) -> Result<Option<Vec<u8>>, ResourceError>;

    /// Replace (or create) the slot with `data` and commit the change.
    fn write_slot(&self, executable: &Path, slot: u16, data: &[u8]) -> Result<(), ResourceError>;
}

/// Read a slot and decode it as JSON.
///
/// An absent slot is `Ok(None)`. A present slot that does not decode is a
/// [`ResourceError::Malformed`] error.
pub fn read_typed<T: DeserializeOwned>(
    store: &dyn ResourceStore,
    executable: &Path,
    slot: u16,
) -> Result<Option<T>, ResourceError> {
    let Some(bytes) = store.read_slot(executable, slot)? else {
        debug!("slot {} not present in {:?}", slot, executable);
        return Ok(None);
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ResourceError::Malformed {
            slot,
            reason: e.to_string(),
        })
}

/// Encode `value` as JSON and write it to a slot.
pub fn write_typed<T: Serialize>(
    store: &dyn ResourceStore,
    executable: &Path,
    slot: u16,
    value: &T,
) -> Result<(), ResourceError> {
    let bytes = serde_json::to_vec(value)?;
    store.write_slot(executable, slot, &bytes)
}

/// The store matching the executable format of the current platform.
pub fn platform_store() -> Box<dyn ResourceStore> {
    #[cfg(target_os = "windows")]
    {
        Box::new(crate::win32::Win32ResourceStore::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(crate::appended::AppendedResourceStore::new())
    }
}

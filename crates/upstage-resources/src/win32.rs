//! PE resource section backend.
//!
//! Slots are `RT_RCDATA` resources addressed by integer id with the neutral
//! language. Reading maps the file as a data-only module; writing goes
//! through the `BeginUpdateResource` / `EndUpdateResource` transaction.

#![cfg(target_os = "windows")]
#![allow(unsafe_code)] // Windows API calls require unsafe.

use std::path::Path;

use tracing::{debug, error, info};
use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::{FreeLibrary, HMODULE};
use windows::Win32::System::LibraryLoader::{
    BeginUpdateResourceW, EndUpdateResourceW, FindResourceW, LoadLibraryExW, LoadResource,
    LockResource, SizeofResource, UpdateResourceW, LOAD_LIBRARY_AS_DATAFILE,
    LOAD_LIBRARY_AS_IMAGE_RESOURCE,
};
use windows::Win32::UI::WindowsAndMessaging::RT_RCDATA;

use crate::error::ResourceError;
use crate::store::ResourceStore;

/// Neutral language id used for every slot.
const LANG_NEUTRAL: u16 = 0;

/// Slot store backed by the PE resource section.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32ResourceStore;

impl Win32ResourceStore {
    pub fn new() -> Self {
        Self
    }
}

/// Equivalent of `MAKEINTRESOURCEW`.
fn int_resource(id: u16) -> PCWSTR {
    PCWSTR(id as usize as *const u16)
}

/// A module loaded as data, released on drop.
struct DataModule(HMODULE);

impl DataModule {
    fn load(path: &Path) -> Result<Self, ResourceError> {
        let wide = HSTRING::from(path.as_os_str());
        unsafe {
            LoadLibraryExW(
                &wide,
                None,
                LOAD_LIBRARY_AS_DATAFILE | LOAD_LIBRARY_AS_IMAGE_RESOURCE,
            )
        }
        .map(DataModule)
        .map_err(|e| {
            ResourceError::file_access(path, std::io::Error::from_raw_os_error(e.code().0))
        })
    }
}

impl Drop for DataModule {
    fn drop(&mut self) {
        unsafe {
            let _ = FreeLibrary(self.0);
        }
    }
}

/// Copy `size` bytes of a locked resource.
///
/// A null lock means the resource exists but could not be mapped.
///
/// # Safety
/// A non-null `data` must be valid for reads of `size` bytes.
unsafe fn copy_locked(
    data: *const u8,
    size: usize,
    slot: u16,
    executable: &Path,
) -> Result<Vec<u8>, ResourceError> {
    if data.is_null() {
        return Err(ResourceError::Io(std::io::Error::other(format!(
            "resource {} of {:?} could not be locked",
            slot, executable
        ))));
    }
    Ok(std::slice::from_raw_parts(data, size).to_vec())
}

impl ResourceStore for Win32ResourceStore {
    fn read_slot(&self, executable: &Path, slot: u16) -> Result<Option<Vec<u8>>, ResourceError> {
        let module = DataModule::load(executable)?;

        unsafe {
            let info = FindResourceW(Some(module.0), int_resource(slot), RT_RCDATA);
            if info.0.is_null() {
                debug!("resource {} not found in {:?}", slot, executable);
                return Ok(None);
            }

            let size = SizeofResource(Some(module.0), info) as usize;
            let handle = LoadResource(Some(module.0), info).map_err(|e| {
                ResourceError::Io(std::io::Error::from_raw_os_error(e.code().0))
            })?;

            if size == 0 {
                return Ok(Some(Vec::new()));
            }

            let data = LockResource(handle) as *const u8;
            copy_locked(data, size, slot, executable).map(Some)
        }
    }

    fn write_slot(&self, executable: &Path, slot: u16, data: &[u8]) -> Result<(), ResourceError> {
        let wide = HSTRING::from(executable.as_os_str());

        let update = unsafe { BeginUpdateResourceW(&wide, false) }.map_err(|e| {
            error!("Could not open {:?} for resource update", executable);
            ResourceError::file_access(executable, std::io::Error::from_raw_os_error(e.code().0))
        })?;

        // A null pointer with zero length would delete the resource instead.
        let empty = [0u8; 1];
        let payload = if data.is_empty() { &empty[..] } else { data };

        let written = unsafe {
            UpdateResourceW(
                update,
                RT_RCDATA,
                int_resource(slot),
                LANG_NEUTRAL,
                Some(payload.as_ptr() as *const _),
                data.len() as u32,
            )
        };

        if let Err(e) = written {
            unsafe {
                let _ = EndUpdateResourceW(update, true);
            }
            return Err(ResourceError::update_failed(
                executable,
                format!("writing resource {} failed: {}", slot, e),
            ));
        }

        unsafe { EndUpdateResourceW(update, false) }.map_err(|e| {
            ResourceError::update_failed(executable, format!("commit failed: {}", e))
        })?;

        info!(
            "Wrote resource {} ({} bytes) to {:?}",
            slot,
            data.len(),
            executable
        );
        Ok(())
    }
}

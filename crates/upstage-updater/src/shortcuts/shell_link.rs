#![allow(unsafe_code)] // COM calls require unsafe.

use std::path::Path;

use windows::core::{Interface, HSTRING};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, IPersistFile, CLSCTX_INPROC_SERVER,
    COINIT_APARTMENTTHREADED,
};
use windows::Win32::UI::Shell::{IShellLinkW, ShellLink as ShellLinkClass};

use super::{ShellLink, ShortcutWriter};
use crate::error::UpdateError;

/// Writes `.lnk` files through the shell's `IShellLinkW`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellLinkWriter;

/// Balances a successful `CoInitializeEx` on this thread.
struct ComApartment {
    initialized: bool,
}

impl ComApartment {
    fn enter() -> Self {
        // S_FALSE (already initialized) still needs the matching uninitialize;
        // RPC_E_CHANGED_MODE means COM is usable but not ours to release.
        let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
        Self {
            initialized: hr.is_ok(),
        }
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.initialized {
            unsafe { CoUninitialize() };
        }
    }
}

fn com_error(link_path: &Path, e: windows::core::Error) -> UpdateError {
    UpdateError::ShortcutCreationFailure(format!("{}: {}", link_path.display(), e))
}

impl ShortcutWriter for ShellLinkWriter {
    fn link_extension(&self) -> &str {
        "lnk"
    }

    fn write(&self, link_path: &Path, link: &ShellLink) -> Result<(), UpdateError> {
        let _apartment = ComApartment::enter();

        unsafe {
            let shell_link: IShellLinkW =
                CoCreateInstance(&ShellLinkClass, None, CLSCTX_INPROC_SERVER)
                    .map_err(|e| com_error(link_path, e))?;

            shell_link
                .SetPath(&HSTRING::from(link.target.as_os_str()))
                .map_err(|e| com_error(link_path, e))?;
            if let Some(description) = &link.description {
                shell_link
                    .SetDescription(&HSTRING::from(description.as_str()))
                    .map_err(|e| com_error(link_path, e))?;
            }
            if let Some(arguments) = &link.arguments {
                shell_link
                    .SetArguments(&HSTRING::from(arguments.as_str()))
                    .map_err(|e| com_error(link_path, e))?;
            }
            if let Some(icon) = &link.icon_path {
                shell_link
                    .SetIconLocation(&HSTRING::from(icon.as_os_str()), link.icon_index)
                    .map_err(|e| com_error(link_path, e))?;
            }
            if let Some(dir) = &link.working_directory {
                shell_link
                    .SetWorkingDirectory(&HSTRING::from(dir.as_os_str()))
                    .map_err(|e| com_error(link_path, e))?;
            }

            let file: IPersistFile = shell_link.cast().map_err(|e| com_error(link_path, e))?;
            file.Save(&HSTRING::from(link_path.as_os_str()), true)
                .map_err(|e| com_error(link_path, e))?;
        }
        Ok(())
    }
}

//! # upstage-resources
//!
//! Reads and writes numbered binary slots inside an executable, so a single
//! compiled installer can be specialised after the build by stamping its
//! configuration into it.
//!
//! Two backends implement [`ResourceStore`]:
//! - [`Win32ResourceStore`] on Windows, using the PE resource section (`RT_RCDATA`)
//! - [`AppendedResourceStore`] everywhere, storing a slot table after the executable image
//!
//! A missing slot is reported as `Ok(None)`, never as an error, and is always
//! distinguishable from a slot holding zero bytes.

pub mod appended;
pub mod error;
pub mod slot;
pub mod store;
#[cfg(target_os = "windows")]
pub mod win32;

pub use appended::AppendedResourceStore;
pub use error::ResourceError;
pub use slot::{EmbeddedResources, InstallerConfig, Slot};
pub use store::{platform_store, read_typed, write_typed, ResourceStore};
#[cfg(target_os = "windows")]
pub use win32::Win32ResourceStore;

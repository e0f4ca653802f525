//! Property-based tests for upstage-updater.
//!
//! # Properties Tested
//!
//! - A minimum version excludes itself and everything older
//! - Checking returns every version once, newest first
//! - `app_path` is injective and depends only on its inputs
//! - Applying a version twice leaves the same files as applying it once

#![cfg(test)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use proptest::prelude::*;
use semver::{Prerelease, Version};

use crate::manager::{DownloadedPackage, UpdateManager};
use crate::package::{PackageContents, PackageFile, PackageRecord, UpdateInfo};
use crate::paths::{app_path, PathLayout};
use crate::repository::MemoryRepository;

// =============================================================================
// Generators
// =============================================================================

/// Generate a random release version.
fn arb_version() -> impl Strategy<Value = Version> {
    (0u64..20, 0u64..20, 0u64..20).prop_map(|(major, minor, patch)| Version::new(major, minor, patch))
}

/// Generate a version that may carry a prerelease label.
fn arb_any_version() -> impl Strategy<Value = Version> {
    (arb_version(), prop::option::of("(alpha|beta|rc)(\\.[1-9])?")).prop_map(|(mut v, pre)| {
        if let Some(pre) = pre {
            v.pre = Prerelease::new(&pre).unwrap();
        }
        v
    })
}

/// Generate a package file layout: (path, contents).
fn arb_files() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::btree_map(
        prop_oneof![
            "lib/net40/[a-z]{1,8}\\.(dll|exe)",
            "lib/net40/[a-z]{1,4}/[a-z]{1,8}\\.dll",
            "content/[a-z]{1,8}\\.txt",
            "lib/net45/[a-z]{1,8}\\.dll",
        ],
        prop::collection::vec(any::<u8>(), 0..64),
        1..12,
    )
    .prop_map(|files| files.into_iter().collect())
}

fn memory_repo(versions: &[Version]) -> MemoryRepository {
    let repo = MemoryRepository::new("memory");
    for v in versions {
        repo.add(PackageRecord::new("App", v.clone()), Vec::new());
    }
    repo
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn list_files(dir: &Path) -> BTreeSet<(String, Vec<u8>)> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(dir).unwrap().to_string_lossy().replace('\\', "/");
            (relative, std::fs::read(e.path()).unwrap())
        })
        .collect()
}

// =============================================================================
// Version selection
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// For a < b, checking with current version a over {a, b} yields exactly {b}.
    #[test]
    fn prop_minimum_version_is_exclusive(a in arb_version(), b in arb_version()) {
        prop_assume!(a < b);
        let base = tempfile::tempdir().unwrap();
        let layout = PathLayout::resolve("App", Some(base.path().to_path_buf()), None);
        let manager = UpdateManager::new("App", Arc::new(memory_repo(&[a.clone(), b.clone()])), layout)
            .with_current_version(Some(a));

        let check = runtime().block_on(manager.check_for_updates(false)).unwrap();
        let versions: Vec<Version> = check.candidates().iter().map(|c| c.version().clone()).collect();
        prop_assert_eq!(versions, vec![b]);
    }

    /// Without a minimum and with prereleases, every version comes back once, descending.
    #[test]
    fn prop_check_returns_all_descending(versions in prop::collection::vec(arb_any_version(), 1..12)) {
        let base = tempfile::tempdir().unwrap();
        let layout = PathLayout::resolve("App", Some(base.path().to_path_buf()), None);
        let manager = UpdateManager::new("App", Arc::new(memory_repo(&versions)), layout);

        let check = runtime().block_on(manager.check_for_updates(true)).unwrap();
        let found: Vec<Version> = check.candidates().iter().map(|c| c.version().clone()).collect();

        let mut expected: Vec<Version> = versions.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        expected.reverse();
        prop_assert_eq!(&found, &expected);
        prop_assert_eq!(check.latest().map(|l| l.version().clone()), versions.iter().max().cloned());
    }
}

// =============================================================================
// Layout
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Distinct versions map to distinct directories; equal inputs to equal paths.
    #[test]
    fn prop_app_path_is_injective(v1 in arb_any_version(), v2 in arb_any_version()) {
        let base = Path::new("/base");
        prop_assert_eq!(app_path(base, &v1), app_path(base, &v1));
        if v1 != v2 {
            prop_assert_ne!(app_path(base, &v1), app_path(base, &v2));
        }
    }
}

// =============================================================================
// Apply
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Applying the same version twice gives the same files as applying once.
    #[test]
    fn prop_apply_is_idempotent(version in arb_version(), files in arb_files()) {
        let base = tempfile::tempdir().unwrap();
        let layout = PathLayout::resolve("App", Some(base.path().to_path_buf()), None);
        let manager = UpdateManager::new("App", Arc::new(MemoryRepository::new("memory")), layout);

        let package = DownloadedPackage {
            info: UpdateInfo::new(PackageRecord::new("App", version)),
            contents: PackageContents::new(
                files.iter().map(|(path, data)| PackageFile::from_bytes(path, data.clone())).collect(),
            ),
        };

        let rt = runtime();
        let first = rt.block_on(manager.apply(package.clone())).unwrap();
        let once = list_files(&first.app_dir);
        let second = rt.block_on(manager.apply(package)).unwrap();
        let twice = list_files(&second.app_dir);

        prop_assert_eq!(first.app_dir, second.app_dir);
        prop_assert_eq!(once, twice);
    }
}

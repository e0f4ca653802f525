//! Patcher commands against the portable slot store.

use std::path::Path;

use upstage_patcher::{run_from, ExitCode};
use upstage_resources::{AppendedResourceStore, EmbeddedResources, InstallerConfig, Slot, ResourceStore};
use upstage_updater::PackageBundle;

fn installer_image(dir: &Path) -> std::path::PathBuf {
    let exe = dir.join("setup.exe");
    std::fs::write(&exe, vec![0x90u8; 256]).unwrap();
    exe
}

fn args<'a>(rest: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec!["upstage-patcher"];
    args.extend_from_slice(rest);
    args
}

#[test]
fn test_missing_installer_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.exe");
    let missing = missing.to_str().unwrap();

    let code = run_from(args(&["patch", missing, "Ledger", "https://feed"]), &AppendedResourceStore::new());

    assert_eq!(code, ExitCode::FileNotFound);
    assert!(!dir.path().join("nope.exe").exists());
}

#[test]
fn test_missing_baseline_exits_2_and_leaves_installer_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let exe = installer_image(dir.path());
    let before = std::fs::read(&exe).unwrap();
    let baseline = dir.path().join("baseline.upsb");

    let code = run_from(
        args(&["patch", exe.to_str().unwrap(), "Ledger", "https://feed", baseline.to_str().unwrap()]),
        &AppendedResourceStore::new(),
    );

    assert_eq!(code, ExitCode::FileNotFound);
    assert_eq!(std::fs::read(&exe).unwrap(), before);
}

#[test]
fn test_wrong_argument_count_exits_1() {
    let code = run_from(args(&["patch", "setup.exe", "Ledger"]), &AppendedResourceStore::new());
    assert_eq!(code, ExitCode::Usage);
}

#[test]
fn test_patch_writes_config_only() {
    let dir = tempfile::tempdir().unwrap();
    let exe = installer_image(dir.path());
    let store = AppendedResourceStore::new();

    let code = run_from(args(&["patch", exe.to_str().unwrap(), "Ledger", r"\\share\feed"]), &store);

    assert_eq!(code, ExitCode::Success);
    let resources = EmbeddedResources::load(&store, &exe).unwrap();
    assert_eq!(resources.installer_config, Some(InstallerConfig::new("Ledger", r"\\share\feed")));
    assert_eq!(resources.baseline_package, None);
    assert_eq!(store.read_slot(&exe, Slot::BaselinePackage.id()).unwrap(), None);
}

#[test]
fn test_bundle_then_patch_embeds_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let package_dir = dir.path().join("feed").join("Ledger");
    std::fs::create_dir_all(package_dir.join("1.0.0").join("lib").join("net40")).unwrap();
    std::fs::write(
        package_dir.join("index.json"),
        r#"[{"id": "Ledger", "version": "1.0", "files": [{"path": "lib/net40/Ledger.exe"}]}]"#,
    )
    .unwrap();
    std::fs::write(package_dir.join("1.0.0").join("lib").join("net40").join("Ledger.exe"), b"MZ").unwrap();

    let store = AppendedResourceStore::new();
    let feed = dir.path().join("feed");
    let out = dir.path().join("out").join("ledger.upsb");
    let code = run_from(
        args(&["bundle", feed.to_str().unwrap(), "Ledger", "1.0", out.to_str().unwrap()]),
        &store,
    );
    assert_eq!(code, ExitCode::Success);

    let exe = installer_image(dir.path());
    let code = run_from(
        args(&["patch", exe.to_str().unwrap(), "Ledger", feed.to_str().unwrap(), out.to_str().unwrap()]),
        &store,
    );
    assert_eq!(code, ExitCode::Success);

    let baseline = EmbeddedResources::load(&store, &exe).unwrap().baseline_package.unwrap();
    assert_eq!(baseline, std::fs::read(&out).unwrap());
    let bundle = PackageBundle::decode(&baseline).unwrap();
    assert_eq!(bundle.record().id, "Ledger");
    assert_eq!(bundle.files().len(), 1);
}

#[test]
fn test_bundle_of_missing_feed_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let feed = dir.path().join("missing-feed");
    let out = dir.path().join("ledger.upsb");

    let code = run_from(
        args(&["bundle", feed.to_str().unwrap(), "Ledger", "1.0", out.to_str().unwrap()]),
        &AppendedResourceStore::new(),
    );

    assert_eq!(code, ExitCode::FileNotFound);
    assert!(!out.exists());
}

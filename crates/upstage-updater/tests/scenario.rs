//! Version selection against the published feed scenario:
//! `{A 1.0}, {A 1.1}, {A 1.2-beta}` with current version 1.1.

use std::path::Path;
use std::sync::Arc;

use upstage_updater::{
    parse_version, FileEntry, FolderRepository, MemoryRepository, PackageRecord, PackageRepository,
    PathLayout, UpdateManager,
};

fn records() -> Vec<PackageRecord> {
    ["1.0", "1.1", "1.2-beta"]
        .iter()
        .map(|v| PackageRecord::new("A", parse_version(v).unwrap()))
        .collect()
}

fn manager(base: &Path, repository: Arc<dyn PackageRepository>) -> UpdateManager {
    let layout = PathLayout::resolve("A", Some(base.to_path_buf()), None);
    UpdateManager::new("A", repository, layout).with_current_version(Some(parse_version("1.1").unwrap()))
}

#[tokio::test]
async fn test_memory_feed_scenario() {
    let repo = MemoryRepository::new("memory");
    for record in records() {
        repo.add(record, Vec::new());
    }
    let base = tempfile::tempdir().unwrap();
    let manager = manager(base.path(), Arc::new(repo));

    let stable = manager.check_for_updates(false).await.unwrap();
    assert!(stable.is_empty());
    assert!(stable.latest().is_none());

    let with_prereleases = manager.check_for_updates(true).await.unwrap();
    let latest = with_prereleases.latest().unwrap();
    assert_eq!(latest.version().to_string(), "1.2.0-beta");
    assert!(!latest.is_release_version());
    assert_eq!(with_prereleases.len(), 1);
}

#[tokio::test]
async fn test_folder_feed_scenario() {
    let feed = tempfile::tempdir().unwrap();
    let package_dir = feed.path().join("A");
    std::fs::create_dir_all(&package_dir).unwrap();

    // Short versions as a NuGet-style feed would publish them.
    std::fs::write(
        package_dir.join("index.json"),
        r#"[
            {"id": "A", "version": "1.0", "authors": ["Ada"]},
            {"id": "A", "version": "1.1", "listed": false},
            {"id": "A", "version": "1.2-beta", "files": [{"path": "lib\\net40\\A.exe", "size": 2}]}
        ]"#,
    )
    .unwrap();
    let beta_dir = package_dir.join("1.2.0-beta").join("lib").join("net40");
    std::fs::create_dir_all(&beta_dir).unwrap();
    std::fs::write(beta_dir.join("A.exe"), b"MZ").unwrap();

    let base = tempfile::tempdir().unwrap();
    let manager = manager(base.path(), Arc::new(FolderRepository::new(feed.path())));

    assert!(manager.check_for_updates(false).await.unwrap().is_empty());

    let check = manager.check_for_updates(true).await.unwrap();
    let latest = check.latest().unwrap().clone();
    assert_eq!(latest.version(), &parse_version("1.2-beta").unwrap());
    assert_eq!(latest.record().files, vec![FileEntry { path: "lib/net40/A.exe".into(), size: Some(2) }]);

    let downloaded = manager.download(&latest, None).await.unwrap();
    let applied = manager.apply(downloaded).await.unwrap();
    assert_eq!(applied.app_dir, base.path().join("app-1.2.0-beta"));
    assert_eq!(std::fs::read(applied.app_dir.join("A.exe")).unwrap(), b"MZ");
}

#[tokio::test]
async fn test_unlisted_versions_are_candidates() {
    let repo = MemoryRepository::new("memory");
    for mut record in records() {
        record.listed = false;
        repo.add(record, Vec::new());
    }
    let base = tempfile::tempdir().unwrap();
    let layout = PathLayout::resolve("A", Some(base.path().to_path_buf()), None);
    let manager = UpdateManager::new("A", Arc::new(repo), layout);

    let check = manager.check_for_updates(false).await.unwrap();
    let versions: Vec<String> = check.candidates().iter().map(|c| c.version().to_string()).collect();
    assert_eq!(versions, vec!["1.1.0", "1.0.0"]);
}

use std::fs;

use sigpatch::inspect::extract_patch_info;
use sigpatch::{ErrorKind, Fingerprint, PatcherConfig, Patcher, Version};
use tempfile::TempDir;

use crate::common::*;

#[test]
fn metadata_describes_the_patch() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(3);
    let target = write_target(&dir, "server.js", &body);
    let catalog = catalog_for(&body);
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();

    let outcome = patcher.patch(&target, false).unwrap();
    let info = patcher.extract_patch_info(&target).unwrap();

    assert_eq!(info, outcome.metadata);
    assert_eq!(info.version, Version::engine());
    assert_eq!(info.occurrences, 3);
    assert_eq!(info.entry, Some(RELEASE));
    assert!(!info.heuristic);
    assert_eq!(info.original_fingerprint, Some(Fingerprint::of(&body)));
}

#[test]
fn metadata_renders_as_json() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(1);
    let target = write_target(&dir, "server.js", &body);
    let catalog = catalog_for(&body);
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();
    patcher.patch(&target, false).unwrap();

    let rendered = patcher.extract_patch_info(&target).unwrap().to_json_pretty().unwrap();
    let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(value["occurrences"], 1);
    assert!(value["timestamp"].is_string());
    assert_eq!(value["entry"], "2.4.0");
}

#[test]
fn unpatched_file_has_no_metadata() {
    let dir = TempDir::new().unwrap();
    let target = write_target(&dir, "server.js", &fixture_body(1));

    let err = extract_patch_info(&target, &PatcherConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotPatched);
}

#[test]
fn inspector_needs_no_catalog() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(2);
    let target = write_target(&dir, "server.js", &body);
    let catalog = catalog_for(&body);
    Patcher::new(&catalog, PatcherConfig::default()).unwrap()
        .patch(&target, false)
        .unwrap();

    let info = extract_patch_info(&target, &PatcherConfig::default()).unwrap();
    assert_eq!(info.occurrences, 2);
}

#[test]
fn record_from_older_engine_is_readable() {
    let dir = TempDir::new().unwrap();
    let mut content = fixture_body(1);
    content.extend_from_slice(b"\n// sigpatch-metadata: {\"version\":\"0.0.9\",\"occurrences\":1,\"timestamp\":1600000000}\n");
    let target = write_target(&dir, "server.js", &content);

    let info = extract_patch_info(&target, &PatcherConfig::default()).unwrap();
    assert_eq!(info.version, Version::new(0, 0, 9));
    assert_eq!(info.occurrences, 1);
    assert_eq!(info.timestamp.timestamp(), 1_600_000_000);
    assert!(info.entry.is_none());
    assert!(info.original_fingerprint.is_none());

    let patcher_catalog = catalog_for(&fixture_body(1));
    let patcher = Patcher::new(&patcher_catalog, PatcherConfig::default()).unwrap();
    assert!(patcher.is_outdated(&info));
    assert_eq!(fs::read(&target).unwrap(), content);
}

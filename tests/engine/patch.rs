use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sigpatch::catalog;
use sigpatch::{
    ErrorKind, PatchError, PatchMetadata, PatchStage, PatcherConfig, Patcher, PatternPair,
    SignatureCatalog, SignatureEntry, Version,
};
use tempfile::TempDir;

use crate::common::*;

#[test]
fn replaces_every_occurrence() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(3);
    let target = write_target(&dir, "server.js", &body);
    let catalog = catalog_for(&body);
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();

    let outcome = patcher.patch(&target, false).unwrap();
    assert_eq!(outcome.occurrences, 3);
    assert_eq!(outcome.metadata.occurrences, 3);

    let patched = fs::read(&target).unwrap();
    assert_eq!(count(&patched, SEARCH), 0);
    assert_eq!(count(&patched, REPLACE), 3);

    assert_eq!(outcome.backup_path, patcher.backup_path(&target).unwrap());
    assert_eq!(fs::read(&outcome.backup_path).unwrap(), body);
    assert_eq!(
        dir_listing(dir.path()),
        ["server.js", "server.js.sigpatch-bak"]
    );
}

#[test]
fn second_patch_reports_existing_metadata() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(2);
    let target = write_target(&dir, "server.js", &body);
    let catalog = catalog_for(&body);
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();

    let first = patcher.patch(&target, false).unwrap();
    assert!(first.occurrences > 0);
    let patched = fs::read(&target).unwrap();

    let err = patcher.patch(&target, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyPatched);
    assert!(!err.is_fatal());
    assert_eq!(err.metadata().unwrap().occurrences, first.occurrences);

    // Neither the target nor the backup changed.
    assert_eq!(fs::read(&target).unwrap(), patched);
    assert_eq!(fs::read(patcher.backup_path(&target).unwrap()).unwrap(), body);
}

#[test]
fn unsupported_target_is_rejected() {
    let dir = TempDir::new().unwrap();
    let content = b"/* some other bundle */\nmodule.exports = {};\n";
    let target = write_target(&dir, "server.js", content);
    let catalog = catalog_for(&fixture_body(1));
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();

    let err = patcher.patch(&target, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    match &err {
        PatchError::Unsupported { reason, .. } => assert!(reason.contains("2.4.0")),
        other => panic!("unexpected {:?}", other),
    }

    let err = patcher.patch(&target, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PatternNotFound);

    assert_eq!(fs::read(&target).unwrap(), content);
    assert_eq!(dir_listing(dir.path()), ["server.js"]);
}

#[test]
fn heuristic_patch_of_unknown_release() {
    let dir = TempDir::new().unwrap();
    let mut body = fixture_body(2);
    body.extend_from_slice(b"// rebuilt\n");
    let target = write_target(&dir, "server.js", &body);
    let catalog = catalog_for(&fixture_body(2));
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();

    let outcome = patcher.patch(&target, true).unwrap();
    assert_eq!(outcome.occurrences, 2);
    assert!(outcome.metadata.heuristic);
    assert!(outcome.metadata.entry.is_none());
    assert_eq!(fs::read(&outcome.backup_path).unwrap(), body);
}

#[test]
fn empty_catalog_is_unsupported_even_when_allowed() {
    let dir = TempDir::new().unwrap();
    let target = write_target(&dir, "server.js", &fixture_body(1));
    let catalog = SignatureCatalog::default();
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();

    let err = patcher.patch(&target, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[test]
fn failure_before_commit_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(3);
    let target = write_target(&dir, "server.js", &body);
    let catalog = catalog_for(&body);
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_in_hook = Arc::clone(&seen);

    let patcher = Patcher::new(&catalog, PatcherConfig::default())
        .unwrap()
        .on_stage(move |stage, _| {
            if stage == PatchStage::BeforeCommit {
                seen_in_hook.fetch_add(1, Ordering::SeqCst);
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "simulated crash"));
            }
            Ok(())
        });

    let err = patcher.patch(&target, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert_eq!(fs::read(&target).unwrap(), body);
    assert_eq!(dir_listing(dir.path()), ["server.js"]);

    // The target is still patchable afterwards.
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();
    assert_eq!(patcher.patch(&target, false).unwrap().occurrences, 3);
}

#[test]
fn failure_after_backup_keeps_existing_backup() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(1);
    let target = write_target(&dir, "server.js", &body);
    let backup = write_target(&dir, "server.js.sigpatch-bak", &body);
    let catalog = catalog_for(&body);

    let patcher = Patcher::new(&catalog, PatcherConfig::default())
        .unwrap()
        .on_stage(|stage, _| {
            if stage == PatchStage::BackupWritten {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "simulated crash"));
            }
            Ok(())
        });

    assert!(patcher.patch(&target, false).is_err());
    assert_eq!(fs::read(&target).unwrap(), body);
    assert_eq!(fs::read(&backup).unwrap(), body);
}

#[test]
fn failure_restores_replaced_stale_backup() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(1);
    let target = write_target(&dir, "server.js", &body);
    let backup = write_target(&dir, "server.js.sigpatch-bak", b"older release");
    let catalog = catalog_for(&body);

    let patcher = Patcher::new(&catalog, PatcherConfig::default())
        .unwrap()
        .on_stage(|stage, _| {
            if stage == PatchStage::BeforeCommit {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "simulated crash"));
            }
            Ok(())
        });

    assert!(patcher.patch(&target, false).is_err());
    assert_eq!(fs::read(&target).unwrap(), body);
    assert_eq!(fs::read(&backup).unwrap(), b"older release");
}

#[test]
fn stale_backup_is_replaced_on_success() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(1);
    let target = write_target(&dir, "server.js", &body);
    let backup = write_target(&dir, "server.js.sigpatch-bak", b"older release");
    let catalog = catalog_for(&body);
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();

    patcher.patch(&target, false).unwrap();
    assert_eq!(fs::read(&backup).unwrap(), body);
}

#[test]
fn occurrence_mismatch_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(2);
    let target = write_target(&dir, "server.js", &body);
    let catalog = SignatureCatalog::new(vec![SignatureEntry::new(
        RELEASE,
        vec![PatternPair::new(SEARCH, REPLACE).expecting(1)],
    )
    .with_fingerprint(sigpatch::Fingerprint::of(&body))])
    .unwrap();
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();

    let err = patcher.patch(&target, false).unwrap_err();
    assert!(matches!(
        err,
        PatchError::OccurrenceMismatch { expected: 1, found: 2, .. }
    ));
    assert_eq!(err.kind(), ErrorKind::PatternNotFound);
    assert_eq!(fs::read(&target).unwrap(), body);
    assert_eq!(dir_listing(dir.path()), ["server.js"]);
}

#[test]
fn custom_suffix_and_marker() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(1);
    let target = write_target(&dir, "server.js", &body);
    let catalog = catalog_for(&body);
    let config = PatcherConfig::from_json_str(
        r#"{"backup":{"suffix":".orig"},"metadata":{"marker":"/* patched: "}}"#,
    )
    .unwrap();
    let patcher = Patcher::new(&catalog, config).unwrap();

    patcher.patch(&target, false).unwrap();
    assert_eq!(dir_listing(dir.path()), ["server.js", "server.js.orig"]);
    let patched = fs::read(&target).unwrap();
    assert_eq!(count(&patched, b"\n/* patched: {"), 1);
    assert!(patcher.extract_patch_info(&target).is_ok());
}

#[test]
fn repatch_restores_then_patches() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(2);
    let target = write_target(&dir, "server.js", &body);
    let catalog = catalog_for(&body);
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();

    patcher.patch(&target, false).unwrap();
    let outcome = patcher.repatch(&target, false).unwrap();

    assert_eq!(outcome.restore.restored, [target.clone()]);
    assert_eq!(outcome.patch.occurrences, 2);
    assert_eq!(fs::read(patcher.backup_path(&target).unwrap()).unwrap(), body);
    assert_eq!(patcher.extract_patch_info(&target).unwrap(), outcome.patch.metadata);
}

#[test]
fn outdated_metadata_is_detected() {
    let catalog = SignatureCatalog::default();
    let patcher = Patcher::new(&catalog, PatcherConfig::default()).unwrap();

    let mut metadata = PatchMetadata::default();
    assert!(patcher.is_outdated(&metadata));

    metadata.version = Version::engine();
    assert!(!patcher.is_outdated(&metadata));

    metadata.version = Version::new(99, 0, 0);
    assert!(!patcher.is_outdated(&metadata));
}

#[test]
fn global_catalog_patcher() {
    let dir = TempDir::new().unwrap();
    let body = fixture_body(1);
    let target = write_target(&dir, "server.js", &body);

    catalog::install_global(catalog_for(&body)).unwrap();
    assert!(catalog::install_global(SignatureCatalog::default()).is_err());

    let patcher = Patcher::with_global(PatcherConfig::default()).unwrap();
    assert_eq!(patcher.catalog().len(), 1);
    assert_eq!(patcher.patch(&target, false).unwrap().occurrences, 1);
}

//! Restore engine: puts backed-up original bytes back in place.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::error::{IoOperation, PatchError, Result};
use crate::io::{self, StagedWrite};

/// Outcome of restoring a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Targets restored from their backups, in enumeration order.
    pub restored: Vec<PathBuf>,
    /// Backups whose target no longer exists; left untouched.
    pub orphans: Vec<PathBuf>,
}

impl RestoreReport {
    pub fn is_empty(&self) -> bool {
        self.restored.is_empty()
    }
}

/// Backup artifacts in `dir`, sorted by file name.
pub fn find_backups(dir: &Path, config: &BackupConfig) -> Result<Vec<PathBuf>> {
    config.validate()?;
    let entries = fs::read_dir(dir).map_err(|e| PatchError::io(dir, IoOperation::ReadDir, e))?;

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PatchError::io(dir, IoOperation::ReadDir, e))?;
        let path = entry.path();
        let is_file = entry
            .file_type()
            .map_err(|e| PatchError::io(&path, IoOperation::Metadata, e))?
            .is_file();
        if is_file && io::target_for_backup(&path, &config.suffix).is_some() {
            backups.push(path);
        }
    }
    backups.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(backups)
}

/// Restores every target in `dir` that has a backup artifact.
///
/// Backups without a target are reported as orphans. An empty report means
/// there was nothing to restore.
pub fn restore_directory<P: AsRef<Path>>(dir: P, config: &BackupConfig) -> Result<RestoreReport> {
    let dir = dir.as_ref();
    let mut report = RestoreReport::default();

    for backup in find_backups(dir, config)? {
        let Some(target) = io::target_for_backup(&backup, &config.suffix) else {
            continue;
        };
        if !target.is_file() {
            warn!(
                backup = %backup.display(),
                target = %target.display(),
                "Backup has no target, skipping"
            );
            report.orphans.push(backup);
            continue;
        }
        restore_pair(&target, &backup)?;
        report.restored.push(target);
    }

    info!(
        dir = %dir.display(),
        restored = report.restored.len(),
        orphans = report.orphans.len(),
        "Directory restore finished"
    );
    Ok(report)
}

/// Restores a single target from its backup artifact.
pub fn restore_file<P: AsRef<Path>>(target: P, config: &BackupConfig) -> Result<PathBuf> {
    let target = target.as_ref();
    config.validate()?;
    let backup = io::backup_path(target, &config.suffix)?;
    if !backup.is_file() {
        return Err(PatchError::io(
            &backup,
            IoOperation::Read,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no backup for target"),
        ));
    }
    restore_pair(target, &backup)?;
    Ok(target.to_path_buf())
}

fn restore_pair(target: &Path, backup: &Path) -> Result<()> {
    let original = fs::read(backup).map_err(|e| PatchError::io(backup, IoOperation::Read, e))?;
    StagedWrite::new(target, &original)?.commit()?;
    io::remove_if_exists(backup)?;
    debug!(
        target = %target.display(),
        bytes = original.len(),
        "Target restored"
    );
    Ok(())
}

//! Patch engine.
//!
//! Applies the substitutions of a matched signature entry to an in-memory
//! copy of the target, keeps the original bytes in a backup artifact beside
//! it, and commits the result with a metadata trailer through an atomic
//! rename. Re-patching is a restore followed by a patch.

pub mod replace;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{self, SignatureCatalog, SignatureEntry};
use crate::config::PatcherConfig;
use crate::core::{Fingerprint, PatchMetadata, Version};
use crate::error::{IoOperation, PatchError, Result};
use crate::inspect;
use crate::io::{self, BinaryFile, StagedWrite};
use crate::restore::{self, RestoreReport};
use crate::scanner::{Classification, Scanner};

/// Points in `Patcher::patch` at which a stage hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStage {
    /// Target classified and substitutions computed; nothing written yet.
    Prepared,
    /// Backup artifact is on disk.
    BackupWritten,
    /// Patched content is staged in a temporary file, not yet renamed.
    BeforeCommit,
}

type StageHook = Box<dyn Fn(PatchStage, &Path) -> std::io::Result<()> + Send + Sync>;

/// Result of a successful patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
    pub path: PathBuf,
    pub occurrences: usize,
    pub metadata: PatchMetadata,
    pub backup_path: PathBuf,
}

/// Result of `Patcher::repatch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepatchOutcome {
    pub restore: RestoreReport,
    pub patch: PatchOutcome,
}

/// State of the backup artifact before this patch touched it.
enum BackupState {
    Created,
    Kept,
    Replaced(Vec<u8>),
}

/// Patch, restore and inspect operations bound to one catalog and config.
pub struct Patcher<'a> {
    catalog: &'a SignatureCatalog,
    config: PatcherConfig,
    hook: Option<StageHook>,
}

impl<'a> Patcher<'a> {
    /// Fails with `InvalidConfig` when `config` does not pass
    /// [`PatcherConfig::validate`].
    pub fn new(catalog: &'a SignatureCatalog, config: PatcherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            config,
            hook: None,
        })
    }

    /// Registers a callback run at each `PatchStage`. An error returned by
    /// the hook aborts the patch as an I/O failure and rolls back.
    pub fn on_stage<F>(mut self, hook: F) -> Self
    where
        F: Fn(PatchStage, &Path) -> std::io::Result<()> + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> &PatcherConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        self.catalog
    }

    pub fn scanner(&self) -> Scanner<'_> {
        Scanner::new(self.catalog, &self.config)
    }

    pub fn classify<P: AsRef<Path>>(&self, path: P) -> Result<Classification> {
        self.scanner().classify(path)
    }

    /// Path of the backup artifact for `target`.
    pub fn backup_path<P: AsRef<Path>>(&self, target: P) -> Result<PathBuf> {
        io::backup_path(target.as_ref(), &self.config.backup.suffix)
    }

    /// Patches `path` in place.
    ///
    /// With `allow_unsupported`, a target that matches no entry is patched
    /// with the patterns of the newest entry; the patterns must still be found.
    pub fn patch<P: AsRef<Path>>(&self, path: P, allow_unsupported: bool) -> Result<PatchOutcome> {
        let path = path.as_ref();
        let file = BinaryFile::load(path, &self.config.io)?;

        let (entry, heuristic) = match self.scanner().classify_file(&file) {
            Classification::AlreadyPatched(metadata) => {
                info!(
                    path = %path.display(),
                    patcher = %metadata.version,
                    occurrences = metadata.occurrences,
                    "Target is already patched"
                );
                return Err(PatchError::AlreadyPatched {
                    path: path.to_path_buf(),
                    metadata: Box::new(metadata),
                });
            }
            Classification::Unpatched { entry, .. } => (entry, false),
            Classification::Unsupported { fingerprint } => {
                (self.fallback_entry(path, fingerprint, allow_unsupported)?, true)
            }
        };

        let (mut patched, occurrences) = apply_patterns(path, file.data(), &entry, heuristic)?;
        let metadata = PatchMetadata::new(
            occurrences,
            (!heuristic).then(|| entry.version.clone()),
            file.fingerprint().clone(),
        );
        patched.extend(metadata.encode_trailer(&self.config.metadata.marker)?);
        ensure_patterns_gone(path, &patched, &entry)?;
        self.stage(PatchStage::Prepared, path)?;

        let backup_path = self.backup_path(path)?;
        let backup = self.write_backup(&backup_path, file.data())?;

        if let Err(e) = self.commit(path, &patched) {
            self.roll_back_backup(&backup_path, backup);
            return Err(e);
        }

        info!(
            path = %path.display(),
            release = %entry.version,
            heuristic = heuristic,
            occurrences = occurrences,
            "Target patched"
        );

        Ok(PatchOutcome {
            path: path.to_path_buf(),
            occurrences,
            metadata,
            backup_path,
        })
    }

    /// Restores the target's directory, then patches the target again.
    pub fn repatch<P: AsRef<Path>>(&self, path: P, allow_unsupported: bool) -> Result<RepatchOutcome> {
        let path = path.as_ref();
        let restore = self.restore_directory(parent_dir(path))?;
        let patch = self.patch(path, allow_unsupported)?;
        Ok(RepatchOutcome { restore, patch })
    }

    pub fn restore_directory<P: AsRef<Path>>(&self, dir: P) -> Result<RestoreReport> {
        restore::restore_directory(dir, &self.config.backup)
    }

    pub fn restore_file<P: AsRef<Path>>(&self, target: P) -> Result<PathBuf> {
        restore::restore_file(target, &self.config.backup)
    }

    pub fn extract_patch_info<P: AsRef<Path>>(&self, path: P) -> Result<PatchMetadata> {
        inspect::extract_patch_info(path, &self.config)
    }

    /// True when this engine is strictly newer than the one that wrote `metadata`.
    pub fn is_outdated(&self, metadata: &PatchMetadata) -> bool {
        Version::engine() > metadata.version
    }

    fn fallback_entry(
        &self,
        path: &Path,
        fingerprint: Fingerprint,
        allow_unsupported: bool,
    ) -> Result<SignatureEntry> {
        let unsupported = |reason: String| PatchError::Unsupported {
            path: path.to_path_buf(),
            fingerprint: fingerprint.clone(),
            reason,
        };

        if !allow_unsupported {
            let reason = match self.catalog.minimum_supported() {
                Some(min) => format!(
                    "no known release matches; the oldest supported release is {}",
                    min.version
                ),
                None => "no known release matches".to_string(),
            };
            return Err(unsupported(reason));
        }

        match self.catalog.latest() {
            Some(entry) => {
                warn!(
                    path = %path.display(),
                    fingerprint = fingerprint.short(),
                    release = %entry.version,
                    "Unrecognized target, trying the newest signature"
                );
                Ok(entry.clone())
            }
            None => Err(unsupported("the signature catalog is empty".to_string())),
        }
    }

    fn stage(&self, stage: PatchStage, path: &Path) -> Result<()> {
        match &self.hook {
            Some(hook) => hook(stage, path).map_err(|e| PatchError::io(path, IoOperation::Write, e)),
            None => Ok(()),
        }
    }

    fn write_backup(&self, backup_path: &Path, original: &[u8]) -> Result<BackupState> {
        let state = match fs::read(backup_path) {
            Ok(existing) if existing == original => {
                debug!(backup = %backup_path.display(), "Backup already holds the original");
                return Ok(BackupState::Kept);
            }
            Ok(existing) => {
                warn!(
                    backup = %backup_path.display(),
                    "Replacing stale backup of a different release"
                );
                BackupState::Replaced(existing)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BackupState::Created,
            Err(e) => return Err(PatchError::io(backup_path, IoOperation::Read, e)),
        };

        io::atomic_write(backup_path, original)?;
        debug!(backup = %backup_path.display(), bytes = original.len(), "Backup written");
        Ok(state)
    }

    fn commit(&self, path: &Path, patched: &[u8]) -> Result<()> {
        self.stage(PatchStage::BackupWritten, path)?;
        let staged = StagedWrite::new(path, patched)?;
        self.stage(PatchStage::BeforeCommit, path)?;
        staged.commit()
    }

    fn roll_back_backup(&self, backup_path: &Path, state: BackupState) {
        let result = match state {
            BackupState::Kept => Ok(()),
            BackupState::Created => io::remove_if_exists(backup_path),
            BackupState::Replaced(previous) => io::atomic_write(backup_path, &previous),
        };
        if let Err(e) = result {
            warn!(backup = %backup_path.display(), error = %e, "Failed to roll back backup");
        }
    }
}

impl Patcher<'static> {
    /// Patcher over the process-wide catalog.
    pub fn with_global(config: PatcherConfig) -> Result<Self> {
        Patcher::new(catalog::global(), config)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Applies every pair of `entry` to `data`, returning the new buffer and the
/// total number of substitutions.
///
/// Expected occurrence counts are only enforced when the entry was matched
/// to this binary, not for heuristic attempts.
fn apply_patterns(
    path: &Path,
    data: &[u8],
    entry: &SignatureEntry,
    heuristic: bool,
) -> Result<(Vec<u8>, usize)> {
    let entry_version = (!heuristic).then(|| entry.version.clone());
    let mut buf = data.to_vec();
    let mut total = 0;

    for (idx, pair) in entry.patterns.iter().enumerate() {
        let (next, count) = replace::replace_all(&buf, &pair.search, &pair.replace);

        match pair.expected_occurrences {
            Some(expected) if !heuristic && count != expected => {
                return Err(PatchError::OccurrenceMismatch {
                    path: path.to_path_buf(),
                    pattern_index: idx,
                    expected,
                    found: count,
                });
            }
            _ if count == 0 && pair.required => {
                return Err(PatchError::PatternNotFound {
                    path: path.to_path_buf(),
                    entry: entry_version,
                    pattern_index: idx,
                });
            }
            _ => {}
        }

        debug!(pattern = idx, occurrences = count, "Pattern applied");
        if count > 0 {
            buf = next;
            total += count;
        }
    }

    if total == 0 {
        return Err(PatchError::PatternNotFound {
            path: path.to_path_buf(),
            entry: entry_version,
            pattern_index: 0,
        });
    }

    Ok((buf, total))
}

/// Fails when any search sequence of `entry` still occurs in the final file
/// content, whether reintroduced by a later replacement or by the trailer.
fn ensure_patterns_gone(path: &Path, content: &[u8], entry: &SignatureEntry) -> Result<()> {
    for (idx, pair) in entry.patterns.iter().enumerate() {
        let left = replace::count_occurrences(content, &pair.search);
        if left > 0 {
            return Err(PatchError::OccurrenceMismatch {
                path: path.to_path_buf(),
                pattern_index: idx,
                expected: 0,
                found: left,
            });
        }
    }
    Ok(())
}

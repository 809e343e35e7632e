//! Bounded reads and crash-safe writes of target files.
//!
//! Targets are loaded fully into memory with a size limit, and written back
//! through a temporary file in the same directory that is renamed over the
//! destination, so a reader never observes a partially written file.

use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

use crate::config::IoConfig;
use crate::core::Fingerprint;
use crate::error::{IoOperation, PatchError, Result};

/// A target file read fully into memory.
#[derive(Debug, Clone)]
pub struct BinaryFile {
    path: PathBuf,
    data: Vec<u8>,
    fingerprint: Fingerprint,
}

impl BinaryFile {
    /// Reads `path` in one pass, refusing files larger than `limits.max_file_size`.
    pub fn load<P: AsRef<Path>>(path: P, limits: &IoConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| PatchError::io(path, IoOperation::Read, e))?;
        let size = file
            .metadata()
            .map_err(|e| PatchError::io(path, IoOperation::Metadata, e))?
            .len();

        debug!(
            path = %path.display(),
            size = size,
            limits.max_file_size = limits.max_file_size,
            "Loading target"
        );

        if size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = size,
                limit = limits.max_file_size,
                "File is too large"
            );
            return Err(PatchError::FileTooLarge {
                path: path.to_path_buf(),
                limit: limits.max_file_size,
                found: size,
            });
        }

        let mut data = Vec::with_capacity(size as usize);
        file.read_to_end(&mut data)
            .map_err(|e| PatchError::io(path, IoOperation::Read, e))?;

        Ok(Self::from_bytes(path, data))
    }

    /// Wraps bytes already in memory.
    pub fn from_bytes<P: AsRef<Path>>(path: P, data: Vec<u8>) -> Self {
        let fingerprint = Fingerprint::of(&data);
        Self {
            path: path.as_ref().to_path_buf(),
            data,
            fingerprint,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Path of the backup artifact for `target`: the target's file name with
/// `suffix` appended, in the same directory.
pub fn backup_path(target: &Path, suffix: &str) -> Result<PathBuf> {
    if suffix.is_empty() {
        return Err(PatchError::InvalidConfig("backup suffix is empty".to_string()));
    }
    let mut name: OsString = target.as_os_str().to_os_string();
    name.push(suffix);
    Ok(PathBuf::from(name))
}

/// Inverse of [`backup_path`]; `None` when `backup` does not carry `suffix`
/// or when `suffix` is empty.
pub fn target_for_backup(backup: &Path, suffix: &str) -> Option<PathBuf> {
    if suffix.is_empty() {
        return None;
    }
    let stem = strip_name_suffix(backup.file_name()?, suffix)?;
    if stem.is_empty() {
        return None;
    }
    Some(backup.with_file_name(stem))
}

#[cfg(unix)]
fn strip_name_suffix(name: &OsStr, suffix: &str) -> Option<OsString> {
    use std::os::unix::ffi::OsStrExt;

    let stem = name.as_bytes().strip_suffix(suffix.as_bytes())?;
    Some(OsStr::from_bytes(stem).to_os_string())
}

#[cfg(not(unix))]
fn strip_name_suffix(name: &OsStr, suffix: &str) -> Option<OsString> {
    name.to_str()?.strip_suffix(suffix).map(OsString::from)
}

/// A write staged in a temporary file beside its destination.
///
/// Dropping a `StagedWrite` without calling [`StagedWrite::commit`] removes
/// the temporary file and leaves the destination untouched.
pub struct StagedWrite {
    dest: PathBuf,
    temp: NamedTempFile,
}

impl StagedWrite {
    /// Writes `data` to a temporary file in `dest`'s directory and syncs it.
    ///
    /// When `dest` already exists its permissions are copied to the staged file.
    pub fn new(dest: &Path, data: &[u8]) -> Result<Self> {
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".sigpatch-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| PatchError::io(dir, IoOperation::Write, e))?;
        let temp_path = temp.path().to_path_buf();

        temp.write_all(data)
            .map_err(|e| PatchError::io(&temp_path, IoOperation::Write, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| PatchError::io(&temp_path, IoOperation::Write, e))?;

        if let Ok(meta) = fs::metadata(dest) {
            fs::set_permissions(&temp_path, meta.permissions())
                .map_err(|e| PatchError::io(&temp_path, IoOperation::Write, e))?;
        }

        trace!(
            dest = %dest.display(),
            temp = %temp_path.display(),
            len = data.len(),
            "Staged write"
        );

        Ok(Self {
            dest: dest.to_path_buf(),
            temp,
        })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Renames the staged file over the destination.
    pub fn commit(self) -> Result<()> {
        let dest = self.dest;
        self.temp
            .persist(&dest)
            .map_err(|e| PatchError::io(&dest, IoOperation::Rename, e.error))?;
        Ok(())
    }
}

/// Atomically replaces `dest` with `data`.
pub fn atomic_write(dest: &Path, data: &[u8]) -> Result<()> {
    StagedWrite::new(dest, data)?.commit()
}

/// Removes `path`, treating an already missing file as success.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PatchError::io(path, IoOperation::Remove, e)),
    }
}

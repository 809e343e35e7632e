//! Error types for the sigpatch engine.
//!
//! Every failure leaving the engine is one of the `PatchError` variants below,
//! carrying enough structured context (path, version, counts) for a caller to
//! render its own message. Raw `std::io::Error`s are always wrapped together
//! with the path and the operation that failed.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::{Fingerprint, PatchMetadata, Version};

/// File operation that was being performed when an I/O error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOperation {
    Read,
    Metadata,
    Write,
    Rename,
    Remove,
    ReadDir,
}

impl fmt::Display for IoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IoOperation::Read => "read",
            IoOperation::Metadata => "stat",
            IoOperation::Write => "write",
            IoOperation::Rename => "rename",
            IoOperation::Remove => "remove",
            IoOperation::ReadDir => "list directory",
        };
        f.write_str(s)
    }
}

/// Coarse classification of a `PatchError`, stable for callers that only
/// need to decide how to present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyPatched,
    Unsupported,
    PatternNotFound,
    NotPatched,
    Io,
    Catalog,
    Config,
}

/// Main error type for sigpatch operations.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The target already carries a metadata record.
    #[error("{} is already patched (patcher {}, {} occurrences)", path.display(), metadata.version, metadata.occurrences)]
    AlreadyPatched {
        path: PathBuf,
        metadata: Box<PatchMetadata>,
    },

    /// No catalog entry applies to the target.
    #[error("{} is not supported: {reason} (fingerprint {fingerprint})", path.display())]
    Unsupported {
        path: PathBuf,
        fingerprint: Fingerprint,
        reason: String,
    },

    /// A required pattern was matched by fingerprint but is absent from the body.
    #[error("pattern #{pattern_index} of {} not found in {}", entry_label(entry), path.display())]
    PatternNotFound {
        path: PathBuf,
        entry: Option<Version>,
        pattern_index: usize,
    },

    /// A pattern occurred a different number of times than the catalog expects.
    #[error("pattern #{pattern_index} occurs {found} times in {}, expected {expected}", path.display())]
    OccurrenceMismatch {
        path: PathBuf,
        pattern_index: usize,
        expected: usize,
        found: usize,
    },

    /// The target carries no valid metadata record.
    #[error("{} is not patched", path.display())]
    NotPatched { path: PathBuf },

    #[error("{} is {found} bytes, exceeding the limit of {limit} bytes", path.display())]
    FileTooLarge { path: PathBuf, limit: u64, found: u64 },

    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        op: IoOperation,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid signature catalog: {0}")]
    InvalidCatalog(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

fn entry_label(entry: &Option<Version>) -> String {
    match entry {
        Some(v) => format!("signature {}", v),
        None => "heuristic signature".to_string(),
    }
}

impl PatchError {
    /// Wraps a low-level I/O failure with the path and operation it belongs to.
    pub fn io(path: impl AsRef<Path>, op: IoOperation, source: std::io::Error) -> Self {
        PatchError::Io {
            path: path.as_ref().to_path_buf(),
            op,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::AlreadyPatched { .. } => ErrorKind::AlreadyPatched,
            PatchError::Unsupported { .. } => ErrorKind::Unsupported,
            PatchError::PatternNotFound { .. } | PatchError::OccurrenceMismatch { .. } => {
                ErrorKind::PatternNotFound
            }
            PatchError::NotPatched { .. } => ErrorKind::NotPatched,
            PatchError::FileTooLarge { .. } | PatchError::Io { .. } => ErrorKind::Io,
            PatchError::InvalidCatalog(_) | PatchError::Serialization(_) => ErrorKind::Catalog,
            PatchError::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// `AlreadyPatched` is informational; everything else aborts the operation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PatchError::AlreadyPatched { .. })
    }

    /// Existing metadata carried by an `AlreadyPatched` error.
    pub fn metadata(&self) -> Option<&PatchMetadata> {
        match self {
            PatchError::AlreadyPatched { metadata, .. } => Some(metadata),
            _ => None,
        }
    }
}

/// Result type alias for sigpatch operations
pub type Result<T> = std::result::Result<T, PatchError>;

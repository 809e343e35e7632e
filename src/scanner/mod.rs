//! Integrity scanner: decides whether a target is patchable, already patched,
//! or unknown.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::catalog::{SignatureCatalog, SignatureEntry};
use crate::config::PatcherConfig;
use crate::core::{Fingerprint, PatchMetadata};
use crate::error::Result;
use crate::io::BinaryFile;

/// How a matching entry was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Fingerprint,
    Markers,
}

/// Outcome of classifying a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Classification {
    /// Content matches a known unpatched release.
    Unpatched {
        entry: SignatureEntry,
        fingerprint: Fingerprint,
        matched_by: MatchKind,
    },
    /// Content ends with a valid metadata record.
    AlreadyPatched(PatchMetadata),
    /// No catalog entry and no metadata record.
    Unsupported { fingerprint: Fingerprint },
}

impl Classification {
    pub fn is_patched(&self) -> bool {
        matches!(self, Classification::AlreadyPatched(_))
    }

    pub fn entry(&self) -> Option<&SignatureEntry> {
        match self {
            Classification::Unpatched { entry, .. } => Some(entry),
            _ => None,
        }
    }
}

/// Classifies targets against a catalog. Never writes.
#[derive(Debug, Clone, Copy)]
pub struct Scanner<'a> {
    catalog: &'a SignatureCatalog,
    config: &'a PatcherConfig,
}

impl<'a> Scanner<'a> {
    pub fn new(catalog: &'a SignatureCatalog, config: &'a PatcherConfig) -> Self {
        Self { catalog, config }
    }

    /// Reads `path` once and classifies its content.
    pub fn classify<P: AsRef<Path>>(&self, path: P) -> Result<Classification> {
        let file = BinaryFile::load(path.as_ref(), &self.config.io)?;
        Ok(self.classify_file(&file))
    }

    /// Classifies an already loaded target.
    pub fn classify_file(&self, file: &BinaryFile) -> Classification {
        let data = file.data();

        if let Some((_, metadata)) = PatchMetadata::decode_trailer(data, &self.config.metadata.marker) {
            debug!(
                path = %file.path().display(),
                patcher = %metadata.version,
                occurrences = metadata.occurrences,
                "Target carries patch metadata"
            );
            return Classification::AlreadyPatched(metadata);
        }

        let fingerprint = file.fingerprint().clone();
        let found = match self.catalog.lookup(&fingerprint) {
            Some(entry) => Some((entry, MatchKind::Fingerprint)),
            None if self.config.scanner.match_markers => self
                .catalog
                .match_markers(data)
                .map(|entry| (entry, MatchKind::Markers)),
            None => None,
        };

        match found {
            Some((entry, matched_by)) => {
                debug!(
                    path = %file.path().display(),
                    fingerprint = fingerprint.short(),
                    release = %entry.version,
                    matched_by = ?matched_by,
                    "Target matches a known release"
                );
                Classification::Unpatched {
                    entry: entry.clone(),
                    fingerprint,
                    matched_by,
                }
            }
            None => {
                debug!(
                    path = %file.path().display(),
                    fingerprint = fingerprint.short(),
                    "Target is not in the catalog"
                );
                Classification::Unsupported { fingerprint }
            }
        }
    }

    /// Classifies a buffer that is not backed by a file.
    pub fn classify_bytes(&self, data: &[u8]) -> Classification {
        self.classify_file(&BinaryFile::from_bytes("<memory>", data.to_vec()))
    }
}

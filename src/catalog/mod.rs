//! Signature catalog: the table of supported releases.
//!
//! The catalog is pure data. It ships empty; callers load entries from a
//! JSON document or build them in code, and may install one catalog as the
//! process-wide instance.

pub mod entry;

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Fingerprint, Version};
use crate::error::{IoOperation, PatchError, Result};

pub use entry::{PatternPair, SignatureEntry};

static GLOBAL: OnceCell<SignatureCatalog> = OnceCell::new();
static EMPTY: OnceCell<SignatureCatalog> = OnceCell::new();

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogDocument {
    entries: Vec<SignatureEntry>,
}

/// Read-only table of signature entries, indexed by fingerprint and version.
#[derive(Debug, Clone, Default)]
pub struct SignatureCatalog {
    // Sorted by ascending version.
    entries: Vec<SignatureEntry>,
    by_fingerprint: HashMap<Fingerprint, usize>,
}

impl SignatureCatalog {
    /// Builds a catalog, validating every entry.
    ///
    /// Fails on invalid entries, duplicate versions, and fingerprints shared
    /// by more than one entry.
    pub fn new(mut entries: Vec<SignatureEntry>) -> Result<Self> {
        for entry in &entries {
            entry.validate()?;
        }

        entries.sort_by(|a, b| a.version.cmp(&b.version));
        if let Some(pair) = entries.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(PatchError::InvalidCatalog(format!(
                "duplicate entry for version {}",
                pair[0].version
            )));
        }

        let mut by_fingerprint = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            for fp in &entry.fingerprints {
                if let Some(prev) = by_fingerprint.insert(fp.clone(), idx) {
                    return Err(PatchError::InvalidCatalog(format!(
                        "fingerprint {} listed by both {} and {}",
                        fp, entries[prev].version, entry.version
                    )));
                }
            }
        }

        debug!(entries = entries.len(), "Signature catalog built");
        Ok(Self {
            entries,
            by_fingerprint,
        })
    }

    /// Parses a `{ "entries": [...] }` document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let doc: CatalogDocument =
            serde_json::from_str(s).map_err(|e| PatchError::InvalidCatalog(e.to_string()))?;
        Self::new(doc.entries)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PatchError::io(path, IoOperation::Read, e))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        let doc = CatalogDocument {
            entries: self.entries.clone(),
        };
        serde_json::to_string_pretty(&doc).map_err(|e| PatchError::Serialization(e.to_string()))
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<&SignatureEntry> {
        self.by_fingerprint.get(fingerprint).map(|&idx| &self.entries[idx])
    }

    pub fn lookup_version(&self, version: &Version) -> Option<&SignatureEntry> {
        self.entries
            .binary_search_by(|e| e.version.cmp(version))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Newest entry whose markers all occur in `data`.
    pub fn match_markers(&self, data: &[u8]) -> Option<&SignatureEntry> {
        self.entries.iter().rev().find(|e| e.markers_match(data))
    }

    /// Entry with the highest version.
    pub fn latest(&self) -> Option<&SignatureEntry> {
        self.entries.last()
    }

    /// Oldest entry flagged as the minimum supported release, if any.
    pub fn minimum_supported(&self) -> Option<&SignatureEntry> {
        self.entries.iter().find(|e| e.minimum_supported)
    }

    /// Entries in ascending version order.
    pub fn entries(&self) -> &[SignatureEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Installs the process-wide catalog. Only the first call succeeds.
pub fn install_global(catalog: SignatureCatalog) -> Result<()> {
    GLOBAL
        .set(catalog)
        .map_err(|_| PatchError::InvalidCatalog("global catalog is already installed".to_string()))
}

/// The process-wide catalog, or an empty catalog when none was installed.
pub fn global() -> &'static SignatureCatalog {
    match GLOBAL.get() {
        Some(catalog) => catalog,
        None => EMPTY.get_or_init(SignatureCatalog::default),
    }
}

//! Configuration for the patch and restore engines.
//!
//! Provides centralized configuration with sensible defaults. Every section
//! can be omitted from a JSON document, in which case its defaults apply.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoOperation, PatchError, Result};

/// Default suffix appended to a target's file name to form its backup name.
pub const DEFAULT_BACKUP_SUFFIX: &str = ".sigpatch-bak";

/// Default prefix of the metadata trailer line.
pub const DEFAULT_METADATA_MARKER: &str = "// sigpatch-metadata: ";

/// Master configuration for the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatcherConfig {
    /// I/O limits for reading targets.
    pub io: IoConfig,
    /// Backup artifact naming.
    pub backup: BackupConfig,
    /// Metadata trailer encoding.
    pub metadata: MetadataConfig,
    /// Classification behaviour.
    pub scanner: ScannerConfig,
}

impl PatcherConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| PatchError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PatchError::io(path, IoOperation::Read, e))?;
        Self::from_json_str(&text)
    }

    /// Checks the invariants the engine relies on. Runs when a config is
    /// loaded from JSON and again when a `Patcher` is constructed.
    pub fn validate(&self) -> Result<()> {
        self.backup.validate()?;
        let marker = &self.metadata.marker;
        if marker.is_empty() || marker.contains('\n') {
            return Err(PatchError::InvalidConfig(
                "metadata marker must be a non-empty single line".to_string(),
            ));
        }
        if self.io.max_file_size == 0 {
            return Err(PatchError::InvalidConfig(
                "max_file_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// I/O configuration for reading target files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Maximum target size to load (default: 536870912 = 512MB).
    pub max_file_size: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_file_size: 512 * 1024 * 1024,
        }
    }
}

/// Backup artifact naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Suffix appended to the target's file name (default: `.sigpatch-bak`).
    pub suffix: String,
}

impl BackupConfig {
    /// Rejects empty suffixes and suffixes containing path separators.
    pub fn validate(&self) -> Result<()> {
        let suffix = &self.suffix;
        if suffix.is_empty() || suffix.contains(['/', '\\']) {
            return Err(PatchError::InvalidConfig(format!(
                "backup suffix {:?} must be a non-empty file name fragment",
                suffix
            )));
        }
        Ok(())
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
        }
    }
}

/// Metadata trailer encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Text preceding the JSON record on the trailer line.
    pub marker: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_METADATA_MARKER.to_string(),
        }
    }
}

/// Classification behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Fall back to byte-marker matching when no fingerprint matches (default: true).
    pub match_markers: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { match_markers: true }
    }
}

//! State inspector: reads the metadata record back from a target.

use std::path::Path;

use crate::config::PatcherConfig;
use crate::core::PatchMetadata;
use crate::error::{PatchError, Result};
use crate::io::BinaryFile;

/// Reads the metadata record embedded in `path`.
///
/// Needs no catalog. Fails with `NotPatched` when the file carries no valid
/// record.
pub fn extract_patch_info<P: AsRef<Path>>(path: P, config: &PatcherConfig) -> Result<PatchMetadata> {
    let path = path.as_ref();
    let file = BinaryFile::load(path, &config.io)?;
    extract_patch_info_from_bytes(file.data(), config).ok_or_else(|| PatchError::NotPatched {
        path: path.to_path_buf(),
    })
}

/// Reads the metadata record from an in-memory buffer.
pub fn extract_patch_info_from_bytes(data: &[u8], config: &PatcherConfig) -> Option<PatchMetadata> {
    PatchMetadata::decode_trailer(data, &config.metadata.marker).map(|(_, metadata)| metadata)
}

//! Shared fixtures for the integration tests.
//!
//! Fixture targets are small synthetic script bundles; none of them
//! correspond to a real product.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use sigpatch::{Fingerprint, PatternPair, SignatureCatalog, SignatureEntry, Version};
use tempfile::TempDir;

/// Byte sequence the fixture catalog replaces.
pub const SEARCH: &[u8] = b"verify_gate()";
/// Its replacement, same length.
pub const REPLACE: &[u8] = b"accept_gate()";

pub const RELEASE: Version = Version::new(2, 4, 0);

/// A bundle containing `instances` calls to the gated function.
pub fn fixture_body(instances: usize) -> Vec<u8> {
    let mut body = b"/* demo-server bundle 2.4.0 */\n\"use strict\";\n".to_vec();
    for i in 0..instances {
        body.extend_from_slice(format!("function f{i}() {{ return ").as_bytes());
        body.extend_from_slice(SEARCH);
        body.extend_from_slice(b"; }\n");
    }
    body.extend_from_slice(b"module.exports = {};\n");
    body
}

/// Catalog with one entry recognizing `body` by fingerprint.
pub fn catalog_for(body: &[u8]) -> SignatureCatalog {
    SignatureCatalog::new(vec![SignatureEntry::new(
        RELEASE,
        vec![PatternPair::new(SEARCH, REPLACE)],
    )
    .with_fingerprint(Fingerprint::of(body))
    .minimum_supported()])
    .expect("fixture catalog")
}

pub fn write_target(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

/// Sorted file names in `dir`.
pub fn dir_listing<P: AsRef<Path>>(dir: P) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read_dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

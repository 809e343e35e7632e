//! Signature entries: one known release and the byte substitutions it needs.

use serde::{Deserialize, Serialize};

use crate::core::{Fingerprint, Version};
use crate::error::{PatchError, Result};

fn default_required() -> bool {
    true
}

/// One search/replace pair. Both sequences are hex strings in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternPair {
    #[serde(with = "hex::serde")]
    pub search: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub replace: Vec<u8>,
    /// A required pair must occur at least once.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Exact number of occurrences expected in a matching binary, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_occurrences: Option<usize>,
}

impl PatternPair {
    pub fn new(search: impl Into<Vec<u8>>, replace: impl Into<Vec<u8>>) -> Self {
        Self {
            search: search.into(),
            replace: replace.into(),
            required: true,
            expected_occurrences: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn expecting(mut self, occurrences: usize) -> Self {
        self.expected_occurrences = Some(occurrences);
        self
    }
}

/// A supported release of the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub version: Version,
    /// Fingerprints of unpatched builds of this release.
    #[serde(default)]
    pub fingerprints: Vec<Fingerprint>,
    /// Byte sequences that all appear in unpatched builds of this release.
    #[serde(default, with = "hex_list")]
    pub markers: Vec<Vec<u8>>,
    pub patterns: Vec<PatternPair>,
    #[serde(default)]
    pub minimum_supported: bool,
}

impl SignatureEntry {
    pub fn new(version: Version, patterns: Vec<PatternPair>) -> Self {
        Self {
            version,
            fingerprints: Vec::new(),
            markers: Vec::new(),
            patterns,
            minimum_supported: false,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprints.push(fingerprint);
        self
    }

    pub fn with_marker(mut self, marker: impl Into<Vec<u8>>) -> Self {
        self.markers.push(marker.into());
        self
    }

    pub fn minimum_supported(mut self) -> Self {
        self.minimum_supported = true;
        self
    }

    /// True when every marker occurs in `data`. Entries without markers never match.
    pub fn markers_match(&self, data: &[u8]) -> bool {
        !self.markers.is_empty()
            && self
                .markers
                .iter()
                .all(|m| memchr::memmem::find(data, m).is_some())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> {
            Err(PatchError::InvalidCatalog(format!("entry {}: {}", self.version, msg)))
        };

        if self.patterns.is_empty() {
            return invalid("no patterns".to_string());
        }
        if self.fingerprints.is_empty() && self.markers.is_empty() {
            return invalid("needs at least one fingerprint or marker".to_string());
        }
        if self.markers.iter().any(|m| m.is_empty()) {
            return invalid("empty marker".to_string());
        }
        for (idx, pair) in self.patterns.iter().enumerate() {
            if pair.search.is_empty() {
                return invalid(format!("pattern #{} has an empty search sequence", idx));
            }
            if memchr::memmem::find(&pair.replace, &pair.search).is_some() {
                return invalid(format!("pattern #{} replacement contains its search sequence", idx));
            }
            if pair.expected_occurrences == Some(0) && pair.required {
                return invalid(format!("pattern #{} is required but expects no occurrences", idx));
            }
        }
        Ok(())
    }
}

mod hex_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(items.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let items = Vec::<String>::deserialize(deserializer)?;
        items
            .iter()
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

//! Patch metadata records and their embedded trailer encoding.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use memchr::memmem;
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::version::{deserialize_lenient, Version};
use crate::core::Fingerprint;
use crate::error::PatchError;

/// Description of a completed patch, embedded at the end of the patched file.
///
/// Deserialization is tolerant of records written by other engine versions:
/// unknown fields are ignored and missing or malformed fields fall back to
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchMetadata {
    /// Version of the engine that applied the patch.
    #[serde(deserialize_with = "deserialize_lenient")]
    pub version: Version,
    /// Total number of pattern occurrences substituted.
    #[serde(deserialize_with = "deserialize_count")]
    pub occurrences: usize,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Release label of the signature entry used.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_lenient"
    )]
    pub entry: Option<Version>,
    /// Set when the patterns of the newest entry were applied to an
    /// unrecognized binary.
    #[serde(deserialize_with = "deserialize_flag")]
    pub heuristic: bool,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_fingerprint"
    )]
    pub original_fingerprint: Option<Fingerprint>,
}

impl Default for PatchMetadata {
    fn default() -> Self {
        Self {
            version: Version::default(),
            occurrences: 0,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            entry: None,
            heuristic: false,
            original_fingerprint: None,
        }
    }
}

impl PatchMetadata {
    /// Record for a patch applied now by this engine.
    pub fn new(occurrences: usize, entry: Option<Version>, original: Fingerprint) -> Self {
        Self {
            version: Version::engine(),
            occurrences,
            timestamp: Utc::now(),
            heuristic: entry.is_none(),
            entry,
            original_fingerprint: Some(original),
        }
    }

    pub fn to_json_string(&self) -> Result<String, PatchError> {
        serde_json::to_string(self).map_err(|e| PatchError::Serialization(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, PatchError> {
        serde_json::to_string_pretty(self).map_err(|e| PatchError::Serialization(e.to_string()))
    }

    pub fn from_json_str(s: &str) -> Result<Self, PatchError> {
        serde_json::from_str(s).map_err(|e| PatchError::Serialization(e.to_string()))
    }

    /// Encodes the record as a trailer line: `\n{marker}{json}\n`.
    pub fn encode_trailer(&self, marker: &str) -> Result<Vec<u8>, PatchError> {
        let json = self.to_json_string()?;
        let mut out = Vec::with_capacity(marker.len() + json.len() + 2);
        out.push(b'\n');
        out.extend_from_slice(marker.as_bytes());
        out.extend_from_slice(json.as_bytes());
        out.push(b'\n');
        Ok(out)
    }

    /// Locates and parses a trailer at the very end of `data`.
    ///
    /// Returns the length of the content preceding the trailer together with
    /// the decoded record, or `None` when no valid trailer is present.
    pub fn decode_trailer(data: &[u8], marker: &str) -> Option<(usize, Self)> {
        if marker.is_empty() {
            return None;
        }
        let body = data.strip_suffix(b"\n")?;

        let mut needle = Vec::with_capacity(marker.len() + 1);
        needle.push(b'\n');
        needle.extend_from_slice(marker.as_bytes());

        let start = memmem::rfind(body, &needle)?;
        let payload = &body[start + needle.len()..];
        if payload.contains(&b'\n') {
            return None;
        }

        let text = std::str::from_utf8(payload).ok()?;
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        if !value.is_object() {
            return None;
        }
        let metadata = serde_json::from_value(value).ok()?;
        Some((start, metadata))
    }
}

impl fmt::Display for PatchMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "patcher {} replaced {} occurrences at {}",
            self.version,
            self.occurrences,
            self.timestamp.to_rfc3339()
        )?;
        match &self.entry {
            Some(entry) => write!(f, " (signature {})", entry),
            None if self.heuristic => write!(f, " (heuristic)"),
            None => Ok(()),
        }
    }
}

fn deserialize_optional_lenient<'de, D>(deserializer: D) -> Result<Option<Version>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

fn deserialize_optional_fingerprint<'de, D>(deserializer: D) -> Result<Option<Fingerprint>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

/// Non-negative whole numbers, including ones written as floats; anything
/// else counts as zero.
fn deserialize_count<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let count = match value {
        serde_json::Value::Number(n) => match n.as_u64() {
            Some(v) => Some(v),
            None => n
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64),
        },
        _ => None,
    };
    Ok(count
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or_default())
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(matches!(value, serde_json::Value::Bool(true)))
}

/// Accepts RFC 3339 strings as well as Unix timestamps in seconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        serde_json::Value::Number(n) => n.as_f64().and_then(|secs| {
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9) as u32;
            Utc.timestamp_opt(whole, nanos).single()
        }),
        _ => None,
    };
    Ok(parsed.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
}

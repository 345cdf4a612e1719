//! # Collection Persistence Format
//!
//! The canonical collection is a pretty-printed JSON array of records.
//!
//! ## Self-healing decode
//!
//! Decoding never fails. Whatever is on disk is reduced to the best valid
//! collection it contains:
//! - empty or whitespace-only input is an empty collection
//! - a JSON object is read as the list of its values
//! - anything else that is not an array marks the input malformed and yields
//!   an empty collection; the next write replaces it
//! - null or mistyped fields read as their defaults
//! - array items that are not objects, or have no usable `image_id`, are skipped
//! - repeated `image_id`s collapse to one entry (last value, first position)

use crate::{TagError, TagRecord};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

// =============================================================================
// DECODE
// =============================================================================

/// Result of decoding a persisted collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedCollection {
    /// Valid records, in file order, one per `image_id`.
    pub records: Vec<TagRecord>,
    /// Items dropped because they were not valid records.
    pub skipped: usize,
    /// Items dropped because a later item had the same `image_id`.
    pub collapsed: usize,
    /// The input was not a JSON collection at all.
    pub malformed: bool,
}

impl DecodedCollection {
    fn malformed() -> Self {
        Self {
            malformed: true,
            ..Self::default()
        }
    }

    /// Check if decoding had to discard anything.
    #[must_use]
    pub fn was_healed(&self) -> bool {
        self.malformed || self.skipped > 0 || self.collapsed > 0
    }
}

/// Decode a persisted collection, healing what can be healed.
#[must_use]
pub fn decode_collection(bytes: &[u8]) -> DecodedCollection {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return DecodedCollection::default();
    }

    let items = match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(serde_json::Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
        _ => return DecodedCollection::malformed(),
    };

    let mut decoded = DecodedCollection::default();
    let mut positions: BTreeMap<String, usize> = BTreeMap::new();

    for item in items {
        let record = match serde_json::from_value::<TagRecord>(item) {
            Ok(r) if r.validate().is_ok() => r,
            _ => {
                decoded.skipped += 1;
                continue;
            }
        };
        let existing = positions.get(&record.image_id).copied();
        match existing {
            Some(pos) => {
                decoded.records[pos] = record;
                decoded.collapsed += 1;
            }
            None => {
                positions.insert(record.image_id.clone(), decoded.records.len());
                decoded.records.push(record);
            }
        }
    }

    decoded
}

// =============================================================================
// ENCODE
// =============================================================================

/// Encode a collection as a pretty-printed JSON array.
pub fn encode_collection(records: &[TagRecord]) -> Result<Vec<u8>, TagError> {
    serde_json::to_vec_pretty(records).map_err(|e| TagError::SerializationError(e.to_string()))
}

/// Write `bytes` to `path` atomically: temp sibling, fsync, rename.
///
/// Readers see either the previous content or the new content, never a
/// partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TagError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| TagError::IoError(format!("'{}' has no file name", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = std::fs::File::create(&tmp_path)
        .map_err(|e| TagError::IoError(format!("create {}: {}", tmp_path.display(), e)))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| TagError::IoError(format!("write {}: {}", tmp_path.display(), e)))?;
    drop(file);

    std::fs::rename(&tmp_path, path).map_err(|e| {
        TagError::IoError(format!(
            "rename {} -> {}: {}",
            tmp_path.display(),
            path.display(),
            e
        ))
    })
}

// =============================================================================
// TESTS
// =============================================================================

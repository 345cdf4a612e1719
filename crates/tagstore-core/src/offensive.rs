//! # Offensive Image Log
//!
//! Append-only audit trail of images reported as offensive, kept as a CSV and
//! JSON pair. Entries are never updated or removed.

use crate::formats::{offensive_to_csv, write_atomic};
use crate::primitives::{OFFENSIVE_CSV_FILE, OFFENSIVE_JSON_FILE};
use crate::{OffensiveLogEntry, TagError};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The CSV + JSON audit log pair in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffensiveLog {
    csv: PathBuf,
    json: PathBuf,
}

impl OffensiveLog {
    /// Log files inside `dir`. Nothing is created until the first append.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            csv: dir.join(OFFENSIVE_CSV_FILE),
            json: dir.join(OFFENSIVE_JSON_FILE),
        }
    }

    #[must_use]
    pub fn csv_path(&self) -> &Path {
        &self.csv
    }

    #[must_use]
    pub fn json_path(&self) -> &Path {
        &self.json
    }

    /// Append `entry` to both files.
    ///
    /// The CSV header is written only when the CSV is new or empty.
    pub fn append(&self, entry: &OffensiveLogEntry) -> Result<(), TagError> {
        if let Some(parent) = self.csv.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TagError::IoError(format!("create {}: {}", parent.display(), e)))?;
        }

        let is_new = std::fs::metadata(&self.csv).map(|m| m.len() == 0).unwrap_or(true);
        let rows = offensive_to_csv(std::slice::from_ref(entry), is_new)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv)
            .map_err(|e| TagError::IoError(format!("open {}: {}", self.csv.display(), e)))?;
        file.write_all(rows.as_bytes())
            .map_err(|e| TagError::IoError(format!("append {}: {}", self.csv.display(), e)))?;

        let mut entries = self.entries()?;
        entries.push(entry.clone());
        let json = serde_json::to_vec_pretty(&entries)
            .map_err(|e| TagError::SerializationError(e.to_string()))?;
        write_atomic(&self.json, &json)?;

        tracing::info!(
            event = "offensive_logged",
            image_id = %entry.image_id,
            flagged_by = %entry.flagged_by,
            "Image reported as offensive"
        );
        Ok(())
    }

    /// All entries from the JSON half, oldest first.
    ///
    /// A missing file is an empty log; an unreadable one starts over with a
    /// warning rather than blocking new reports.
    pub fn entries(&self) -> Result<Vec<OffensiveLogEntry>, TagError> {
        let bytes = match std::fs::read(&self.json) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TagError::IoError(format!(
                    "read {}: {}",
                    self.json.display(),
                    e
                )));
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(
                    event = "offensive_log_malformed",
                    path = %self.json.display(),
                    error = %e,
                    "Offensive log JSON unreadable; starting a new list"
                );
                Ok(Vec::new())
            }
        }
    }
}

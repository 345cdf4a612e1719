//! # Export Module
//!
//! The failures view and the export artifacts handed to the CLI and API.
//!
//! An export is a byte payload plus a BLAKE3 checksum of those bytes, so a
//! downloaded file can be verified against what the server produced.

use crate::formats::{encode_collection, failures_to_csv, records_to_csv};
use crate::identity::content_hash;
use crate::{FailureRow, TagError, TagRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// FAILURE VIEW
// =============================================================================

/// Derived projection of every flagged or rejected record.
///
/// Never edited in place: each materialization rebuilds it from the canonical
/// collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureView {
    rows: Vec<FailureRow>,
}

impl FailureView {
    /// Project the failing subset of `records`, preserving collection order.
    pub fn from_records(records: &[TagRecord]) -> Result<Self, TagError> {
        let rows = records
            .iter()
            .filter(|r| r.is_failure())
            .map(FailureRow::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    #[must_use]
    pub fn rows(&self) -> &[FailureRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check if `image_id` appears in the view.
    #[must_use]
    pub fn contains(&self, image_id: &str) -> bool {
        self.rows.iter().any(|r| r.image_id == image_id)
    }

    /// Render as the failures CSV (header always present).
    pub fn to_csv(&self) -> Result<String, TagError> {
        failures_to_csv(&self.rows)
    }
}

// =============================================================================
// EXPORT ARTIFACTS
// =============================================================================

/// Which projection to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Canonical JSON array.
    Json,
    /// Every record as CSV.
    Csv,
    /// Failures CSV.
    Failures,
}

impl ExportFormat {
    /// Conventional file name for this format.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Json => crate::primitives::EXPORT_JSON_FILE,
            Self::Csv => crate::primitives::EXPORT_CSV_FILE,
            Self::Failures => crate::primitives::FAILURES_CSV_FILE,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Failures => "failures",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "failures" => Ok(Self::Failures),
            other => Err(TagError::ConfigError(format!(
                "unknown export format '{}' (expected json, csv or failures)",
                other
            ))),
        }
    }
}

/// An export payload with its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    /// BLAKE3 hex digest of `bytes`.
    pub checksum: String,
}

impl ExportArtifact {
    fn new(format: ExportFormat, bytes: Vec<u8>) -> Self {
        let checksum = content_hash(&bytes);
        Self {
            format,
            bytes,
            checksum,
        }
    }

    /// Check the payload against its checksum.
    #[must_use]
    pub fn verify(&self) -> bool {
        content_hash(&self.bytes) == self.checksum
    }
}

/// Render `records` in `format`.
pub fn export_records(records: &[TagRecord], format: ExportFormat) -> Result<ExportArtifact, TagError> {
    let bytes = match format {
        ExportFormat::Json => encode_collection(records)?,
        ExportFormat::Csv => records_to_csv(records)?.into_bytes(),
        ExportFormat::Failures => FailureView::from_records(records)?.to_csv()?.into_bytes(),
    };
    Ok(ExportArtifact::new(format, bytes))
}

// =============================================================================
// TESTS
// =============================================================================

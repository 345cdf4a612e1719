//! # Fixed Constants
//!
//! Compiled-in defaults, file names and input limits for tagstore.
//! Runtime configuration may override the defaults; the file names are part
//! of the on-disk layout and do not change.

/// Number of buffered records that triggers an automatic flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 10;

/// Minimum seconds between two autosaves of the same form.
///
/// An autosave fires only when strictly more time than this has passed and
/// the form content changed.
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

// =============================================================================
// ON-DISK LAYOUT
// =============================================================================

/// Canonical collection: JSON array of records.
pub const EXPORT_JSON_FILE: &str = "tagged_results_export.json";

/// Row projection of the canonical collection.
pub const EXPORT_CSV_FILE: &str = "tagged_results_export.csv";

/// Failures view (flagged or rejected records only).
pub const FAILURES_CSV_FILE: &str = "tagged_results_failures.csv";

/// Offensive-image audit log, CSV half.
pub const OFFENSIVE_CSV_FILE: &str = "offensive_images.csv";

/// Offensive-image audit log, JSON half.
pub const OFFENSIVE_JSON_FILE: &str = "offensive_images.json";

/// Columns of the failures CSV, in order.
pub const FAILURE_COLUMNS: [&str; 6] = ["image_id", "text", "rejected", "flagged", "tagger", "tags"];

/// Columns of the export CSV, in order.
pub const EXPORT_COLUMNS: [&str; 10] = [
    "image_id",
    "text",
    "image_url",
    "tags",
    "tagger",
    "uid",
    "display_name",
    "timestamp",
    "flagged",
    "rejected",
];

/// Columns of the offensive log CSV, in order.
pub const OFFENSIVE_COLUMNS: [&str; 5] = ["timestamp", "image_id", "image_url", "text", "flagged_by"];

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of an `image_id`.
pub const MAX_IMAGE_ID_LENGTH: usize = 512;

/// Maximum length of the free-text notes attached to a tag set.
pub const MAX_NOTES_LENGTH: usize = 8192;

/// Maximum number of records accepted by one batch ingest.
pub const MAX_BATCH_RECORDS: usize = 10_000;

/// Number of hex characters kept from a BLAKE3 digest in derived ids.
pub const DERIVED_ID_HEX_LEN: usize = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_columns_are_a_subset_of_export_columns() {
        for column in FAILURE_COLUMNS {
            assert!(EXPORT_COLUMNS.contains(&column), "{column}");
        }
    }

    #[test]
    fn default_threshold_is_ten() {
        assert_eq!(DEFAULT_FLUSH_THRESHOLD, 10);
    }
}

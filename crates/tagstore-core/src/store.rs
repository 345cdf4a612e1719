//! # Record Store
//!
//! Canonical `image_id → TagRecord` storage with two durable projections:
//! the export CSV (all rows) and the failures CSV (flagged or rejected rows).
//!
//! ## Write unit
//!
//! Every write is a whole-collection read-modify-write: load, replace or
//! append in place, write the JSON back, then regenerate the CSV from the same
//! rows. Files are replaced atomically, so readers never see a torn file.
//!
//! The store does not lock. Callers that share one store between sessions
//! must serialize writers themselves (the server keeps it behind a `RwLock`
//! and holds the write half for the whole upsert). Two processes writing the
//! same directory can still lose updates.
//!
//! ## Backends
//!
//! - `InMemory`: a vector of records (tests, dry runs)
//! - `Files`: JSON + CSV + failures CSV under one directory

use crate::export::FailureView;
use crate::formats::{decode_collection, encode_collection, records_to_csv, write_atomic};
use crate::primitives::{EXPORT_CSV_FILE, EXPORT_JSON_FILE, FAILURES_CSV_FILE};
use crate::{TagError, TagRecord};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

// =============================================================================
// SINK TRAIT
// =============================================================================

/// Where a [`WriteBuffer`](crate::WriteBuffer) delivers its records.
///
/// One call per flush; the sink returns one result per record, in order.
pub trait TagSink {
    /// Upsert `records` in order, last write wins within the batch.
    fn upsert_batch(&mut self, records: &[TagRecord]) -> Vec<Result<Upsert, TagError>>;
}

/// What an upsert did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// No record had this id; appended at `position`.
    Inserted { position: usize },
    /// An existing record at `position` was overwritten.
    Replaced { position: usize },
}

impl Upsert {
    /// Index of the record in collection order.
    #[must_use]
    pub fn position(self) -> usize {
        match self {
            Self::Inserted { position } | Self::Replaced { position } => position,
        }
    }
}

// =============================================================================
// FILE LAYOUT
// =============================================================================

/// Locations of the three files a file-backed store owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub dir: PathBuf,
    pub json: PathBuf,
    pub csv: PathBuf,
    pub failures: PathBuf,
}

impl StorePaths {
    /// Standard layout inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            json: dir.join(EXPORT_JSON_FILE),
            csv: dir.join(EXPORT_CSV_FILE),
            failures: dir.join(FAILURES_CSV_FILE),
            dir,
        }
    }
}

/// Storage backend for a [`RecordStore`].
#[derive(Debug)]
pub enum StoreBackend {
    /// Records held in memory; the failures view is kept alongside.
    InMemory {
        records: Vec<TagRecord>,
        failures: FailureView,
    },
    /// Records persisted under a directory.
    Files(StorePaths),
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::InMemory {
            records: Vec::new(),
            failures: FailureView::default(),
        }
    }
}

// =============================================================================
// RECORD STORE
// =============================================================================

/// Canonical at-most-one-record-per-key store.
#[derive(Debug, Default)]
pub struct RecordStore {
    backend: StoreBackend,
}

impl RecordStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory store pre-populated through the normal upsert path.
    pub fn with_records(records: Vec<TagRecord>) -> Result<Self, TagError> {
        let mut store = Self::new();
        for result in store.upsert_batch(&records) {
            result?;
        }
        Ok(store)
    }

    /// Open (or initialize) a file-backed store in `dir`.
    ///
    /// Missing files are created empty; existing files are left untouched.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, TagError> {
        let paths = StorePaths::in_dir(dir);
        std::fs::create_dir_all(&paths.dir)
            .map_err(|e| TagError::IoError(format!("create {}: {}", paths.dir.display(), e)))?;

        let mut store = Self {
            backend: StoreBackend::Files(paths.clone()),
        };
        if !paths.json.exists() {
            tracing::info!(dir = %paths.dir.display(), "Initializing empty tag store");
            store.persist(&[])?;
        } else if !paths.csv.exists() {
            let records = store.records()?;
            store.persist(&records)?;
        }
        if !paths.failures.exists() {
            store.materialize_failures()?;
        }
        Ok(store)
    }

    /// File layout, if file-backed.
    #[must_use]
    pub fn paths(&self) -> Option<&StorePaths> {
        match &self.backend {
            StoreBackend::Files(paths) => Some(paths),
            StoreBackend::InMemory { .. } => None,
        }
    }

    /// Human-readable backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            StoreBackend::InMemory { .. } => "memory",
            StoreBackend::Files(_) => "files",
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Load the full collection.
    ///
    /// A malformed file reads as empty (logged); the next write replaces it.
    pub fn records(&self) -> Result<Vec<TagRecord>, TagError> {
        let paths = match &self.backend {
            StoreBackend::InMemory { records, .. } => return Ok(records.clone()),
            StoreBackend::Files(paths) => paths,
        };

        let bytes = match std::fs::read(&paths.json) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TagError::IoError(format!(
                    "read {}: {}",
                    paths.json.display(),
                    e
                )));
            }
        };

        let decoded = decode_collection(&bytes);
        if decoded.malformed {
            tracing::warn!(
                event = "store_malformed",
                path = %paths.json.display(),
                "Tag collection is not a JSON array; treating store as empty"
            );
        } else if decoded.was_healed() {
            tracing::warn!(
                event = "store_healed",
                path = %paths.json.display(),
                skipped = decoded.skipped,
                collapsed = decoded.collapsed,
                "Dropped invalid or duplicate entries while loading tag collection"
            );
        }
        Ok(decoded.records)
    }

    /// Look up one record.
    pub fn get(&self, image_id: &str) -> Result<Option<TagRecord>, TagError> {
        Ok(self
            .records()?
            .into_iter()
            .find(|r| r.image_id == image_id))
    }

    /// Number of distinct images with a record whose `uid` is `uid`.
    pub fn count_by_user(&self, uid: &str) -> Result<usize, TagError> {
        let records = self.records()?;
        let ids: BTreeSet<&str> = records
            .iter()
            .filter(|r| r.uid.as_deref() == Some(uid))
            .map(|r| r.image_id.as_str())
            .collect();
        Ok(ids.len())
    }

    /// Number of distinct images in the store.
    pub fn count_total(&self) -> Result<usize, TagError> {
        let records = self.records()?;
        let ids: BTreeSet<&str> = records.iter().map(|r| r.image_id.as_str()).collect();
        Ok(ids.len())
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Insert or replace one record.
    ///
    /// Rejects a record without `image_id` before touching storage.
    pub fn upsert(&mut self, record: TagRecord) -> Result<Upsert, TagError> {
        record.validate()?;
        self.upsert_batch(std::slice::from_ref(&record))
            .pop()
            .unwrap_or_else(|| Err(TagError::IoError("upsert produced no result".to_string())))
    }

    /// Recompute the failures view from the current collection and persist it.
    ///
    /// Always replaces the previous projection wholesale.
    pub fn materialize_failures(&mut self) -> Result<FailureView, TagError> {
        let records = self.records()?;
        self.write_failures(&records)
    }

    /// Drop every record and rewrite all projections empty.
    pub fn clear(&mut self) -> Result<(), TagError> {
        self.persist(&[])?;
        self.write_failures(&[])?;
        Ok(())
    }

    fn persist(&mut self, records: &[TagRecord]) -> Result<(), TagError> {
        match &mut self.backend {
            StoreBackend::InMemory { records: held, .. } => {
                *held = records.to_vec();
                Ok(())
            }
            StoreBackend::Files(paths) => {
                write_atomic(&paths.json, &encode_collection(records)?)?;
                write_atomic(&paths.csv, records_to_csv(records)?.as_bytes())
            }
        }
    }

    fn write_failures(&mut self, records: &[TagRecord]) -> Result<FailureView, TagError> {
        let view = FailureView::from_records(records)?;
        match &mut self.backend {
            StoreBackend::InMemory { failures, .. } => *failures = view.clone(),
            StoreBackend::Files(paths) => write_atomic(&paths.failures, view.to_csv()?.as_bytes())?,
        }
        tracing::debug!(rows = view.len(), "Failures view materialized");
        Ok(view)
    }
}

/// Place `record` in `records`; returns what happened and whether the
/// failures view can differ afterwards, i.e. the incoming record or the one
/// it replaced is a failure.
fn place(records: &mut Vec<TagRecord>, record: TagRecord) -> (Upsert, bool) {
    match records.iter().position(|r| r.image_id == record.image_id) {
        Some(position) => {
            let touches_failures = records[position].is_failure() || record.is_failure();
            records[position] = record;
            (Upsert::Replaced { position }, touches_failures)
        }
        None => {
            let touches_failures = record.is_failure();
            records.push(record);
            (
                Upsert::Inserted {
                    position: records.len() - 1,
                },
                touches_failures,
            )
        }
    }
}

impl TagSink for RecordStore {
    /// One load, one write-back for the whole batch.
    ///
    /// Invalid records fail individually and are never written. If the
    /// write-back fails, every record that would have been written reports
    /// that error. A failures-view refresh that fails after a successful
    /// write is logged; the canonical write stands.
    fn upsert_batch(&mut self, batch: &[TagRecord]) -> Vec<Result<Upsert, TagError>> {
        let mut records = match self.records() {
            Ok(r) => r,
            Err(e) => return batch.iter().map(|_| Err(e.clone())).collect(),
        };

        let mut outcomes = Vec::with_capacity(batch.len());
        let mut refresh_failures = false;
        for record in batch {
            if let Err(e) = record.validate() {
                tracing::warn!(event = "upsert_rejected", error = %e, "Rejected record");
                outcomes.push(Err(e));
                continue;
            }
            tracing::debug!(image_id = %record.image_id, "Upserting tag record");
            let (upsert, touches_failures) = place(&mut records, record.clone());
            refresh_failures |= touches_failures;
            outcomes.push(Ok(upsert));
        }

        if !outcomes.iter().any(Result::is_ok) {
            return outcomes;
        }

        if let Err(e) = self.persist(&records) {
            tracing::warn!(event = "store_write_failed", error = %e, "Tag store write failed");
            return outcomes
                .into_iter()
                .map(|o| o.and_then(|_| Err(e.clone())))
                .collect();
        }

        if refresh_failures {
            if let Err(e) = self.write_failures(&records) {
                tracing::warn!(
                    event = "failures_refresh_failed",
                    error = %e,
                    "Failures view refresh failed after a successful write"
                );
            }
        }

        outcomes
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlagKind, TagSet};

    fn record(id: &str) -> TagRecord {
        TagRecord::new(id, TagSet::new())
    }

    #[test]
    fn insert_then_replace_in_place() {
        let mut store = RecordStore::new();
        assert_eq!(
            store.upsert(record("a")).expect("a"),
            Upsert::Inserted { position: 0 }
        );
        assert_eq!(
            store.upsert(record("b")).expect("b"),
            Upsert::Inserted { position: 1 }
        );
        assert_eq!(
            store.upsert(record("a")).expect("a again"),
            Upsert::Replaced { position: 0 }
        );

        let ids: Vec<_> = store
            .records()
            .expect("records")
            .into_iter()
            .map(|r| r.image_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn missing_image_id_is_not_written() {
        let mut store = RecordStore::new();
        store.upsert(record("a")).expect("a");

        let result = store.upsert(record(""));
        assert!(matches!(result, Err(TagError::InvalidRecord(_))));
        assert_eq!(store.count_total().expect("count"), 1);
    }

    #[test]
    fn batch_reports_per_record() {
        let mut store = RecordStore::new();
        let outcomes = store.upsert_batch(&[record("a"), record(""), record("a")]);

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0], Ok(Upsert::Inserted { position: 0 }));
        assert!(outcomes[1].is_err());
        assert_eq!(outcomes[2], Ok(Upsert::Replaced { position: 0 }));
        assert_eq!(store.count_total().expect("count"), 1);
    }

    #[test]
    fn count_by_user_counts_distinct_images() {
        let mut store = RecordStore::new();
        store.upsert(record("a").with_uid("u1")).expect("a");
        store.upsert(record("b").with_uid("u2")).expect("b");
        store.upsert(record("c").with_uid("u1")).expect("c");
        store.upsert(record("a").with_uid("u1")).expect("a again");

        assert_eq!(store.count_by_user("u1").expect("u1"), 2);
        assert_eq!(store.count_by_user("u2").expect("u2"), 1);
        assert_eq!(store.count_by_user("nobody").expect("none"), 0);
        assert_eq!(store.count_total().expect("total"), 3);
    }

    #[test]
    fn flag_change_refreshes_in_memory_failures() {
        let mut store = RecordStore::new();
        store
            .upsert(record("a").with_flag(FlagKind::Rejected))
            .expect("a");

        let StoreBackend::InMemory { failures, .. } = &store.backend else {
            unreachable!("in-memory store");
        };
        assert!(failures.contains("a"));
    }

    #[test]
    fn reupsert_of_flagged_record_refreshes_failures_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = RecordStore::open(dir.path()).expect("open");
        let failures_path = store.paths().expect("paths").failures.clone();

        store
            .upsert(
                TagRecord::new("img1", TagSet::new().with_quality("Low"))
                    .with_tagger("ada")
                    .with_flag(FlagKind::Flagged),
            )
            .expect("first");
        store
            .upsert(
                TagRecord::new("img1", TagSet::new().with_quality("High"))
                    .with_tagger("bob")
                    .with_flag(FlagKind::Flagged),
            )
            .expect("second");

        let csv = std::fs::read_to_string(&failures_path).expect("failures");
        assert_eq!(csv.lines().count(), 2);
        let row = csv.lines().nth(1).expect("row");
        assert!(row.contains("bob"));
        assert!(row.contains("High"));
        assert!(!row.contains("ada"));
    }

    #[test]
    fn unflagging_removes_row_from_failures_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = RecordStore::open(dir.path()).expect("open");
        let failures_path = store.paths().expect("paths").failures.clone();

        store
            .upsert(record("img1").with_flag(FlagKind::Rejected))
            .expect("rejected");
        store.upsert(record("img1")).expect("cleared");

        let csv = std::fs::read_to_string(&failures_path).expect("failures");
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn records_with_null_fields_survive_other_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = RecordStore::open(dir.path()).expect("open");
        let json = store.paths().expect("paths").json.clone();

        std::fs::write(
            &json,
            br#"[{"image_id":"legacy","text":null,"uid":null,"flagged":"no","tags":null}]"#,
        )
        .expect("seed");
        store.upsert(record("other")).expect("other");

        let reopened = RecordStore::open(dir.path()).expect("reopen");
        let legacy = reopened.get("legacy").expect("get").expect("legacy kept");
        assert_eq!(legacy.text, "");
        assert!(!legacy.flagged);
        assert_eq!(reopened.count_total().expect("count"), 2);
    }

    #[test]
    fn files_backend_initializes_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::open(dir.path()).expect("open");
        let paths = store.paths().expect("file backed").clone();

        assert_eq!(std::fs::read_to_string(&paths.json).expect("json").trim(), "[]");
        assert!(
            std::fs::read_to_string(&paths.csv)
                .expect("csv")
                .starts_with("image_id,")
        );
        assert_eq!(
            std::fs::read_to_string(&paths.failures).expect("failures"),
            "image_id,text,rejected,flagged,tagger,tags\n"
        );
    }

    #[test]
    fn malformed_file_reads_empty_and_heals_on_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = RecordStore::open(dir.path()).expect("open");
        let json = store.paths().expect("paths").json.clone();

        std::fs::write(&json, b"this is not json").expect("corrupt");
        assert_eq!(store.count_total().expect("count"), 0);

        store.upsert(record("a")).expect("write after corruption");
        let reopened = RecordStore::open(dir.path()).expect("reopen");
        assert_eq!(reopened.count_total().expect("count"), 1);
    }

    #[test]
    fn csv_mirrors_json_after_every_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = RecordStore::open(dir.path()).expect("open");
        store.upsert(record("a")).expect("a");
        store.upsert(record("b")).expect("b");
        store.upsert(record("a")).expect("a again");

        let csv_path = store.paths().expect("paths").csv.clone();
        let mut reader = csv::Reader::from_path(csv_path).expect("reader");
        let ids: Vec<String> = reader
            .records()
            .map(|r| r.expect("row")[0].to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}

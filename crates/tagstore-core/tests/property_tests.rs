//! # Property-Based Tests
//!
//! Store invariants under arbitrary write sequences.

use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tagstore_core::{FailureView, FlagKind, RecordStore, TagRecord, TagSet, TagSink};

fn arb_record() -> impl Strategy<Value = TagRecord> {
    (
        0u8..12,
        prop::sample::select(vec!["High", "Medium", "Low"]),
        any::<bool>(),
        any::<bool>(),
        prop::option::of(prop::sample::select(vec!["u1", "u2", "u3"])),
    )
        .prop_map(|(id, quality, flagged, rejected, uid)| {
            let mut record = TagRecord::new(format!("img{id}"), TagSet::new().with_quality(quality));
            if flagged {
                record = record.with_flag(FlagKind::Flagged);
            }
            if rejected {
                record = record.with_flag(FlagKind::Rejected);
            }
            if let Some(uid) = uid {
                record = record.with_uid(uid);
            }
            record
        })
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Upserting the same record twice leaves the store as one upsert did.
    #[test]
    fn upsert_is_idempotent(records in vec(arb_record(), 1..20)) {
        let mut once = RecordStore::new();
        let mut twice = RecordStore::new();

        for record in &records {
            once.upsert(record.clone()).expect("once");
            twice.upsert(record.clone()).expect("twice");
            twice.upsert(record.clone()).expect("twice again");
        }

        prop_assert_eq!(once.records().expect("once"), twice.records().expect("twice"));
    }

    /// The store holds exactly one record per distinct id, holding the last value.
    #[test]
    fn at_most_one_record_per_key(records in vec(arb_record(), 0..40)) {
        let mut store = RecordStore::new();
        let mut last: BTreeMap<String, TagRecord> = BTreeMap::new();

        for record in &records {
            store.upsert(record.clone()).expect("upsert");
            last.insert(record.image_id.clone(), record.clone());
        }

        let stored = store.records().expect("records");
        let ids: BTreeSet<&str> = stored.iter().map(|r| r.image_id.as_str()).collect();
        prop_assert_eq!(ids.len(), stored.len());
        prop_assert_eq!(store.count_total().expect("total"), last.len());

        for record in &stored {
            prop_assert_eq!(Some(record), last.get(&record.image_id));
        }
    }

    /// A batch upsert ends in the same state as the same upserts one by one.
    #[test]
    fn batch_matches_sequential(records in vec(arb_record(), 0..30)) {
        let mut sequential = RecordStore::new();
        for record in &records {
            sequential.upsert(record.clone()).expect("upsert");
        }

        let mut batched = RecordStore::new();
        let outcomes = batched.upsert_batch(&records);
        prop_assert!(outcomes.iter().all(Result::is_ok));

        prop_assert_eq!(sequential.records().expect("seq"), batched.records().expect("batch"));
    }

    /// The failures view lists exactly the flagged or rejected ids, and
    /// rebuilding it changes nothing.
    #[test]
    fn failures_view_is_exact_and_idempotent(records in vec(arb_record(), 0..30)) {
        let mut store = RecordStore::new();
        for record in &records {
            store.upsert(record.clone()).expect("upsert");
        }

        let first = store.materialize_failures().expect("first");
        let second = store.materialize_failures().expect("second");
        prop_assert_eq!(&first, &second);

        let expected: Vec<String> = store
            .records()
            .expect("records")
            .into_iter()
            .filter(|r| r.flagged || r.rejected)
            .map(|r| r.image_id)
            .collect();
        let actual: Vec<String> = first.rows().iter().map(|r| r.image_id.clone()).collect();
        prop_assert_eq!(actual, expected);

        let recomputed = FailureView::from_records(&store.records().expect("records")).expect("view");
        prop_assert_eq!(first, recomputed);
    }

    /// Per-user counts add up to the number of ids that carry a uid.
    #[test]
    fn user_counts_partition_owned_ids(records in vec(arb_record(), 0..30)) {
        let mut store = RecordStore::new();
        for record in &records {
            store.upsert(record.clone()).expect("upsert");
        }

        let owned = store
            .records()
            .expect("records")
            .iter()
            .filter(|r| r.uid.is_some())
            .count();
        let sum: usize = ["u1", "u2", "u3"]
            .iter()
            .map(|uid| store.count_by_user(uid).expect("count"))
            .sum();
        prop_assert_eq!(sum, owned);
    }
}

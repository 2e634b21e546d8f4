use super::common::*;
use crate::monitor::diff::{detect_new, SourceBatch};
use crate::monitor::domain::Source;
use crate::monitor::store::{KnownViolationStore, StoreError};

#[test]
fn reports_only_unknown_records_in_canonical_order() {
    let mut store = MemoryStore::seeded(&[record(Source::Hpd, "H123")]);
    let batches = vec![
        SourceBatch::new(Source::Dob, vec![record(Source::Dob, "D1")]),
        SourceBatch::new(
            Source::Hpd,
            vec![record(Source::Hpd, "H123"), record(Source::Hpd, "H456")],
        ),
    ];

    let fresh = detect_new(batches, &mut store, &property(), now()).expect("diff succeeds");

    assert_eq!(
        keys(&fresh),
        vec![key(Source::Hpd, "H456"), key(Source::Dob, "D1")]
    );
    assert!(store.contains(&key(Source::Hpd, "H123")));
    assert!(store.contains(&key(Source::Hpd, "H456")));
    assert!(store.contains(&key(Source::Dob, "D1")));
    assert_eq!(store.len(), 3);
}

#[test]
fn fetch_order_is_preserved_within_a_source() {
    let mut store = MemoryStore::default();
    let batches = vec![SourceBatch::new(
        Source::Oath,
        vec![
            record(Source::Oath, "300"),
            record(Source::Oath, "100"),
            record(Source::Oath, "200"),
        ],
    )];

    let fresh = detect_new(batches, &mut store, &property(), now()).expect("diff succeeds");

    assert_eq!(
        keys(&fresh),
        vec![
            key(Source::Oath, "300"),
            key(Source::Oath, "100"),
            key(Source::Oath, "200")
        ]
    );
}

#[test]
fn duplicate_rows_within_a_fetch_are_reported_once() {
    let mut store = MemoryStore::default();
    let batches = vec![SourceBatch::new(
        Source::Complaints311,
        vec![
            record(Source::Complaints311, "555"),
            record(Source::Complaints311, "555"),
        ],
    )];

    let fresh = detect_new(batches, &mut store, &property(), now()).expect("diff succeeds");

    assert_eq!(fresh.len(), 1);
}

#[test]
fn same_native_id_in_different_sources_is_distinct() {
    let mut store = MemoryStore::seeded(&[record(Source::Hpd, "42")]);
    let batches = vec![SourceBatch::new(Source::Dob, vec![record(Source::Dob, "42")])];

    let fresh = detect_new(batches, &mut store, &property(), now()).expect("diff succeeds");

    assert_eq!(keys(&fresh), vec![key(Source::Dob, "42")]);
}

#[test]
fn store_failure_keeps_the_processed_prefix() {
    let mut store = MemoryStore::failing_after(1);
    let batches = vec![SourceBatch::new(
        Source::Hpd,
        vec![record(Source::Hpd, "H1"), record(Source::Hpd, "H2")],
    )];

    let error = detect_new(batches, &mut store, &property(), now()).expect_err("second write fails");

    assert!(matches!(error, StoreError::Io { .. }));
    assert!(store.contains(&key(Source::Hpd, "H1")));
    assert!(!store.contains(&key(Source::Hpd, "H2")));
}

#[test]
fn entries_record_first_seen_and_property() {
    let mut store = MemoryStore::default();
    let batches = vec![SourceBatch::new(Source::Dob, vec![record(Source::Dob, "D7")])];

    detect_new(batches, &mut store, &property(), now()).expect("diff succeeds");

    let entry = &store.entries()[0];
    assert_eq!(entry.first_seen, now());
    assert_eq!(entry.block, "01234");
    assert_eq!(entry.lot, "0056");
    assert_eq!(entry.issued_date, record(Source::Dob, "D7").issued_date);
}

use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{KnownViolationEntry, PropertyKey, Source, ViolationRecord};
use super::store::{KnownViolationStore, StoreError};

/// Records fetched from one feed during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBatch {
    pub source: Source,
    pub records: Vec<ViolationRecord>,
}

impl SourceBatch {
    pub fn new(source: Source, records: Vec<ViolationRecord>) -> Self {
        Self { source, records }
    }
}

/// Returns the records the store has not seen, in canonical source order and
/// fetch order within a source. Each new record is marked seen before the next
/// one is examined, so an interruption leaves exactly the processed prefix.
pub fn detect_new<S>(
    mut batches: Vec<SourceBatch>,
    store: &mut S,
    property: &PropertyKey,
    seen_at: DateTime<Utc>,
) -> Result<Vec<ViolationRecord>, StoreError>
where
    S: KnownViolationStore + ?Sized,
{
    batches.sort_by_key(|batch| batch.source);

    let mut fresh = Vec::new();
    for batch in batches {
        let mut known = 0usize;
        for record in batch.records {
            let key = record.key();
            if store.contains(&key) {
                known += 1;
                continue;
            }

            store.mark_seen(KnownViolationEntry::observed(&record, property, seen_at))?;
            debug!(violation = %key, "new violation recorded");
            fresh.push(record);
        }
        debug!(source = batch.source.tag(), already_known = known, "diffed batch");
    }

    Ok(fresh)
}

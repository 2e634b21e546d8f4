use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::monitor::domain::{
    KnownViolationEntry, PropertyKey, Source, ViolationKey, ViolationRecord,
};
use crate::monitor::notify::{DigestMessage, MailRelay, NotifyError};
use crate::monitor::sources::{FetchFailure, RecordSource, SourceError};
use crate::monitor::store::{KnownViolationStore, StoreError};

pub(super) fn property() -> PropertyKey {
    PropertyKey::new("01234", "0056")
}

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn record(source: Source, native_id: &str) -> ViolationRecord {
    ViolationRecord {
        source,
        native_id: native_id.to_string(),
        issued_date: NaiveDate::from_ymd_opt(2025, 3, 1),
        description: format!("{} finding {native_id}", source.tag()),
        raw_fields: BTreeMap::new(),
    }
}

pub(super) fn key(source: Source, native_id: &str) -> ViolationKey {
    ViolationKey::new(source, native_id)
}

pub(super) fn keys(records: &[ViolationRecord]) -> Vec<ViolationKey> {
    records.iter().map(ViolationRecord::key).collect()
}

#[derive(Debug, Default)]
pub(super) struct MemoryStore {
    known: HashSet<ViolationKey>,
    entries: Vec<KnownViolationEntry>,
    fail_after: Option<usize>,
}

impl MemoryStore {
    pub(super) fn seeded(records: &[ViolationRecord]) -> Self {
        let mut store = Self::default();
        for record in records {
            store
                .mark_seen(KnownViolationEntry::observed(
                    record,
                    &property(),
                    now() - chrono::Duration::days(30),
                ))
                .expect("seed store");
        }
        store
    }

    /// Accepts `writes` marks, then fails like an unwritable disk.
    pub(super) fn failing_after(writes: usize) -> Self {
        Self {
            fail_after: Some(writes),
            ..Self::default()
        }
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl KnownViolationStore for MemoryStore {
    fn contains(&self, key: &ViolationKey) -> bool {
        self.known.contains(key)
    }

    fn mark_seen(&mut self, entry: KnownViolationEntry) -> Result<(), StoreError> {
        if self.known.contains(&entry.key()) {
            return Ok(());
        }
        if self.fail_after.is_some_and(|limit| self.entries.len() >= limit) {
            return Err(StoreError::Io {
                path: "memory://ledger".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.known.insert(entry.key());
        self.entries.push(entry);
        Ok(())
    }

    fn entries(&self) -> Vec<KnownViolationEntry> {
        self.entries.clone()
    }
}

#[derive(Debug)]
pub(super) struct FakeSource {
    feed: Source,
    outcome: Result<Vec<ViolationRecord>, FetchFailure>,
}

impl FakeSource {
    pub(super) fn ok(feed: Source, records: Vec<ViolationRecord>) -> Box<dyn RecordSource> {
        Box::new(Self {
            feed,
            outcome: Ok(records),
        })
    }

    pub(super) fn failing(feed: Source) -> Box<dyn RecordSource> {
        Box::new(Self {
            feed,
            outcome: Err(FetchFailure::Status(503)),
        })
    }
}

impl RecordSource for FakeSource {
    fn source(&self) -> Source {
        self.feed
    }

    fn fetch(
        &self,
        _property: &PropertyKey,
        _since: NaiveDate,
    ) -> Result<Vec<ViolationRecord>, SourceError> {
        self.outcome
            .clone()
            .map_err(|failure| SourceError::new(self.feed, failure, 3))
    }
}

#[derive(Debug, Clone, Default)]
pub(super) struct RecordingRelay {
    sent: Arc<Mutex<Vec<(DigestMessage, Vec<String>)>>>,
    failures: Arc<Mutex<VecDeque<NotifyError>>>,
    attempts: Arc<Mutex<usize>>,
}

impl RecordingRelay {
    pub(super) fn failing_with(failures: Vec<NotifyError>) -> Self {
        Self {
            failures: Arc::new(Mutex::new(failures.into())),
            ..Self::default()
        }
    }

    pub(super) fn sent(&self) -> Vec<(DigestMessage, Vec<String>)> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }

    pub(super) fn attempts(&self) -> usize {
        *self.attempts.lock().expect("attempts mutex poisoned")
    }
}

impl MailRelay for RecordingRelay {
    fn send(&self, message: &DigestMessage, recipients: &[String]) -> Result<(), NotifyError> {
        *self.attempts.lock().expect("attempts mutex poisoned") += 1;
        if let Some(failure) = self
            .failures
            .lock()
            .expect("failures mutex poisoned")
            .pop_front()
        {
            return Err(failure);
        }
        self.sent
            .lock()
            .expect("sent mutex poisoned")
            .push((message.clone(), recipients.to_vec()));
        Ok(())
    }
}

pub(super) fn recipients() -> Vec<String> {
    vec!["owner@example.test".to_string()]
}

pub(super) fn generated_on() -> NaiveDate {
    now().date_naive()
}

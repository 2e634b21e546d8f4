mod diff;
pub mod domain;
pub mod notify;
mod retry;
mod run;
pub mod sources;
pub mod store;

#[cfg(test)]
mod tests;

pub use diff::{detect_new, SourceBatch};
pub use domain::{KnownViolationEntry, PropertyKey, Source, ViolationKey, ViolationRecord};
pub use notify::{Delivery, Digest, DigestMessage, DigestNotifier, MailRelay, NotifyError};
pub use retry::{BackoffPolicy, RetryPolicy, Retryable};
pub use run::{
    NotificationStatus, RunController, RunOptions, RunOutcome, RunReport, RunResult, RunStage,
};
pub use sources::{FetchFailure, RecordSource, SocrataSource, SourceError};
pub use store::{CsvViolationLedger, KnownViolationStore, StoreError};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::diff::{detect_new, SourceBatch};
use super::domain::{PropertyKey, Source, ViolationRecord};
use super::notify::{Delivery, Digest, DigestNotifier, SmtpRelay};
use super::sources::{RecordSource, ReqwestTransport, SocrataSource, SourceError};
use super::store::{CsvViolationLedger, KnownViolationStore};
use crate::config::AppConfig;
use crate::error::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    Fetching,
    Diffing,
    Notifying,
    Done,
    Failed,
}

impl RunStage {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::Notifying => "notifying",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Clean,
    PartialSourceErrors,
    FailedEntirely,
}

impl RunOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Clean => "ran clean",
            Self::PartialSourceErrors => "ran with partial source errors",
            Self::FailedEntirely => "failed entirely",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    Sent { recipients: usize },
    NothingToSend,
    NoRecipients,
    Disabled,
    /// The run failed before a digest could be considered.
    Skipped,
    Failed(String),
}

impl NotificationStatus {
    pub fn was_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// New records and collected source errors of a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub new_records: Vec<ViolationRecord>,
    pub errors: Vec<SourceError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub property: PropertyKey,
    pub outcome: RunOutcome,
    pub stage: RunStage,
    pub succeeded: Vec<Source>,
    pub failed: Vec<Source>,
    pub result: RunResult,
    pub notification: NotificationStatus,
}

impl RunReport {
    pub fn is_failure(&self) -> bool {
        self.outcome == RunOutcome::FailedEntirely
    }

    pub fn summary_line(&self) -> String {
        let found = match self.result.new_records.len() {
            0 => "no new violations".to_string(),
            1 => "1 new violation".to_string(),
            n => format!("{n} new violations"),
        };
        let notification = match &self.notification {
            NotificationStatus::Sent { recipients } => format!("yes ({recipients} recipients)"),
            NotificationStatus::NothingToSend => "no (nothing to send)".to_string(),
            NotificationStatus::NoRecipients => "no (no recipients)".to_string(),
            NotificationStatus::Disabled => "no (disabled)".to_string(),
            NotificationStatus::Skipped => "no (run failed)".to_string(),
            NotificationStatus::Failed(reason) => format!("no (failed: {reason})"),
        };

        format!(
            "{}: {}; sources ok {}, sources failed {}; {}; notification sent: {}",
            self.property,
            self.outcome.label(),
            self.succeeded.len(),
            self.failed.len(),
            found,
            notification
        )
    }

    /// Converts a total source failure into an error for the process exit code.
    pub fn ensure_success(&self) -> Result<(), MonitorError> {
        if self.is_failure() {
            return Err(MonitorError::AllSourcesFailed {
                failed: self.failed.len(),
            });
        }
        Ok(())
    }
}

/// Per-invocation overrides layered on top of [`AppConfig`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub no_email: bool,
}

/// Sequences fetch → diff → persist → notify exactly once.
#[derive(Debug)]
pub struct RunController<S> {
    property: PropertyKey,
    sources: Vec<Box<dyn RecordSource>>,
    store: S,
    notifier: Option<DigestNotifier>,
    lookback_days: u32,
    stage: RunStage,
}

impl RunController<CsvViolationLedger> {
    /// Wires the production sources, ledger, and SMTP relay from configuration.
    pub fn from_config(config: &AppConfig, options: &RunOptions) -> Result<Self, MonitorError> {
        let transport = Arc::new(ReqwestTransport::new(ReqwestTransport::DEFAULT_TIMEOUT)?);
        let sources = config
            .nyc_data
            .sources
            .iter()
            .map(|source| {
                Box::new(SocrataSource::new(
                    *source,
                    config.nyc_data.base_url.clone(),
                    config.nyc_data.api_token.clone(),
                    transport.clone(),
                )) as Box<dyn RecordSource>
            })
            .collect();

        let store = CsvViolationLedger::open(&config.state.store_path)?;

        let mut controller = Self::new(config.property.clone(), sources, store)
            .with_lookback_days(config.nyc_data.lookback_days);
        if options.no_email {
            info!("email notification disabled for this run");
        } else {
            let relay = SmtpRelay::from_config(&config.email)?;
            let notifier = DigestNotifier::new(Box::new(relay), config.email.to_emails.clone())
                .send_when_empty(config.email.send_when_empty);
            controller = controller.with_notifier(notifier);
        }

        Ok(controller)
    }
}

impl<S> RunController<S>
where
    S: KnownViolationStore,
{
    pub fn new(property: PropertyKey, sources: Vec<Box<dyn RecordSource>>, store: S) -> Self {
        Self {
            property,
            sources,
            store,
            notifier: None,
            lookback_days: 1,
            stage: RunStage::Idle,
        }
    }

    pub fn with_notifier(mut self, notifier: DigestNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days.max(1);
        self
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Runs the pipeline once. The lookback window and digest date use the
    /// calendar date of `now` in its own zone; ledger timestamps are UTC.
    pub fn execute<Tz: TimeZone>(&mut self, now: DateTime<Tz>) -> Result<RunReport, MonitorError> {
        info!(property = %self.property, "checking violations");
        let today = now.date_naive();
        let now = now.with_timezone(&Utc);
        let since = today - Duration::days(i64::from(self.lookback_days));

        self.transition(RunStage::Fetching);
        let (batches, succeeded, errors) = self.fetch_all(since);
        let failed: Vec<Source> = errors.iter().map(|err| err.feed).collect();

        if succeeded.is_empty() {
            self.transition(RunStage::Failed);
            error!(failed = failed.len(), "every source failed; skipping diff and notification");
            return Ok(RunReport {
                property: self.property.clone(),
                outcome: RunOutcome::FailedEntirely,
                stage: self.stage,
                succeeded,
                failed,
                result: RunResult {
                    new_records: Vec::new(),
                    errors,
                },
                notification: NotificationStatus::Skipped,
            });
        }

        self.transition(RunStage::Diffing);
        let new_records = match detect_new(batches, &mut self.store, &self.property, now) {
            Ok(records) => records,
            Err(err) => {
                self.transition(RunStage::Failed);
                error!(error = %err, "known-violations store failed");
                return Err(err.into());
            }
        };
        info!(new = new_records.len(), "diff complete");

        self.transition(RunStage::Notifying);
        let result = RunResult {
            new_records,
            errors,
        };
        let notification = self.notify(&result, &succeeded, today);

        self.transition(RunStage::Done);
        let outcome = if result.errors.is_empty() {
            RunOutcome::Clean
        } else {
            RunOutcome::PartialSourceErrors
        };

        Ok(RunReport {
            property: self.property.clone(),
            outcome,
            stage: self.stage,
            succeeded,
            failed,
            result,
            notification,
        })
    }

    fn fetch_all(&self, since: NaiveDate) -> (Vec<SourceBatch>, Vec<Source>, Vec<SourceError>) {
        let mut batches = Vec::with_capacity(self.sources.len());
        let mut succeeded = Vec::with_capacity(self.sources.len());
        let mut errors = Vec::new();

        for source in &self.sources {
            match source.fetch(&self.property, since) {
                Ok(records) => {
                    info!(source = source.source().tag(), rows = records.len(), "source fetched");
                    succeeded.push(source.source());
                    batches.push(SourceBatch::new(source.source(), records));
                }
                Err(err) => {
                    warn!(error = %err, "source fetch failed");
                    errors.push(err);
                }
            }
        }

        succeeded.sort();
        errors.sort_by_key(|err| err.feed);
        (batches, succeeded, errors)
    }

    fn notify(
        &self,
        result: &RunResult,
        succeeded: &[Source],
        today: NaiveDate,
    ) -> NotificationStatus {
        let Some(notifier) = &self.notifier else {
            debug!("no notifier configured");
            return NotificationStatus::Disabled;
        };

        let mut monitored: Vec<Source> = succeeded.to_vec();
        monitored.extend(result.errors.iter().map(|err| err.feed));
        let digest = Digest {
            property: &self.property,
            monitored: &monitored,
            records: &result.new_records,
            unavailable: &result.errors,
            generated_on: today,
        };

        match notifier.notify(&digest) {
            Ok(Delivery::Sent { recipients, .. }) => NotificationStatus::Sent { recipients },
            Ok(Delivery::NothingToSend) => NotificationStatus::NothingToSend,
            Ok(Delivery::NoRecipients) => NotificationStatus::NoRecipients,
            Err(err) => {
                warn!(error = %err, "digest could not be delivered; records stay marked seen");
                NotificationStatus::Failed(err.to_string())
            }
        }
    }

    fn transition(&mut self, next: RunStage) {
        debug!(from = self.stage.label(), to = next.label(), "run stage");
        self.stage = next;
    }
}

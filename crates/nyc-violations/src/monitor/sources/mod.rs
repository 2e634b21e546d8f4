//! Record fetchers for the NYC Open Data feeds.
//!
//! Every feed is a Socrata resource, so a single [`SocrataSource`] is
//! parameterized per feed by a [`DatasetSpec`] table entry. The HTTP client sits
//! behind [`HttpTransport`] so retry and normalization can be exercised without
//! the network.

mod datasets;
mod transport;

use chrono::NaiveDate;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

use super::domain::{PropertyKey, Source, ViolationRecord};
use super::retry::{RetryPolicy, Retryable};

pub use datasets::{DatasetSpec, ROW_LIMIT};
pub use transport::{HttpQuery, HttpTransport, ReqwestTransport, TransportError, APP_TOKEN_HEADER};

/// Capability implemented once per upstream feed.
pub trait RecordSource: Debug {
    fn source(&self) -> Source;
    fn fetch(
        &self,
        property: &PropertyKey,
        since: NaiveDate,
    ) -> Result<Vec<ViolationRecord>, SourceError>;
}

/// Why a single feed could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("network error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Retryable for FetchFailure {
    fn is_transient(&self) -> bool {
        match self {
            FetchFailure::Transport(_) | FetchFailure::Timeout | FetchFailure::RateLimited => true,
            FetchFailure::Status(status) => *status >= 500,
            FetchFailure::Malformed(_) => false,
        }
    }
}

impl From<TransportError> for FetchFailure {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Timeout => Self::Timeout,
            TransportError::Connect(message) | TransportError::Client(message) => {
                Self::Transport(message)
            }
            TransportError::Status { status: 429 } => Self::RateLimited,
            TransportError::Status { status } => Self::Status(status),
            TransportError::Decode(message) => Self::Malformed(message),
        }
    }
}

/// Non-fatal per-feed error collected into the run report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{feed} unavailable after {attempts} attempt(s): {failure}")]
pub struct SourceError {
    pub feed: Source,
    pub failure: FetchFailure,
    pub attempts: usize,
}

impl SourceError {
    pub fn new(feed: Source, failure: FetchFailure, attempts: usize) -> Self {
        Self {
            feed,
            failure,
            attempts,
        }
    }
}

#[derive(Debug)]
pub struct SocrataSource {
    dataset: &'static DatasetSpec,
    base_url: String,
    app_token: Option<String>,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl SocrataSource {
    pub fn new(
        source: Source,
        base_url: impl Into<String>,
        app_token: Option<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            dataset: DatasetSpec::for_source(source),
            base_url: base_url.into(),
            app_token,
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn dataset(&self) -> &'static DatasetSpec {
        self.dataset
    }

    pub fn query_for(&self, property: &PropertyKey, since: NaiveDate) -> HttpQuery {
        HttpQuery {
            url: self.dataset.resource_url(&self.base_url),
            params: self.dataset.query_params(property, since),
            app_token: self.app_token.clone(),
        }
    }

    /// Single unfiltered one-row request used by the connectivity self-test.
    pub fn probe(&self) -> Result<usize, SourceError> {
        let query = HttpQuery {
            url: self.dataset.resource_url(&self.base_url),
            params: vec![("$limit".to_string(), "1".to_string())],
            app_token: self.app_token.clone(),
        };
        let payload = self
            .transport
            .get_json(&query)
            .map_err(|err| SourceError::new(self.source(), err.into(), 1))?;
        self.dataset
            .normalize(payload)
            .map(|records| records.len())
            .map_err(|failure| SourceError::new(self.source(), failure, 1))
    }
}

impl RecordSource for SocrataSource {
    fn source(&self) -> Source {
        self.dataset.source
    }

    fn fetch(
        &self,
        property: &PropertyKey,
        since: NaiveDate,
    ) -> Result<Vec<ViolationRecord>, SourceError> {
        let query = self.query_for(property, since);
        let mut attempts = 0;

        let payload = self
            .retry
            .run(self.dataset.source.tag(), |attempt| {
                attempts = attempt;
                self.transport
                    .get_json(&query)
                    .map_err(FetchFailure::from)
            })
            .map_err(|failure| SourceError::new(self.source(), failure, attempts))?;

        let records = self
            .dataset
            .normalize(payload)
            .map_err(|failure| SourceError::new(self.source(), failure, attempts))?;

        debug!(
            source = self.dataset.source.tag(),
            dataset = self.dataset.dataset_id,
            rows = records.len(),
            attempts,
            "fetched records"
        );
        Ok(records)
    }
}

use crate::config::ConfigError;
use crate::monitor::notify::NotifyError;
use crate::monitor::sources::TransportError;
use crate::monitor::store::StoreError;
use crate::telemetry::TelemetryError;
use std::fmt;

/// Fatal errors: each aborts the invocation with a non-zero exit.
#[derive(Debug)]
pub enum MonitorError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Store(StoreError),
    Http(TransportError),
    Mail(NotifyError),
    AllSourcesFailed { failed: usize },
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Config(err) => write!(f, "configuration error: {}", err),
            MonitorError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            MonitorError::Store(err) => write!(f, "store error: {}", err),
            MonitorError::Http(err) => write!(f, "http client error: {}", err),
            MonitorError::Mail(err) => write!(f, "mail setup error: {}", err),
            MonitorError::AllSourcesFailed { failed } => {
                write!(f, "run failed: all {} data sources were unavailable", failed)
            }
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Config(err) => Some(err),
            MonitorError::Telemetry(err) => Some(err),
            MonitorError::Store(err) => Some(err),
            MonitorError::Http(err) => Some(err),
            MonitorError::Mail(err) => Some(err),
            MonitorError::AllSourcesFailed { .. } => None,
        }
    }
}

impl From<ConfigError> for MonitorError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for MonitorError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<StoreError> for MonitorError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<TransportError> for MonitorError {
    fn from(value: TransportError) -> Self {
        Self::Http(value)
    }
}

impl From<NotifyError> for MonitorError {
    fn from(value: NotifyError) -> Self {
        Self::Mail(value)
    }
}

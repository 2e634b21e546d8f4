use std::fmt::Debug;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

/// Socrata's application token header.
pub const APP_TOKEN_HEADER: &str = "X-App-Token";

/// A single GET against a Socrata resource endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpQuery {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub app_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },
    #[error("response body was not valid JSON: {0}")]
    Decode(String),
    #[error("http client unavailable: {0}")]
    Client(String),
}

pub trait HttpTransport: Debug {
    fn get_json(&self, query: &HttpQuery) -> Result<Value, TransportError>;
}

/// Async `reqwest` client driven by a private current-thread runtime so the
/// fetch pipeline stays synchronous.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    runtime: Runtime,
}

impl ReqwestTransport {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nyc-violations/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;

        Ok(Self { client, runtime })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get_json(&self, query: &HttpQuery) -> Result<Value, TransportError> {
        self.runtime.block_on(async {
            let mut request = self.client.get(&query.url).query(&query.params);
            if let Some(token) = &query.app_token {
                request = request.header(APP_TOKEN_HEADER, token);
            }

            let response = request.send().await.map_err(map_request_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                });
            }

            response.json::<Value>().await.map_err(|err| {
                if err.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Decode(err.to_string())
                }
            })
        })
    }
}

fn map_request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connect(err.to_string())
    }
}

use serde::{Deserialize, Deserializer};
use std::env;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::monitor::domain::{PropertyKey, Source};
use crate::monitor::notify::parse_mailbox;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_BASE_URL: &str = "https://data.cityofnewyork.us/resource";
pub const DEFAULT_STORE_PATH: &str = "violations.csv";

/// Top-level configuration for a monitoring run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub property: PropertyKey,
    pub email: EmailConfig,
    pub nyc_data: NycDataConfig,
    pub state: StateConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Loads `.env`, then the file named by `MONITOR_CONFIG` (or `config.json`).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = env::var("MONITOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ConfigError::Missing {
                path: path.to_path_buf(),
            },
            _ => ConfigError::Unreadable {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let mut config = Self::from_json(&raw)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parses and validates a configuration document without touching the environment.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        file.validate()
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(password) = non_empty_var("MONITOR_SMTP_PASSWORD") {
            self.email.from_password = password;
        }
        if let Some(token) = non_empty_var("MONITOR_SOCRATA_TOKEN") {
            self.nyc_data.api_token = Some(token);
        }
        if let Some(path) = non_empty_var("MONITOR_STORE_PATH") {
            self.state.store_path = PathBuf::from(path);
        }
        if let Some(level) = non_empty_var("MONITOR_LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
        Ok(())
    }
}

/// SMTP submission settings and digest recipients.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub from_email: String,
    pub from_password: String,
    pub to_emails: Vec<String>,
    pub send_when_empty: bool,
}

impl EmailConfig {
    /// Human-readable problems for the self-test; empty when the settings look usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.smtp_server.trim().is_empty() {
            problems.push("smtp_server: missing or empty".to_string());
        }
        if self.smtp_port == 0 {
            problems.push("smtp_port: must be a non-zero port".to_string());
        }
        if self.from_email.trim().is_empty() {
            problems.push("from_email: missing or empty".to_string());
        }
        if self.from_password.is_empty() {
            problems.push("from_password: missing or empty".to_string());
        }
        if self.to_emails.is_empty() {
            problems.push("to_emails: no recipients configured".to_string());
        }
        problems
    }
}

/// Open-data endpoint settings.
#[derive(Debug, Clone)]
pub struct NycDataConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub lookback_days: u32,
    pub sources: Vec<Source>,
}

/// Location of the known-violations ledger.
#[derive(Debug, Clone)]
pub struct StateConfig {
    pub store_path: PathBuf,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    property: PropertyFile,
    email: EmailFile,
    #[serde(default)]
    nyc_data: NycDataFile,
    #[serde(default)]
    state: StateFile,
}

#[derive(Debug, Deserialize)]
struct PropertyFile {
    #[serde(deserialize_with = "string_or_number")]
    block: String,
    #[serde(deserialize_with = "string_or_number")]
    lot: String,
}

#[derive(Debug, Deserialize)]
struct EmailFile {
    smtp_server: String,
    smtp_port: u16,
    from_email: String,
    #[serde(default)]
    from_password: String,
    #[serde(default)]
    to_emails: Vec<String>,
    #[serde(default)]
    send_when_empty: bool,
}

#[derive(Debug, Default, Deserialize)]
struct NycDataFile {
    #[serde(default)]
    api_tokens: ApiTokensFile,
    base_url: Option<String>,
    lookback_days: Option<u32>,
    sources: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiTokensFile {
    socrata_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StateFile {
    store_path: Option<PathBuf>,
}

impl ConfigFile {
    fn validate(self) -> Result<AppConfig, ConfigError> {
        let block = required("property.block", self.property.block)?;
        let lot = required("property.lot", self.property.lot)?;
        let smtp_server = required("email.smtp_server", self.email.smtp_server)?;
        let from_email = required("email.from_email", self.email.from_email)?;
        if self.email.smtp_port == 0 {
            return Err(ConfigError::Invalid {
                field: "email.smtp_port",
                reason: "must be a non-zero port".to_string(),
            });
        }

        mailbox("email.from_email", &from_email)?;
        let to_emails: Vec<String> = self
            .email
            .to_emails
            .into_iter()
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .collect();
        for address in &to_emails {
            mailbox("email.to_emails", address)?;
        }

        let lookback_days = self.nyc_data.lookback_days.unwrap_or(1);
        if lookback_days == 0 {
            return Err(ConfigError::Invalid {
                field: "nyc_data.lookback_days",
                reason: "must be at least 1".to_string(),
            });
        }

        let sources = match self.nyc_data.sources {
            None => Source::ordered().to_vec(),
            Some(tags) => parse_sources(&tags)?,
        };

        let base_url = self
            .nyc_data
            .base_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let api_token = self
            .nyc_data
            .api_tokens
            .socrata_token
            .filter(|token| !token.trim().is_empty());

        Ok(AppConfig {
            property: PropertyKey::new(block, lot),
            email: EmailConfig {
                smtp_server,
                smtp_port: self.email.smtp_port,
                from_email,
                from_password: self.email.from_password,
                to_emails,
                send_when_empty: self.email.send_when_empty,
            },
            nyc_data: NycDataConfig {
                base_url,
                api_token,
                lookback_days,
                sources,
            },
            state: StateConfig {
                store_path: self
                    .state
                    .store_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
            },
        })
    }
}

fn parse_sources(tags: &[String]) -> Result<Vec<Source>, ConfigError> {
    let mut sources = Vec::with_capacity(tags.len());
    for tag in tags {
        let source =
            Source::from_tag(tag).ok_or_else(|| ConfigError::UnknownSource(tag.clone()))?;
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    if sources.is_empty() {
        return Err(ConfigError::Invalid {
            field: "nyc_data.sources",
            reason: "at least one source must be enabled".to_string(),
        });
    }
    sources.sort();
    Ok(sources)
}

fn required(field: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Rejects addresses the relay would refuse, before any record is marked seen.
fn mailbox(field: &'static str, address: &str) -> Result<(), ConfigError> {
    parse_mailbox(address)
        .map(|_| ())
        .map_err(|err| ConfigError::Invalid {
            field,
            reason: err.to_string(),
        })
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

#[derive(Debug)]
pub enum ConfigError {
    Missing {
        path: PathBuf,
    },
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid {
        field: &'static str,
        reason: String,
    },
    UnknownSource(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing { path } => write!(
                f,
                "{} not found; copy config.json.example and fill in the property and email settings",
                path.display()
            ),
            ConfigError::Unreadable { path, .. } => {
                write!(f, "unable to read {}", path.display())
            }
            ConfigError::Parse(err) => write!(f, "config is not valid JSON: {}", err),
            ConfigError::Invalid { field, reason } => write!(f, "{} {}", field, reason),
            ConfigError::UnknownSource(tag) => write!(
                f,
                "nyc_data.sources contains unknown source '{}' (expected 311, hpd, oath, dob)",
                tag
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Unreadable { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Missing { .. }
            | ConfigError::Invalid { .. }
            | ConfigError::UnknownSource(_) => None,
        }
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Borough block/lot pair pinning the monitored parcel across every feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyKey {
    pub block: String,
    pub lot: String,
}

impl PropertyKey {
    pub fn new(block: impl Into<String>, lot: impl Into<String>) -> Self {
        Self {
            block: block.into(),
            lot: lot.into(),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block {}, Lot {}", self.block, self.lot)
    }
}

/// Upstream open-data feed. Declaration order is the canonical reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "311")]
    Complaints311,
    #[serde(rename = "hpd")]
    Hpd,
    #[serde(rename = "oath")]
    Oath,
    #[serde(rename = "dob")]
    Dob,
}

impl Source {
    pub const fn ordered() -> [Self; 4] {
        [Self::Complaints311, Self::Hpd, Self::Oath, Self::Dob]
    }

    /// Stable identifier used in the ledger file and on the command line.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Complaints311 => "311",
            Self::Hpd => "hpd",
            Self::Oath => "oath",
            Self::Dob => "dob",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Complaints311 => "311 Complaints",
            Self::Hpd => "HPD Violations",
            Self::Oath => "OATH Violations",
            Self::Dob => "DOB Violations",
        }
    }

    /// Accepts the short tags as well as the legacy `*_complaints` / `*_violations` keys.
    pub fn from_tag(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "311" | "311_complaints" | "complaints" => Some(Self::Complaints311),
            "hpd" | "hpd_violations" => Some(Self::Hpd),
            "oath" | "oath_violations" => Some(Self::Oath),
            "dob" | "dob_violations" => Some(Self::Dob),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::from_tag(raw).ok_or_else(|| {
            format!("unknown source '{raw}' (expected one of: 311, hpd, oath, dob)")
        })
    }
}

/// Natural key of a violation: unique per feed, not across feeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViolationKey {
    pub source: Source,
    pub native_id: String,
}

impl ViolationKey {
    pub fn new(source: Source, native_id: impl Into<String>) -> Self {
        Self {
            source,
            native_id: native_id.into(),
        }
    }
}

impl fmt::Display for ViolationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source.tag(), self.native_id)
    }
}

/// A record normalized out of one of the upstream feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationRecord {
    pub source: Source,
    pub native_id: String,
    pub issued_date: Option<NaiveDate>,
    pub description: String,
    pub raw_fields: BTreeMap<String, String>,
}

impl ViolationRecord {
    pub fn key(&self) -> ViolationKey {
        ViolationKey::new(self.source, self.native_id.clone())
    }

    pub fn issued_label(&self) -> String {
        match self.issued_date {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Ledger row written the first time a record is confirmed new. Never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownViolationEntry {
    pub source: Source,
    pub native_id: String,
    pub first_seen: DateTime<Utc>,
    pub block: String,
    pub lot: String,
    pub issued_date: Option<NaiveDate>,
}

impl KnownViolationEntry {
    pub fn observed(
        record: &ViolationRecord,
        property: &PropertyKey,
        first_seen: DateTime<Utc>,
    ) -> Self {
        Self {
            source: record.source,
            native_id: record.native_id.clone(),
            first_seen,
            block: property.block.clone(),
            lot: property.lot.clone(),
            issued_date: record.issued_date,
        }
    }

    pub fn key(&self) -> ViolationKey {
        ViolationKey::new(self.source, self.native_id.clone())
    }
}

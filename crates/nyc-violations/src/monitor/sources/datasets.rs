use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use super::FetchFailure;
use crate::monitor::domain::{PropertyKey, Source, ViolationRecord};

/// Maximum rows requested per query.
pub const ROW_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationFilter {
    /// 311 rows carry no block/lot columns, so the address is pattern matched.
    AddressLike,
    BlockLot,
}

/// How one Socrata dataset is queried and normalized.
#[derive(Debug, PartialEq, Eq)]
pub struct DatasetSpec {
    pub source: Source,
    pub dataset_id: &'static str,
    pub id_field: &'static str,
    pub date_field: &'static str,
    pub description_fields: &'static [&'static str],
    filter: LocationFilter,
}

static COMPLAINTS_311: DatasetSpec = DatasetSpec {
    source: Source::Complaints311,
    dataset_id: "erm2-nwe9",
    id_field: "unique_key",
    date_field: "created_date",
    description_fields: &["complaint_type", "descriptor"],
    filter: LocationFilter::AddressLike,
};

static HPD_VIOLATIONS: DatasetSpec = DatasetSpec {
    source: Source::Hpd,
    dataset_id: "wvxf-dwi5",
    id_field: "violationid",
    date_field: "inspectiondate",
    description_fields: &["violationtype", "violationdescription"],
    filter: LocationFilter::BlockLot,
};

static OATH_VIOLATIONS: DatasetSpec = DatasetSpec {
    source: Source::Oath,
    dataset_id: "6bgk-3dad",
    id_field: "summons_number",
    date_field: "hearing_date",
    description_fields: &["violation_type", "status"],
    filter: LocationFilter::BlockLot,
};

static DOB_VIOLATIONS: DatasetSpec = DatasetSpec {
    source: Source::Dob,
    dataset_id: "3h2n-5cm9",
    id_field: "isn_dob_bis_viol",
    date_field: "issue_date",
    description_fields: &["violation_type_code", "description"],
    filter: LocationFilter::BlockLot,
};

impl DatasetSpec {
    pub fn for_source(source: Source) -> &'static DatasetSpec {
        match source {
            Source::Complaints311 => &COMPLAINTS_311,
            Source::Hpd => &HPD_VIOLATIONS,
            Source::Oath => &OATH_VIOLATIONS,
            Source::Dob => &DOB_VIOLATIONS,
        }
    }

    pub fn resource_url(&self, base_url: &str) -> String {
        format!("{}/{}.json", base_url.trim_end_matches('/'), self.dataset_id)
    }

    /// SoQL parameters selecting rows for `property` newer than `since`.
    pub fn query_params(&self, property: &PropertyKey, since: NaiveDate) -> Vec<(String, String)> {
        let block = soql_literal(&property.block);
        let lot = soql_literal(&property.lot);
        let since = since.format("%Y-%m-%d");
        let location = match self.filter {
            LocationFilter::AddressLike => format!("incident_address LIKE '%{block} %{lot}%'"),
            LocationFilter::BlockLot => format!("block = '{block}' AND lot = '{lot}'"),
        };

        vec![
            (
                "$where".to_string(),
                format!("{location} AND {} > '{since}'", self.date_field),
            ),
            ("$order".to_string(), format!("{} DESC", self.date_field)),
            ("$limit".to_string(), ROW_LIMIT.to_string()),
        ]
    }

    /// Turns a Socrata JSON payload into records, skipping rows without an id.
    pub(crate) fn normalize(&self, payload: Value) -> Result<Vec<ViolationRecord>, FetchFailure> {
        let rows = match payload {
            Value::Array(rows) => rows,
            other => {
                return Err(FetchFailure::Malformed(format!(
                    "expected a JSON array, got {}",
                    json_kind(&other)
                )))
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            let Value::Object(object) = row else {
                return Err(FetchFailure::Malformed(format!(
                    "row {index} is not a JSON object"
                )));
            };

            let raw_fields = flatten_fields(object);
            let Some(native_id) = raw_fields
                .get(self.id_field)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
            else {
                debug!(
                    source = self.source.tag(),
                    row = index,
                    field = self.id_field,
                    "skipping row without identifier"
                );
                continue;
            };

            let issued_date = raw_fields
                .get(self.date_field)
                .and_then(|raw| parse_issued_date(raw));
            let description = self
                .description_fields
                .iter()
                .filter_map(|field| raw_fields.get(*field))
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .collect::<Vec<_>>()
                .join(" - ");

            records.push(ViolationRecord {
                source: self.source,
                native_id,
                issued_date,
                description,
                raw_fields,
            });
        }

        Ok(records)
    }
}

fn soql_literal(raw: &str) -> String {
    raw.trim().replace('\'', "''")
}

fn flatten_fields(object: Map<String, Value>) -> BTreeMap<String, String> {
    object
        .into_iter()
        .filter_map(|(key, value)| {
            let flattened = match value {
                Value::Null => return None,
                Value::String(text) => text,
                Value::Bool(flag) => flag.to_string(),
                Value::Number(number) => number.to_string(),
                nested => nested.to_string(),
            };
            Some((key, flattened))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Socrata floating timestamps, RFC 3339, ISO dates, DOB's `YYYYMMDD`, and US dates.
pub(crate) fn parse_issued_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }

    ["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

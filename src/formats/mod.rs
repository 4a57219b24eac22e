//! APC vendor formats.
//!
//! Each vendor has a [`FormatAdapter`] that turns one raw CSV line into draft
//! board-alight rows using the schedule. [`detect_format`] picks the adapter
//! from the header once per file, trying [`ApcFormat::ALL`] in order.

mod cet;
mod gmv;
mod ltd;
mod passio;
mod ridecheck;
mod rvtd;
mod swiftly;
mod weta;

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calendar::service_ids_for_date;
use crate::error::{ImportError, RecordError, RecordFailure};
use crate::schedule::ScheduleQuery;
use crate::time::format_service_date;
use crate::validate::Draft;

/// One parsed CSV line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based line in the source file, header included.
    pub line_number: u64,
    pub fields: HashMap<String, String>,
}

impl RawRecord {
    pub fn new(line_number: u64, fields: HashMap<String, String>) -> Self {
        Self { line_number, fields }
    }

    /// The raw value of `name`, trimmed.
    pub fn field(&self, name: &str) -> Result<&str, RecordError> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .ok_or_else(|| RecordError::MissingField(name.to_string()))
    }

    /// Like [`RawRecord::field`] but an empty or `NULL` value is an error.
    pub fn non_empty(&self, name: &str) -> Result<&str, RecordError> {
        match self.field(name)? {
            "" | "NULL" => Err(RecordError::EmptyField(name.to_string())),
            value => Ok(value),
        }
    }

    /// The value of `name` when present and neither empty nor `NULL`.
    pub fn optional(&self, name: &str) -> Option<&str> {
        self.non_empty(name).ok()
    }

    /// A count field parsed as an integer, for Issue context.
    pub fn count(&self, name: &str) -> Option<i64> {
        self.optional(name).and_then(|value| value.parse().ok())
    }
}

/// Maps raw lines of one vendor format to draft board-alight rows.
pub trait FormatAdapter: Send + Sync {
    fn format(&self) -> ApcFormat;

    /// Header names that identify this format. Extra columns are ignored.
    fn required_fields(&self) -> &'static [&'static str];

    fn detect(&self, field_names: &[String]) -> bool {
        self.required_fields()
            .iter()
            .all(|required| field_names.iter().any(|name| name == required))
    }

    /// Whether the data can hold several partial observations of one event.
    fn merges_duplicates(&self) -> bool {
        false
    }

    /// Resolves one raw line. Most formats yield one row; some yield two.
    ///
    /// # Errors
    ///
    /// Any unresolvable reference fails the whole line with the counts it
    /// carried attached, so the line becomes exactly one Issue.
    fn adapt(&self, record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordFailure>;
}

/// Known vendor formats, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ApcFormat {
    Cet,
    Ltd,
    Rvtd,
    Weta,
    Gmv,
    Swiftly,
    Ridecheck,
    Passio,
}

impl ApcFormat {
    pub const ALL: [ApcFormat; 8] = [
        ApcFormat::Cet,
        ApcFormat::Ltd,
        ApcFormat::Rvtd,
        ApcFormat::Weta,
        ApcFormat::Gmv,
        ApcFormat::Swiftly,
        ApcFormat::Ridecheck,
        ApcFormat::Passio,
    ];

    pub fn adapter(self) -> &'static dyn FormatAdapter {
        match self {
            ApcFormat::Cet => &cet::Cet,
            ApcFormat::Ltd => &ltd::Ltd,
            ApcFormat::Rvtd => &rvtd::Rvtd,
            ApcFormat::Weta => &weta::Weta,
            ApcFormat::Gmv => &gmv::Gmv,
            ApcFormat::Swiftly => &swiftly::Swiftly,
            ApcFormat::Ridecheck => &ridecheck::Ridecheck,
            ApcFormat::Passio => &passio::Passio,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ApcFormat::Cet => "cet",
            ApcFormat::Ltd => "ltd",
            ApcFormat::Rvtd => "rvtd",
            ApcFormat::Weta => "weta",
            ApcFormat::Gmv => "gmv",
            ApcFormat::Swiftly => "swiftly",
            ApcFormat::Ridecheck => "ridecheck",
            ApcFormat::Passio => "passio",
        }
    }
}

impl fmt::Display for ApcFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Selects the first format whose required header names are all present.
///
/// # Errors
///
/// Returns [`ImportError::UndetectedFormat`] listing the header when no
/// format matches. This aborts the whole file.
pub fn detect_format(field_names: &[String]) -> Result<ApcFormat, ImportError> {
    ApcFormat::ALL
        .into_iter()
        .find(|format| format.adapter().detect(field_names))
        .ok_or_else(|| ImportError::UndetectedFormat(field_names.join(", ")))
}

/// Left-pads `value` with zeros to `width` characters.
pub(crate) fn pad_start(value: &str, width: usize) -> String {
    format!("{value:0>width$}")
}

/// Parses `value` with the first of `formats` that accepts it.
pub(crate) fn parse_datetime(value: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value.trim(), format).ok())
}

pub(crate) fn parse_date(value: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value.trim(), format).ok())
}

pub(crate) fn invalid_date(field: &str, value: &str) -> RecordError {
    RecordError::InvalidDateTime {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Service ids running on `date`. None running is a record error naming the
/// raw field it came from.
pub(crate) fn active_service_ids(
    schedule: &dyn ScheduleQuery,
    date: NaiveDate,
    field: &str,
    raw: &str,
) -> Result<BTreeSet<String>, RecordError> {
    let service_ids = service_ids_for_date(schedule, date);
    if service_ids.is_empty() {
        return Err(RecordError::NoServiceIds {
            field: field.to_string(),
            value: raw.to_string(),
        });
    }
    Ok(service_ids)
}

pub(crate) fn service_date_value(date: NaiveDate) -> Value {
    Value::String(format_service_date(date))
}

/// Builds a draft from `(column, value)` pairs, skipping absent values.
pub(crate) fn draft<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<Value>)>) -> Draft {
    pairs
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name.to_string(), value)))
        .collect()
}

pub(crate) fn text(value: impl Into<String>) -> Option<Value> {
    Some(Value::String(value.into()))
}

pub(crate) fn int(value: impl Into<i64>) -> Option<Value> {
    Some(Value::from(value.into()))
}

/// A raw optional vendor field passed through for the validator to coerce.
pub(crate) fn raw(value: Option<&str>) -> Option<Value> {
    value.map(|value| Value::String(value.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_detect_cet_with_extra_columns() {
        let header = names(&["Vehicle", "Exits", "Entrys", "ClientTime", "Route_ID", "RouteStop"]);
        assert_eq!(detect_format(&header).unwrap(), ApcFormat::Cet);
    }

    #[test]
    fn test_detect_each_format_from_its_own_fields() {
        for format in ApcFormat::ALL {
            let header = names(format.adapter().required_fields());
            assert_eq!(detect_format(&header).unwrap(), format);
        }
    }

    #[test]
    fn test_detect_unknown_header_lists_fields() {
        let err = detect_format(&names(&["foo", "bar"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to detect APC type from field names: foo, bar"
        );
    }

    #[test]
    fn test_only_cet_merges_duplicates() {
        let merging: Vec<ApcFormat> = ApcFormat::ALL
            .into_iter()
            .filter(|format| format.adapter().merges_duplicates())
            .collect();
        assert_eq!(merging, vec![ApcFormat::Cet]);
    }

    #[test]
    fn test_adapter_reports_its_format() {
        for format in ApcFormat::ALL {
            assert_eq!(format.adapter().format(), format);
        }
    }

    #[test]
    fn test_pad_start() {
        assert_eq!(pad_start("101", 5), "00101");
        assert_eq!(pad_start("123456", 5), "123456");
    }

    #[test]
    fn test_raw_record_field_access() {
        let record = test_support::record(&[("a", " 1 "), ("b", "NULL"), ("c", "")]);
        assert_eq!(record.field("a").unwrap(), "1");
        assert_eq!(record.count("a"), Some(1));
        assert_eq!(
            record.non_empty("b").unwrap_err(),
            RecordError::EmptyField("b".into())
        );
        assert!(record.optional("c").is_none());
        assert_eq!(
            record.field("missing").unwrap_err(),
            RecordError::MissingField("missing".into())
        );
    }
}

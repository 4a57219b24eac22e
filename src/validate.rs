//! Schema-driven normalization of draft rows.
//!
//! Adapters emit loosely typed drafts (a JSON object per row). This module
//! drops unknown and empty fields, coerces numbers, enforces required/min/max
//! and derives the midnight-second `...stamp` fields.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::error::ValidationError;
use crate::model::{Column, ColumnType, Model};
use crate::time::to_wall_clock;

/// A draft row keyed by column name.
pub type Draft = Map<String, Value>;

/// Column name suffixes that get a derived `<name>stamp` field.
const TIME_FIELDS: [&str; 4] = ["start_time", "end_time", "arrival_time", "departure_time"];

/// Parses the leading integer of a string the way loose CSV producers expect:
/// `"12"`, `" 12 "`, `"12.9"` and `"12 pax"` all give 12.
fn parse_integer_prefix(value: &str) -> Option<i64> {
    let value = value.trim();
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, value.strip_prefix('+').unwrap_or(value)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty() || s == "NULL",
        _ => false,
    }
}

fn coerce(value: Value, kind: ColumnType) -> Option<Value> {
    match kind {
        ColumnType::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .map(Value::from),
            Value::String(s) => parse_integer_prefix(&s).map(Value::from),
            _ => None,
        },
        ColumnType::Real => match value {
            Value::Number(n) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            _ => None,
        },
        ColumnType::Text => match value {
            Value::String(s) => Some(Value::String(s.trim().to_string())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
    }
}

fn check_bounds(column: &Column, value: &Value, model: &Model, line: u64) -> Result<(), ValidationError> {
    let Some(number) = value.as_f64() else {
        return Ok(());
    };
    if let Some(min) = column.min {
        if number < min {
            return Err(ValidationError::BelowMinimum {
                file: model.filename_base,
                field: column.name,
                line,
                min,
            });
        }
    }
    if let Some(max) = column.max {
        if number > max {
            return Err(ValidationError::AboveMaximum {
                file: model.filename_base,
                field: column.name,
                line,
                max,
            });
        }
    }
    Ok(())
}

/// Normalizes `draft` against `model`.
///
/// Negative counts are rejected, never clamped; `"NULL"` and `""` count as
/// absent, never as zero.
///
/// # Errors
///
/// Returns the first required, minimum or maximum violation, naming the
/// schema file, field and `line`.
pub fn normalize(draft: Draft, model: &Model, line: u64) -> Result<Draft, ValidationError> {
    let mut record = Draft::new();

    for (name, value) in draft {
        let Some(column) = model.column(&name) else {
            continue;
        };
        if is_absent(&value) {
            continue;
        }
        if let Some(value) = coerce(value, column.kind) {
            record.insert(name, value);
        }
    }

    for column in model.schema {
        match record.get(column.name) {
            None if column.required => {
                return Err(ValidationError::MissingRequired {
                    file: model.filename_base,
                    field: column.name,
                    line,
                });
            }
            None => {}
            Some(value) => check_bounds(column, value, model, line)?,
        }
    }

    for column in model.schema {
        if !TIME_FIELDS.iter().any(|suffix| column.name.ends_with(suffix)) {
            continue;
        }
        let stamp_name = format!("{}stamp", column.name);
        if model.column(&stamp_name).is_none() {
            continue;
        }
        let stamp = record
            .get(column.name)
            .and_then(Value::as_str)
            .and_then(to_wall_clock)
            .map(|clock| clock.service_seconds());
        if let Some(stamp) = stamp {
            record.insert(stamp_name, Value::from(stamp));
        }
    }

    Ok(record)
}

/// Normalizes `draft` and converts it into the model's typed row.
pub fn into_row<T: DeserializeOwned>(draft: Draft, model: &Model, line: u64) -> Result<T, ValidationError> {
    let record = normalize(draft, model, line)?;
    serde_json::from_value(Value::Object(record)).map_err(|e| ValidationError::Shape {
        file: model.filename_base,
        line,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BOARD_ALIGHT, BoardAlight, RIDE_FEED_INFO, RideFeedInfo};
    use serde_json::json;

    fn draft(value: Value) -> Draft {
        match value {
            Value::Object(map) => map,
            _ => panic!("draft must be an object"),
        }
    }

    fn base() -> Value {
        json!({
            "trip_id": "T1",
            "stop_id": "S1",
            "stop_sequence": "3",
            "record_use": 0,
            "service_date": "20240305",
        })
    }

    #[test]
    fn test_negative_count_is_rejected_not_clamped() {
        let mut value = base();
        value["boardings"] = json!(-1);

        let err = normalize(draft(value), &BOARD_ALIGHT, 4).unwrap_err();
        assert_eq!(
            err,
            ValidationError::BelowMinimum {
                file: "board_alight",
                field: "boardings",
                line: 4,
                min: 0.0,
            }
        );
    }

    #[test]
    fn test_null_sentinel_is_absent_not_zero() {
        let mut value = base();
        value["boardings"] = json!("NULL");
        value["alightings"] = json!("");

        let record = normalize(draft(value), &BOARD_ALIGHT, 2).unwrap();
        assert!(!record.contains_key("boardings"));
        assert!(!record.contains_key("alightings"));
    }

    #[test]
    fn test_unknown_fields_are_dropped() {
        let mut value = base();
        value["vehicle"] = json!("bus 12");

        let record = normalize(draft(value), &BOARD_ALIGHT, 2).unwrap();
        assert!(!record.contains_key("vehicle"));
    }

    #[test]
    fn test_integer_coercion() {
        let mut value = base();
        value["boardings"] = json!("12");
        value["alightings"] = json!("3.9");
        value["current_load"] = json!("lots");

        let record = normalize(draft(value), &BOARD_ALIGHT, 2).unwrap();
        assert_eq!(record["boardings"], json!(12));
        assert_eq!(record["alightings"], json!(3));
        assert_eq!(record["stop_sequence"], json!(3));
        assert!(!record.contains_key("current_load"));
    }

    #[test]
    fn test_missing_required_field() {
        let mut value = base();
        value.as_object_mut().unwrap().remove("trip_id");

        let err = normalize(draft(value), &BOARD_ALIGHT, 9).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required value in board_alight.txt for trip_id on line 9."
        );
    }

    #[test]
    fn test_required_field_that_fails_coercion_is_missing() {
        let mut value = base();
        value["stop_sequence"] = json!("n/a");

        let err = normalize(draft(value), &BOARD_ALIGHT, 5).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MissingRequired { field: "stop_sequence", .. }
        ));
    }

    #[test]
    fn test_above_maximum() {
        let mut value = base();
        value["record_use"] = json!(2);

        let err = normalize(draft(value), &BOARD_ALIGHT, 3).unwrap_err();
        assert!(matches!(err, ValidationError::AboveMaximum { field: "record_use", .. }));
    }

    #[test]
    fn test_time_fields_get_stamps() {
        let mut value = base();
        value["service_arrival_time"] = json!("08:05:00");
        value["service_departure_time"] = json!("25:00:00");

        let record = normalize(draft(value), &BOARD_ALIGHT, 2).unwrap();
        assert_eq!(record["service_arrival_timestamp"], json!(8 * 3600 + 5 * 60));
        assert_eq!(record["service_departure_timestamp"], json!(25 * 3600));
    }

    #[test]
    fn test_malformed_time_gets_no_stamp() {
        let mut value = base();
        value["service_arrival_time"] = json!("8:05");

        let record = normalize(draft(value), &BOARD_ALIGHT, 2).unwrap();
        assert!(!record.contains_key("service_arrival_timestamp"));
    }

    #[test]
    fn test_into_row_board_alight() {
        let mut value = base();
        value["boardings"] = json!("5");

        let row: BoardAlight = into_row(draft(value), &BOARD_ALIGHT, 2).unwrap();
        assert_eq!(row.trip_id, "T1");
        assert_eq!(row.stop_sequence, 3);
        assert_eq!(row.service_date, 20240305);
        assert_eq!(row.boardings, Some(5));
        assert_eq!(row.alightings, None);
    }

    #[test]
    fn test_into_row_ride_feed_info() {
        let value = json!({ "ride_files": 0, "ride_start_date": 20240301, "ride_end_date": null });

        let row: RideFeedInfo = into_row(draft(value), &RIDE_FEED_INFO, 1).unwrap();
        assert_eq!(row.ride_files, 0);
        assert_eq!(row.ride_start_date, Some(20240301));
        assert_eq!(row.ride_end_date, None);
    }

    #[test]
    fn test_parse_integer_prefix() {
        assert_eq!(parse_integer_prefix(" 42 "), Some(42));
        assert_eq!(parse_integer_prefix("-3"), Some(-3));
        assert_eq!(parse_integer_prefix("7 pax"), Some(7));
        assert_eq!(parse_integer_prefix("x7"), None);
        assert_eq!(parse_integer_prefix(""), None);
    }
}

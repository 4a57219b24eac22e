use chrono::NaiveDateTime;
use serde_json::Value;

use super::{
    ApcFormat, FormatAdapter, RawRecord, active_service_ids, draft, int, invalid_date,
    parse_datetime, text,
};
use crate::error::{IssueContext, RecordError, RecordFailure};
use crate::matcher::{CandidateQuery, find_closest_trip_by_time};
use crate::schedule::{RouteFilter, ScheduleQuery, StopFilter};
use crate::time::format_service_date;
use crate::validate::Draft;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

fn timestamp(value: &str) -> Option<NaiveDateTime> {
    parse_datetime(value, &TIMESTAMP_FORMATS)
}

/// Sum of the front and rear door counts. Absent when neither door reported.
fn door_total(record: &RawRecord, front: &str, rear: &str) -> Result<Option<i64>, RecordError> {
    match (record.count(front), record.count(rear)) {
        (None, None) => Ok(None),
        (front_count, rear_count) => front_count
            .unwrap_or(0)
            .checked_add(rear_count.unwrap_or(0))
            .map(Some)
            .ok_or_else(|| RecordError::CountOverflow {
                field: format!("{front}+{rear}"),
            }),
    }
}

/// Ride checker exports with separate front and rear door counters. The
/// service date is the date of the actual arrival.
pub struct Ridecheck;

impl Ridecheck {
    fn resolve(record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordError> {
        let stop_code = record.field("STOP_ID")?;
        let stop_ids: Vec<String> = schedule
            .stops(StopFilter::Code(stop_code))
            .into_iter()
            .map(|stop| stop.stop_id.clone())
            .collect();
        if stop_ids.is_empty() {
            return Err(RecordError::InvalidStop {
                field: "stop code".into(),
                value: stop_code.into(),
            });
        }

        let route_number = record.field("ROUTE_NUMBER")?;
        let route = schedule
            .routes(RouteFilter::ShortName(route_number))
            .into_iter()
            .next()
            .ok_or_else(|| RecordError::InvalidRoute {
                field: "route number".into(),
                value: route_number.into(),
            })?;

        let boardings = door_total(record, "FON", "RON")?;
        let alightings = door_total(record, "FOFF", "ROFF")?;

        let arrive_value = record.non_empty("TIME_ACTUAL_ARRIVE")?;
        let arrival = timestamp(arrive_value).ok_or_else(|| invalid_date("TIME_ACTUAL_ARRIVE", arrive_value))?;
        let departure = record.optional("TIME_ACTUAL_DEPART").and_then(timestamp);

        let service_date = format_service_date(arrival.date());
        let service_ids = active_service_ids(schedule, arrival.date(), "date", &service_date)?;

        let query = CandidateQuery {
            stop_ids: &stop_ids,
            route_id: &route.route_id,
            service_ids: &service_ids,
        };
        let arrival_clock = arrival.format("%H:%M:%S").to_string();
        let matched = find_closest_trip_by_time(schedule, &query, &arrival_clock)?;

        Ok(vec![draft([
            ("trip_id", text(matched.trip_id)),
            ("stop_id", text(matched.stop_id)),
            ("stop_sequence", int(matched.stop_sequence)),
            ("record_use", int(0)),
            ("schedule_relationship", int(0)),
            ("boardings", boardings.map(Value::from)),
            ("alightings", alightings.map(Value::from)),
            ("load_count", record.count("MAX_LOAD").map(Value::from)),
            ("load_type", int(1)),
            ("service_date", text(service_date)),
            ("service_arrival_time", text(arrival_clock)),
            (
                "service_departure_time",
                departure.and_then(|dt| text(dt.format("%H:%M:%S").to_string())),
            ),
            ("source", int(1)),
        ])])
    }
}

impl FormatAdapter for Ridecheck {
    fn format(&self) -> ApcFormat {
        ApcFormat::Ridecheck
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "STOP_ID",
            "ROUTE_NUMBER",
            "SIGNUP_NAME",
            "TIME_ACTUAL_ARRIVE",
            "TIME_ACTUAL_DEPART",
            "FON",
            "RON",
            "FOFF",
            "ROFF",
            "MAX_LOAD",
        ]
    }

    fn adapt(&self, record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordFailure> {
        let context = IssueContext {
            date: record
                .optional("TIME_ACTUAL_ARRIVE")
                .and_then(timestamp)
                .map(|dt| format_service_date(dt.date())),
            boardings: door_total(record, "FON", "RON").ok().flatten(),
            alightings: door_total(record, "FOFF", "ROFF").ok().flatten(),
        };
        Self::resolve(record, schedule).map_err(|error| RecordFailure { error, context })
    }
}

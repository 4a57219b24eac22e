use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

use super::{ApcFormat, FormatAdapter, RawRecord, active_service_ids, draft, int, invalid_date, raw, text};
use crate::error::{IssueContext, RecordError, RecordFailure};
use crate::matcher::{CandidateQuery, find_closest_stop_time_by_time, find_closest_trip_by_time};
use crate::schedule::{ScheduleQuery, StopFilter};
use crate::time::format_service_date;
use crate::validate::Draft;

/// Timestamps carry their own UTC offset; the local clock at that offset is
/// what the schedule is written in.
fn local_timestamp(value: &str) -> Option<NaiveDateTime> {
    ["%m/%d/%Y %H:%M:%S %:z", "%m/%d/%Y %H:%M:%S %z"]
        .iter()
        .find_map(|format| DateTime::parse_from_str(value.trim(), format).ok())
        .map(|dt| dt.naive_local())
}

fn timestamp_field(record: &RawRecord, name: &str) -> Result<NaiveDateTime, RecordError> {
    let value = record.field(name)?;
    local_timestamp(value).ok_or_else(|| invalid_date(name, value))
}

fn clock(dt: NaiveDateTime) -> String {
    dt.format("%H:%M:%S").to_string()
}

/// Stop-level events with a vendor trip name that is usually, but not
/// always, a GTFS trip_id.
pub struct Gmv;

impl Gmv {
    fn resolve(record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordError> {
        let scheduled = timestamp_field(record, "ScheduledArrive")?;
        let arrival = timestamp_field(record, "Arrive")?;
        let departure = record
            .optional("Depart")
            .and_then(local_timestamp)
            .map(clock);

        let stop_value = record.field("StopId")?;
        if stop_value.is_empty() {
            return Err(RecordError::EmptyField("stop".into()));
        }
        let stop = schedule
            .stops(StopFilter::Id(stop_value))
            .into_iter()
            .next()
            .ok_or_else(|| RecordError::InvalidStop {
                field: "stop".into(),
                value: stop_value.into(),
            })?;

        let service_date = scheduled.date();
        let service_ids = active_service_ids(
            schedule,
            service_date,
            "calendar_date",
            &format_service_date(service_date),
        )?;

        let trip_name = record.field("TripName")?;
        let trip_id = match schedule.trip(trip_name) {
            Some(trip) => trip.trip_id.clone(),
            None => {
                let stop_ids = vec![stop.stop_id.clone()];
                let query = CandidateQuery {
                    stop_ids: &stop_ids,
                    route_id: record.field("RouteId")?,
                    service_ids: &service_ids,
                };
                find_closest_trip_by_time(schedule, &query, &clock(scheduled))?.trip_id
            }
        };

        let stop_time = find_closest_stop_time_by_time(schedule, &trip_id, &stop.stop_id, &clock(arrival))?;

        Ok(vec![draft([
            ("trip_id", text(trip_id)),
            ("stop_id", text(stop.stop_id.clone())),
            ("stop_sequence", int(stop_time.stop_sequence)),
            ("record_use", int(0)),
            ("schedule_relationship", int(0)),
            ("boardings", raw(record.optional("Ons"))),
            ("alightings", raw(record.optional("Offs"))),
            ("load_count", raw(record.optional("DeparturePassengers"))),
            ("load_type", int(1)),
            ("service_date", text(format_service_date(service_date))),
            ("service_arrival_time", text(clock(arrival))),
            ("service_departure_time", departure.map(Value::String)),
            ("source", int(1)),
        ])])
    }
}

impl FormatAdapter for Gmv {
    fn format(&self) -> ApcFormat {
        ApcFormat::Gmv
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "StopId",
            "RouteId",
            "TripName",
            "ScheduledArrive",
            "Arrive",
            "Depart",
            "Ons",
            "Offs",
            "DeparturePassengers",
        ]
    }

    fn adapt(&self, record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordFailure> {
        let context = IssueContext {
            date: record
                .optional("ScheduledArrive")
                .and_then(local_timestamp)
                .map(|dt| format_service_date(dt.date())),
            boardings: record.count("Ons"),
            alightings: record.count("Offs"),
        };
        Self::resolve(record, schedule).map_err(|error| RecordFailure { error, context })
    }
}

use std::collections::BTreeMap;

use super::{
    ApcFormat, FormatAdapter, RawRecord, active_service_ids, draft, int, invalid_date, parse_date,
    raw, service_date_value, text,
};
use crate::error::{IssueContext, RecordError, RecordFailure};
use crate::schedule::{ScheduleQuery, StopTime, station_stop_ids};
use crate::time::{format_service_date, normalize_clock, parse_clock_seconds};
use crate::validate::Draft;

/// Ferry run segments as (code, origin stop_id, destination stop_id).
const RUN_SEGMENTS: [(&str, &str, &str); 10] = [
    ("FBVJO", "2455444", "12149044"),
    ("VJOFB", "12149044", "2455444"),
    ("FBRICH", "2455444", "890004"),
    ("RICHFB", "890004", "2455444"),
    ("JLSALA", "12030043", "12030042"),
    ("ALAJLS", "12030042", "12030043"),
    ("FBALA", "2455444", "12030042"),
    ("ALAFB", "12030042", "2455444"),
    ("FBJLS", "2455444", "12030043"),
    ("JLSFB", "12030043", "2455444"),
];

const DATE_FORMATS: [&str; 2] = ["%m/%d/%Y", "%Y-%m-%d"];

fn run_segment(code: &str) -> Option<(&'static str, &'static str)> {
    RUN_SEGMENTS
        .iter()
        .find(|(segment, _, _)| *segment == code)
        .map(|(_, origin, destination)| (*origin, *destination))
}

fn departure_secs(stop_time: &StopTime) -> Option<u32> {
    stop_time
        .departure_time
        .as_deref()
        .or(stop_time.arrival_time.as_deref())
        .and_then(parse_clock_seconds)
}

/// A vendor clock value in `H:mm` or `H:mm:ss`, zero padded when readable.
fn clock_value(value: Option<&str>) -> Option<serde_json::Value> {
    let value = value?;
    match normalize_clock(value) {
        Some(clock) => text(clock),
        None => raw(Some(value)),
    }
}

/// Ferry runs: one line per vessel leg between two terminals. Each line
/// becomes a boarding row at the origin and an alighting row at the
/// destination of the same trip.
pub struct Weta;

impl Weta {
    fn resolve(record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordError> {
        let code = record.field("RunSegment")?;
        let (origin_id, destination_id) =
            run_segment(code).ok_or_else(|| RecordError::InvalidRunSegment(code.to_string()))?;

        let date_value = record.field("Date")?;
        let service_date =
            parse_date(date_value, &DATE_FORMATS).ok_or_else(|| invalid_date("Date", date_value))?;
        let service_ids = active_service_ids(schedule, service_date, "Date", date_value)?;

        let sched_depart = record.field("SchedDepart")?;
        let depart_secs = normalize_clock(sched_depart)
            .as_deref()
            .and_then(parse_clock_seconds)
            .ok_or_else(|| invalid_date("SchedDepart", sched_depart))?;

        let origin_ids = station_stop_ids(schedule, origin_id);
        let destination_ids = station_stop_ids(schedule, destination_id);

        // trip_id -> (origin, first destination after it)
        let mut legs: BTreeMap<&str, (&StopTime, &StopTime)> = BTreeMap::new();
        for origin_stop_id in &origin_ids {
            for origin in schedule.stop_times_at_stop(origin_stop_id) {
                if departure_secs(origin) != Some(depart_secs) {
                    continue;
                }
                let runs = schedule
                    .trip(&origin.trip_id)
                    .is_some_and(|trip| service_ids.contains(&trip.service_id));
                if !runs || legs.contains_key(origin.trip_id.as_str()) {
                    continue;
                }
                let destination = schedule
                    .stop_times(&origin.trip_id)
                    .iter()
                    .filter(|st| st.stop_sequence > origin.stop_sequence)
                    .find(|st| destination_ids.contains(&st.stop_id));
                if let Some(destination) = destination {
                    legs.insert(&origin.trip_id, (origin, destination));
                }
            }
        }

        let description = format!("stop_id `{origin_id}` departure time `{sched_depart}`");
        let (origin, destination) = match legs.len() {
            0 => return Err(RecordError::TripNotFound(description)),
            1 => legs.into_values().next().ok_or(RecordError::NoCandidates)?,
            count => return Err(RecordError::AmbiguousTrip { count, description }),
        };

        let service_date = service_date_value(service_date);
        let boarding = draft([
            ("trip_id", text(origin.trip_id.clone())),
            ("stop_id", text(origin.stop_id.clone())),
            ("stop_sequence", int(origin.stop_sequence)),
            ("record_use", int(0)),
            ("schedule_relationship", int(0)),
            ("boardings", raw(record.optional("PassengersOn"))),
            ("load_type", int(1)),
            ("bike_boardings", raw(record.optional("BikesOn"))),
            ("service_date", Some(service_date.clone())),
            ("service_departure_time", clock_value(record.optional("Depart"))),
            ("source", int(0)),
        ]);
        let alighting = draft([
            ("trip_id", text(destination.trip_id.clone())),
            ("stop_id", text(destination.stop_id.clone())),
            ("stop_sequence", int(destination.stop_sequence)),
            ("record_use", int(0)),
            ("schedule_relationship", int(0)),
            ("alightings", raw(record.optional("PassengersOff"))),
            ("load_type", int(0)),
            ("bike_alightings", raw(record.optional("BikesOff"))),
            ("service_date", Some(service_date)),
            ("service_arrival_time", clock_value(record.optional("Arrival"))),
            ("source", int(0)),
        ]);
        Ok(vec![boarding, alighting])
    }
}

impl FormatAdapter for Weta {
    fn format(&self) -> ApcFormat {
        ApcFormat::Weta
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "RunSegment",
            "Date",
            "SchedDepart",
            "Depart",
            "Arrival",
            "PassengersOn",
            "PassengersOff",
            "BikesOn",
            "BikesOff",
        ]
    }

    fn adapt(&self, record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordFailure> {
        let context = IssueContext {
            date: record
                .optional("Date")
                .and_then(|value| parse_date(value, &DATE_FORMATS))
                .map(format_service_date),
            boardings: record.count("PassengersOn"),
            alightings: record.count("PassengersOff"),
        };
        Self::resolve(record, schedule).map_err(|error| RecordFailure { error, context })
    }
}

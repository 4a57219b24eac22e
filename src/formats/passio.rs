use super::{ApcFormat, FormatAdapter, RawRecord, draft, int, invalid_date, parse_date, raw, text};
use crate::error::{IssueContext, RecordError, RecordFailure};
use crate::schedule::{ScheduleQuery, StopFilter};
use crate::time::{format_service_date, normalize_clock, parse_clock_seconds};
use crate::validate::Draft;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    On,
    Off,
}

impl Direction {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "on" => Some(Direction::On),
            "off" => Some(Direction::Off),
            _ => None,
        }
    }
}

/// Per-direction counts: the raw count as (boardings, alightings).
fn counts(record: &RawRecord) -> (Option<&str>, Option<&str>) {
    let count = record.optional("Count");
    match record.optional("On off").and_then(Direction::parse) {
        Some(Direction::On) => (count, None),
        Some(Direction::Off) => (None, count),
        None => (None, None),
    }
}

/// One line per stop event and direction, keyed by GTFS trip and stop ids.
pub struct Passio;

impl Passio {
    fn resolve(record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordError> {
        let trip_id = record.field("Trip ID")?;
        if schedule.trip(trip_id).is_none() {
            return Err(RecordError::InvalidTrip {
                field: "Trip ID".into(),
                value: trip_id.into(),
            });
        }

        let stop_id = record.field("Stop ID")?;
        if schedule.stops(StopFilter::Id(stop_id)).is_empty() {
            return Err(RecordError::InvalidStop {
                field: "Stop ID".into(),
                value: stop_id.into(),
            });
        }

        let direction = record.field("On off")?;
        if Direction::parse(direction).is_none() {
            return Err(RecordError::InvalidDateTime {
                field: "On off".into(),
                value: direction.into(),
            });
        }

        let date_value = record.field("Date")?;
        let service_date =
            parse_date(date_value, &DATE_FORMATS).ok_or_else(|| invalid_date("Date", date_value))?;

        let time_point = record.field("Time point")?;
        let time_point_secs = normalize_clock(time_point)
            .as_deref()
            .and_then(parse_clock_seconds)
            .ok_or_else(|| invalid_date("Time point", time_point))?;

        let stop_time = schedule
            .stop_times(trip_id)
            .iter()
            .filter(|st| st.stop_id == stop_id)
            .find(|st| st.departure_time.as_deref().and_then(parse_clock_seconds) == Some(time_point_secs))
            .ok_or_else(|| {
                RecordError::NoStopTime(format!(
                    "stop_id=`{stop_id}` trip_id=`{trip_id}` departure_time=`{time_point}`"
                ))
            })?;

        let (boardings, alightings) = counts(record);
        let departure = record
            .optional("Time")
            .map(|time| normalize_clock(time).unwrap_or_else(|| time.to_string()));

        Ok(vec![draft([
            ("trip_id", text(trip_id)),
            ("stop_id", text(stop_id)),
            ("stop_sequence", int(stop_time.stop_sequence)),
            ("record_use", int(0)),
            ("schedule_relationship", int(0)),
            ("boardings", raw(boardings)),
            ("alightings", raw(alightings)),
            ("load_count", raw(record.optional("Pax load"))),
            ("load_type", int(1)),
            ("service_date", text(format_service_date(service_date))),
            ("service_departure_time", departure.and_then(|time| text(time))),
            ("source", int(1)),
        ])])
    }
}

impl FormatAdapter for Passio {
    fn format(&self) -> ApcFormat {
        ApcFormat::Passio
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "Trip ID",
            "Stop ID",
            "Date",
            "On off",
            "Count",
            "Pax load",
            "Time point",
            "Time",
        ]
    }

    fn adapt(&self, record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordFailure> {
        let (boardings, alightings) = counts(record);
        let context = IssueContext {
            date: record
                .optional("Date")
                .and_then(|value| parse_date(value, &DATE_FORMATS))
                .map(format_service_date),
            boardings: boardings.and_then(|n| n.parse().ok()),
            alightings: alightings.and_then(|n| n.parse().ok()),
        };
        Self::resolve(record, schedule).map_err(|error| RecordFailure { error, context })
    }
}

use super::{ApcFormat, FormatAdapter, RawRecord, draft, int, invalid_date, parse_date, raw, text};
use crate::error::{IssueContext, RecordError, RecordFailure};
use crate::schedule::{ScheduleQuery, StopFilter};
use crate::time::{format_service_date, normalize_clock, parse_clock_seconds};
use crate::validate::Draft;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

/// Stop-level counts already keyed by GTFS trip and stop ids.
pub struct Swiftly;

impl Swiftly {
    fn resolve(record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordError> {
        let trip_id = record.field("trip_id")?;
        if schedule.trip(trip_id).is_none() {
            return Err(RecordError::InvalidTrip {
                field: "Trip ID".into(),
                value: trip_id.into(),
            });
        }

        let stop_id = record.field("stop_id")?;
        if schedule.stops(StopFilter::Id(stop_id)).is_empty() {
            return Err(RecordError::InvalidStop {
                field: "Stop ID".into(),
                value: stop_id.into(),
            });
        }

        let date_value = record.field("service_date")?;
        let service_date =
            parse_date(date_value, &DATE_FORMATS).ok_or_else(|| invalid_date("service_date", date_value))?;

        let scheduled_value = record.field("scheduled_time")?;
        let scheduled = normalize_clock(scheduled_value)
            .ok_or_else(|| invalid_date("scheduled_time", scheduled_value))?;
        let scheduled_secs = parse_clock_seconds(&scheduled);

        let stop_time = schedule
            .stop_times(trip_id)
            .iter()
            .filter(|st| st.stop_id == stop_id)
            .find(|st| {
                let departs = st.departure_time.as_deref().and_then(parse_clock_seconds);
                let arrives = st.arrival_time.as_deref().and_then(parse_clock_seconds);
                scheduled_secs.is_some() && (departs == scheduled_secs || arrives == scheduled_secs)
            })
            .ok_or_else(|| {
                RecordError::NoStopTime(format!(
                    "stop_id=`{stop_id}` trip_id=`{trip_id}` departure_time=`{scheduled}`"
                ))
            })?;

        Ok(vec![draft([
            ("trip_id", text(trip_id)),
            ("stop_id", text(stop_id)),
            ("stop_sequence", int(stop_time.stop_sequence)),
            ("record_use", int(0)),
            ("schedule_relationship", int(0)),
            ("boardings", raw(record.optional("boardings"))),
            ("alightings", raw(record.optional("alightings"))),
            ("load_count", raw(record.optional("occupancy_count"))),
            ("load_type", int(1)),
            ("service_date", text(format_service_date(service_date))),
            ("service_departure_time", raw(record.optional("actual_time"))),
            ("source", int(1)),
        ])])
    }
}

impl FormatAdapter for Swiftly {
    fn format(&self) -> ApcFormat {
        ApcFormat::Swiftly
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "trip_id",
            "stop_id",
            "service_date",
            "scheduled_time",
            "actual_time",
            "boardings",
            "alightings",
            "occupancy_count",
        ]
    }

    fn adapt(&self, record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordFailure> {
        let context = IssueContext {
            date: record
                .optional("service_date")
                .and_then(|value| parse_date(value, &DATE_FORMATS))
                .map(format_service_date),
            boardings: record.count("boardings"),
            alightings: record.count("alightings"),
        };
        Self::resolve(record, schedule).map_err(|error| RecordFailure { error, context })
    }
}

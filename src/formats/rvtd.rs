use super::{
    ApcFormat, FormatAdapter, RawRecord, active_service_ids, draft, invalid_date, pad_start,
    parse_date, raw, text,
};
use crate::error::{IssueContext, RecordError, RecordFailure};
use crate::matcher::find_trip_by_first_stop_time;
use crate::schedule::{RouteFilter, ScheduleQuery, StopFilter};
use crate::time::{format_service_date, normalize_clock, parse_clock_seconds};
use crate::validate::Draft;

const DATE_FORMATS: [&str; 2] = ["%Y%m%d", "%Y-%m-%d"];

/// Columns copied through unchanged, as (vendor column, board_alight column).
const PASSTHROUGH: [(&str, &str); 13] = [
    ("record_use", "record_use"),
    ("schedule_relationship", "schedule_relationship"),
    ("boardings", "boardings"),
    ("alightings", "alightings"),
    ("current_load", "load_count"),
    ("load_type", "load_type"),
    ("rack_down", "rack_down"),
    ("bike_boardings", "bike_boardings"),
    ("bike_alightings", "bike_alightings"),
    ("ramp_used", "ramp_used"),
    ("ramp_boardings", "ramp_boardings"),
    ("ramp_alightings", "ramp_alightings"),
    ("source", "source"),
];

/// Rows already shaped like board_alight, but keyed by stop code and a
/// `<route> - <headsign> - <start time>` trip name instead of a trip id.
pub struct Rvtd;

impl Rvtd {
    fn resolve(record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordError> {
        let stop_code = pad_start(record.non_empty("stop_code")?, 6);
        let stop = schedule
            .stops(StopFilter::Code(&stop_code))
            .into_iter()
            .next()
            .ok_or_else(|| RecordError::InvalidStop {
                field: "stop_code".into(),
                value: stop_code.clone(),
            })?;

        let trip_name = record.non_empty("trip_name")?;
        let parts: Vec<&str> = trip_name.split(" - ").map(str::trim).collect();
        let (route_short_name, start_time) = match parts.as_slice() {
            [route, _, start, ..] => (*route, *start),
            _ => {
                return Err(RecordError::InvalidTrip {
                    field: "trip_name".into(),
                    value: trip_name.into(),
                });
            }
        };
        let start_secs = normalize_clock(start_time)
            .as_deref()
            .and_then(parse_clock_seconds)
            .ok_or_else(|| invalid_date("trip_name", trip_name))?;

        let route = schedule
            .routes(RouteFilter::ShortName(route_short_name))
            .into_iter()
            .next()
            .ok_or_else(|| RecordError::InvalidRoute {
                field: "route_short_name".into(),
                value: route_short_name.into(),
            })?;

        let sequence_value = record.non_empty("stope_sequence")?;
        let stop_sequence: u32 = sequence_value.parse().map_err(|_| RecordError::InvalidTrip {
            field: "stope_sequence".into(),
            value: sequence_value.into(),
        })?;

        let date_value = record.field("service_arrival_date")?;
        let service_date =
            parse_date(date_value, &DATE_FORMATS).ok_or_else(|| invalid_date("service_arrival_date", date_value))?;
        let service_ids = active_service_ids(schedule, service_date, "service_arrival_date", date_value)?;

        let trip = find_trip_by_first_stop_time(
            schedule,
            &route.route_id,
            &stop.stop_id,
            stop_sequence,
            &service_ids,
            start_secs,
        )?;

        let mut row = draft([
            ("trip_id", text(trip.trip_id.clone())),
            ("stop_id", text(stop.stop_id.clone())),
            ("stop_sequence", text(sequence_value)),
            ("service_date", text(format_service_date(service_date))),
            (
                "service_arrival_time",
                raw(record.optional("service_arrival_time")),
            ),
        ]);
        row.extend(draft(
            PASSTHROUGH
                .iter()
                .map(|(from, to)| (*to, raw(record.optional(from)))),
        ));
        Ok(vec![row])
    }
}

impl FormatAdapter for Rvtd {
    fn format(&self) -> ApcFormat {
        ApcFormat::Rvtd
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "stop_code",
            "trip_name",
            "stope_sequence",
            "record_use",
            "schedule_relationship",
            "boardings",
            "alightings",
            "current_load",
            "load_type",
            "rack_down",
            "bike_boardings",
            "bike_alightings",
            "ramp_used",
            "ramp_boardings",
            "ramp_alightings",
            "service_arrival_date",
            "service_arrival_time",
            "source",
        ]
    }

    fn adapt(&self, record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordFailure> {
        let context = IssueContext {
            date: record.optional("service_arrival_date").map(str::to_string),
            boardings: record.count("boardings"),
            alightings: record.count("alightings"),
        };
        Self::resolve(record, schedule).map_err(|error| RecordFailure { error, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::test_support::{bus_schedule, record};
    use serde_json::Value;

    fn line(stop_code: &str, trip_name: &str, sequence: &str) -> RawRecord {
        record(&[
            ("stop_code", stop_code),
            ("trip_name", trip_name),
            ("stope_sequence", sequence),
            ("record_use", "0"),
            ("schedule_relationship", "0"),
            ("boardings", "2"),
            ("alightings", "1"),
            ("current_load", "9"),
            ("load_type", "1"),
            ("rack_down", "0"),
            ("bike_boardings", ""),
            ("bike_alightings", ""),
            ("ramp_used", "1"),
            ("ramp_boardings", "1"),
            ("ramp_alightings", "0"),
            ("service_arrival_date", "20240305"),
            ("service_arrival_time", "09:10:30"),
            ("source", "0"),
        ])
    }

    #[test]
    fn test_rvtd_finds_trip_by_start_time() {
        let schedule = bus_schedule();
        let rows = Rvtd
            .adapt(&line("102", "10 - Downtown - 09:00", "2"), &schedule)
            .unwrap();

        let row = &rows[0];
        assert_eq!(row["trip_id"], Value::from("T900"));
        assert_eq!(row["stop_id"], Value::from("00102"));
        assert_eq!(row["load_count"], Value::from("9"));
        assert_eq!(row["ramp_boardings"], Value::from("1"));
        assert!(!row.contains_key("bike_boardings"));
        assert!(!row.contains_key("current_load"));
    }

    #[test]
    fn test_rvtd_no_trip_at_start_time() {
        let schedule = bus_schedule();
        let failure = Rvtd
            .adapt(&line("102", "10 - Downtown - 10:00", "2"), &schedule)
            .unwrap_err();
        assert!(matches!(failure.error, RecordError::TripNotFound(_)));
        assert_eq!(failure.context.date.as_deref(), Some("20240305"));
        assert_eq!(failure.context.boardings, Some(2));
    }

    #[test]
    fn test_rvtd_unknown_stop_code_is_reported_padded() {
        let schedule = bus_schedule();
        let failure = Rvtd
            .adapt(&line("7", "10 - Downtown - 09:00", "2"), &schedule)
            .unwrap_err();
        assert_eq!(failure.to_string(), "Invalid stop_code `000007` found");
    }

    #[test]
    fn test_rvtd_malformed_trip_name() {
        let schedule = bus_schedule();
        let failure = Rvtd.adapt(&line("102", "10 Downtown", "2"), &schedule).unwrap_err();
        assert!(matches!(failure.error, RecordError::InvalidTrip { .. }));
    }
}

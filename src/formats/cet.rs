use super::{
    ApcFormat, FormatAdapter, RawRecord, active_service_ids, draft, int, invalid_date,
    parse_datetime, raw, service_date_value, text,
};
use crate::error::{IssueContext, RecordError, RecordFailure};
use crate::matcher::{CandidateQuery, find_closest_trip_by_time};
use crate::schedule::{RouteFilter, ScheduleQuery, StopFilter};
use crate::time::format_service_date;
use crate::validate::Draft;

const CLIENT_TIME_FORMATS: [&str; 2] = ["%m/%d/%Y %I:%M:%S %p", "%m/%d/%Y %H:%M:%S"];

/// Stop counters keyed by stop name and route short name, one line per door
/// event. A stop visit is often split over several lines.
pub struct Cet;

impl Cet {
    fn resolve(record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordError> {
        let stop_name = record.field("RouteStop")?;
        let stop_ids: Vec<String> = schedule
            .stops(StopFilter::Name(stop_name))
            .into_iter()
            .map(|stop| stop.stop_id.clone())
            .collect();
        if stop_ids.is_empty() {
            return Err(RecordError::InvalidStop {
                field: "RouteStop".into(),
                value: stop_name.into(),
            });
        }

        let route_value = record.non_empty("Route_ID")?;
        // Route_ID carries the short name, sometimes zero padded.
        let short_name = route_value
            .parse::<u32>()
            .map(|n| n.to_string())
            .unwrap_or_else(|_| route_value.to_string());
        let route = schedule
            .routes(RouteFilter::ShortName(&short_name))
            .into_iter()
            .next()
            .ok_or_else(|| RecordError::InvalidRoute {
                field: "Route_ID".into(),
                value: route_value.into(),
            })?;

        let client_time = record.field("ClientTime")?;
        let observed = parse_datetime(client_time, &CLIENT_TIME_FORMATS)
            .ok_or_else(|| invalid_date("ClientTime", client_time))?;
        let service_ids = active_service_ids(schedule, observed.date(), "ClientTime", client_time)?;

        let query = CandidateQuery {
            stop_ids: &stop_ids,
            route_id: &route.route_id,
            service_ids: &service_ids,
        };
        let target = observed.format("%H:%M:%S").to_string();
        let matched = find_closest_trip_by_time(schedule, &query, &target)?;

        Ok(vec![draft([
            ("trip_id", text(matched.trip_id)),
            ("stop_id", text(matched.stop_id)),
            ("stop_sequence", int(matched.stop_sequence)),
            ("record_use", int(0)),
            ("schedule_relationship", int(0)),
            ("boardings", raw(record.optional("Entrys"))),
            ("alightings", raw(record.optional("Exits"))),
            ("service_date", Some(service_date_value(observed.date()))),
            ("source", int(1)),
        ])])
    }
}

impl FormatAdapter for Cet {
    fn format(&self) -> ApcFormat {
        ApcFormat::Cet
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["RouteStop", "Route_ID", "ClientTime", "Entrys", "Exits"]
    }

    fn merges_duplicates(&self) -> bool {
        true
    }

    fn adapt(&self, record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordFailure> {
        let context = IssueContext {
            date: record
                .optional("ClientTime")
                .and_then(|value| parse_datetime(value, &CLIENT_TIME_FORMATS))
                .map(|observed| format_service_date(observed.date())),
            boardings: record.count("Entrys"),
            alightings: record.count("Exits"),
        };
        Self::resolve(record, schedule).map_err(|error| RecordFailure { error, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::test_support::{bus_schedule, record};
    use serde_json::Value;

    fn line(stop: &str, route: &str, time: &str) -> RawRecord {
        record(&[
            ("RouteStop", stop),
            ("Route_ID", route),
            ("ClientTime", time),
            ("Entrys", "3"),
            ("Exits", "1"),
        ])
    }

    #[test]
    fn test_cet_matches_estimated_stop() {
        let schedule = bus_schedule();
        let rows = Cet
            .adapt(&line("Main & 2nd", "10", "3/5/2024 8:11:00 AM"), &schedule)
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row["trip_id"], Value::from("T800"));
        assert_eq!(row["stop_id"], Value::from("00102"));
        assert_eq!(row["stop_sequence"], Value::from(2));
        assert_eq!(row["boardings"], Value::from("3"));
        assert_eq!(row["service_date"], Value::from("20240305"));
    }

    #[test]
    fn test_cet_pm_times() {
        let schedule = bus_schedule();
        // 9:05 PM is after every trip; the last one is the closest.
        let rows = Cet
            .adapt(&line("Main & 1st", "010", "3/5/2024 9:05:00 PM"), &schedule)
            .unwrap();
        assert_eq!(rows[0]["trip_id"], Value::from("T900"));
    }

    #[test]
    fn test_cet_unknown_stop_keeps_counts() {
        let schedule = bus_schedule();
        let failure = Cet
            .adapt(&line("Nowhere", "10", "3/5/2024 8:11:00 AM"), &schedule)
            .unwrap_err();

        assert_eq!(failure.to_string(), "Invalid RouteStop `Nowhere` found");
        assert_eq!(failure.context.boardings, Some(3));
        assert_eq!(failure.context.alightings, Some(1));
        assert_eq!(failure.context.date.as_deref(), Some("20240305"));
    }

    #[test]
    fn test_cet_unknown_route() {
        let schedule = bus_schedule();
        let failure = Cet
            .adapt(&line("Main & 1st", "99", "3/5/2024 8:11:00 AM"), &schedule)
            .unwrap_err();
        assert_eq!(failure.to_string(), "Invalid Route_ID `99` found");
    }

    #[test]
    fn test_cet_weekend_has_no_service() {
        let schedule = bus_schedule();
        let failure = Cet
            .adapt(&line("Main & 1st", "10", "3/9/2024 8:11:00 AM"), &schedule)
            .unwrap_err();
        assert!(matches!(failure.error, RecordError::NoServiceIds { .. }));
    }
}

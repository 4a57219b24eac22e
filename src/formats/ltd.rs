use chrono::NaiveDate;

use super::{
    ApcFormat, FormatAdapter, RawRecord, active_service_ids, draft, int, invalid_date, pad_start,
    parse_date, parse_datetime, raw, service_date_value, text,
};
use crate::error::{IssueContext, RecordError, RecordFailure};
use crate::matcher::{CandidateQuery, find_closest_trip_by_time};
use crate::schedule::{RouteFilter, ScheduleQuery, StopFilter};
use crate::time::{format_service_date, normalize_clock};
use crate::validate::Draft;

fn calendar_date(value: &str) -> Option<NaiveDate> {
    parse_datetime(value, &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"])
        .map(|dt| dt.date())
        .or_else(|| parse_date(value, &["%Y-%m-%d"]))
}

/// Stop-level counts with zero-stripped stop and route ids and an `HH:mm`
/// message time.
pub struct Ltd;

impl Ltd {
    fn resolve(record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordError> {
        let stop_value = record.non_empty("stop")?;
        let stop = schedule
            .stops(StopFilter::Id(&pad_start(stop_value, 5)))
            .into_iter()
            .next()
            .ok_or_else(|| RecordError::InvalidStop {
                field: "stop".into(),
                value: stop_value.into(),
            })?;

        let route_value = record.non_empty("route")?;
        let route = schedule
            .routes(RouteFilter::Id(&pad_start(route_value, 2)))
            .into_iter()
            .next()
            .ok_or_else(|| RecordError::InvalidRoute {
                field: "route".into(),
                value: route_value.into(),
            })?;

        let date_value = record.field("calendar_date")?;
        let service_date =
            calendar_date(date_value).ok_or_else(|| invalid_date("calendar_date", date_value))?;
        let service_ids = active_service_ids(schedule, service_date, "calendar_date", date_value)?;

        let msg_time = record.field("msg_time")?;
        let gtfs_time = normalize_clock(msg_time).ok_or_else(|| invalid_date("msg_time", msg_time))?;

        let stop_ids = vec![stop.stop_id.clone()];
        let query = CandidateQuery {
            stop_ids: &stop_ids,
            route_id: &route.route_id,
            service_ids: &service_ids,
        };
        let matched = find_closest_trip_by_time(schedule, &query, &gtfs_time)?;

        Ok(vec![draft([
            ("trip_id", text(matched.trip_id)),
            ("stop_id", text(matched.stop_id)),
            ("stop_sequence", int(matched.stop_sequence)),
            ("record_use", int(0)),
            ("schedule_relationship", int(0)),
            ("boardings", raw(record.optional("board"))),
            ("alightings", raw(record.optional("alight"))),
            ("load_count", raw(record.optional("departure_load"))),
            ("load_type", int(1)),
            ("service_date", Some(service_date_value(service_date))),
            ("service_departure_time", text(gtfs_time)),
            ("source", int(1)),
        ])])
    }
}

impl FormatAdapter for Ltd {
    fn format(&self) -> ApcFormat {
        ApcFormat::Ltd
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "stop",
            "route",
            "calendar_date",
            "msg_time",
            "dir",
            "board",
            "alight",
            "departure_load",
        ]
    }

    fn adapt(&self, record: &RawRecord, schedule: &dyn ScheduleQuery) -> Result<Vec<Draft>, RecordFailure> {
        let context = IssueContext {
            date: record
                .optional("calendar_date")
                .and_then(calendar_date)
                .map(format_service_date),
            boardings: record.count("board"),
            alightings: record.count("alight"),
        };
        Self::resolve(record, schedule).map_err(|error| RecordFailure { error, context })
    }
}

//! Read-only view of an already-imported GTFS schedule.
//!
//! [`ScheduleQuery`] is the only thing the matching code sees of the schedule
//! store. [`MemorySchedule`] implements it over GTFS text files.

mod memory;

pub use memory::MemorySchedule;

use chrono::NaiveDate;

/// A GTFS stop (stops.txt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stop {
    pub stop_id: String,
    pub stop_code: Option<String>,
    pub stop_name: Option<String>,
    /// At most one level deep: a parent never has a parent of its own.
    pub parent_station: Option<String>,
}

/// A GTFS route (routes.txt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub route_id: String,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
}

/// A GTFS trip (trips.txt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub direction_id: Option<u8>,
}

/// A GTFS stop time (stop_times.txt). Times are `None` on non-timepoint stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
}

/// A weekly service pattern (calendar.txt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    pub service_id: String,
    /// Monday first.
    pub days: [bool; 7],
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionType {
    Added,
    Removed,
}

impl ExceptionType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ExceptionType::Added),
            2 => Some(ExceptionType::Removed),
            _ => None,
        }
    }
}

/// A date-specific service exception (calendar_dates.txt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDate {
    pub service_id: String,
    pub date: NaiveDate,
    pub exception_type: ExceptionType,
}

#[derive(Debug, Clone, Copy)]
pub enum StopFilter<'a> {
    Id(&'a str),
    Code(&'a str),
    Name(&'a str),
    /// Every platform whose parent_station is the given stop.
    Parent(&'a str),
}

#[derive(Debug, Clone, Copy)]
pub enum RouteFilter<'a> {
    Id(&'a str),
    ShortName(&'a str),
}

/// Side-effect-free lookups into the schedule store.
///
/// Implementations must be safe to share between threads; the store is never
/// written while an import is running.
pub trait ScheduleQuery: Send + Sync {
    fn stops(&self, filter: StopFilter<'_>) -> Vec<&Stop>;

    fn routes(&self, filter: RouteFilter<'_>) -> Vec<&Route>;

    fn trip(&self, trip_id: &str) -> Option<&Trip>;

    fn trips_for_route(&self, route_id: &str) -> Vec<&Trip>;

    /// Stop times of one trip, ordered by stop_sequence.
    fn stop_times(&self, trip_id: &str) -> &[StopTime];

    /// Every stop time at one stop, across all trips.
    fn stop_times_at_stop(&self, stop_id: &str) -> Vec<&StopTime>;

    fn calendars(&self) -> &[Calendar];

    /// Exceptions for one date, in storage order.
    fn calendar_dates(&self, date: NaiveDate) -> Vec<&CalendarDate>;
}

/// Expands a stop to every stop id of its station: the station itself and all
/// of its platforms.
///
/// A stop that is neither a station nor a platform expands to itself.
pub fn station_stop_ids(schedule: &dyn ScheduleQuery, stop_id: &str) -> Vec<String> {
    let station_id = schedule
        .stops(StopFilter::Id(stop_id))
        .first()
        .and_then(|stop| stop.parent_station.clone())
        .unwrap_or_else(|| stop_id.to_string());

    let mut ids = vec![station_id.clone()];
    ids.extend(
        schedule
            .stops(StopFilter::Parent(&station_id))
            .into_iter()
            .map(|stop| stop.stop_id.clone()),
    );
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(id: &str, parent: Option<&str>) -> Stop {
        Stop {
            stop_id: id.to_string(),
            stop_code: None,
            stop_name: None,
            parent_station: parent.map(str::to_string),
        }
    }

    fn schedule() -> MemorySchedule {
        MemorySchedule::builder()
            .stops(vec![
                stop("STATION", None),
                stop("P1", Some("STATION")),
                stop("P2", Some("STATION")),
                stop("LONE", None),
            ])
            .build()
            .unwrap()
    }

    #[test]
    fn test_station_stop_ids_from_platform() {
        let schedule = schedule();
        let mut ids = station_stop_ids(&schedule, "P1");
        ids.sort();
        assert_eq!(ids, vec!["P1", "P2", "STATION"]);
    }

    #[test]
    fn test_station_stop_ids_from_station() {
        let schedule = schedule();
        let ids = station_stop_ids(&schedule, "STATION");
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], "STATION");
    }

    #[test]
    fn test_station_stop_ids_lone_stop() {
        let schedule = schedule();
        assert_eq!(station_stop_ids(&schedule, "LONE"), vec!["LONE"]);
    }

    #[test]
    fn test_exception_type_codes() {
        assert_eq!(ExceptionType::from_code(1), Some(ExceptionType::Added));
        assert_eq!(ExceptionType::from_code(2), Some(ExceptionType::Removed));
        assert_eq!(ExceptionType::from_code(3), None);
    }
}

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    Calendar, CalendarDate, ExceptionType, Route, RouteFilter, ScheduleQuery, Stop, StopFilter,
    StopTime, Trip,
};
use crate::error::ScheduleError;
use crate::time::parse_service_date;

#[derive(Debug, Deserialize)]
struct StopRow {
    stop_id: String,
    #[serde(default)]
    stop_code: Option<String>,
    #[serde(default)]
    stop_name: Option<String>,
    #[serde(default)]
    parent_station: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    route_id: String,
    #[serde(default)]
    route_short_name: Option<String>,
    #[serde(default)]
    route_long_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TripRow {
    trip_id: String,
    route_id: String,
    service_id: String,
    #[serde(default)]
    direction_id: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct StopTimeRow {
    trip_id: String,
    stop_id: String,
    stop_sequence: u32,
    #[serde(default)]
    arrival_time: Option<String>,
    #[serde(default)]
    departure_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarRow {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct CalendarDateRow {
    service_id: String,
    date: String,
    exception_type: u8,
}

/// An in-memory, indexed GTFS schedule.
#[derive(Debug, Default)]
pub struct MemorySchedule {
    stops: Vec<Stop>,
    stop_by_id: HashMap<String, usize>,
    stops_by_code: HashMap<String, Vec<usize>>,
    stops_by_name: HashMap<String, Vec<usize>>,
    stops_by_parent: HashMap<String, Vec<usize>>,
    routes: Vec<Route>,
    trips: HashMap<String, Trip>,
    /// route_id -> trip_ids in file order
    trips_by_route: HashMap<String, Vec<String>>,
    /// trip_id -> stop_times ordered by stop_sequence
    stop_times: HashMap<String, Vec<StopTime>>,
    /// stop_id -> (trip_id, index into that trip's stop_times)
    stop_times_by_stop: HashMap<String, Vec<(String, usize)>>,
    calendars: Vec<Calendar>,
    calendar_dates: HashMap<NaiveDate, Vec<CalendarDate>>,
}

/// Collects schedule rows and builds the indexes.
#[derive(Debug, Default)]
pub struct MemoryScheduleBuilder {
    stops: Vec<Stop>,
    routes: Vec<Route>,
    trips: Vec<Trip>,
    stop_times: Vec<StopTime>,
    calendars: Vec<Calendar>,
    calendar_dates: Vec<CalendarDate>,
}

impl MemoryScheduleBuilder {
    pub fn stops(mut self, stops: Vec<Stop>) -> Self {
        self.stops = stops;
        self
    }

    pub fn routes(mut self, routes: Vec<Route>) -> Self {
        self.routes = routes;
        self
    }

    pub fn trips(mut self, trips: Vec<Trip>) -> Self {
        self.trips = trips;
        self
    }

    pub fn stop_times(mut self, stop_times: Vec<StopTime>) -> Self {
        self.stop_times = stop_times;
        self
    }

    pub fn calendars(mut self, calendars: Vec<Calendar>) -> Self {
        self.calendars = calendars;
        self
    }

    pub fn calendar_dates(mut self, calendar_dates: Vec<CalendarDate>) -> Self {
        self.calendar_dates = calendar_dates;
        self
    }

    /// Builds the lookup indexes and checks the station hierarchy.
    ///
    /// # Errors
    ///
    /// Returns an error if a `parent_station` is unknown or itself has a parent.
    pub fn build(self) -> Result<MemorySchedule, ScheduleError> {
        let mut schedule = MemorySchedule::default();

        for (index, stop) in self.stops.iter().enumerate() {
            schedule.stop_by_id.insert(stop.stop_id.clone(), index);
            if let Some(code) = &stop.stop_code {
                schedule
                    .stops_by_code
                    .entry(code.clone())
                    .or_default()
                    .push(index);
            }
            if let Some(name) = &stop.stop_name {
                schedule
                    .stops_by_name
                    .entry(name.clone())
                    .or_default()
                    .push(index);
            }
            if let Some(parent) = &stop.parent_station {
                schedule
                    .stops_by_parent
                    .entry(parent.clone())
                    .or_default()
                    .push(index);
            }
        }

        for stop in &self.stops {
            let Some(parent) = &stop.parent_station else {
                continue;
            };
            match schedule.stop_by_id.get(parent).map(|&i| &self.stops[i]) {
                None => {
                    return Err(ScheduleError::InvalidParentStation {
                        stop_id: stop.stop_id.clone(),
                        parent: parent.clone(),
                        problem: "does not exist",
                    });
                }
                Some(parent_stop) if parent_stop.parent_station.is_some() => {
                    return Err(ScheduleError::InvalidParentStation {
                        stop_id: stop.stop_id.clone(),
                        parent: parent.clone(),
                        problem: "has a parent_station of its own",
                    });
                }
                Some(_) => {}
            }
        }
        schedule.stops = self.stops;
        schedule.routes = self.routes;

        for trip in self.trips {
            schedule
                .trips_by_route
                .entry(trip.route_id.clone())
                .or_default()
                .push(trip.trip_id.clone());
            schedule.trips.insert(trip.trip_id.clone(), trip);
        }

        for stop_time in self.stop_times {
            schedule
                .stop_times
                .entry(stop_time.trip_id.clone())
                .or_default()
                .push(stop_time);
        }
        for stop_times in schedule.stop_times.values_mut() {
            stop_times.sort_by_key(|st| st.stop_sequence);
        }
        for (trip_id, stop_times) in &schedule.stop_times {
            for (index, stop_time) in stop_times.iter().enumerate() {
                schedule
                    .stop_times_by_stop
                    .entry(stop_time.stop_id.clone())
                    .or_default()
                    .push((trip_id.clone(), index));
            }
        }
        for entries in schedule.stop_times_by_stop.values_mut() {
            entries.sort();
        }

        schedule.calendars = self.calendars;
        for calendar_date in self.calendar_dates {
            schedule
                .calendar_dates
                .entry(calendar_date.date)
                .or_default()
                .push(calendar_date);
        }

        Ok(schedule)
    }
}

impl MemorySchedule {
    pub fn builder() -> MemoryScheduleBuilder {
        MemoryScheduleBuilder::default()
    }

    /// Loads stops, routes, trips, stop_times, calendar and calendar_dates
    /// from a directory of GTFS text files.
    ///
    /// `calendar.txt` and `calendar_dates.txt` are each optional.
    #[tracing::instrument(fields(dir = %dir.display()))]
    pub fn load_dir(dir: &Path) -> Result<Self, ScheduleError> {
        let stops: Vec<Stop> = read_rows::<StopRow>(dir, "stops.txt")?
            .into_iter()
            .map(|row| Stop {
                stop_id: row.stop_id,
                stop_code: row.stop_code,
                stop_name: row.stop_name,
                parent_station: row.parent_station,
            })
            .collect();
        info!(count = stops.len(), "Parsed GTFS stops");

        let routes: Vec<Route> = read_rows::<RouteRow>(dir, "routes.txt")?
            .into_iter()
            .map(|row| Route {
                route_id: row.route_id,
                route_short_name: row.route_short_name,
                route_long_name: row.route_long_name,
            })
            .collect();
        info!(count = routes.len(), "Parsed GTFS routes");

        let trips: Vec<Trip> = read_rows::<TripRow>(dir, "trips.txt")?
            .into_iter()
            .map(|row| Trip {
                trip_id: row.trip_id,
                route_id: row.route_id,
                service_id: row.service_id,
                direction_id: row.direction_id,
            })
            .collect();
        info!(count = trips.len(), "Parsed GTFS trips");

        let stop_times: Vec<StopTime> = read_rows::<StopTimeRow>(dir, "stop_times.txt")?
            .into_iter()
            .map(|row| StopTime {
                trip_id: row.trip_id,
                stop_id: row.stop_id,
                stop_sequence: row.stop_sequence,
                arrival_time: row.arrival_time,
                departure_time: row.departure_time,
            })
            .collect();
        info!(count = stop_times.len(), "Parsed GTFS stop_times");

        let calendars = if dir.join("calendar.txt").exists() {
            read_rows::<CalendarRow>(dir, "calendar.txt")?
                .into_iter()
                .map(|row| {
                    Ok(Calendar {
                        days: [
                            row.monday == 1,
                            row.tuesday == 1,
                            row.wednesday == 1,
                            row.thursday == 1,
                            row.friday == 1,
                            row.saturday == 1,
                            row.sunday == 1,
                        ],
                        start_date: gtfs_date("calendar.txt", &row.start_date)?,
                        end_date: gtfs_date("calendar.txt", &row.end_date)?,
                        service_id: row.service_id,
                    })
                })
                .collect::<Result<Vec<_>, ScheduleError>>()?
        } else {
            warn!("No calendar.txt found");
            Vec::new()
        };
        info!(count = calendars.len(), "Parsed GTFS calendar");

        let calendar_dates = if dir.join("calendar_dates.txt").exists() {
            read_rows::<CalendarDateRow>(dir, "calendar_dates.txt")?
                .into_iter()
                .map(|row| {
                    Ok(CalendarDate {
                        date: gtfs_date("calendar_dates.txt", &row.date)?,
                        exception_type: ExceptionType::from_code(row.exception_type).ok_or(
                            ScheduleError::InvalidExceptionType {
                                value: row.exception_type,
                            },
                        )?,
                        service_id: row.service_id,
                    })
                })
                .collect::<Result<Vec<_>, ScheduleError>>()?
        } else {
            debug!("No calendar_dates.txt found");
            Vec::new()
        };
        info!(count = calendar_dates.len(), "Parsed GTFS calendar_dates");

        Self::builder()
            .stops(stops)
            .routes(routes)
            .trips(trips)
            .stop_times(stop_times)
            .calendars(calendars)
            .calendar_dates(calendar_dates)
            .build()
    }

    fn stops_at(&self, indexes: Option<&Vec<usize>>) -> Vec<&Stop> {
        indexes
            .map(|indexes| indexes.iter().map(|&i| &self.stops[i]).collect())
            .unwrap_or_default()
    }
}

fn gtfs_date(file: &'static str, value: &str) -> Result<NaiveDate, ScheduleError> {
    parse_service_date(value).ok_or_else(|| ScheduleError::InvalidDate {
        file,
        value: value.to_string(),
    })
}

fn read_rows<T: for<'de> Deserialize<'de>>(dir: &Path, name: &str) -> Result<Vec<T>, ScheduleError> {
    let path = dir.join(name);
    let file = File::open(&path).map_err(|source| ScheduleError::Io {
        file: path.display().to_string(),
        source,
    })?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result.map_err(|source| ScheduleError::Csv {
            file: name.to_string(),
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

impl ScheduleQuery for MemorySchedule {
    fn stops(&self, filter: StopFilter<'_>) -> Vec<&Stop> {
        match filter {
            StopFilter::Id(id) => self.stop_by_id.get(id).map(|&i| &self.stops[i]).into_iter().collect(),
            StopFilter::Code(code) => self.stops_at(self.stops_by_code.get(code)),
            StopFilter::Name(name) => self.stops_at(self.stops_by_name.get(name)),
            StopFilter::Parent(parent) => self.stops_at(self.stops_by_parent.get(parent)),
        }
    }

    fn routes(&self, filter: RouteFilter<'_>) -> Vec<&Route> {
        self.routes
            .iter()
            .filter(|route| match filter {
                RouteFilter::Id(id) => route.route_id == id,
                RouteFilter::ShortName(name) => route.route_short_name.as_deref() == Some(name),
            })
            .collect()
    }

    fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.get(trip_id)
    }

    fn trips_for_route(&self, route_id: &str) -> Vec<&Trip> {
        self.trips_by_route
            .get(route_id)
            .map(|ids| ids.iter().filter_map(|id| self.trips.get(id)).collect())
            .unwrap_or_default()
    }

    fn stop_times(&self, trip_id: &str) -> &[StopTime] {
        self.stop_times
            .get(trip_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn stop_times_at_stop(&self, stop_id: &str) -> Vec<&StopTime> {
        self.stop_times_by_stop
            .get(stop_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(trip_id, index)| self.stop_times.get(trip_id)?.get(*index))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn calendars(&self) -> &[Calendar] {
        &self.calendars
    }

    fn calendar_dates(&self, date: NaiveDate) -> Vec<&CalendarDate> {
        self.calendar_dates
            .get(&date)
            .map(|rows| rows.iter().collect())
            .unwrap_or_default()
    }
}

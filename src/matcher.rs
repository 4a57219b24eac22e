//! Closest-match resolution of an observation time against scheduled stop times.

use std::collections::BTreeSet;

use crate::error::RecordError;
use crate::estimator::{TimedStopTime, timed_stop_times};
use crate::schedule::{ScheduleQuery, Trip};
use crate::time::{format_clock, parse_clock_seconds};

/// Picks the single scheduled stop time that best matches `target_secs`.
///
/// `candidates` must be sorted ascending by arrival. One left-to-right scan:
///
/// - a candidate whose dwell window contains the target wins outright;
/// - a candidate that arrived before the target is remembered, and replaced by
///   any later one that also arrived before it;
/// - at the first candidate arriving after the target the scan stops. With
///   nothing remembered that candidate is the answer (target precedes the
///   first trip). Otherwise the smaller of the two gaps wins, the remembered
///   candidate on a tie.
///
/// # Errors
///
/// Returns [`RecordError::NoCandidates`] for an empty candidate list.
pub fn closest_by_time(
    candidates: &[TimedStopTime],
    target_secs: u32,
) -> Result<&TimedStopTime, RecordError> {
    let target = i64::from(target_secs);
    let mut remembered: Option<&TimedStopTime> = None;

    for candidate in candidates {
        let arrival = i64::from(candidate.arrival_secs);
        let departure = i64::from(candidate.departure_secs);

        if arrival <= target && target <= departure {
            return Ok(candidate);
        }

        if arrival <= target {
            remembered = Some(candidate);
            continue;
        }

        return Ok(match remembered {
            None => candidate,
            Some(previous) => {
                let gap_to_next = arrival - target;
                let gap_from_previous = target - i64::from(previous.departure_secs);
                if gap_to_next < gap_from_previous {
                    candidate
                } else {
                    previous
                }
            }
        });
    }

    remembered.ok_or(RecordError::NoCandidates)
}

/// Filters used to build a candidate list for [`find_closest_trip_by_time`].
#[derive(Debug, Clone, Copy)]
pub struct CandidateQuery<'a> {
    pub stop_ids: &'a [String],
    pub route_id: &'a str,
    pub service_ids: &'a BTreeSet<String>,
}

fn parse_target(target: &str) -> Result<u32, RecordError> {
    parse_clock_seconds(target).ok_or_else(|| RecordError::InvalidDateTime {
        field: "time".to_string(),
        value: target.to_string(),
    })
}

/// Stop times at any of the query's stops on the route's trips that run
/// under one of the service ids, with missing times estimated, sorted by
/// arrival.
pub fn trip_candidates(
    schedule: &dyn ScheduleQuery,
    query: &CandidateQuery<'_>,
) -> Result<Vec<TimedStopTime>, RecordError> {
    let mut candidates = Vec::new();

    for trip in schedule.trips_for_route(query.route_id) {
        if !query.service_ids.contains(&trip.service_id) {
            continue;
        }

        let stop_times = schedule.stop_times(&trip.trip_id);
        if !stop_times.iter().any(|st| query.stop_ids.contains(&st.stop_id)) {
            continue;
        }

        candidates.extend(
            timed_stop_times(stop_times)?
                .into_iter()
                .filter(|st| query.stop_ids.contains(&st.stop_id)),
        );
    }

    candidates.sort_by(|a, b| {
        a.arrival_secs
            .cmp(&b.arrival_secs)
            .then_with(|| a.trip_id.cmp(&b.trip_id))
            .then_with(|| a.stop_sequence.cmp(&b.stop_sequence))
    });
    Ok(candidates)
}

/// Finds the scheduled trip stop time closest to `target` (`HH:mm:ss`).
pub fn find_closest_trip_by_time(
    schedule: &dyn ScheduleQuery,
    query: &CandidateQuery<'_>,
    target: &str,
) -> Result<TimedStopTime, RecordError> {
    let target_secs = parse_target(target)?;
    let candidates = trip_candidates(schedule, query)?;

    if candidates.is_empty() {
        return Err(RecordError::NoTrips {
            route_id: query.route_id.to_string(),
            stops: query.stop_ids.join(","),
        });
    }

    closest_by_time(&candidates, target_secs).cloned()
}

/// Finds the visit of `stop_id` on one trip closest to `target`. Loop trips
/// can serve the same stop more than once.
pub fn find_closest_stop_time_by_time(
    schedule: &dyn ScheduleQuery,
    trip_id: &str,
    stop_id: &str,
    target: &str,
) -> Result<TimedStopTime, RecordError> {
    let target_secs = parse_target(target)?;
    let mut candidates: Vec<TimedStopTime> = timed_stop_times(schedule.stop_times(trip_id))?
        .into_iter()
        .filter(|st| st.stop_id == stop_id)
        .collect();
    candidates.sort_by_key(|st| st.arrival_secs);

    if candidates.is_empty() {
        return Err(RecordError::NoStopTime(format!(
            "stop_id=`{stop_id}` trip_id=`{trip_id}`"
        )));
    }

    closest_by_time(&candidates, target_secs).cloned()
}

/// Finds the one trip on `route_id`, running under `service_ids`, whose first
/// stop time departs at `start_secs` and which serves `stop_id` at
/// `stop_sequence`.
///
/// # Errors
///
/// Zero matches is [`RecordError::TripNotFound`]; more than one is
/// [`RecordError::AmbiguousTrip`].
pub fn find_trip_by_first_stop_time<'s>(
    schedule: &'s dyn ScheduleQuery,
    route_id: &str,
    stop_id: &str,
    stop_sequence: u32,
    service_ids: &BTreeSet<String>,
    start_secs: u32,
) -> Result<&'s Trip, RecordError> {
    let matches: Vec<&Trip> = schedule
        .trips_for_route(route_id)
        .into_iter()
        .filter(|trip| service_ids.contains(&trip.service_id))
        .filter(|trip| {
            let stop_times = schedule.stop_times(&trip.trip_id);
            let starts_at = stop_times
                .first()
                .and_then(|first| first.departure_time.as_deref().or(first.arrival_time.as_deref()))
                .and_then(parse_clock_seconds)
                == Some(start_secs);
            starts_at
                && stop_times
                    .iter()
                    .any(|st| st.stop_id == stop_id && st.stop_sequence == stop_sequence)
        })
        .collect();

    let description = format!(
        "route `{route_id}` stop `{stop_id}` stop_sequence `{stop_sequence}` first departure `{}`",
        format_clock(start_secs)
    );
    match matches.as_slice() {
        [] => Err(RecordError::TripNotFound(description)),
        [trip] => Ok(*trip),
        _ => Err(RecordError::AmbiguousTrip {
            count: matches.len(),
            description,
        }),
    }
}

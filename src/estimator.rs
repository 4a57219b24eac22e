//! Fills in arrival and departure times on non-timepoint stops.

use crate::error::RecordError;
use crate::schedule::StopTime;
use crate::time::{format_clock, parse_clock_seconds};

/// A stop time whose arrival and departure are both known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedStopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub arrival_time: String,
    pub departure_time: String,
    pub arrival_secs: u32,
    pub departure_secs: u32,
    /// Interpolated rather than read from the schedule.
    pub estimated: bool,
}

/// Seconds for (arrival, departure) when the stop is a timepoint. A missing
/// side borrows the other one.
fn timepoint_seconds(stop_time: &StopTime) -> Option<(u32, u32)> {
    let arrival = stop_time.arrival_time.as_deref().and_then(parse_clock_seconds);
    let departure = stop_time.departure_time.as_deref().and_then(parse_clock_seconds);
    match (arrival, departure) {
        (Some(a), Some(d)) => Some((a, d)),
        (Some(a), None) => Some((a, a)),
        (None, Some(d)) => Some((d, d)),
        (None, None) => None,
    }
}

/// Interpolates the stop time at `index` between its nearest earlier and
/// later timepoints on the same trip, linear in stop_sequence distance.
///
/// `stop_times` must be one trip ordered by stop_sequence. Arrival and
/// departure of the estimate are the same instant.
///
/// # Errors
///
/// Returns [`RecordError::MissingTimepoint`] when either bracketing timepoint
/// is absent; the trip's schedule is malformed and no guess is made.
/// Returns [`RecordError::NoStopTime`] when `index` is out of range.
pub fn estimate_stop_time(stop_times: &[StopTime], index: usize) -> Result<TimedStopTime, RecordError> {
    let this = stop_times
        .get(index)
        .ok_or_else(|| RecordError::NoStopTime(format!("index `{index}` of {} stop times", stop_times.len())))?;

    let missing = |side| RecordError::MissingTimepoint {
        trip_id: this.trip_id.clone(),
        stop_sequence: this.stop_sequence,
        side,
    };

    let (previous, (_, previous_departure)) = stop_times[..index]
        .iter()
        .rev()
        .find_map(|st| timepoint_seconds(st).map(|secs| (st, secs)))
        .ok_or_else(|| missing("previous"))?;
    let (next, (next_arrival, _)) = stop_times[index + 1..]
        .iter()
        .find_map(|st| timepoint_seconds(st).map(|secs| (st, secs)))
        .ok_or_else(|| missing("next"))?;

    let span = i64::from(next_arrival) - i64::from(previous_departure);
    let covered = i64::from(this.stop_sequence) - i64::from(previous.stop_sequence);
    let total = i64::from(next.stop_sequence) - i64::from(previous.stop_sequence);
    let offset = if total == 0 { 0 } else { span * covered / total };
    let estimated = (i64::from(previous_departure) + offset).max(0) as u32;

    Ok(TimedStopTime {
        trip_id: this.trip_id.clone(),
        stop_id: this.stop_id.clone(),
        stop_sequence: this.stop_sequence,
        arrival_time: format_clock(estimated),
        departure_time: format_clock(estimated),
        arrival_secs: estimated,
        departure_secs: estimated,
        estimated: true,
    })
}

/// Returns every stop time of one trip with times filled in.
pub fn timed_stop_times(stop_times: &[StopTime]) -> Result<Vec<TimedStopTime>, RecordError> {
    stop_times
        .iter()
        .enumerate()
        .map(|(index, st)| match timepoint_seconds(st) {
            Some((arrival, departure)) => Ok(TimedStopTime {
                trip_id: st.trip_id.clone(),
                stop_id: st.stop_id.clone(),
                stop_sequence: st.stop_sequence,
                arrival_time: format_clock(arrival),
                departure_time: format_clock(departure),
                arrival_secs: arrival,
                departure_secs: departure,
                estimated: false,
            }),
            None => estimate_stop_time(stop_times, index),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(seq: u32, arrival: Option<&str>, departure: Option<&str>) -> StopTime {
        StopTime {
            trip_id: "T1".into(),
            stop_id: format!("S{seq}"),
            stop_sequence: seq,
            arrival_time: arrival.map(str::to_string),
            departure_time: departure.map(str::to_string),
        }
    }

    #[test]
    fn test_estimate_midpoint() {
        let stop_times = vec![
            st(1, Some("09:58:00"), Some("10:00:00")),
            st(2, None, None),
            st(3, None, None),
            st(4, None, None),
            st(5, Some("10:20:00"), Some("10:21:00")),
        ];

        let estimate = estimate_stop_time(&stop_times, 2).unwrap();
        assert_eq!(estimate.stop_sequence, 3);
        assert_eq!(estimate.arrival_time, "10:10:00");
        assert_eq!(estimate.departure_time, "10:10:00");
        assert_eq!(estimate.arrival_secs, 10 * 3600 + 10 * 60);
        assert!(estimate.estimated);
    }

    #[test]
    fn test_estimate_uses_sequence_distance_not_index() {
        let stop_times = vec![
            st(10, Some("10:00:00"), Some("10:00:00")),
            st(11, None, None),
            st(20, Some("10:10:00"), Some("10:10:00")),
        ];

        let estimate = estimate_stop_time(&stop_times, 1).unwrap();
        assert_eq!(estimate.arrival_time, "10:01:00");
    }

    #[test]
    fn test_estimate_across_midnight() {
        let stop_times = vec![
            st(1, Some("23:50:00"), Some("23:50:00")),
            st(2, None, None),
            st(3, Some("24:10:00"), Some("24:10:00")),
        ];

        let estimate = estimate_stop_time(&stop_times, 1).unwrap();
        assert_eq!(estimate.arrival_time, "24:00:00");
    }

    #[test]
    fn test_estimate_without_previous_timepoint_fails() {
        let stop_times = vec![st(1, None, None), st(2, Some("10:00:00"), Some("10:00:00"))];

        let err = estimate_stop_time(&stop_times, 0).unwrap_err();
        assert_eq!(
            err,
            RecordError::MissingTimepoint {
                trip_id: "T1".into(),
                stop_sequence: 1,
                side: "previous",
            }
        );
    }

    #[test]
    fn test_estimate_without_next_timepoint_fails() {
        let stop_times = vec![st(1, Some("10:00:00"), Some("10:00:00")), st(2, None, None)];

        let err = estimate_stop_time(&stop_times, 1).unwrap_err();
        assert!(matches!(err, RecordError::MissingTimepoint { side: "next", .. }));
    }

    #[test]
    fn test_estimate_index_out_of_range() {
        let stop_times = vec![st(1, Some("10:00:00"), Some("10:00:00"))];

        let err = estimate_stop_time(&stop_times, 3).unwrap_err();
        assert_eq!(err.to_string(), "No stoptime found for index `3` of 1 stop times");
        assert!(estimate_stop_time(&[], 0).is_err());
    }

    #[test]
    fn test_timed_stop_times_fills_gaps() {
        let stop_times = vec![
            st(1, Some("10:00:00"), Some("10:01:00")),
            st(2, None, None),
            st(3, Some("10:21:00"), None),
        ];

        let timed = timed_stop_times(&stop_times).unwrap();
        assert_eq!(timed.len(), 3);
        assert!(!timed[0].estimated);
        assert_eq!(timed[0].departure_time, "10:01:00");
        assert_eq!(timed[1].arrival_time, "10:11:00");
        assert!(timed[1].estimated);
        assert_eq!(timed[2].departure_time, "10:21:00");
    }
}

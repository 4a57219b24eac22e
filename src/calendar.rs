//! Service-id resolution for a calendar date.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

use crate::schedule::{ExceptionType, ScheduleQuery};

/// Returns the service ids running on `date`.
///
/// Starts from every calendar whose date window contains `date` and whose
/// weekday flag is set, then applies the date's exceptions in one
/// left-to-right pass: removals and additions are set operations, so for a
/// service id listed more than once the last exception wins.
pub fn service_ids_for_date(schedule: &dyn ScheduleQuery, date: NaiveDate) -> BTreeSet<String> {
    let weekday = date.weekday().num_days_from_monday() as usize;

    let mut service_ids: BTreeSet<String> = schedule
        .calendars()
        .iter()
        .filter(|cal| cal.start_date <= date && date <= cal.end_date && cal.days[weekday])
        .map(|cal| cal.service_id.clone())
        .collect();

    for exception in schedule.calendar_dates(date) {
        match exception.exception_type {
            ExceptionType::Removed => {
                service_ids.remove(&exception.service_id);
            }
            ExceptionType::Added => {
                service_ids.insert(exception.service_id.clone());
            }
        }
    }

    service_ids
}

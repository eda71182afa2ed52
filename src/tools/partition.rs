use crate::core::types::DateTask;
use chrono::{Days, NaiveDate};

/// Every (check-in, check-out) pair of the sweep.
///
/// One task per day `d` in `[start, end]` and per stay length `1..=los`,
/// ordered by `d` then by stay length. An inverted range or `los == 0` gives
/// an empty list; stays whose check-out falls past the calendar end are skipped.
pub fn generate_tasks(start: NaiveDate, end: NaiveDate, los: u32) -> Vec<DateTask> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .flat_map(|checkin| {
            (1..=los).filter_map(move |nights| {
                let checkout = checkin.checked_add_days(Days::new(u64::from(nights)))?;
                DateTask::new(checkin, checkout).ok()
            })
        })
        .collect()
}

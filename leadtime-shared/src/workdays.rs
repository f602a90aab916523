/// Workday calendar arithmetic
///
/// This module counts and projects workdays over a configurable weekly
/// pattern minus excluded dates (holidays and vacations). The two entry
/// points mirror the NETWORKDAYS and WORKDAY spreadsheet functions:
///
/// - [`net_workdays`]: workdays between two dates, inclusive of both
///   endpoints, with a floor of 1
/// - [`workday_after`]: the date N workdays after a start date
///
/// The floor of 1 is a deliberate policy: a same-day or zero-span interval
/// still counts as one workday, so in-progress work never reports a span
/// of zero.
///
/// # Example
///
/// ```
/// use std::collections::HashSet;
/// use chrono::NaiveDate;
/// use leadtime_shared::workdays::{net_workdays, WorkWeek};
///
/// let week = WorkWeek::default();
/// let mon = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let fri = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
/// assert_eq!(net_workdays(mon, fri, &HashSet::new(), &week), 5);
/// ```

use std::collections::HashSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use thiserror::Error;

/// Work-week parse error
#[derive(Debug, Error)]
pub enum WorkWeekError {
    /// A configured day name is not a weekday
    #[error("Unknown weekday name: {0}")]
    UnknownDay(String),

    /// The configured week has no workdays
    #[error("Work week must contain at least one day")]
    Empty,
}

/// The set of weekdays that count as workdays
///
/// Defaults to Monday through Friday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkWeek {
    // indexed by Weekday::num_days_from_monday()
    days: [bool; 7],
}

impl Default for WorkWeek {
    fn default() -> Self {
        WorkWeek {
            days: [true, true, true, true, true, false, false],
        }
    }
}

impl WorkWeek {
    /// Builds a work week from weekday names
    ///
    /// Accepts full names or three-letter abbreviations, case-insensitive
    /// ("mon", "Monday", "THU", ...).
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unrecognized or the list is empty
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, WorkWeekError> {
        let mut days = [false; 7];
        for name in names {
            let day = parse_weekday(name.as_ref())
                .ok_or_else(|| WorkWeekError::UnknownDay(name.as_ref().to_string()))?;
            days[day.num_days_from_monday() as usize] = true;
        }
        if !days.iter().any(|d| *d) {
            return Err(WorkWeekError::Empty);
        }
        Ok(WorkWeek { days })
    }

    /// Checks whether a weekday is a workday
    pub fn contains(&self, day: Weekday) -> bool {
        self.days[day.num_days_from_monday() as usize]
    }

    fn is_workday(&self, date: NaiveDate, excludes: &HashSet<NaiveDate>) -> bool {
        self.contains(date.weekday()) && !excludes.contains(&date)
    }
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thur" | "thurs" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Counts workdays between `start` and `stop`, inclusive of both endpoints
///
/// Days in `excludes` and days outside the work week do not count. The
/// result is floored at 1: a same-day or inverted interval still reports
/// one workday.
pub fn net_workdays(
    start: NaiveDate,
    stop: NaiveDate,
    excludes: &HashSet<NaiveDate>,
    week: &WorkWeek,
) -> i64 {
    let mut count = 0i64;
    let mut day = start;
    while day <= stop {
        if week.is_workday(day, excludes) {
            count += 1;
        }
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    count.max(1)
}

/// Returns the date `days` workdays after `start`
///
/// The first workday on or after `start` counts as day 1. Days in
/// `excludes` and days outside the work week are skipped. A `days` of 0 or
/// less clamps to `start`.
pub fn workday_after(
    start: NaiveDate,
    days: i64,
    excludes: &HashSet<NaiveDate>,
    week: &WorkWeek,
) -> NaiveDate {
    if days <= 0 {
        return start;
    }
    let mut remaining = days;
    let mut day = start;
    loop {
        if week.is_workday(day, excludes) {
            remaining -= 1;
            if remaining == 0 {
                return day;
            }
        }
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => return day,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn no_excludes() -> HashSet<NaiveDate> {
        HashSet::new()
    }

    #[test]
    fn test_same_day_floors_at_one() {
        let week = WorkWeek::default();
        let mon = date(2024, 1, 1);
        assert_eq!(net_workdays(mon, mon, &no_excludes(), &week), 1);
    }

    #[test]
    fn test_weekend_only_interval_floors_at_one() {
        let week = WorkWeek::default();
        let sat = date(2024, 1, 6);
        let sun = date(2024, 1, 7);
        assert_eq!(net_workdays(sat, sun, &no_excludes(), &week), 1);
    }

    #[test]
    fn test_full_week_counts_five() {
        let week = WorkWeek::default();
        assert_eq!(
            net_workdays(date(2024, 1, 1), date(2024, 1, 7), &no_excludes(), &week),
            5
        );
    }

    #[test]
    fn test_excluded_holiday_reduces_count_by_one() {
        let week = WorkWeek::default();
        // Mon 2024-01-01 .. Mon 2024-01-08, excluding Wed 2024-01-03:
        // Mon, Tue, Thu, Fri, Mon = 5
        let excludes: HashSet<_> = [date(2024, 1, 3)].into_iter().collect();
        assert_eq!(
            net_workdays(date(2024, 1, 1), date(2024, 1, 8), &excludes, &week),
            5
        );
    }

    #[test]
    fn test_excluding_in_range_workday_never_increases_count() {
        let week = WorkWeek::default();
        let start = date(2024, 1, 1);
        let stop = date(2024, 1, 12);
        let base = net_workdays(start, stop, &no_excludes(), &week);
        let mut day = start;
        while day <= stop {
            let excludes: HashSet<_> = [day].into_iter().collect();
            let reduced = net_workdays(start, stop, &excludes, &week);
            assert!(reduced <= base);
            if week.contains(day.weekday()) && day > start && day < stop {
                assert_eq!(reduced, base - 1);
            }
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_excluding_weekend_date_changes_nothing() {
        let week = WorkWeek::default();
        let excludes: HashSet<_> = [date(2024, 1, 6)].into_iter().collect();
        assert_eq!(
            net_workdays(date(2024, 1, 1), date(2024, 1, 12), &excludes, &week),
            net_workdays(date(2024, 1, 1), date(2024, 1, 12), &no_excludes(), &week),
        );
    }

    #[test]
    fn test_workday_after_clamps_non_positive() {
        let week = WorkWeek::default();
        let sat = date(2024, 1, 6);
        assert_eq!(workday_after(sat, 0, &no_excludes(), &week), sat);
        assert_eq!(workday_after(sat, -3, &no_excludes(), &week), sat);
    }

    #[test]
    fn test_workday_after_counts_start_as_first() {
        let week = WorkWeek::default();
        let mon = date(2024, 1, 1);
        assert_eq!(workday_after(mon, 1, &no_excludes(), &week), mon);
        assert_eq!(workday_after(mon, 5, &no_excludes(), &week), date(2024, 1, 5));
        // the 6th workday rolls over the weekend
        assert_eq!(workday_after(mon, 6, &no_excludes(), &week), date(2024, 1, 8));
    }

    #[test]
    fn test_workday_after_skips_excluded_dates() {
        let week = WorkWeek::default();
        let mon = date(2024, 1, 1);
        let excludes: HashSet<_> = [date(2024, 1, 3)].into_iter().collect();
        // Mon, Tue, (Wed excluded), Thu, Fri -> 4th workday is Friday
        assert_eq!(workday_after(mon, 4, &excludes, &week), date(2024, 1, 5));
    }

    #[test]
    fn test_workday_after_starting_on_weekend() {
        let week = WorkWeek::default();
        let sat = date(2024, 1, 6);
        assert_eq!(workday_after(sat, 1, &no_excludes(), &week), date(2024, 1, 8));
    }

    #[test]
    fn test_custom_week() {
        let week = WorkWeek::from_names(&["sat", "sun"]).unwrap();
        assert!(week.contains(Weekday::Sat));
        assert!(!week.contains(Weekday::Mon));
        assert_eq!(
            net_workdays(date(2024, 1, 1), date(2024, 1, 7), &no_excludes(), &week),
            2
        );
    }

    #[test]
    fn test_from_names_rejects_unknown() {
        assert!(matches!(
            WorkWeek::from_names(&["mon", "noday"]),
            Err(WorkWeekError::UnknownDay(_))
        ));
        let empty: [&str; 0] = [];
        assert!(matches!(WorkWeek::from_names(&empty), Err(WorkWeekError::Empty)));
    }
}

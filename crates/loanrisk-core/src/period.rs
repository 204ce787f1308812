//! Calendar arithmetic for reporting periods.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Last day of the month containing `date`
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Whether two dates fall in the same calendar month
pub fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Every month end from the month of `from` up to and including `to`
pub fn month_ends(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = month_end(from);
    while current <= to {
        dates.push(current);
        current = match current.succ_opt() {
            Some(next) => month_end(next),
            None => break,
        };
    }
    dates
}

/// Every Sunday on or after `from` up to and including `to`
pub fn week_ends(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let offset = (7 - from.weekday().num_days_from_sunday()) % 7;
    let mut current = from + Duration::days(i64::from(offset));
    debug_assert_eq!(current.weekday(), Weekday::Sun);
    let mut dates = Vec::new();
    while current <= to {
        dates.push(current);
        current += Duration::days(7);
    }
    dates
}

/// Whole calendar months elapsed from `from` to `to`.
///
/// Counts `years * 12 + months`; a partial trailing month is not counted
/// unless `to` is the last day of its month.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    let mut months =
        (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32);
    if months > 0 && to.day() < from.day() && to != month_end(to) {
        months -= 1;
    } else if months < 0 && to.day() > from.day() && from != month_end(from) {
        months += 1;
    }
    months
}

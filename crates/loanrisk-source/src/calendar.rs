//! Snapshot calendar.

use chrono::NaiveDate;

use loanrisk_core::period::{month_ends, week_ends};
use loanrisk_core::ReportKind;

/// Snapshot dates a run queries: every month end (monthly) or every Sunday
/// (weekly) from `campaign_start` through `as_of`
pub fn snapshot_dates(kind: ReportKind, campaign_start: NaiveDate, as_of: NaiveDate) -> Vec<NaiveDate> {
    match kind {
        ReportKind::Monthly => month_ends(campaign_start, as_of),
        ReportKind::Weekly => week_ends(campaign_start, as_of),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn monthly_calendar_stops_at_as_of() {
        let dates = snapshot_dates(ReportKind::Monthly, date(2015, 8, 31), date(2016, 1, 15));
        assert_eq!(dates.first(), Some(&date(2015, 8, 31)));
        assert_eq!(dates.last(), Some(&date(2015, 12, 31)));
        assert_eq!(dates.len(), 5);
    }

    #[test]
    fn weekly_calendar_uses_sundays() {
        let dates = snapshot_dates(ReportKind::Weekly, date(2015, 8, 31), date(2015, 9, 30));
        assert_eq!(dates.first(), Some(&date(2015, 9, 6)));
        assert_eq!(dates.len(), 4);
    }

    #[test]
    fn empty_when_as_of_precedes_start() {
        assert!(snapshot_dates(ReportKind::Monthly, date(2016, 1, 31), date(2015, 1, 1)).is_empty());
    }
}

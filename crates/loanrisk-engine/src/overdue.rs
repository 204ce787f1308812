//! Overdue / delinquency builder.

use chrono::NaiveDate;
use loanrisk_core::snapshot::latest_snapshot;
use loanrisk_core::{Field, Key, LoanSnapshot, ReportError, Table};
use tracing::debug;

use crate::aggregate::{
    all_rows, closed, delinquent, maturity_over, new_loan, snapshot_on, Aggregate, Measure, SnapshotFrame,
};

/// Maturity-day cut-offs for the delinquency tiers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverdueThresholds {
    /// Delinquent loans past more days than this are past grace
    pub grace_days: i64,
    /// Delinquent loans past more days than this are non-performing
    pub non_performing_days: i64,
}

impl Default for OverdueThresholds {
    fn default() -> Self {
        Self {
            grace_days: 0,
            non_performing_days: 2,
        }
    }
}

/// Time series and current-period breakdown
#[derive(Clone, Debug, PartialEq)]
pub struct OverdueReport {
    pub series: Table,
    pub current: Table,
}

pub const DELINQUENCY_RATE: &str = "Delinquency rate";
pub const NON_PERFORMING_RATE: &str = "Non-performing rate";

/// Builds [`OverdueReport`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct OverdueBuilder {
    thresholds: OverdueThresholds,
}

impl OverdueBuilder {
    pub fn new(thresholds: OverdueThresholds) -> Self {
        Self { thresholds }
    }

    /// `series_keys` group the full time series (normally ending with the
    /// snapshot date); `current_keys` group the latest snapshot only.
    pub fn build(
        &self,
        rows: &[LoanSnapshot],
        series_keys: &[Field],
        current_keys: &[Field],
    ) -> Result<OverdueReport, ReportError> {
        debug!(rows = rows.len(), ?series_keys, ?current_keys, "Building overdue report");
        let frame = SnapshotFrame::new(rows)?;
        Ok(OverdueReport {
            series: self.series(&frame, series_keys)?,
            current: Self::current(&frame, latest_snapshot(rows), current_keys)?,
        })
    }

    fn series(&self, frame: &SnapshotFrame, keys: &[Field]) -> Result<Table, ReportError> {
        let tiers = |prefix: &str| {
            [
                Measure::named(Field::Count, &format!("{prefix} loans")),
                Measure::named(Field::OverduePrincipal, &format!("{prefix} principal")),
                Measure::named(Field::OverdueAmount, &format!("{prefix} amount")),
            ]
        };
        let grace = maturity_over(self.thresholds.grace_days);
        let non_performing = maturity_over(self.thresholds.non_performing_days);

        let parts = vec![
            Aggregate::sum(
                frame,
                keys,
                &[
                    Measure::named(Field::Count, "Loans"),
                    Measure::field(Field::Disbursed),
                    Measure::field(Field::PrincipalBalance),
                    Measure::field(Field::Balance),
                ],
                all_rows(),
            ),
            Aggregate::sum(frame, keys, &[Measure::named(Field::Count, "Open loans")], closed().not()),
            Aggregate::sum(frame, keys, &[Measure::named(Field::Count, "New loans")], new_loan()),
            Aggregate::sum(frame, keys, &tiers("Delinquent"), delinquent()),
            Aggregate::sum(frame, keys, &tiers("Past-grace"), delinquent().and(grace)),
            Aggregate::sum(frame, keys, &tiers("Non-performing"), delinquent().and(non_performing)),
        ];

        let balance = [Key::Field(Field::Balance)];
        Aggregate::join_filled(parts)?
            .with_ratio(
                vec![Key::text(DELINQUENCY_RATE)],
                &[Key::text("Delinquent amount")],
                &balance,
            )
            .with_ratio(
                vec![Key::text(NON_PERFORMING_RATE)],
                &[Key::text("Non-performing amount")],
                &balance,
            )
            .collect()
    }

    fn current(frame: &SnapshotFrame, latest: Option<NaiveDate>, keys: &[Field]) -> Result<Table, ReportError> {
        let parts = vec![
            Aggregate::sum(
                frame,
                keys,
                &[
                    Measure::named(Field::Count, "Open loans"),
                    Measure::field(Field::Disbursed),
                    Measure::field(Field::ScheduledAmount),
                    Measure::field(Field::Balance),
                ],
                snapshot_on(latest).and(closed().not()),
            ),
            Aggregate::sum(
                frame,
                keys,
                &[
                    Measure::named(Field::Count, "Delinquent loans"),
                    Measure::named(Field::OverdueAmount, "Delinquent amount"),
                ],
                snapshot_on(latest).and(delinquent()),
            ),
        ];
        Aggregate::join_filled(parts)?.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn loan(snap: NaiveDate, status: &str, days: i64) -> LoanSnapshot {
        LoanSnapshot::new(snap, date(2016, 1, 5))
            .with_code(Field::Status3, status)
            .with_code(Field::PrincipalRange, "<10k")
            .with_amount(Field::Balance, dec!(100))
            .with_amount(Field::OverdueAmount, if status == "1" { dec!(40) } else { Decimal::ZERO })
            .with_maturity_days(days)
    }

    #[test]
    fn tiers_follow_thresholds() {
        let jan = date(2016, 1, 31);
        let rows = vec![loan(jan, "1", 0), loan(jan, "1", 1), loan(jan, "1", 5), loan(jan, "0", 0)];
        let report = OverdueBuilder::default()
            .build(&rows, &[Field::SnapshotDate], &[Field::PrincipalRange])
            .unwrap();
        let row = [Key::Date(jan)];
        let series = &report.series;
        assert_eq!(series.value(&row, &[Key::text("Delinquent loans")]), Some(dec!(3)));
        assert_eq!(series.value(&row, &[Key::text("Past-grace loans")]), Some(dec!(2)));
        assert_eq!(series.value(&row, &[Key::text("Non-performing loans")]), Some(dec!(1)));
        assert_eq!(series.value(&row, &[Key::text(DELINQUENCY_RATE)]), Some(dec!(0.3)));
        assert_eq!(series.value(&row, &[Key::text(NON_PERFORMING_RATE)]), Some(dec!(0.1)));
    }

    #[test]
    fn rates_undefined_without_balance() {
        let jan = date(2016, 1, 31);
        let rows = vec![loan(jan, "1", 0).with_amount(Field::Balance, Decimal::ZERO)];
        let report = OverdueBuilder::default()
            .build(&rows, &[Field::SnapshotDate], &[Field::PrincipalRange])
            .unwrap();
        assert_eq!(report.series.value(&[Key::Date(jan)], &[Key::text(DELINQUENCY_RATE)]), None);
    }

    #[test]
    fn current_uses_latest_snapshot_only() {
        let rows = vec![
            loan(date(2016, 1, 31), "1", 0),
            loan(date(2016, 2, 29), "1", 0),
            loan(date(2016, 2, 29), "2", 0),
        ];
        let report = OverdueBuilder::default()
            .build(&rows, &[Field::SnapshotDate], &[Field::PrincipalRange])
            .unwrap();
        let row = [Key::text("<10k")];
        assert_eq!(report.current.n_rows(), 1);
        assert_eq!(report.current.value(&row, &[Key::text("Open loans")]), Some(dec!(1)));
        assert_eq!(report.current.value(&row, &[Key::text("Delinquent amount")]), Some(dec!(40)));
    }
}

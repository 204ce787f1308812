//! Repeat-borrower (reloan) builder.

use loanrisk_core::{Field, Key, LoanSnapshot, ReportError, Table};
use polars::prelude::{col, lit};
use tracing::debug;

use crate::aggregate::{closed, new_loan, Aggregate, Measure, SnapshotFrame, RELOAN, RELOAN_TIMES};

pub const RENEWED: &str = "Renewed";
pub const CLOSED_FIRST_LOANS: &str = "Closed first loans";
pub const RENEWAL_RATE: &str = "Renewal rate";

/// Merchant-level renewal rate and loan-level renewal volume
#[derive(Clone, Debug, PartialEq)]
pub struct ReloanReport {
    pub merchants: Table,
    pub loans: Table,
}

/// Builds [`ReloanReport`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct ReloanBuilder;

impl ReloanBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, rows: &[LoanSnapshot]) -> Result<ReloanReport, ReportError> {
        debug!(rows = rows.len(), "Building reloan report");
        let by_snapshot = [Field::SnapshotDate];
        let by_origin = [Field::OriginDate];

        let frame = SnapshotFrame::new(rows)?;
        let times = col(RELOAN_TIMES);

        let merchants = Aggregate::join_filled(vec![
            Aggregate::sum(
                &frame,
                &by_snapshot,
                &[Measure::named(Field::Count, RENEWED)],
                times.clone().eq(lit(2i64)),
            ),
            Aggregate::sum(
                &frame,
                &by_snapshot,
                &[Measure::named(Field::Count, CLOSED_FIRST_LOANS)],
                times.clone().eq(lit(1i64)).and(closed()),
            ),
        ])?
        .with_ratio(
            vec![Key::text(RENEWAL_RATE)],
            &[Key::text(RENEWED)],
            &[Key::text(CLOSED_FIRST_LOANS)],
        )
        .collect()?;

        // keyed by origination first, so the joined index keeps that name
        let loans = Aggregate::join_filled(vec![
            Aggregate::sum(
                &frame,
                &by_origin,
                &[
                    Measure::named(Field::Count, "Renewals"),
                    Measure::named(Field::Disbursed, "Renewal amount"),
                ],
                new_loan().and(col(RELOAN).gt(lit(1i64))),
            ),
            Aggregate::sum(
                &frame,
                &by_snapshot,
                &[
                    Measure::named(Field::Count, "Cumulative renewals"),
                    Measure::named(Field::Disbursed, "Cumulative renewal amount"),
                ],
                times.neq(lit(1i64)),
            ),
        ])?
        .collect()?;

        Ok(ReloanReport { merchants, loans })
    }
}

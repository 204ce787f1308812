//! Cohort patching.
//!
//! Turns a pivot whose columns are calendar periods into a cohort matrix
//! whose columns are months on book:
//!
//! 1. every month end from the campaign start to the as-of date missing
//!    from the columns is inserted: zero for rows originated on or before
//!    that period, undefined for rows not yet originated. Periods in months
//!    before the earliest origination are dropped
//! 2. the row's own origination period is zero-filled if undefined
//! 3. each row is shifted left so its first defined value lands in the
//!    first column
//! 4. columns are renamed to the months elapsed between the earliest
//!    origination in the data and the period they stood for

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::debug;

use loanrisk_core::period::{month_end, month_ends, months_between, same_month};
use loanrisk_core::{Cell, Column, Key, Level, ReportError, Table, ValueKind};

/// Where each row's origination date comes from
#[derive(Clone, Copy, Debug)]
pub enum Origins<'a> {
    /// One date per row, in row order
    Explicit(&'a [NaiveDate]),
    /// The last row-index level, which must hold dates
    FromIndex,
}

/// Calendar-to-age reshaping over a fixed reporting window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CohortPatcher {
    campaign_start: NaiveDate,
    as_of: NaiveDate,
}

impl CohortPatcher {
    pub fn new(campaign_start: NaiveDate, as_of: NaiveDate) -> Self {
        Self {
            campaign_start,
            as_of,
        }
    }

    pub fn campaign_start(&self) -> NaiveDate {
        self.campaign_start
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Reshape `table` into a cohort matrix.
    ///
    /// `table` must have a single column level of [`Key::Date`]s. `anchor`
    /// is the earliest origination date across the whole data set and fixes
    /// the age labels; the first kept period is the anchor's month, even
    /// when the campaign started earlier.
    pub fn patch(&self, table: &Table, origins: Origins<'_>, anchor: NaiveDate) -> Result<Table, ReportError> {
        let periods: Vec<NaiveDate> = table
            .columns()
            .iter()
            .map(|c| match c.key.as_slice() {
                [Key::Date(d)] => Ok(*d),
                other => Err(ReportError::ShapeMismatch(format!(
                    "cohort columns must be single dates, found {:?}",
                    other
                ))),
            })
            .collect::<Result<_, _>>()?;

        // months before the anchor have no age
        let first_month = month_end(anchor);
        let grid: Vec<NaiveDate> = periods
            .iter()
            .copied()
            .chain(month_ends(self.campaign_start, self.as_of))
            .filter(|d| month_end(*d) >= first_month)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let source_column: Vec<Option<usize>> = grid
            .iter()
            .map(|d| periods.iter().position(|p| p == d))
            .collect();
        for (col, period) in periods.iter().enumerate() {
            let has_values = (0..table.n_rows()).any(|row| table.get(row, col).is_some());
            if month_end(*period) < first_month && has_values {
                debug!(period = %period, anchor = %anchor, "Dropping values dated before the earliest origination");
            }
        }

        let row_origins = self.row_origins(table, origins)?;

        let mut cells = Vec::with_capacity(table.n_rows());
        for (row, origin) in row_origins.iter().enumerate() {
            let mut values: Vec<Cell> = grid
                .iter()
                .zip(&source_column)
                .map(|(period, source)| match source {
                    Some(col) => table.get(row, *col),
                    None if *origin <= *period => Some(Decimal::ZERO),
                    None => None,
                })
                .collect();

            match grid.iter().position(|p| same_month(*p, *origin)) {
                Some(diagonal) => {
                    if values[diagonal].is_none() {
                        values[diagonal] = Some(Decimal::ZERO);
                    }
                }
                None => debug!(origin = %origin, "Origination period outside the grid, no diagonal fill"),
            }

            if let Some(first) = values.iter().position(Option::is_some) {
                values.rotate_left(first);
                let len = values.len();
                for cell in &mut values[len - first..] {
                    *cell = None;
                }
            }
            cells.push(values);
        }

        let columns = grid
            .iter()
            .map(|period| Column {
                key: vec![Key::Age(months_between(anchor, *period))],
                kind: table.columns().first().map_or(ValueKind::Amount, |c| c.kind),
            })
            .collect::<Vec<_>>();
        let mut ages = BTreeSet::new();
        if let Some(dup) = columns.iter().find(|c| !ages.insert(c.key.clone())) {
            return Err(ReportError::DuplicateKey(format!(
                "period columns map to the same age {}",
                dup.key[0]
            )));
        }

        Table::from_parts(
            table.index_levels().to_vec(),
            vec![Level::Unnamed],
            table.rows().to_vec(),
            columns,
            cells,
        )
    }

    fn row_origins(&self, table: &Table, origins: Origins<'_>) -> Result<Vec<NaiveDate>, ReportError> {
        match origins {
            Origins::Explicit(dates) => {
                if dates.len() != table.n_rows() {
                    return Err(ReportError::ShapeMismatch(format!(
                        "{} origination dates for {} rows",
                        dates.len(),
                        table.n_rows()
                    )));
                }
                Ok(dates.to_vec())
            }
            Origins::FromIndex => table
                .rows()
                .iter()
                .map(|key| {
                    key.last().and_then(Key::as_date).ok_or_else(|| {
                        ReportError::MissingOrigin(
                            key.iter().map(ToString::to_string).collect::<Vec<_>>().join(" / "),
                        )
                    })
                })
                .collect(),
        }
    }
}

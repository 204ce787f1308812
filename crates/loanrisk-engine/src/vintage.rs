//! Vintage (cohort) builder.
//!
//! Produces an outstanding-amount cohort matrix and its percentage-of-
//! disbursed counterpart. How rows are bucketed into cohorts is chosen
//! explicitly with a [`CohortMode`].

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use loanrisk_core::period::month_end;
use loanrisk_core::snapshot::{earliest_origin, latest_snapshot};
use loanrisk_core::{
    codes, ratio, Code, DimensionDict, Field, Key, Level, LoanSnapshot, ReportError, Table,
    ValueKind,
};

use crate::aggregate::{all_rows, first_origins, pivot_sum, snapshot_on, Aggregate, Measure, SnapshotFrame};
use crate::cohort::{CohortPatcher, Origins};

/// How rows are bucketed into cohorts
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CohortMode {
    /// One cohort per value of `field`, originating at the earliest
    /// origination date seen for that value
    Geography { field: Field },
    /// One cohort per stage, originating at the stage's boundary date
    Stage { boundaries: BTreeMap<Code, NaiveDate> },
    /// Cohorts keyed by `keys`, whose last key must be the origination date
    General { keys: Vec<Field> },
}

/// Amount and percentage cohort matrices
#[derive(Clone, Debug, PartialEq)]
pub struct VintageReport {
    pub amounts: Table,
    pub ratios: Table,
}

/// Builds [`VintageReport`]s
#[derive(Clone, Copy, Debug)]
pub struct VintageBuilder {
    patcher: CohortPatcher,
}

impl VintageBuilder {
    pub fn new(patcher: CohortPatcher) -> Self {
        Self { patcher }
    }

    pub fn build(&self, rows: &[LoanSnapshot], mode: &CohortMode) -> Result<VintageReport, ReportError> {
        let Some(anchor) = earliest_origin(rows) else {
            return Ok(empty_report(mode));
        };
        debug!(rows = rows.len(), ?mode, "Building vintage");
        match mode {
            CohortMode::Geography { field } => self.geography(rows, *field, anchor),
            CohortMode::Stage { boundaries } => self.stage(rows, boundaries, anchor),
            CohortMode::General { keys } => self.general(rows, keys, anchor),
        }
    }

    fn geography(&self, rows: &[LoanSnapshot], field: Field, anchor: NaiveDate) -> Result<VintageReport, ReportError> {
        let frame = SnapshotFrame::new(rows)?;
        let first_origin = first_origins(&frame, field)?;

        let amount = [Key::text("amount")];
        let disbursed = [Key::text("disbursed")];
        let share = [Key::text("share")];
        let long = Aggregate::sum(
            &frame,
            &[field, Field::SnapshotDate],
            &[
                Measure::new(Field::OverdueAmount, amount[0].clone()),
                Measure::new(Field::Disbursed, disbursed[0].clone()),
            ],
            all_rows(),
        )
        .with_ratio(share.to_vec(), &amount, &disbursed);
        let amounts = long.clone().select(&amount)?.pivot()?;
        let ratios = long.select(&share)?.pivot()?;

        let amounts = with_origin_level(&amounts, field, &first_origin)?;
        let ratios = with_origin_level(&ratios, field, &first_origin)?;
        Ok(VintageReport {
            amounts: self.patcher.patch(&amounts, Origins::FromIndex, anchor)?,
            ratios: self.patcher.patch(&ratios, Origins::FromIndex, anchor)?,
        })
    }

    fn stage(
        &self,
        rows: &[LoanSnapshot],
        boundaries: &BTreeMap<Code, NaiveDate>,
        anchor: NaiveDate,
    ) -> Result<VintageReport, ReportError> {
        let frame = SnapshotFrame::new(rows)?;
        let by_stage = [Field::Stage];
        let amounts = pivot_sum(&frame, &by_stage, Field::SnapshotDate, Field::OverdueAmount, all_rows())?;
        let disbursed = pivot_sum(&frame, &by_stage, Field::SnapshotDate, Field::Disbursed, all_rows())?;

        let origins = amounts
            .rows()
            .iter()
            .map(|key| {
                let code = key.first().and_then(Key::as_text).unwrap_or_default();
                boundaries
                    .get(code)
                    .copied()
                    .ok_or_else(|| ReportError::MissingOrigin(format!("stage {}", code)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // patched before dividing, so inserted periods divide too
        let amounts = self.patcher.patch(&amounts, Origins::Explicit(&origins), anchor)?;
        let disbursed = self.patcher.patch(&disbursed, Origins::Explicit(&origins), anchor)?;
        let mut ratios = amounts.clone();
        cellwise_ratio(&mut ratios, &disbursed);
        Ok(VintageReport { amounts, ratios })
    }

    fn general(&self, rows: &[LoanSnapshot], keys: &[Field], anchor: NaiveDate) -> Result<VintageReport, ReportError> {
        if keys.last() != Some(&Field::OriginDate) {
            return Err(ReportError::ShapeMismatch(
                "general cohorts must be keyed by origination date last".into(),
            ));
        }
        let frame = SnapshotFrame::new(rows)?;
        let disbursed = Aggregate::sum(
            &frame,
            keys,
            &[Measure::new(Field::Disbursed, Key::Field(Field::NewAmount))],
            snapshot_on(latest_snapshot(rows)),
        )
        .collect()?;
        let pivot = pivot_sum(&frame, keys, Field::SnapshotDate, Field::OverdueAmount, all_rows())?;
        let cohorts = self.patcher.patch(&pivot, Origins::FromIndex, anchor)?;
        let amounts = Table::concat(&[disbursed, cohorts])?;

        let mut ratios = amounts.clone();
        for row in 0..ratios.n_rows() {
            let base = ratios.get(row, 0);
            for col in 1..ratios.n_cols() {
                ratios.set(row, col, ratio(amounts.get(row, col), base));
            }
        }
        for col in 1..ratios.n_cols() {
            ratios.set_column_kind(col, ValueKind::Ratio);
        }
        Ok(VintageReport { amounts, ratios })
    }
}

/// Divide each cell of a cohort matrix by the cell with the same keys in
/// `denominator`
fn cellwise_ratio(table: &mut Table, denominator: &Table) {
    let rows = table.rows().to_vec();
    let columns: Vec<Vec<Key>> = table.columns().iter().map(|c| c.key.clone()).collect();
    for (r, row_key) in rows.iter().enumerate() {
        for (c, col_key) in columns.iter().enumerate() {
            let value = ratio(table.get(r, c), denominator.value(row_key, col_key));
            table.set(r, c, value);
        }
    }
    table.set_kind(ValueKind::Ratio);
}

/// Re-key `table` by `(field, origination date)`, ordered by origination
fn with_origin_level(
    table: &Table,
    field: Field,
    origins: &BTreeMap<Key, NaiveDate>,
) -> Result<Table, ReportError> {
    let mut order: Vec<(NaiveDate, usize)> = Vec::with_capacity(table.n_rows());
    for (i, key) in table.rows().iter().enumerate() {
        let origin = key
            .first()
            .and_then(|k| origins.get(k))
            .ok_or_else(|| ReportError::MissingOrigin(format!("{:?}", key)))?;
        order.push((*origin, i));
    }
    order.sort();

    Table::from_parts(
        vec![Level::Field(field), Level::Field(Field::OriginDate)],
        table.column_levels().to_vec(),
        order
            .iter()
            .map(|(origin, i)| vec![table.rows()[*i][0].clone(), Key::Date(*origin)])
            .collect(),
        table.columns().to_vec(),
        order.iter().map(|(_, i)| table.row_cells(*i).to_vec()).collect(),
    )
}

fn empty_report(mode: &CohortMode) -> VintageReport {
    let keys: Vec<Field> = match mode {
        CohortMode::Geography { field } => vec![*field, Field::OriginDate],
        CohortMode::Stage { .. } => vec![Field::Stage],
        CohortMode::General { keys } => keys.clone(),
    };
    VintageReport {
        amounts: Table::keyed_by(&keys),
        ratios: Table::keyed_by(&keys),
    }
}

/// Cohort origin of every stage, read from its dictionary label.
///
/// The first comma-separated part of a label ends with a `YYYY/MM/DD`
/// date; the stage's cohort originates at that month's end.
pub fn stage_boundaries(dict: &DimensionDict) -> Result<BTreeMap<Code, NaiveDate>, ReportError> {
    let mut boundaries = BTreeMap::new();
    for (code, label) in dict.entries(Field::Stage) {
        if code.as_str() == codes::PASS_THROUGH {
            continue;
        }
        let head = label.split(',').next().unwrap_or_default().trim_end();
        let chars: Vec<char> = head.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(10)..].iter().collect();
        let date = NaiveDate::parse_from_str(&tail, "%Y/%m/%d").map_err(|_| ReportError::StageBoundary {
            code: code.to_string(),
            label: label.to_string(),
        })?;
        boundaries.insert(code.clone(), month_end(date));
    }
    Ok(boundaries)
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

    fn builder() -> VintageBuilder {
        VintageBuilder::new(CohortPatcher::new(date(2015, 8, 31), date(2015, 10, 31)))
    }

    fn loan(snap: NaiveDate, origin: NaiveDate, prov: &str, disbursed: Decimal, overdue: Decimal) -> LoanSnapshot {
        LoanSnapshot::new(snap, origin)
            .with_code(Field::Province, prov)
            .with_code(Field::Stage, "A")
            .with_amount(Field::Disbursed, disbursed)
            .with_amount(Field::OverdueAmount, overdue)
    }

    fn rows() -> Vec<LoanSnapshot> {
        vec![
            loan(date(2015, 8, 31), date(2015, 8, 3), "3501", dec!(100), dec!(0)),
            loan(date(2015, 9, 30), date(2015, 8, 3), "3501", dec!(100), dec!(10)),
            loan(date(2015, 10, 31), date(2015, 8, 3), "3501", dec!(100), dec!(20)),
            loan(date(2015, 9, 30), date(2015, 9, 8), "3502", dec!(50), dec!(0)),
            loan(date(2015, 10, 31), date(2015, 9, 8), "3502", dec!(50), dec!(5)),
        ]
    }

    #[test]
    fn general_mode_keeps_disbursed_unscaled() {
        let report = builder()
            .build(&rows(), &CohortMode::General { keys: vec![Field::OriginDate] })
            .unwrap();
        let aug = [Key::Date(date(2015, 8, 3))];
        let sep = [Key::Date(date(2015, 9, 8))];
        let base = [Key::Field(Field::NewAmount)];

        assert_eq!(report.amounts.value(&aug, &base), Some(dec!(100)));
        assert_eq!(report.amounts.value(&aug, &[Key::Age(2)]), Some(dec!(20)));
        // September cohort shifted to age 0
        assert_eq!(report.amounts.value(&sep, &[Key::Age(0)]), Some(dec!(0)));
        assert_eq!(report.amounts.value(&sep, &[Key::Age(1)]), Some(dec!(5)));
        assert_eq!(report.amounts.value(&sep, &[Key::Age(2)]), None);

        assert_eq!(report.ratios.value(&aug, &base), Some(dec!(100)));
        assert_eq!(report.ratios.value(&aug, &[Key::Age(1)]), Some(dec!(0.1)));
        assert_eq!(report.ratios.value(&sep, &[Key::Age(1)]), Some(dec!(0.1)));
        assert_eq!(report.ratios.columns()[0].kind, ValueKind::Amount);
        assert_eq!(report.ratios.columns()[1].kind, ValueKind::Ratio);
    }

    #[test]
    fn general_mode_zero_disbursed_gives_undefined_ratio() {
        let mut rows = rows();
        for row in &mut rows {
            row.disbursed = Decimal::ZERO;
        }
        let report = builder()
            .build(&rows, &CohortMode::General { keys: vec![Field::OriginDate] })
            .unwrap();
        assert!(report
            .ratios
            .row_cells(0)
            .iter()
            .skip(1)
            .all(Option::is_none));
    }

    #[test]
    fn geography_mode_adds_first_origin_level() {
        let report = builder()
            .build(&rows(), &CohortMode::Geography { field: Field::Province })
            .unwrap();
        assert_eq!(
            report.amounts.index_levels(),
            &[Level::Field(Field::Province), Level::Field(Field::OriginDate)]
        );
        assert_eq!(
            report.amounts.rows()[1],
            vec![Key::text("3502"), Key::Date(date(2015, 9, 8))]
        );
        let row = [Key::text("3502"), Key::Date(date(2015, 9, 8))];
        assert_eq!(report.amounts.value(&row, &[Key::Age(1)]), Some(dec!(5)));
        assert_eq!(report.ratios.value(&row, &[Key::Age(1)]), Some(dec!(0.1)));
    }

    #[test]
    fn stage_mode_uses_boundaries() {
        let boundaries = BTreeMap::from([(Code::new("A"), date(2015, 9, 30))]);
        let report = builder()
            .build(&rows(), &CohortMode::Stage { boundaries })
            .unwrap();
        let a = [Key::text("A")];
        // first defined value is August, before the boundary
        assert_eq!(report.amounts.value(&a, &[Key::Age(0)]), Some(dec!(0)));
        assert_eq!(report.amounts.value(&a, &[Key::Age(1)]), Some(dec!(10)));
        assert_eq!(report.amounts.value(&a, &[Key::Age(2)]), Some(dec!(25)));
        assert_eq!(report.ratios.value(&a, &[Key::Age(2)]), Some(dec!(25) / dec!(150)));
    }

    fn late_rows() -> Vec<LoanSnapshot> {
        let origin = date(2015, 10, 5);
        vec![
            loan(date(2015, 10, 31), origin, "3501", dec!(100), dec!(0)),
            loan(date(2015, 11, 30), origin, "3501", dec!(100), dec!(8)),
        ]
    }

    fn late_builder() -> VintageBuilder {
        // campaign window opens two months before the first loan
        VintageBuilder::new(CohortPatcher::new(date(2015, 8, 31), date(2015, 11, 30)))
    }

    #[test]
    fn general_mode_with_late_first_origin() {
        let report = late_builder()
            .build(&late_rows(), &CohortMode::General { keys: vec![Field::OriginDate] })
            .unwrap();
        let row = [Key::Date(date(2015, 10, 5))];
        assert_eq!(report.amounts.n_cols(), 3);
        assert_eq!(report.amounts.value(&row, &[Key::Field(Field::NewAmount)]), Some(dec!(100)));
        assert_eq!(report.amounts.value(&row, &[Key::Age(0)]), Some(dec!(0)));
        assert_eq!(report.amounts.value(&row, &[Key::Age(1)]), Some(dec!(8)));
        assert_eq!(report.ratios.value(&row, &[Key::Age(1)]), Some(dec!(0.08)));
    }

    #[test]
    fn geography_mode_with_late_first_origin() {
        let report = late_builder()
            .build(&late_rows(), &CohortMode::Geography { field: Field::Province })
            .unwrap();
        let row = [Key::text("3501"), Key::Date(date(2015, 10, 5))];
        let ages: Vec<Key> = report.amounts.columns().iter().map(|c| c.key[0].clone()).collect();
        assert_eq!(ages, vec![Key::Age(0), Key::Age(1)]);
        assert_eq!(report.amounts.value(&row, &[Key::Age(1)]), Some(dec!(8)));
        assert_eq!(report.ratios.value(&row, &[Key::Age(1)]), Some(dec!(0.08)));
    }

    #[test]
    fn stage_without_boundary_is_an_error() {
        let result = builder().build(&rows(), &CohortMode::Stage { boundaries: BTreeMap::new() });
        assert!(matches!(result, Err(ReportError::MissingOrigin(_))));
    }

    #[test]
    fn empty_rows_give_empty_tables() {
        let report = builder()
            .build(&[], &CohortMode::Geography { field: Field::Province })
            .unwrap();
        assert!(report.amounts.is_empty());
        assert_eq!(report.amounts.index_levels().len(), 2);
    }

    #[test]
    fn stage_boundaries_from_labels() {
        let dict = DimensionDict::new()
            .with(Field::Stage, "1", "Pilot 2015/08/03, Fujian only")
            .with(Field::Stage, "2", "Rollout 2016/02/15")
            .with(Field::Stage, "3", "No date here");
        assert!(matches!(
            stage_boundaries(&dict),
            Err(ReportError::StageBoundary { .. })
        ));

        let dict = DimensionDict::new()
            .with(Field::Stage, "1", "Pilot 2015/08/03, Fujian only")
            .with(Field::Stage, "2", "Rollout 2016/02/15");
        let boundaries = stage_boundaries(&dict).unwrap();
        assert_eq!(boundaries[&Code::new("1")], date(2015, 8, 31));
        assert_eq!(boundaries[&Code::new("2")], date(2016, 2, 29));
    }
}

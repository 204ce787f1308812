//! Grouped sums, outer joins and pivots over snapshot rows.
//!
//! Rows are loaded once into a polars frame ([`SnapshotFrame`]): date and
//! code fields become string columns, measures become `f64` columns. A
//! builder describes each aggregate as a filter [`Expr`] plus the measures
//! it sums ([`Aggregate`]); grouping, outer joins, zero-fill and ratio
//! columns all run in the lazy plan. [`Aggregate::collect`] lays the result
//! out as a [`Table`].
//!
//! Rows whose grouping key is undefined for any key field are left out,
//! matching group-by semantics. Collected rows are sorted by key.

use chrono::NaiveDate;
use polars::prelude::{
    col, lit, Column as FrameColumn, DataFrame, Expr, IntoLazy, JoinArgs, JoinCoalesce, JoinType,
    LazyFrame, PolarsError,
};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

use loanrisk_core::{codes, Cell, Field, Key, Level, LoanSnapshot, ReportError, Table, ValueKind};

/// Frame column holding days past maturity
pub const MATURITY_DAYS: &str = "maturity_days";
/// Frame column holding the loan's sequence number for its merchant
pub const RELOAN: &str = "reloan";
/// Frame column holding how many loans the merchant has taken
pub const RELOAN_TIMES: &str = "reloan_times";

const DATE_FORMAT: &str = "%Y-%m-%d";
const AMOUNT_SCALE: u32 = 4;
const RATIO_SCALE: u32 = 10;
/// Long-form value column a single-measure pivot spreads out
const PIVOT_VALUE: &str = "value";
/// Placeholder sum of a key-only aggregate
const GROUP_ROWS: &str = "__rows";

fn frame_error(err: PolarsError) -> ReportError {
    ReportError::Frame(err.to_string())
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Snapshot rows as a lazy polars frame
#[derive(Clone)]
pub struct SnapshotFrame {
    frame: LazyFrame,
    rows: usize,
}

impl SnapshotFrame {
    pub fn new(rows: &[LoanSnapshot]) -> Result<Self, ReportError> {
        let mut columns = Vec::with_capacity(Field::ALL.len() + 3);
        for field in Field::ALL {
            let name = field.column();
            let column = if field.is_date() {
                let values: Vec<Option<String>> = rows
                    .iter()
                    .map(|r| r.key(field).map(|k| k.to_string()))
                    .collect();
                FrameColumn::new(name.into(), values)
            } else if field.is_categorical() {
                let values: Vec<Option<&str>> =
                    rows.iter().map(|r| r.code(field).map(|c| c.as_str())).collect();
                FrameColumn::new(name.into(), values)
            } else {
                let values: Vec<f64> = rows
                    .iter()
                    .map(|r| r.amount(field).to_f64().unwrap_or_default())
                    .collect();
                FrameColumn::new(name.into(), values)
            };
            columns.push(column);
        }
        let ints = |f: fn(&LoanSnapshot) -> i64| rows.iter().map(f).collect::<Vec<i64>>();
        columns.push(FrameColumn::new(MATURITY_DAYS.into(), ints(|r| r.maturity_days)));
        columns.push(FrameColumn::new(RELOAN.into(), ints(|r| r.reloan)));
        columns.push(FrameColumn::new(RELOAN_TIMES.into(), ints(|r| r.reloan_times)));

        let frame = DataFrame::new(columns).map_err(frame_error)?.lazy();
        Ok(Self {
            frame,
            rows: rows.len(),
        })
    }

    pub fn lazy(&self) -> LazyFrame {
        self.frame.clone()
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// Every row
pub fn all_rows() -> Expr {
    lit(true)
}

/// `field` holds `code`; undefined never matches
pub fn code_is(field: Field, code: &str) -> Expr {
    col(field.column()).eq_missing(lit(code.to_owned()))
}

/// `field` is defined
pub fn defined(field: Field) -> Expr {
    col(field.column()).is_not_null()
}

pub fn delinquent() -> Expr {
    code_is(Field::Status3, codes::DELINQUENT)
}

pub fn closed() -> Expr {
    code_is(Field::Status3, codes::CLOSED)
}

pub fn new_loan() -> Expr {
    code_is(Field::NewLoan, codes::NEW_LOAN)
}

/// More than `days` past maturity
pub fn maturity_over(days: i64) -> Expr {
    col(MATURITY_DAYS).gt(lit(days))
}

/// Rows of the snapshot taken on `date`; nothing when there is none
pub fn snapshot_on(date: Option<NaiveDate>) -> Expr {
    match date {
        Some(date) => col(Field::SnapshotDate.column()).eq_missing(lit(date_key(date))),
        None => lit(false),
    }
}

/// A summed field and the column key it is reported under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Measure {
    pub field: Field,
    pub label: Key,
}

impl Measure {
    /// Report `field` under its own (translatable) name
    pub fn field(field: Field) -> Self {
        Self {
            field,
            label: Key::Field(field),
        }
    }

    /// Report `field` under `label`
    pub fn new(field: Field, label: Key) -> Self {
        Self { field, label }
    }

    pub fn named(field: Field, label: &str) -> Self {
        Self::new(field, Key::text(label))
    }
}

/// Frame column name of a column key
fn column_name(key: &[Key]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" / ")
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Output {
    name: String,
    key: Vec<Key>,
    kind: ValueKind,
}

/// A grouped aggregate, planned but not yet collected
#[derive(Clone)]
pub struct Aggregate {
    frame: LazyFrame,
    keys: Vec<Field>,
    column_levels: Vec<Level>,
    outputs: Vec<Output>,
}

impl Aggregate {
    /// Sum `measures` over the rows matching `filter`, grouped by `keys`.
    ///
    /// One single-level column per measure; every cell of an output row is
    /// defined.
    pub fn sum(frame: &SnapshotFrame, keys: &[Field], measures: &[Measure], filter: Expr) -> Self {
        let columns: Vec<(Field, Vec<Key>)> = measures
            .iter()
            .map(|m| (m.field, vec![m.label.clone()]))
            .collect();
        Self::sum_columns(frame, keys, vec![Level::Unnamed], &columns, filter)
    }

    /// [`sum`](Self::sum) with multi-level column keys
    pub fn sum_columns(
        frame: &SnapshotFrame,
        keys: &[Field],
        column_levels: Vec<Level>,
        columns: &[(Field, Vec<Key>)],
        filter: Expr,
    ) -> Self {
        let outputs: Vec<Output> = columns
            .iter()
            .map(|(_, key)| Output {
                name: column_name(key),
                key: key.clone(),
                kind: ValueKind::Amount,
            })
            .collect();
        let mut sums: Vec<Expr> = columns
            .iter()
            .zip(&outputs)
            .map(|((field, _), out)| col(field.column()).sum().alias(out.name.as_str()))
            .collect();
        if sums.is_empty() {
            // keys only; the count is never collected
            sums.push(col(Field::Count.column()).sum().alias(GROUP_ROWS));
        }
        let predicate = keys
            .iter()
            .fold(filter, |acc, f| acc.and(defined(*f)));
        let by: Vec<Expr> = keys.iter().map(|f| col(f.column())).collect();
        let frame = frame.lazy().filter(predicate).group_by(by).agg(sums);
        Self {
            frame,
            keys: keys.to_vec(),
            column_levels,
            outputs,
        }
    }

    pub fn keys(&self) -> &[Field] {
        &self.keys
    }

    /// Whether an output is reported under `key`
    pub fn has_column(&self, key: &[Key]) -> bool {
        self.outputs.iter().any(|o| o.key == key)
    }

    /// Keep only the output reported under `key`
    pub fn select(mut self, key: &[Key]) -> Result<Self, ReportError> {
        self.outputs.retain(|o| o.key == key);
        if self.outputs.is_empty() {
            return Err(ReportError::ShapeMismatch(format!(
                "no column {}",
                column_name(key)
            )));
        }
        Ok(self)
    }

    /// Outer-join `parts` side by side on their row keys.
    ///
    /// Index level names come from the first part; a part may group by
    /// different fields as long as it has as many. Cells missing from a
    /// part stay undefined.
    pub fn join(parts: Vec<Aggregate>) -> Result<Aggregate, ReportError> {
        let mut parts = parts.into_iter();
        let Some(mut joined) = parts.next() else {
            return Err(ReportError::ShapeMismatch("nothing to join".into()));
        };
        for part in parts {
            if part.keys.len() != joined.keys.len()
                || part.column_levels.len() != joined.column_levels.len()
            {
                return Err(ReportError::ShapeMismatch(format!(
                    "cannot join {} key levels onto {}",
                    part.keys.len(),
                    joined.keys.len()
                )));
            }
            if let Some(dup) = part.outputs.iter().find(|o| joined.has_column(&o.key)) {
                return Err(ReportError::DuplicateKey(dup.name.clone()));
            }
            let left_on: Vec<Expr> = joined.keys.iter().map(|f| col(f.column())).collect();
            let right_on: Vec<Expr> = part.keys.iter().map(|f| col(f.column())).collect();
            joined.frame = joined.frame.join(
                part.frame,
                left_on,
                right_on,
                JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
            );
            joined.outputs.extend(part.outputs);
        }
        Ok(joined)
    }

    /// Replace undefined cells with zero
    pub fn fill_zero(mut self) -> Self {
        let fills: Vec<Expr> = self
            .outputs
            .iter()
            .map(|o| col(o.name.as_str()).fill_null(lit(0.0)))
            .collect();
        if !fills.is_empty() {
            self.frame = self.frame.with_columns(fills);
        }
        self
    }

    /// [`join`](Self::join) then [`fill_zero`](Self::fill_zero)
    pub fn join_filled(parts: Vec<Aggregate>) -> Result<Aggregate, ReportError> {
        Ok(Self::join(parts)?.fill_zero())
    }

    /// Append `numerator ÷ denominator` under `label`. Undefined where the
    /// denominator is zero or either side is undefined.
    pub fn with_ratio(self, label: Vec<Key>, numerator: &[Key], denominator: &[Key]) -> Self {
        let expr = col(column_name(numerator).as_str()) / col(column_name(denominator).as_str());
        self.with_expr(label, ValueKind::Ratio, expr)
    }

    /// Append `minuend − subtrahend` under `label`; undefined where either
    /// side is undefined
    pub fn with_difference(self, label: Vec<Key>, minuend: &[Key], subtrahend: &[Key]) -> Self {
        let expr = col(column_name(minuend).as_str()) - col(column_name(subtrahend).as_str());
        self.with_expr(label, ValueKind::Amount, expr)
    }

    fn with_expr(mut self, label: Vec<Key>, kind: ValueKind, expr: Expr) -> Self {
        let name = column_name(&label);
        self.frame = self.frame.with_column(expr.alias(name.as_str()));
        self.outputs.push(Output {
            name,
            key: label,
            kind,
        });
        self
    }

    /// Run the plan and lay the result out with one row per key
    pub fn collect(self) -> Result<Table, ReportError> {
        let df = self.frame.collect().map_err(frame_error)?;
        let keys = read_keys(&df, &self.keys)?;
        let mut values = Vec::with_capacity(self.outputs.len());
        for out in &self.outputs {
            values.push(read_values(&df, &out.name)?);
        }

        let mut table = Table::new(
            self.keys.iter().copied().map(Level::Field).collect(),
            self.column_levels,
        );
        for out in &self.outputs {
            table.add_column(out.key.clone(), out.kind)?;
        }
        for (i, key) in keys.into_iter().enumerate() {
            let Some(key) = key else { continue };
            let row = table.ensure_row(key)?;
            for (c, (column, out)) in values.iter().zip(&self.outputs).enumerate() {
                table.set(row, c, to_cell(column[i], out.kind));
            }
        }
        table.sort_rows();
        Ok(table)
    }

    /// Collect with the last key field moved from the rows onto the
    /// columns. Needs exactly one output; the table has a single column
    /// level named by that field.
    pub fn pivot(self) -> Result<Table, ReportError> {
        if self.outputs.len() != 1 {
            return Err(ReportError::ShapeMismatch(format!(
                "pivot needs one value column, found {}",
                self.outputs.len()
            )));
        }
        self.spread(false)
    }

    /// Collect with the last key field moved onto the columns, one block of
    /// columns per output under an outer level holding the output key
    pub fn pivot_outputs(self) -> Result<Table, ReportError> {
        self.spread(true)
    }

    fn spread(self, keep_output_level: bool) -> Result<Table, ReportError> {
        let Some((&column, row_fields)) = self.keys.split_last() else {
            return Err(ReportError::ShapeMismatch("pivot needs a column key".into()));
        };
        let df = self.frame.collect().map_err(frame_error)?;
        let keys = read_keys(&df, &self.keys)?;
        let mut values = Vec::with_capacity(self.outputs.len());
        for out in &self.outputs {
            values.push(read_values(&df, &out.name)?);
        }
        let seen: BTreeSet<Key> = keys
            .iter()
            .flatten()
            .filter_map(|k| k.last().cloned())
            .collect();

        let mut column_levels = Vec::new();
        if keep_output_level {
            column_levels.extend(self.column_levels.iter().cloned());
        }
        column_levels.push(Level::Field(column));
        let mut table = Table::new(
            row_fields.iter().copied().map(Level::Field).collect(),
            column_levels,
        );
        for out in &self.outputs {
            for value in &seen {
                let mut key = if keep_output_level {
                    out.key.clone()
                } else {
                    Vec::new()
                };
                key.push(value.clone());
                table.add_column(key, out.kind)?;
            }
        }

        for (i, key) in keys.into_iter().enumerate() {
            let Some(mut key) = key else { continue };
            let Some(value) = key.pop() else { continue };
            let Some(offset) = seen.iter().position(|v| *v == value) else {
                continue;
            };
            let row = table.ensure_row(key)?;
            for (o, (column, out)) in values.iter().zip(&self.outputs).enumerate() {
                table.set(row, o * seen.len() + offset, to_cell(column[i], out.kind));
            }
        }
        table.sort_rows();
        Ok(table)
    }
}

/// Earliest origination date per value of `field`
pub fn first_origins(frame: &SnapshotFrame, field: Field) -> Result<BTreeMap<Key, NaiveDate>, ReportError> {
    // ISO dates order the same as text
    let df = frame
        .lazy()
        .filter(defined(field))
        .group_by([col(field.column())])
        .agg([col(Field::OriginDate.column()).min()])
        .collect()
        .map_err(frame_error)?;
    Ok(read_keys(&df, &[field, Field::OriginDate])?
        .into_iter()
        .flatten()
        .filter_map(|key| match key.as_slice() {
            [value, Key::Date(origin)] => Some((value.clone(), *origin)),
            _ => None,
        })
        .collect())
}

/// Row keys of `df`, `None` where any key is null
fn read_keys(df: &DataFrame, keys: &[Field]) -> Result<Vec<Option<Vec<Key>>>, ReportError> {
    let mut levels = Vec::with_capacity(keys.len());
    for field in keys {
        let values: Vec<Option<&str>> = df
            .column(field.column())
            .map_err(frame_error)?
            .str()
            .map_err(frame_error)?
            .into_iter()
            .collect();
        levels.push(values);
    }
    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut key = Vec::with_capacity(keys.len());
        for (field, level) in keys.iter().zip(&levels) {
            match level[i] {
                Some(raw) => key.push(parse_key(*field, raw)?),
                None => break,
            }
        }
        rows.push((key.len() == keys.len()).then_some(key));
    }
    Ok(rows)
}

fn parse_key(field: Field, raw: &str) -> Result<Key, ReportError> {
    if field.is_date() {
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(Key::Date)
            .map_err(|e| ReportError::Frame(format!("{}: {}", field.column(), e)))
    } else {
        Ok(Key::text(raw))
    }
}

fn read_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, ReportError> {
    Ok(df
        .column(name)
        .map_err(frame_error)?
        .f64()
        .map_err(frame_error)?
        .into_iter()
        .collect())
}

/// Decimal cell of a frame value; NaN and infinities are undefined
fn to_cell(value: Option<f64>, kind: ValueKind) -> Cell {
    let scale = match kind {
        ValueKind::Amount => AMOUNT_SCALE,
        ValueKind::Ratio => RATIO_SCALE,
    };
    value
        .filter(|v| v.is_finite())
        .and_then(Decimal::from_f64)
        .map(|d| d.round_dp(scale).normalize())
}

/// Sum `measure` over the rows matching `filter`, grouped by `keys` on rows
/// and by the values of `column` on columns.
///
/// Columns are the sorted distinct values seen; a cell is undefined where
/// no row fell into it.
pub fn pivot_sum(
    frame: &SnapshotFrame,
    keys: &[Field],
    column: Field,
    measure: Field,
    filter: Expr,
) -> Result<Table, ReportError> {
    let mut by = keys.to_vec();
    by.push(column);
    Aggregate::sum(frame, &by, &[Measure::named(measure, PIVOT_VALUE)], filter).pivot()
}

/// Pivot each measure over the values of `column`, side by side under an
/// outer column level holding the measure label
pub fn pivot_measures(
    frame: &SnapshotFrame,
    keys: &[Field],
    column: Field,
    measures: &[Measure],
) -> Result<Table, ReportError> {
    let mut by = keys.to_vec();
    by.push(column);
    Aggregate::sum(frame, &by, measures, all_rows()).pivot_outputs()
}

//! Aggregate tables.
//!
//! A [`Table`] is a rows × columns grid of `Option<Decimal>` cells, keyed on
//! both axes by tuples of [`Key`]s. Each key position is a *level* with its
//! own name ([`Level`]). `None` cells are undefined: a missing combination
//! before zero-fill, or a ratio whose denominator was zero.
//!
//! Row and column keys are unique; rows and columns keep insertion order
//! unless explicitly sorted. Row lookups go through a hashed index.
//!
//! Tables are the typed view the aggregation frames are collected into and
//! the unit the renderers lay out.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::field::Field;
use crate::ReportError;

/// A table cell; `None` is undefined
pub type Cell = Option<Decimal>;

/// One component of a row or column key
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    Date(NaiveDate),
    Text(String),
    /// A field name awaiting translation to its display label
    Field(Field),
    /// Months on book
    Age(i32),
}

impl Key {
    pub fn text(s: impl Into<String>) -> Self {
        Key::Text(s.into())
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Key::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Key::Text(s) => f.write_str(s),
            Key::Field(field) => f.write_str(field.column()),
            Key::Age(n) => write!(f, "M{}", n),
        }
    }
}

/// Name of a row-index or column level
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    /// Named by a field, not yet translated
    Field(Field),
    /// Display name
    Name(String),
    Unnamed,
}

impl Level {
    pub fn field(&self) -> Option<Field> {
        match self {
            Level::Field(f) => Some(*f),
            _ => None,
        }
    }

    /// Text shown in a header cell
    pub fn display(&self) -> &str {
        match self {
            Level::Field(f) => f.column(),
            Level::Name(s) => s,
            Level::Unnamed => "",
        }
    }
}

/// How a column's values should be read
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Monetary amount or count
    #[default]
    Amount,
    /// Ratio of two aggregates
    Ratio,
}

/// Column key plus its value kind
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub key: Vec<Key>,
    pub kind: ValueKind,
}

/// A keyed rows × columns grid
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    index: Vec<Level>,
    column_levels: Vec<Level>,
    rows: Vec<Vec<Key>>,
    /// Row key -> position in `rows`
    positions: HashMap<Vec<Key>, usize>,
    columns: Vec<Column>,
    cells: Vec<Vec<Cell>>,
}

/// First position of every row key
fn index_rows(rows: &[Vec<Key>]) -> HashMap<Vec<Key>, usize> {
    let mut positions = HashMap::with_capacity(rows.len());
    for (i, key) in rows.iter().enumerate() {
        positions.entry(key.clone()).or_insert(i);
    }
    positions
}

fn render_key(key: &[Key]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" / ")
}

impl Table {
    /// Empty table with the given level names
    pub fn new(index: Vec<Level>, column_levels: Vec<Level>) -> Self {
        Self {
            index,
            column_levels,
            rows: Vec::new(),
            positions: HashMap::new(),
            columns: Vec::new(),
            cells: Vec::new(),
        }
    }

    /// Empty table whose row index is named by `fields` and whose columns
    /// have a single unnamed level
    pub fn keyed_by(fields: &[Field]) -> Self {
        Self::new(
            fields.iter().copied().map(Level::Field).collect(),
            vec![Level::Unnamed],
        )
    }

    // ------------------------------------------------------------------------
    // Shape
    // ------------------------------------------------------------------------

    pub fn index_levels(&self) -> &[Level] {
        &self.index
    }

    pub fn column_levels(&self) -> &[Level] {
        &self.column_levels
    }

    pub fn rows(&self) -> &[Vec<Key>] {
        &self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_position(&self, key: &[Key]) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn column_position(&self, key: &[Key]) -> Option<usize> {
        self.columns.iter().position(|c| c.key.as_slice() == key)
    }

    // ------------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------------

    /// Append a column of undefined cells
    pub fn add_column(&mut self, key: Vec<Key>, kind: ValueKind) -> Result<usize, ReportError> {
        if key.len() != self.column_levels.len() {
            return Err(ReportError::ShapeMismatch(format!(
                "column key '{}' has {} levels, table has {}",
                render_key(&key),
                key.len(),
                self.column_levels.len()
            )));
        }
        if self.column_position(&key).is_some() {
            return Err(ReportError::DuplicateKey(render_key(&key)));
        }
        self.columns.push(Column { key, kind });
        for row in &mut self.cells {
            row.push(None);
        }
        Ok(self.columns.len() - 1)
    }

    /// Position of the row keyed by `key`, appending an undefined row if absent
    pub fn ensure_row(&mut self, key: Vec<Key>) -> Result<usize, ReportError> {
        if key.len() != self.index.len() {
            return Err(ReportError::ShapeMismatch(format!(
                "row key '{}' has {} levels, table has {}",
                render_key(&key),
                key.len(),
                self.index.len()
            )));
        }
        if let Some(pos) = self.row_position(&key) {
            return Ok(pos);
        }
        self.positions.insert(key.clone(), self.rows.len());
        self.rows.push(key);
        self.cells.push(vec![None; self.columns.len()]);
        Ok(self.rows.len() - 1)
    }

    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.cells.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    pub fn set(&mut self, row: usize, col: usize, value: Cell) {
        if let Some(cell) = self.cells.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }

    /// Cell looked up by keys
    pub fn value(&self, row: &[Key], col: &[Key]) -> Cell {
        match (self.row_position(row), self.column_position(col)) {
            (Some(r), Some(c)) => self.get(r, c),
            _ => None,
        }
    }

    /// All cells of one row
    pub fn row_cells(&self, row: usize) -> &[Cell] {
        self.cells.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    // ------------------------------------------------------------------------
    // Reshaping
    // ------------------------------------------------------------------------

    /// Sort rows by key
    pub fn sort_rows(&mut self) {
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|a, b| self.rows[*a].cmp(&self.rows[*b]));
        self.rows = order.iter().map(|i| self.rows[*i].clone()).collect();
        self.cells = order.iter().map(|i| self.cells[*i].clone()).collect();
        self.positions = index_rows(&self.rows);
    }

    /// Stable-sort columns by a rank derived from each column
    pub fn sort_columns_by_key<K: Ord>(&mut self, mut rank: impl FnMut(&Column) -> K) {
        let mut order: Vec<usize> = (0..self.columns.len()).collect();
        order.sort_by_key(|i| rank(&self.columns[*i]));
        self.columns = order.iter().map(|i| self.columns[*i].clone()).collect();
        for row in &mut self.cells {
            *row = order.iter().map(|i| row[*i]).collect();
        }
    }

    /// Replace every undefined cell with `value`
    pub fn fill_undefined(&mut self, value: Decimal) {
        for cell in self.cells.iter_mut().flatten() {
            if cell.is_none() {
                *cell = Some(value);
            }
        }
    }

    /// Insert a column level at `at` holding `key` for every column
    pub fn insert_column_level(&mut self, at: usize, level: Level, key: Key) {
        let at = at.min(self.column_levels.len());
        self.column_levels.insert(at, level);
        for column in &mut self.columns {
            column.key.insert(at, key.clone());
        }
    }

    /// Mark every column with the given value kind
    pub fn set_kind(&mut self, kind: ValueKind) {
        for column in &mut self.columns {
            column.kind = kind;
        }
    }

    /// Mark one column with the given value kind
    pub fn set_column_kind(&mut self, col: usize, kind: ValueKind) {
        if let Some(column) = self.columns.get_mut(col) {
            column.kind = kind;
        }
    }

    /// Outer-join tables side by side on their row keys.
    ///
    /// Level names are taken from the first table; every table must have
    /// the same index and column depth. Rows come out sorted, columns in
    /// input order. Cells missing from a table are undefined.
    pub fn concat(tables: &[Table]) -> Result<Table, ReportError> {
        let Some(first) = tables.first() else {
            return Err(ReportError::ShapeMismatch("nothing to concatenate".into()));
        };
        let mut out = Table::new(first.index.clone(), first.column_levels.clone());

        let mut keys = BTreeSet::new();
        for table in tables {
            if table.index.len() != first.index.len()
                || table.column_levels.len() != first.column_levels.len()
            {
                return Err(ReportError::ShapeMismatch(format!(
                    "cannot join a {}x{}-level table onto a {}x{}-level table",
                    table.index.len(),
                    table.column_levels.len(),
                    first.index.len(),
                    first.column_levels.len()
                )));
            }
            keys.extend(table.rows.iter().cloned());
        }
        for key in keys {
            out.rows.push(key);
            out.cells.push(Vec::new());
        }
        out.positions = index_rows(&out.rows);
        let positions = out.positions.clone();

        for table in tables {
            for column in &table.columns {
                if out.column_position(&column.key).is_some() {
                    return Err(ReportError::DuplicateKey(render_key(&column.key)));
                }
                out.columns.push(column.clone());
            }
            let mut incoming: Vec<Option<&Vec<Cell>>> = vec![None; out.rows.len()];
            for (key, cells) in table.rows.iter().zip(&table.cells) {
                incoming[positions[key]] = Some(cells);
            }
            for (slot, cells) in out.cells.iter_mut().zip(incoming) {
                match cells {
                    Some(cells) => slot.extend_from_slice(cells),
                    None => slot.extend(std::iter::repeat(None).take(table.columns.len())),
                }
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Relabeling (used by translation)
    // ------------------------------------------------------------------------

    pub fn set_index_level(&mut self, level: usize, name: Level) {
        if let Some(slot) = self.index.get_mut(level) {
            *slot = name;
        }
    }

    pub fn set_column_level(&mut self, level: usize, name: Level) {
        if let Some(slot) = self.column_levels.get_mut(level) {
            *slot = name;
        }
    }

    /// Rewrite one level of every row key
    pub fn map_index_keys(&mut self, level: usize, mut f: impl FnMut(&Key) -> Key) {
        for row in &mut self.rows {
            if let Some(key) = row.get_mut(level) {
                *key = f(key);
            }
        }
        self.positions = index_rows(&self.rows);
    }

    /// Rewrite one level of every column key
    pub fn map_column_keys(&mut self, level: usize, mut f: impl FnMut(&Key) -> Key) {
        for column in &mut self.columns {
            if let Some(key) = column.key.get_mut(level) {
                *key = f(key);
            }
        }
    }

    /// Build a table from parts, checking that the shapes agree
    pub fn from_parts(
        index: Vec<Level>,
        column_levels: Vec<Level>,
        rows: Vec<Vec<Key>>,
        columns: Vec<Column>,
        cells: Vec<Vec<Cell>>,
    ) -> Result<Table, ReportError> {
        if rows.len() != cells.len() {
            return Err(ReportError::ShapeMismatch(format!(
                "{} row keys for {} rows of cells",
                rows.len(),
                cells.len()
            )));
        }
        if let Some(bad) = cells.iter().find(|r| r.len() != columns.len()) {
            return Err(ReportError::ShapeMismatch(format!(
                "row of {} cells for {} columns",
                bad.len(),
                columns.len()
            )));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != index.len()) {
            return Err(ReportError::ShapeMismatch(format!(
                "row key '{}' does not match {} index levels",
                render_key(bad),
                index.len()
            )));
        }
        if let Some(bad) = columns.iter().find(|c| c.key.len() != column_levels.len()) {
            return Err(ReportError::ShapeMismatch(format!(
                "column key '{}' does not match {} column levels",
                render_key(&bad.key),
                column_levels.len()
            )));
        }
        Ok(Table {
            index,
            column_levels,
            positions: index_rows(&rows),
            rows,
            columns,
            cells,
        })
    }
}

/// `numerator ÷ denominator`, undefined when either side is undefined or
/// the denominator is zero
pub fn ratio(numerator: Cell, denominator: Cell) -> Cell {
    match (numerator, denominator) {
        (Some(n), Some(d)) => n.checked_div(d),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn one_column(name: &str, rows: &[(&str, Decimal)]) -> Table {
        let mut table = Table::keyed_by(&[Field::Province]);
        let col = table.add_column(vec![Key::text(name)], ValueKind::Amount).unwrap();
        for (key, value) in rows {
            let row = table.ensure_row(vec![Key::text(*key)]).unwrap();
            table.set(row, col, Some(*value));
        }
        table
    }

    #[test]
    fn concat_outer_joins_and_sorts() {
        let a = one_column("a", &[("2", dec!(1)), ("1", dec!(2))]);
        let b = one_column("b", &[("3", dec!(5))]);
        let joined = Table::concat(&[a, b]).unwrap();

        assert_eq!(
            joined.rows().to_vec(),
            vec![vec![Key::text("1")], vec![Key::text("2")], vec![Key::text("3")]]
        );
        assert_eq!(joined.value(&[Key::text("1")], &[Key::text("a")]), Some(dec!(2)));
        assert_eq!(joined.value(&[Key::text("1")], &[Key::text("b")]), None);
        assert_eq!(joined.value(&[Key::text("3")], &[Key::text("b")]), Some(dec!(5)));
    }

    #[test]
    fn concat_keeps_first_index_names() {
        let a = one_column("a", &[("1", dec!(1))]);
        let mut b = one_column("b", &[("1", dec!(1))]);
        b.set_index_level(0, Level::Field(Field::Stage));
        let joined = Table::concat(&[a, b]).unwrap();
        assert_eq!(joined.index_levels(), &[Level::Field(Field::Province)]);
    }

    #[test]
    fn concat_rejects_duplicate_columns() {
        let a = one_column("a", &[("1", dec!(1))]);
        let b = one_column("a", &[("2", dec!(1))]);
        assert!(matches!(
            Table::concat(&[a, b]),
            Err(ReportError::DuplicateKey(_))
        ));
    }

    #[test]
    fn fill_undefined_zeroes_missing() {
        let a = one_column("a", &[("1", dec!(1))]);
        let b = one_column("b", &[("2", dec!(1))]);
        let mut joined = Table::concat(&[a, b]).unwrap();
        joined.fill_undefined(Decimal::ZERO);
        assert_eq!(joined.value(&[Key::text("1")], &[Key::text("b")]), Some(Decimal::ZERO));
    }

    #[test]
    fn ratio_is_undefined_on_zero_denominator() {
        assert_eq!(ratio(Some(dec!(1)), Some(dec!(4))), Some(dec!(0.25)));
        assert_eq!(ratio(Some(dec!(1)), Some(Decimal::ZERO)), None);
        assert_eq!(ratio(None, Some(dec!(1))), None);
    }

    #[test]
    fn sort_columns_is_stable() {
        let mut table = Table::keyed_by(&[Field::Province]);
        for name in ["b1", "a1", "b2", "a2"] {
            table.add_column(vec![Key::text(name)], ValueKind::Amount).unwrap();
        }
        table.sort_columns_by_key(|c| c.key[0].as_text().map(|s| s.as_bytes()[0]));
        let names: Vec<String> = table.columns().iter().map(|c| c.key[0].to_string()).collect();
        assert_eq!(names, vec!["a1", "a2", "b1", "b2"]);
    }

    #[test]
    fn shape_checks() {
        let mut table = Table::keyed_by(&[Field::Province]);
        assert!(table.add_column(vec![Key::text("a"), Key::text("b")], ValueKind::Amount).is_err());
        assert!(table.ensure_row(vec![]).is_err());
        assert!(Table::from_parts(vec![Level::Unnamed], vec![Level::Unnamed], vec![], vec![], vec![vec![]]).is_err());
    }
}

//! Report, sheet and block layout.
//!
//! A [`Report`] is one output workbook: an ordered list of named
//! [`Sheet`]s, each holding [`Block`]s placed at row/column offsets.
//! Blocks are placed with [`Sheet::push_right`] and [`Sheet::push_below`],
//! which leave [`BLOCK_MARGIN`] empty rows or columns after the furthest
//! extent of the blocks already on the sheet.

use crate::table::Table;

/// Empty rows/columns between neighbouring blocks
pub const BLOCK_MARGIN: u32 = 5;

/// Longest sheet name a workbook accepts
pub const MAX_SHEET_NAME: usize = 31;

/// A table positioned on a sheet
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// Zero-based top row
    pub row: u32,
    /// Zero-based left column
    pub col: u32,
    pub table: Table,
}

impl Block {
    /// Rows occupied: one header row per column level, one row for the
    /// index level names, then the data rows
    pub fn height(&self) -> u32 {
        to_u32(self.table.column_levels().len() + 1 + self.table.n_rows())
    }

    /// Columns occupied: index levels followed by data columns
    pub fn width(&self) -> u32 {
        to_u32(self.table.index_levels().len() + self.table.n_cols())
    }

    pub fn bottom(&self) -> u32 {
        self.row + self.height()
    }

    pub fn right(&self) -> u32 {
        self.col + self.width()
    }

    /// Whether the two blocks share at least one cell
    pub fn overlaps(&self, other: &Block) -> bool {
        self.row < other.bottom()
            && other.row < self.bottom()
            && self.col < other.right()
            && other.col < self.right()
    }
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// A named worksheet
#[derive(Clone, Debug, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub blocks: Vec<Block>,
}

impl Sheet {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: sheet_name(name.as_ref()),
            blocks: Vec::new(),
        }
    }

    /// Place `table` at the top, to the right of every existing block
    pub fn push_right(&mut self, table: Table) -> &mut Self {
        let col = self
            .blocks
            .iter()
            .map(|b| b.right() + BLOCK_MARGIN)
            .max()
            .unwrap_or(0);
        self.blocks.push(Block { row: 0, col, table });
        self
    }

    /// Place `table` at the left edge, below every existing block
    pub fn push_below(&mut self, table: Table) -> &mut Self {
        let row = self
            .blocks
            .iter()
            .map(|b| b.bottom() + BLOCK_MARGIN)
            .max()
            .unwrap_or(0);
        self.blocks.push(Block { row, col: 0, table });
        self
    }

    /// Builder-style [`push_right`](Self::push_right)
    pub fn with_right(mut self, table: Table) -> Self {
        self.push_right(table);
        self
    }

    /// Builder-style [`push_below`](Self::push_below)
    pub fn with_below(mut self, table: Table) -> Self {
        self.push_below(table);
        self
    }

    /// Whether any two blocks share a cell
    pub fn has_overlap(&self) -> bool {
        self.blocks.iter().enumerate().any(|(i, a)| {
            self.blocks[i + 1..].iter().any(|b| a.overlaps(b))
        })
    }
}

/// One output workbook
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    /// File name, without directory
    pub file_name: String,
    pub sheets: Vec<Sheet>,
}

impl Report {
    pub fn new(file_name: impl AsRef<str>) -> Self {
        Self {
            file_name: file_name_component(file_name.as_ref()),
            sheets: Vec::new(),
        }
    }

    pub fn with_sheet(mut self, sheet: Sheet) -> Self {
        self.push_sheet(sheet);
        self
    }

    /// Append `sheet`. A name already taken in this report (compared
    /// case-insensitively, as workbooks do) gets a numbered suffix.
    pub fn push_sheet(&mut self, mut sheet: Sheet) {
        sheet.name = self.unique_sheet_name(&sheet.name);
        self.sheets.push(sheet);
    }

    fn unique_sheet_name(&self, name: &str) -> String {
        let taken = |candidate: &str| {
            let candidate = candidate.to_lowercase();
            self.sheets.iter().any(|s| s.name.to_lowercase() == candidate)
        };
        if !taken(name) {
            return name.to_string();
        }
        let mut n = 2u32;
        loop {
            let suffix = format!(" ({n})");
            let head: String = name
                .chars()
                .take(MAX_SHEET_NAME.saturating_sub(suffix.chars().count()))
                .collect();
            let candidate = format!("{}{}", head.trim_end(), suffix);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// A worksheet name with the characters workbooks reject replaced and the
/// length capped
pub fn sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME)
        .collect();
    let cleaned = cleaned.trim_matches('\'').to_string();
    if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned
    }
}

/// A string safe to use as a single path component
pub fn file_name_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::table::{Key, ValueKind};

    fn table(rows: usize, cols: usize) -> Table {
        let mut t = Table::keyed_by(&[Field::SnapshotDate]);
        for c in 0..cols {
            t.add_column(vec![Key::text(format!("c{c}"))], ValueKind::Amount)
                .unwrap();
        }
        for r in 0..rows {
            t.ensure_row(vec![Key::Age(i32::try_from(r).unwrap())]).unwrap();
        }
        t
    }

    #[test]
    fn blocks_placed_right_leave_margin() {
        let mut sheet = Sheet::new("Overdue");
        sheet.push_right(table(3, 4)).push_right(table(2, 2));
        assert_eq!(sheet.blocks[0].col, 0);
        // 1 index column + 4 data columns + margin
        assert_eq!(sheet.blocks[1].col, 5 + BLOCK_MARGIN);
        assert_eq!(sheet.blocks[1].row, 0);
        assert!(!sheet.has_overlap());
    }

    #[test]
    fn blocks_placed_below_leave_margin() {
        let sheet = Sheet::new("Vintage")
            .with_below(table(3, 4))
            .with_below(table(10, 2))
            .with_below(table(1, 1));
        // 1 column level + 1 name row + 3 data rows
        assert_eq!(sheet.blocks[1].row, 5 + BLOCK_MARGIN);
        assert_eq!(sheet.blocks[2].row, sheet.blocks[1].bottom() + BLOCK_MARGIN);
        assert!(!sheet.has_overlap());
    }

    #[test]
    fn overlap_detected() {
        let a = Block { row: 0, col: 0, table: table(3, 3) };
        let b = Block { row: 2, col: 2, table: table(3, 3) };
        assert!(a.overlaps(&b));
    }

    #[test]
    fn sheet_names_sanitized() {
        assert_eq!(sheet_name("Vintage ex 3502"), "Vintage ex 3502");
        assert_eq!(sheet_name("a/b:c"), "a_b_c");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), MAX_SHEET_NAME);
        assert_eq!(sheet_name(""), "Sheet");
    }

    #[test]
    fn truncated_sheet_names_stay_unique() {
        let long = "Vintage ex Fujian Province Pilot Region";
        let mut report = Report::new("risk.xlsx");
        report.push_sheet(Sheet::new(format!("{long} North")));
        report.push_sheet(Sheet::new(format!("{long} South")));
        report.push_sheet(Sheet::new("OVERDUE"));
        report.push_sheet(Sheet::new("Overdue"));

        let names: Vec<&str> = report.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names[0], "Vintage ex Fujian Province Pilo");
        assert_eq!(names[1], "Vintage ex Fujian Province (2)");
        assert_eq!(names[3], "Overdue (2)");
        assert!(names.iter().all(|n| n.chars().count() <= MAX_SHEET_NAME));
        assert!(report.sheet("Vintage ex Fujian Province (2)").is_some());
    }

    #[test]
    fn file_names_sanitized() {
        assert_eq!(file_name_component("risk_report_20160131_a/b.xlsx"), "risk_report_20160131_a_b.xlsx");
    }
}

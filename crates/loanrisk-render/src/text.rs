//! Plain-text report renderer
//!
//! Prints every sheet as a heading followed by its blocks as aligned
//! columns. Meant for terminals and dry runs, not for distribution.

use std::fmt::Write;

use loanrisk_core::{Block, Cell, RenderError, Renderer, Report, ValueKind};

/// Plain-text renderer
#[derive(Clone, Debug)]
pub struct TextRenderer {
    /// Decimal places for amounts
    pub precision: u32,
    /// Text shown for undefined cells
    pub undefined: String,
    /// Cap on data rows printed per block
    pub max_rows: Option<usize>,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self {
            precision: 2,
            undefined: "-".into(),
            max_rows: None,
        }
    }
}

impl TextRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn precision(mut self, places: u32) -> Self {
        self.precision = places;
        self
    }

    pub fn undefined(mut self, text: impl Into<String>) -> Self {
        self.undefined = text.into();
        self
    }

    /// Print at most `rows` data rows per block
    pub fn max_rows(mut self, rows: usize) -> Self {
        self.max_rows = Some(rows);
        self
    }

    fn cell(&self, cell: Cell, kind: ValueKind) -> String {
        match (cell, kind) {
            (None, _) => self.undefined.clone(),
            (Some(v), ValueKind::Amount) => v.round_dp(self.precision).to_string(),
            (Some(v), ValueKind::Ratio) => {
                format!("{}%", (v * rust_decimal::Decimal::ONE_HUNDRED).round_dp(self.precision))
            }
        }
    }

    fn block_lines(&self, block: &Block) -> Vec<Vec<String>> {
        let table = &block.table;
        let n_index = table.index_levels().len();
        let mut lines = Vec::new();

        for (level, name) in table.column_levels().iter().enumerate() {
            let mut line = vec![String::new(); n_index.saturating_sub(1)];
            if n_index > 0 {
                line.push(name.display().to_string());
            }
            line.extend(
                table
                    .columns()
                    .iter()
                    .map(|c| c.key.get(level).map(ToString::to_string).unwrap_or_default()),
            );
            lines.push(line);
        }
        lines.push(
            table
                .index_levels()
                .iter()
                .map(|l| l.display().to_string())
                .collect(),
        );

        let limit = self.max_rows.unwrap_or(usize::MAX);
        for (r, key) in table.rows().iter().enumerate().take(limit) {
            let mut line: Vec<String> = key.iter().map(ToString::to_string).collect();
            line.extend(
                table
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(c, column)| self.cell(table.get(r, c), column.kind)),
            );
            lines.push(line);
        }
        if table.n_rows() > limit {
            lines.push(vec![format!("... {} more rows", table.n_rows() - limit)]);
        }
        lines
    }
}

/// Pad every column of `lines` to its widest entry
fn align(lines: &[Vec<String>]) -> Vec<String> {
    let width = lines.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0; width];
    for line in lines {
        for (i, cell) in line.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    lines
        .iter()
        .map(|line| {
            line.iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<w$}", cell, w = widths[i]))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect()
}

impl Renderer for TextRenderer {
    type Output = String;

    fn render(&self, report: &Report) -> Result<String, RenderError> {
        let mut out = String::new();
        let fmt_err = |e: std::fmt::Error| RenderError::Format(e.to_string());

        writeln!(out, "# {}", report.file_name).map_err(fmt_err)?;
        for sheet in &report.sheets {
            writeln!(out).map_err(fmt_err)?;
            writeln!(out, "## {}", sheet.name).map_err(fmt_err)?;
            for block in &sheet.blocks {
                writeln!(out).map_err(fmt_err)?;
                writeln!(
                    out,
                    "[row {}, col {}] {} x {}",
                    block.row,
                    block.col,
                    block.table.n_rows(),
                    block.table.n_cols()
                )
                .map_err(fmt_err)?;
                for line in align(&self.block_lines(block)) {
                    writeln!(out, "{}", line).map_err(fmt_err)?;
                }
            }
        }
        Ok(out)
    }
}

//! XLSX workbook renderer
//!
//! Every [`Sheet`] of a report becomes a worksheet; every [`Block`] is
//! written at its row/column offset in the layout a data-frame export
//! uses:
//!
//! ```text
//! |              | <col level 0> | A        | A        | B        |
//! |              | <col level 1> | x        | y        | x        |
//! | <idx level 0>| <idx level 1> |          |          |          |
//! | 2016-01-31   | 3502          | 1,200.00 | 35.00    | 12.50%   |
//! ```
//!
//! Undefined cells are left blank. Ratio columns get a percent format.
//! Date keys are written as date cells.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use std::path::{Path, PathBuf};
use tracing::debug;

use loanrisk_core::{Block, Key, RenderError, Renderer, Report, Sheet, ValueKind};

/// XLSX renderer
#[derive(Clone, Debug)]
pub struct ExcelRenderer {
    /// Excel number format for date keys
    pub date_format: String,
    /// Number format for amount columns
    pub amount_format: String,
    /// Number format for ratio columns
    pub ratio_format: String,
    /// Fit column widths to their content after writing
    pub autofit: bool,
}

impl Default for ExcelRenderer {
    fn default() -> Self {
        Self {
            date_format: "yyyy-mm-dd".into(),
            amount_format: "#,##0.00".into(),
            ratio_format: "0.00%".into(),
            autofit: true,
        }
    }
}

/// Reusable cell formats
struct ExcelFormats {
    header: Format,
    header_date: Format,
    index: Format,
    index_date: Format,
    amount: Format,
    ratio: Format,
}

/// What a key is written as
#[derive(Debug, PartialEq)]
enum KeyCell {
    Date(NaiveDate),
    Text(String),
}

impl From<&Key> for KeyCell {
    fn from(key: &Key) -> Self {
        match key {
            Key::Date(d) => KeyCell::Date(*d),
            other => KeyCell::Text(other.to_string()),
        }
    }
}

impl ExcelRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Excel number format used for date keys
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Set the number format for amount columns
    pub fn amount_format(mut self, format: impl Into<String>) -> Self {
        self.amount_format = format.into();
        self
    }

    /// Set the number format for ratio columns
    pub fn ratio_format(mut self, format: impl Into<String>) -> Self {
        self.ratio_format = format.into();
        self
    }

    /// Keep the default column widths
    pub fn no_autofit(mut self) -> Self {
        self.autofit = false;
        self
    }

    /// Generate workbook bytes
    pub fn render_to_bytes(&self, report: &Report) -> Result<Vec<u8>, RenderError> {
        let mut workbook = Workbook::new();
        let formats = self.create_formats();

        for sheet in &report.sheets {
            self.add_sheet(&mut workbook, sheet, &formats)?;
        }

        workbook
            .save_to_buffer()
            .map_err(|e| RenderError::Format(format!("Failed to create workbook: {e}")))
    }

    /// Render `report` into `dir` under its own file name
    pub fn write(&self, report: &Report, dir: &Path) -> Result<PathBuf, RenderError> {
        let bytes = self.render(report)?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&report.file_name);
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), sheets = report.sheets.len(), "Wrote workbook");
        Ok(path)
    }

    fn create_formats(&self) -> ExcelFormats {
        let header = Format::new()
            .set_bold()
            .set_align(FormatAlign::Center)
            .set_border(FormatBorder::Thin);

        let header_date = header.clone().set_num_format(&self.date_format);

        let index = Format::new().set_bold().set_border(FormatBorder::Thin);
        let index_date = index.clone().set_num_format(&self.date_format);

        let amount = Format::new().set_num_format(&self.amount_format);

        let ratio = Format::new().set_num_format(&self.ratio_format);

        ExcelFormats {
            header,
            header_date,
            index,
            index_date,
            amount,
            ratio,
        }
    }

    fn add_sheet(&self, workbook: &mut Workbook, sheet: &Sheet, formats: &ExcelFormats) -> Result<(), RenderError> {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&sheet.name)
            .map_err(|e| RenderError::Format(e.to_string()))?;

        for block in &sheet.blocks {
            Self::write_block(worksheet, block, formats)?;
        }

        if self.autofit {
            worksheet.autofit();
        }
        Ok(())
    }

    fn write_block(sheet: &mut Worksheet, block: &Block, formats: &ExcelFormats) -> Result<(), RenderError> {
        let table = &block.table;
        let n_index = table.index_levels().len();
        let n_levels = table.column_levels().len();
        let data_col = block.col + to_u32(n_index)?;

        // column headers: level name in the last index column, keys across
        for (level, name) in table.column_levels().iter().enumerate() {
            let row = block.row + to_u32(level)?;
            if n_index > 0 && !name.display().is_empty() {
                write_text(sheet, row, data_col - 1, name.display(), &formats.header)?;
            }
            for (c, column) in table.columns().iter().enumerate() {
                let col = data_col + to_u32(c)?;
                match column.key.get(level) {
                    Some(key) => write_key(sheet, row, col, key, &formats.header, &formats.header_date)?,
                    None => write_text(sheet, row, col, "", &formats.header)?,
                }
            }
        }

        // index level names
        let names_row = block.row + to_u32(n_levels)?;
        for (i, level) in table.index_levels().iter().enumerate() {
            write_text(sheet, names_row, block.col + to_u32(i)?, level.display(), &formats.header)?;
        }

        for (r, key) in table.rows().iter().enumerate() {
            let row = names_row + 1 + to_u32(r)?;
            for (i, part) in key.iter().enumerate() {
                write_key(sheet, row, block.col + to_u32(i)?, part, &formats.index, &formats.index_date)?;
            }
            for (c, column) in table.columns().iter().enumerate() {
                let Some(value) = table.get(r, c) else {
                    continue;
                };
                let value = value
                    .to_f64()
                    .ok_or_else(|| RenderError::InvalidData(format!("{value} does not fit a cell")))?;
                let format = match column.kind {
                    ValueKind::Amount => &formats.amount,
                    ValueKind::Ratio => &formats.ratio,
                };
                let col = column_index(data_col + to_u32(c)?)?;
                sheet
                    .write_number_with_format(row, col, value, format)
                    .map_err(|e| RenderError::Format(e.to_string()))?;
            }
        }
        Ok(())
    }
}

impl Renderer for ExcelRenderer {
    type Output = Vec<u8>;

    fn render(&self, report: &Report) -> Result<Vec<u8>, RenderError> {
        if report.sheets.is_empty() {
            return Err(RenderError::InvalidData("No sheets to render".into()));
        }
        self.render_to_bytes(report)
    }
}

fn write_key(
    sheet: &mut Worksheet,
    row: u32,
    col: u32,
    key: &Key,
    text_format: &Format,
    date_format: &Format,
) -> Result<(), RenderError> {
    match KeyCell::from(key) {
        KeyCell::Date(date) => {
            sheet
                .write_date_with_format(row, column_index(col)?, &date, date_format)
                .map_err(|e| RenderError::Format(e.to_string()))?;
            Ok(())
        }
        KeyCell::Text(text) => write_text(sheet, row, col, &text, text_format),
    }
}

fn write_text(sheet: &mut Worksheet, row: u32, col: u32, text: &str, format: &Format) -> Result<(), RenderError> {
    sheet
        .write_string_with_format(row, column_index(col)?, text, format)
        .map_err(|e| RenderError::Format(e.to_string()))?;
    Ok(())
}

fn to_u32(n: usize) -> Result<u32, RenderError> {
    u32::try_from(n).map_err(|_| RenderError::InvalidData(format!("offset {n} out of range")))
}

fn column_index(col: u32) -> Result<u16, RenderError> {
    u16::try_from(col).map_err(|_| RenderError::InvalidData(format!("column {col} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loanrisk_core::{Field, Table};
    use rust_decimal_macros::dec;

    fn report() -> Report {
        let date = NaiveDate::from_ymd_opt(2016, 1, 31).unwrap();
        let mut table = Table::keyed_by(&[Field::SnapshotDate]);
        let amount = table.add_column(vec![Key::text("Balance")], ValueKind::Amount).unwrap();
        let rate = table.add_column(vec![Key::text("Rate")], ValueKind::Ratio).unwrap();
        let r = table.ensure_row(vec![Key::Date(date)]).unwrap();
        table.set(r, amount, Some(dec!(1200)));
        table.set(r, rate, None);

        Report::new("risk.xlsx").with_sheet(Sheet::new("Overdue").with_right(table.clone()).with_right(table))
    }

    #[test]
    fn renders_xlsx_bytes() {
        let bytes = ExcelRenderer::new().render(&report()).unwrap();
        // XLSX files are zip archives
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn empty_report_is_rejected() {
        let result = ExcelRenderer::new().render(&Report::new("empty.xlsx"));
        assert!(matches!(result, Err(RenderError::InvalidData(_))));
    }

    #[test]
    fn date_keys_become_date_cells() {
        let date = NaiveDate::from_ymd_opt(2016, 1, 31).unwrap();
        assert_eq!(KeyCell::from(&Key::Date(date)), KeyCell::Date(date));
        assert_eq!(KeyCell::from(&Key::Age(3)), KeyCell::Text("M3".into()));
    }

    #[test]
    fn date_column_headers_render() {
        let date = NaiveDate::from_ymd_opt(2016, 1, 31).unwrap();
        let mut table = Table::keyed_by(&[Field::OriginDate]);
        let col = table.add_column(vec![Key::Date(date)], ValueKind::Amount).unwrap();
        let r = table.ensure_row(vec![Key::Date(date)]).unwrap();
        table.set(r, col, Some(dec!(3)));
        let report = Report::new("vintage.xlsx").with_sheet(Sheet::new("Vintage").with_below(table));

        let bytes = ExcelRenderer::new().date_format("yyyy-mm").render(&report).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}

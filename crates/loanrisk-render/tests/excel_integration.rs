//! Integration tests for workbook rendering

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use loanrisk_core::{Field, Key, Level, Renderer, Report, Sheet, Table, ValueKind};
use loanrisk_render::{ExcelRenderer, TextRenderer};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Two-level columns, two-level index
fn transitions_table() -> Table {
    let mut table = Table::new(
        vec![Level::Name("Period".into()), Level::Name("Province".into())],
        vec![Level::Unnamed, Level::Unnamed],
    );
    for label in ["0-0", "0-1", "1-1"] {
        table
            .add_column(vec![Key::text("Count"), Key::text(label)], ValueKind::Amount)
            .unwrap();
    }
    for (i, province) in ["Fuzhou", "Xiamen"].iter().enumerate() {
        let r = table
            .ensure_row(vec![Key::Date(date(2016, 1, 31)), Key::text(*province)])
            .unwrap();
        table.set(r, 0, Some(dec!(10) + rust_decimal::Decimal::from(i)));
        table.set(r, 2, Some(dec!(1)));
    }
    table
}

fn overdue_report() -> Report {
    let mut rates = Table::keyed_by(&[Field::SnapshotDate]);
    rates.add_column(vec![Key::text("Delinquency rate")], ValueKind::Ratio).unwrap();
    let r = rates.ensure_row(vec![Key::Date(date(2016, 1, 31))]).unwrap();
    rates.set(r, 0, Some(dec!(0.0425)));

    Report::new("risk_report_20160201.xlsx")
        .with_sheet(Sheet::new("Overdue").with_right(rates.clone()).with_right(transitions_table()))
        .with_sheet(Sheet::new("Transitions").with_below(transitions_table()).with_below(rates))
}

#[test]
fn workbook_written_under_report_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let report = overdue_report();
    let path = ExcelRenderer::new().write(&report, dir.path()).unwrap();

    assert_eq!(path, dir.path().join("risk_report_20160201.xlsx"));
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.len() > 1000);
    assert_eq!(&bytes[..2], b"PK");
}

#[test]
fn output_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("monthly").join("2016");
    let path = ExcelRenderer::new().no_autofit().write(&overdue_report(), &nested).unwrap();
    assert!(path.exists());
}

#[test]
fn empty_tables_still_render() {
    let report = Report::new("empty.xlsx")
        .with_sheet(Sheet::new("Vintage").with_below(Table::keyed_by(&[Field::Stage])));
    let bytes = ExcelRenderer::new().render(&report).unwrap();
    assert!(!bytes.is_empty());
}

#[test]
fn text_preview_lists_every_sheet() {
    let text = TextRenderer::new().render(&overdue_report()).unwrap();
    assert!(text.contains("## Overdue"));
    assert!(text.contains("## Transitions"));
    assert!(text.contains("Xiamen"));
    assert!(text.contains("4.25%"));
}

//! # loanrisk-core
//!
//! Core domain model and traits for loan-portfolio risk reporting.
//!
//! This crate provides:
//! - Domain types: `LoanSnapshot`, `Field`, `Code`, `DimensionDict`, `ColumnLabels`
//! - Aggregate tables: `Table` with typed row/column keys and undefined cells
//! - Output layout: `Report`, `Sheet`, `Block`
//! - Core traits: `SnapshotSource`, `Renderer`
//! - Error types
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use loanrisk_core::{Field, LoanSnapshot, Sheet, Table, Key, ValueKind};
//! use rust_decimal::Decimal;
//!
//! let date = NaiveDate::from_ymd_opt(2016, 1, 31).unwrap();
//! let row = LoanSnapshot::new(date, date)
//!     .with_code(Field::Province, "3502")
//!     .with_amount(Field::Balance, Decimal::new(12050, 2));
//! assert_eq!(row.code(Field::Province).unwrap().as_str(), "3502");
//!
//! let mut table = Table::keyed_by(&[Field::SnapshotDate]);
//! let col = table.add_column(vec![Key::Field(Field::Balance)], ValueKind::Amount).unwrap();
//! let r = table.ensure_row(vec![Key::Date(date)]).unwrap();
//! table.set(r, col, Some(row.balance));
//!
//! let mut sheet = Sheet::new("Overdue");
//! sheet.push_right(table);
//! assert_eq!(sheet.blocks.len(), 1);
//! ```

pub mod dictionary;
pub mod field;
pub mod period;
pub mod report;
pub mod snapshot;
pub mod table;

pub use dictionary::{ColumnLabels, DimensionDict};
pub use field::{codes, Code, Dimension, Field, ReportKind};
pub use report::{Block, Report, Sheet, BLOCK_MARGIN};
pub use snapshot::LoanSnapshot;
pub use table::{ratio, Cell, Column, Key, Level, Table, ValueKind};

use chrono::NaiveDate;
use thiserror::Error;

// ============================================================================
// Traits
// ============================================================================

/// Input side of a report run
pub trait SnapshotSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// All snapshot rows whose snapshot date is one of `dates`
    fn snapshots(&self, dates: &[NaiveDate]) -> Result<Vec<LoanSnapshot>, Self::Error>;

    /// The code → label dictionary
    fn dimension_dict(&self) -> Result<DimensionDict, Self::Error>;
}

/// Output rendering
pub trait Renderer {
    type Output;

    /// Render one report to the output format
    fn render(&self, report: &Report) -> Result<Self::Output, RenderError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Report-building error
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("No origination date for row {0}")]
    MissingOrigin(String),

    #[error("Cannot read a cohort date for stage '{code}' from label '{label}'")]
    StageBoundary { code: String, label: String },

    #[error("No snapshot rows to report on")]
    NoData,

    #[error("Aggregation error: {0}")]
    Frame(String),
}

/// Rendering error
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

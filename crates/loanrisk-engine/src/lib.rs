//! # loanrisk-engine
//!
//! Aggregation builders and report assembly for loan-portfolio risk reports.
//!
//! The pipeline runs in four steps:
//! - [`Translator`] turns raw dimension codes into display labels
//! - the builders ([`OverdueBuilder`], [`TransitionBuilder`],
//!   [`VintageBuilder`], [`ReloanBuilder`]) group snapshot rows into tables
//! - [`CohortPatcher`] reshapes calendar pivots into months-on-book matrices
//! - [`ReportAssembler`] lays every table out on named sheets
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use loanrisk_core::{ColumnLabels, DimensionDict, Dimension, Field, LoanSnapshot};
//! use loanrisk_engine::{ReportAssembler, ReportPlan, Translator};
//! use rust_decimal::Decimal;
//!
//! let jan = NaiveDate::from_ymd_opt(2016, 1, 31).unwrap();
//! let rows = vec![LoanSnapshot::new(jan, jan)
//!     .with_code(Field::Status3, "0")
//!     .with_amount(Field::Disbursed, Decimal::new(1000, 0))];
//!
//! let plan = ReportPlan::new(jan, jan)
//!     .dimensions(vec![Dimension::Overall])
//!     .excluded_region(None);
//! let translator = Translator::new(DimensionDict::new(), ColumnLabels::english());
//! let reports = ReportAssembler::new(plan, translator).assemble(&rows).unwrap();
//! assert_eq!(reports[0].file_name, "risk_report_20160131.xlsx");
//! ```

pub mod aggregate;
pub mod assemble;
pub mod cohort;
pub mod overdue;
pub mod reloan;
pub mod transition;
pub mod translate;
pub mod vintage;

pub use assemble::{ReportAssembler, ReportPlan};
pub use cohort::{CohortPatcher, Origins};
pub use overdue::{OverdueBuilder, OverdueReport, OverdueThresholds};
pub use reloan::{ReloanBuilder, ReloanReport};
pub use transition::{TransitionBuilder, TransitionFamily, TransitionPolicy, TransitionReport};
pub use translate::Translator;
pub use vintage::{stage_boundaries, CohortMode, VintageBuilder, VintageReport};

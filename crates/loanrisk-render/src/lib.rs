//! # loanrisk-render
//!
//! Rendering backends for loanrisk reports.
//!
//! This crate provides:
//! - XLSX workbooks, one per [`Report`](loanrisk_core::Report), with every
//!   table block written at its sheet offset
//! - Plain-text output for terminals and dry runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use loanrisk_core::Renderer;
//! use loanrisk_render::{ExcelRenderer, TextRenderer};
//!
//! // Workbook written under its own file name
//! let path = ExcelRenderer::new().write(&report, Path::new("out"))?;
//!
//! // Terminal preview
//! println!("{}", TextRenderer::new().max_rows(20).render(&report)?);
//! ```

pub mod excel;
pub mod text;

pub use excel::ExcelRenderer;
pub use text::TextRenderer;

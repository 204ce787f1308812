//! # loanrisk-source
//!
//! Input side of a report run:
//!
//! - [`RunConfig`]: TOML run configuration
//! - [`SqliteSource`]: snapshot rows and the dimension dictionary from SQLite
//! - [`snapshot_dates`]: the snapshot calendar a run queries
//!
//! ## Example
//!
//! ```rust
//! use loanrisk_source::RunConfig;
//!
//! let config = RunConfig::from_toml_str(r#"
//!     statistics_db = "stats.db"
//!     reference_db = "stats.db"
//!     kind = "weekly"
//! "#).unwrap();
//! assert_eq!(config.statistics_table, "risk_statistics_all");
//! ```

pub mod calendar;
pub mod config;
pub mod sqlite;

pub use calendar::snapshot_dates;
pub use config::{RunConfig, ThresholdConfig};
pub use sqlite::SqliteSource;

use thiserror::Error;

/// Error loading configuration or input data
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value in column '{column}': {value}")]
    InvalidValue { column: String, value: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

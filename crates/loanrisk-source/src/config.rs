//! Run configuration.
//!
//! ```toml
//! statistics_db = "data/risk.db"
//! reference_db = "data/risk.db"
//! campaign_start = "2015-08-31"
//! output_dir = "reports"
//! kind = "monthly"
//! dimensions = ["overall", "product_type", "province", "stage"]
//! excluded_region = "3502"
//!
//! [collapse_product_codes]
//! "3" = "1"
//!
//! [thresholds]
//! grace_days = 0
//! non_performing_days = 2
//!
//! [labels]
//! prov_cd = "Region"
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use loanrisk_core::{Code, ColumnLabels, Dimension, Field, ReportKind};

use crate::{SourceError, SourceResult};

/// Maturity-day thresholds for the overdue report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Delinquent loans past this many days count as past grace
    pub grace_days: i64,
    /// Delinquent loans past this many days count as non-performing
    pub non_performing_days: i64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            grace_days: 0,
            non_performing_days: 2,
        }
    }
}

/// Everything a report run needs besides the as-of date
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// SQLite database holding the snapshot table
    pub statistics_db: PathBuf,
    /// SQLite database holding the dimension dictionary (may be the same file)
    pub reference_db: PathBuf,

    #[serde(default = "default_statistics_table")]
    pub statistics_table: String,
    #[serde(default = "default_dimension_table")]
    pub dimension_table: String,

    /// First month of the reporting calendar
    #[serde(default = "default_campaign_start")]
    pub campaign_start: NaiveDate,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default)]
    pub kind: ReportKind,

    /// Grouping dimensions, in report order
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<Dimension>,

    /// Province code left out of the second vintage sheet; empty disables it
    #[serde(default = "default_excluded_region")]
    pub excluded_region: String,

    /// Product-type codes folded into another code before grouping
    #[serde(default = "default_collapse")]
    pub collapse_product_codes: BTreeMap<String, String>,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Display-label overrides keyed by database column name
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_statistics_table() -> String {
    "risk_statistics_all".into()
}

fn default_dimension_table() -> String {
    "risk_dimension".into()
}

fn default_campaign_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 8, 31).unwrap_or_default()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_prefix() -> String {
    "risk_report".into()
}

fn default_dimensions() -> Vec<Dimension> {
    Dimension::DEFAULT_ORDER.to_vec()
}

fn default_excluded_region() -> String {
    "3502".into()
}

fn default_collapse() -> BTreeMap<String, String> {
    BTreeMap::from([("3".to_string(), "1".to_string())])
}

impl RunConfig {
    /// A configuration with every default, reading both tables from `db`
    pub fn new(db: impl Into<PathBuf>) -> Self {
        let db = db.into();
        Self {
            statistics_db: db.clone(),
            reference_db: db,
            statistics_table: default_statistics_table(),
            dimension_table: default_dimension_table(),
            campaign_start: default_campaign_start(),
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            kind: ReportKind::default(),
            dimensions: default_dimensions(),
            excluded_region: default_excluded_region(),
            collapse_product_codes: default_collapse(),
            thresholds: ThresholdConfig::default(),
            labels: BTreeMap::new(),
        }
    }

    /// Load and validate a TOML configuration file.
    ///
    /// Relative database and output paths are resolved against the
    /// directory holding the file.
    pub fn load(path: &Path) -> SourceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse and validate a TOML configuration
    pub fn from_toml_str(content: &str) -> SourceResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.statistics_db,
            &mut self.reference_db,
            &mut self.output_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Check values serde cannot
    pub fn validate(&self) -> SourceResult<()> {
        for table in [&self.statistics_table, &self.dimension_table] {
            if !is_identifier(table) {
                return Err(SourceError::InvalidConfig(format!(
                    "'{}' is not a valid table name",
                    table
                )));
            }
        }
        if self.dimensions.is_empty() {
            return Err(SourceError::InvalidConfig(
                "at least one dimension is required".into(),
            ));
        }
        if self.thresholds.non_performing_days < self.thresholds.grace_days {
            return Err(SourceError::InvalidConfig(format!(
                "non_performing_days ({}) is below grace_days ({})",
                self.thresholds.non_performing_days, self.thresholds.grace_days
            )));
        }
        if self.file_prefix.trim().is_empty() {
            return Err(SourceError::InvalidConfig("file_prefix is empty".into()));
        }
        for column in self.labels.keys() {
            if Field::from_column(column).is_none() {
                return Err(SourceError::InvalidConfig(format!(
                    "unknown column '{}' in [labels]",
                    column
                )));
            }
        }
        Ok(())
    }

    /// Default English labels with the `[labels]` overrides applied
    pub fn column_labels(&self) -> SourceResult<ColumnLabels> {
        let mut labels = ColumnLabels::english();
        for (column, label) in &self.labels {
            let field = Field::from_column(column).ok_or_else(|| {
                SourceError::InvalidConfig(format!("unknown column '{}' in [labels]", column))
            })?;
            labels.set(field, label.clone());
        }
        Ok(labels)
    }

    /// Product-type collapse map as normalized codes
    pub fn product_collapse(&self) -> BTreeMap<Code, Code> {
        self.collapse_product_codes
            .iter()
            .filter_map(|(from, to)| Some((Code::parse(from)?, Code::parse(to)?)))
            .collect()
    }

    /// The excluded region code, if one is configured
    pub fn excluded_region(&self) -> Option<Code> {
        Code::parse(&self.excluded_region)
    }
}

/// Plain (optionally schema-qualified) SQL identifier
pub(crate) fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            part.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

//! Report assembly.
//!
//! Runs the builders once per grouping dimension and lays their tables out
//! on named sheets. Monthly runs produce one workbook per dimension; weekly
//! runs produce a single workbook with one overdue sheet per dimension.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info};

use loanrisk_core::snapshot::latest_snapshot;
use loanrisk_core::{
    codes, Code, Dimension, Field, LoanSnapshot, Report, ReportError, ReportKind, Sheet, Table,
};

use crate::cohort::CohortPatcher;
use crate::overdue::{OverdueBuilder, OverdueReport, OverdueThresholds};
use crate::reloan::ReloanBuilder;
use crate::transition::TransitionBuilder;
use crate::translate::Translator;
use crate::vintage::{stage_boundaries, CohortMode, VintageBuilder, VintageReport};

pub const OVERDUE_SHEET: &str = "Overdue";
pub const TRANSITIONS_SHEET: &str = "Transitions";
pub const VINTAGE_SHEET: &str = "Vintage";
pub const RELOAN_SHEET: &str = "Reloan";

/// Repeat-loan dimension values after relabeling
pub const FIRST_LOAN_LABEL: &str = "First loan";
pub const REPEAT_LOAN_LABEL: &str = "Repeat loan";

/// What to assemble
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportPlan {
    pub kind: ReportKind,
    pub dimensions: Vec<Dimension>,
    pub campaign_start: NaiveDate,
    /// Last date the reporting window covers
    pub as_of: NaiveDate,
    /// Date stamped into file names
    pub generated_on: NaiveDate,
    pub file_prefix: String,
    pub excluded_region: Option<Code>,
    pub product_collapse: BTreeMap<Code, Code>,
    pub thresholds: OverdueThresholds,
}

impl ReportPlan {
    /// Monthly plan over every dimension with default settings
    pub fn new(campaign_start: NaiveDate, as_of: NaiveDate) -> Self {
        Self {
            kind: ReportKind::Monthly,
            dimensions: Dimension::DEFAULT_ORDER.to_vec(),
            campaign_start,
            as_of,
            generated_on: as_of,
            file_prefix: "risk_report".into(),
            excluded_region: Some(Code::new("3502")),
            product_collapse: BTreeMap::from([(Code::new("3"), Code::new("1"))]),
            thresholds: OverdueThresholds::default(),
        }
    }

    pub fn kind(mut self, kind: ReportKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn dimensions(mut self, dimensions: Vec<Dimension>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn generated_on(mut self, date: NaiveDate) -> Self {
        self.generated_on = date;
        self
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn excluded_region(mut self, region: Option<Code>) -> Self {
        self.excluded_region = region;
        self
    }

    pub fn product_collapse(mut self, collapse: BTreeMap<Code, Code>) -> Self {
        self.product_collapse = collapse;
        self
    }

    pub fn thresholds(mut self, thresholds: OverdueThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

/// Turns snapshot rows into reports
#[derive(Clone, Debug)]
pub struct ReportAssembler {
    plan: ReportPlan,
    translator: Translator,
}

impl ReportAssembler {
    pub fn new(plan: ReportPlan, translator: Translator) -> Self {
        Self { plan, translator }
    }

    pub fn plan(&self) -> &ReportPlan {
        &self.plan
    }

    pub fn assemble(&self, rows: &[LoanSnapshot]) -> Result<Vec<Report>, ReportError> {
        if rows.is_empty() {
            return Err(ReportError::NoData);
        }
        info!(
            kind = %self.plan.kind,
            rows = rows.len(),
            dimensions = self.plan.dimensions.len(),
            "Assembling reports"
        );
        match self.plan.kind {
            ReportKind::Monthly => self
                .plan
                .dimensions
                .iter()
                .map(|d| self.monthly_report(rows, *d))
                .collect(),
            ReportKind::Weekly => Ok(vec![self.weekly_report(rows)?]),
        }
    }

    // ------------------------------------------------------------------------
    // Layouts
    // ------------------------------------------------------------------------

    fn monthly_report(&self, base: &[LoanSnapshot], dimension: Dimension) -> Result<Report, ReportError> {
        debug!(?dimension, "Assembling monthly workbook");
        let rows = self.prepare(base, dimension);
        let mut report = Report::new(self.file_name(dimension));

        let vintage = VintageBuilder::new(CohortPatcher::new(self.plan.campaign_start, self.plan.as_of));
        let mode = self.cohort_mode(dimension)?;
        let vintage_all = vintage.build(&rows, &mode)?;
        let vintage_ex = match &self.plan.excluded_region {
            Some(region) => {
                let kept: Vec<LoanSnapshot> = rows
                    .iter()
                    .filter(|r| r.code(Field::Province) != Some(region))
                    .cloned()
                    .collect();
                Some((region, vintage.build(&kept, &mode)?))
            }
            None => None,
        };

        let rows = self.reporting_rows(rows, dimension);
        let overdue = self.overdue(&rows, dimension, &[Field::PrincipalRange])?;
        let transitions = TransitionBuilder::new(&self.translator)
            .build(&rows, &dimension.keys(&[Field::SnapshotDate]))?;

        report.push_sheet(self.overdue_sheet(OVERDUE_SHEET, &overdue));
        report.push_sheet(
            Sheet::new(TRANSITIONS_SHEET)
                .with_below(self.translate(&transitions.totals))
                .with_below(self.translate(&transitions.transitions)),
        );
        report.push_sheet(self.vintage_sheet(VINTAGE_SHEET, &vintage_all));
        if let Some((region, vintage_ex)) = vintage_ex {
            let label = self.translator.value_label(Field::Province, region.as_str());
            report.push_sheet(self.vintage_sheet(&format!("{} ex {}", VINTAGE_SHEET, label), &vintage_ex));
        }
        if dimension == Dimension::RepeatLoan {
            let reloan = ReloanBuilder::new().build(base)?;
            report.push_sheet(
                Sheet::new(RELOAN_SHEET)
                    .with_below(self.translate(&reloan.merchants))
                    .with_below(self.translate(&reloan.loans)),
            );
        }
        Ok(report)
    }

    fn weekly_report(&self, base: &[LoanSnapshot]) -> Result<Report, ReportError> {
        let mut report = Report::new(format!(
            "{}_{}_{}.xlsx",
            self.plan.file_prefix,
            ReportKind::Weekly,
            self.plan.generated_on.format("%Y%m%d")
        ));
        for dimension in &self.plan.dimensions {
            debug!(?dimension, "Assembling weekly sheet");
            let rows = self.reporting_rows(self.prepare(base, *dimension), *dimension);
            let current_keys: &[Field] = if *dimension == Dimension::Province {
                &[Field::PrincipalRange]
            } else {
                &[Field::Province, Field::PrincipalRange]
            };
            let overdue = self.overdue(&rows, *dimension, current_keys)?;
            let name = match dimension.field() {
                Some(field) => format!("{} {}", OVERDUE_SHEET, self.translator.field_label(field)),
                None => OVERDUE_SHEET.to_string(),
            };
            report.push_sheet(self.overdue_sheet(&name, &overdue));
        }
        Ok(report)
    }

    fn overdue_sheet(&self, name: &str, overdue: &OverdueReport) -> Sheet {
        Sheet::new(name)
            .with_right(self.translate(&overdue.series))
            .with_right(self.translate(&overdue.current))
    }

    fn vintage_sheet(&self, name: &str, vintage: &VintageReport) -> Sheet {
        Sheet::new(name)
            .with_below(self.translate(&vintage.amounts))
            .with_below(self.translate(&vintage.ratios))
    }

    fn file_name(&self, dimension: Dimension) -> String {
        let suffix = dimension
            .field()
            .map(|f| format!("_{}", self.translator.field_label(f)))
            .unwrap_or_default();
        format!(
            "{}_{}{}.xlsx",
            self.plan.file_prefix,
            self.plan.generated_on.format("%Y%m%d"),
            suffix
        )
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    fn overdue(&self, rows: &[LoanSnapshot], dimension: Dimension, current: &[Field]) -> Result<OverdueReport, ReportError> {
        OverdueBuilder::new(self.plan.thresholds).build(
            rows,
            &dimension.keys(&[Field::SnapshotDate]),
            &dimension.keys(current),
        )
    }

    fn cohort_mode(&self, dimension: Dimension) -> Result<CohortMode, ReportError> {
        Ok(match dimension {
            Dimension::Province => CohortMode::Geography {
                field: Field::Province,
            },
            Dimension::Stage => CohortMode::Stage {
                boundaries: stage_boundaries(self.translator.dims())?,
            },
            other => CohortMode::General {
                keys: other.keys(&[Field::OriginDate]),
            },
        })
    }

    fn translate(&self, table: &Table) -> Table {
        self.translator.translate(table)
    }

    // ------------------------------------------------------------------------
    // Dimension pre-processing
    // ------------------------------------------------------------------------

    /// Copies of `rows` with the dimension's codes rewritten before grouping
    fn prepare(&self, rows: &[LoanSnapshot], dimension: Dimension) -> Vec<LoanSnapshot> {
        let mut rows = rows.to_vec();
        match dimension {
            Dimension::ProductType => {
                for row in &mut rows {
                    let collapsed = row
                        .code(Field::ProductType)
                        .and_then(|c| self.plan.product_collapse.get(c))
                        .cloned();
                    if let Some(code) = collapsed {
                        row.set_code(Field::ProductType, Some(code));
                    }
                }
            }
            Dimension::RepeatLoan => {
                for row in &mut rows {
                    let relabeled = row.code(Field::RepeatLoan).map(|c| {
                        if c.as_str() == codes::FIRST_LOAN {
                            Code::new(FIRST_LOAN_LABEL)
                        } else {
                            Code::new(REPEAT_LOAN_LABEL)
                        }
                    });
                    row.set_code(Field::RepeatLoan, relabeled);
                }
            }
            _ => {}
        }
        rows
    }

    /// Rows feeding the overdue and transition tables: the province
    /// breakdown only looks at the latest snapshot
    fn reporting_rows(&self, rows: Vec<LoanSnapshot>, dimension: Dimension) -> Vec<LoanSnapshot> {
        if dimension != Dimension::Province {
            return rows;
        }
        let latest = latest_snapshot(&rows);
        rows.into_iter()
            .filter(|r| Some(r.snapshot_date) == latest)
            .collect()
    }
}

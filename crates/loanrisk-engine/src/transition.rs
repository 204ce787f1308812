//! Status-transition builder.
//!
//! Two tables per grouping:
//! - totals: current-period sums broken out by new-loan flag, 5-level
//!   grade and 3-level delinquency status
//! - transitions: sums per allowed `prior-current` state pair for each
//!   transition family, plus a derived normal-runoff column
//!
//! Rows with any undefined state are left out of the transition table.

use polars::prelude::Expr;
use rust_decimal::Decimal;
use tracing::debug;

use loanrisk_core::{codes, Code, Field, Key, Level, LoanSnapshot, ReportError, Table};

use crate::aggregate::{all_rows, code_is, defined, pivot_measures, Aggregate, Measure, SnapshotFrame};
use crate::translate::Translator;

pub const RUNOFF_FAMILY: &str = "Runoff";
pub const RUNOFF_LABEL: &str = "Normal runoff";

/// Summed per transition pair, in column order
const MEASURES: [Field; 2] = [Field::Count, Field::OverdueDelta];

/// One family of `prior-current` state pairs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionFamily {
    /// Names the family in column headers
    pub name: Field,
    pub prior: Field,
    pub current: Field,
    /// Pairs reported, in column order
    pub allowed: Vec<(Code, Code)>,
}

impl TransitionFamily {
    pub fn new(name: Field, prior: Field, current: Field, allowed: &[(&str, &str)]) -> Self {
        Self {
            name,
            prior,
            current,
            allowed: allowed
                .iter()
                .map(|(p, c)| (Code::from(*p), Code::from(*c)))
                .collect(),
        }
    }

    /// Both states of the family are defined
    fn is_defined(&self) -> Expr {
        defined(self.prior).and(defined(self.current))
    }
}

/// A transition pair referenced by family name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairRef {
    pub family: Field,
    pub prior: Code,
    pub current: Code,
}

impl PairRef {
    pub fn new(family: Field, prior: &str, current: &str) -> Self {
        Self {
            family,
            prior: Code::from(prior),
            current: Code::from(current),
        }
    }
}

/// Which transitions are reported and how runoff is derived
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionPolicy {
    pub families: Vec<TransitionFamily>,
    /// Runoff = minuend − subtrahend
    pub runoff: Option<(PairRef, PairRef)>,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        use codes::{
            ACTIVE, CLOSED, CURRENT, DELINQUENT, GRADE_COLLECTION, GRADE_GENERAL, GRADE_SEVERE,
            NEW_LOAN, TERMINATED,
        };
        Self {
            families: vec![
                TransitionFamily::new(Field::NewLoan, Field::NewLoan, Field::Status3, &[(NEW_LOAN, DELINQUENT)]),
                TransitionFamily::new(
                    Field::Status3,
                    Field::Status3Prior,
                    Field::Status3,
                    &[
                        (DELINQUENT, CLOSED),
                        (DELINQUENT, DELINQUENT),
                        (DELINQUENT, CURRENT),
                        (CURRENT, CLOSED),
                        (CURRENT, DELINQUENT),
                        (CURRENT, CURRENT),
                    ],
                ),
                TransitionFamily::new(
                    Field::Status5,
                    Field::Status5Prior,
                    Field::Status5,
                    &[
                        (GRADE_GENERAL, GRADE_GENERAL),
                        (GRADE_GENERAL, GRADE_COLLECTION),
                        (GRADE_GENERAL, GRADE_SEVERE),
                        (GRADE_COLLECTION, GRADE_GENERAL),
                        (GRADE_COLLECTION, GRADE_COLLECTION),
                        (GRADE_COLLECTION, GRADE_SEVERE),
                        (GRADE_SEVERE, GRADE_SEVERE),
                    ],
                ),
                TransitionFamily::new(
                    Field::AccountStatus,
                    Field::AccountStatusPrior,
                    Field::AccountStatus,
                    &[(ACTIVE, TERMINATED)],
                ),
            ],
            runoff: Some((
                PairRef::new(Field::Status3, DELINQUENT, DELINQUENT),
                PairRef::new(Field::AccountStatus, ACTIVE, TERMINATED),
            )),
        }
    }
}

impl TransitionPolicy {
    /// Every state of every family is defined
    fn is_complete(&self) -> Expr {
        self.families
            .iter()
            .fold(all_rows(), |acc, f| acc.and(f.is_defined()))
    }
}

/// Totals and transitions
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionReport {
    pub totals: Table,
    pub transitions: Table,
}

/// Builds [`TransitionReport`]s
#[derive(Clone, Debug)]
pub struct TransitionBuilder<'a> {
    translator: &'a Translator,
    policy: TransitionPolicy,
}

impl<'a> TransitionBuilder<'a> {
    pub fn new(translator: &'a Translator) -> Self {
        Self {
            translator,
            policy: TransitionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(&self, rows: &[LoanSnapshot], keys: &[Field]) -> Result<TransitionReport, ReportError> {
        debug!(rows = rows.len(), ?keys, "Building status transitions");
        Ok(TransitionReport {
            totals: self.totals(rows, keys)?,
            transitions: self.transitions(&SnapshotFrame::new(rows)?, keys)?,
        })
    }

    /// Columns: measure / status field / translated status value
    fn totals(&self, rows: &[LoanSnapshot], keys: &[Field]) -> Result<Table, ReportError> {
        let translated = SnapshotFrame::new(&self.translator.translate_values(rows))?;
        let measures = [Measure::field(Field::Count), Measure::field(Field::OverdueAmount)];

        let mut parts = Vec::new();
        for field in [Field::NewLoan, Field::Status5, Field::Status3] {
            let mut part = pivot_measures(&translated, keys, field, &measures)?;
            part.set_column_level(1, Level::Unnamed);
            part.insert_column_level(1, Level::Unnamed, Key::Field(field));
            parts.push(part);
        }
        let mut totals = Table::concat(&parts)?;
        totals.sort_columns_by_key(|c| measures.iter().position(|m| c.key.first() == Some(&m.label)));
        totals.fill_undefined(Decimal::ZERO);
        Ok(totals)
    }

    /// Columns: measure / family / `prior-current` label
    fn transitions(&self, frame: &SnapshotFrame, keys: &[Field]) -> Result<Table, ReportError> {
        let eligible = self.policy.is_complete();
        let levels = vec![Level::Unnamed, Level::Unnamed, Level::Unnamed];

        // every eligible key gets a row, even without an allowed pair
        let mut parts = vec![Aggregate::sum_columns(frame, keys, levels.clone(), &[], eligible.clone())];
        for family in &self.policy.families {
            for (prior, current) in &family.allowed {
                let label = self.pair_label(family, prior, current);
                let columns: Vec<(Field, Vec<Key>)> = MEASURES
                    .iter()
                    .map(|m| (*m, vec![Key::Field(*m), Key::Field(family.name), label.clone()]))
                    .collect();
                let filter = eligible
                    .clone()
                    .and(code_is(family.prior, prior.as_str()))
                    .and(code_is(family.current, current.as_str()));
                parts.push(Aggregate::sum_columns(frame, keys, levels.clone(), &columns, filter));
            }
        }
        let mut joined = Aggregate::join(parts)?;

        // a side with no rows makes the runoff undefined, then zero
        if let Some((minuend, subtrahend)) = &self.policy.runoff {
            match (self.pair_key(minuend), self.pair_key(subtrahend)) {
                (Some(lhs), Some(rhs)) => {
                    for measure in MEASURES {
                        joined = joined.with_difference(
                            vec![Key::Field(measure), Key::text(RUNOFF_FAMILY), Key::text(RUNOFF_LABEL)],
                            &[Key::Field(measure), Key::Field(minuend.family), lhs.clone()],
                            &[Key::Field(measure), Key::Field(subtrahend.family), rhs.clone()],
                        );
                    }
                }
                _ => debug!(?minuend, ?subtrahend, "Runoff pair not reported, skipping runoff"),
            }
        }

        let mut table = joined.fill_zero().collect()?;
        table.sort_columns_by_key(|c| MEASURES.iter().position(|m| c.key.first() == Some(&Key::Field(*m))));
        Ok(table)
    }

    fn pair_label(&self, family: &TransitionFamily, prior: &Code, current: &Code) -> Key {
        Key::Text(format!(
            "{}-{}",
            self.translator.value_label(family.prior, prior.as_str()),
            self.translator.value_label(family.current, current.as_str())
        ))
    }

    /// Column label of a reported pair
    fn pair_key(&self, pair: &PairRef) -> Option<Key> {
        let family = self.policy.families.iter().find(|f| f.name == pair.family)?;
        family
            .allowed
            .iter()
            .find(|(prior, current)| *prior == pair.prior && *current == pair.current)
            .map(|(prior, current)| self.pair_label(family, prior, current))
    }
}

//! Loan snapshot rows.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::field::{codes, Code, Field};
use crate::table::Key;

/// One loan's (or one pre-aggregated loan bucket's) state as of a snapshot date.
///
/// Rows are read once and never mutated by the builders; dimension
/// pre-processing works on copies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoanSnapshot {
    pub snapshot_date: NaiveDate,
    pub origin_date: NaiveDate,
    /// Number of loans this row stands for
    pub count: Decimal,
    pub disbursed: Decimal,
    pub principal_balance: Decimal,
    pub balance: Decimal,
    pub scheduled_amount: Decimal,
    pub overdue_amount: Decimal,
    pub overdue_principal: Decimal,
    pub overdue_delta: Decimal,
    pub new_amount: Decimal,
    /// Days past maturity
    pub maturity_days: i64,
    pub reloan: i64,
    pub reloan_times: i64,
    /// Categorical dimensions and status codes; absent means undefined
    pub codes: BTreeMap<Field, Code>,
}

impl LoanSnapshot {
    /// A single performing loan with zero amounts
    pub fn new(snapshot_date: NaiveDate, origin_date: NaiveDate) -> Self {
        Self {
            snapshot_date,
            origin_date,
            count: Decimal::ONE,
            disbursed: Decimal::ZERO,
            principal_balance: Decimal::ZERO,
            balance: Decimal::ZERO,
            scheduled_amount: Decimal::ZERO,
            overdue_amount: Decimal::ZERO,
            overdue_principal: Decimal::ZERO,
            overdue_delta: Decimal::ZERO,
            new_amount: Decimal::ZERO,
            maturity_days: 0,
            reloan: 1,
            reloan_times: 1,
            codes: BTreeMap::new(),
        }
    }

    /// Set a categorical code from raw text; undefined markers clear it
    pub fn with_code(mut self, field: Field, raw: &str) -> Self {
        match Code::parse(raw) {
            Some(code) => {
                self.codes.insert(field, code);
            }
            None => {
                self.codes.remove(&field);
            }
        }
        self
    }

    /// Set a measure
    pub fn with_amount(mut self, field: Field, amount: Decimal) -> Self {
        if let Some(slot) = self.amount_mut(field) {
            *slot = amount;
        }
        self
    }

    pub fn with_maturity_days(mut self, days: i64) -> Self {
        self.maturity_days = days;
        self
    }

    pub fn with_reloan(mut self, reloan: i64, reloan_times: i64) -> Self {
        self.reloan = reloan;
        self.reloan_times = reloan_times;
        self
    }

    pub fn code(&self, field: Field) -> Option<&Code> {
        self.codes.get(&field)
    }

    pub fn set_code(&mut self, field: Field, code: Option<Code>) {
        match code {
            Some(code) => {
                self.codes.insert(field, code);
            }
            None => {
                self.codes.remove(&field);
            }
        }
    }

    fn code_is(&self, field: Field, expected: &str) -> bool {
        self.code(field).is_some_and(|c| c.as_str() == expected)
    }

    /// Grouping key for `field`, or `None` when the value is undefined
    /// or `field` is a measure
    pub fn key(&self, field: Field) -> Option<Key> {
        match field {
            Field::SnapshotDate => Some(Key::Date(self.snapshot_date)),
            Field::OriginDate => Some(Key::Date(self.origin_date)),
            f if f.is_categorical() => self.code(f).map(|c| Key::Text(c.to_string())),
            _ => None,
        }
    }

    /// Value of a measure; zero for non-measure fields
    pub fn amount(&self, field: Field) -> Decimal {
        match field {
            Field::Count => self.count,
            Field::Disbursed => self.disbursed,
            Field::PrincipalBalance => self.principal_balance,
            Field::Balance => self.balance,
            Field::ScheduledAmount => self.scheduled_amount,
            Field::OverdueAmount => self.overdue_amount,
            Field::OverduePrincipal => self.overdue_principal,
            Field::OverdueDelta => self.overdue_delta,
            Field::NewAmount => self.new_amount,
            _ => Decimal::ZERO,
        }
    }

    fn amount_mut(&mut self, field: Field) -> Option<&mut Decimal> {
        match field {
            Field::Count => Some(&mut self.count),
            Field::Disbursed => Some(&mut self.disbursed),
            Field::PrincipalBalance => Some(&mut self.principal_balance),
            Field::Balance => Some(&mut self.balance),
            Field::ScheduledAmount => Some(&mut self.scheduled_amount),
            Field::OverdueAmount => Some(&mut self.overdue_amount),
            Field::OverduePrincipal => Some(&mut self.overdue_principal),
            Field::OverdueDelta => Some(&mut self.overdue_delta),
            Field::NewAmount => Some(&mut self.new_amount),
            _ => None,
        }
    }

    pub fn is_delinquent(&self) -> bool {
        self.code_is(Field::Status3, codes::DELINQUENT)
    }

    pub fn is_closed(&self) -> bool {
        self.code_is(Field::Status3, codes::CLOSED)
    }

    pub fn is_new_loan(&self) -> bool {
        self.code_is(Field::NewLoan, codes::NEW_LOAN)
    }
}

/// Latest snapshot date present in `rows`
pub fn latest_snapshot(rows: &[LoanSnapshot]) -> Option<NaiveDate> {
    rows.iter().map(|r| r.snapshot_date).max()
}

/// Earliest origination date present in `rows`
pub fn earliest_origin(rows: &[LoanSnapshot]) -> Option<NaiveDate> {
    rows.iter().map(|r| r.origin_date).min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn undefined_marker_clears_code() {
        let row = LoanSnapshot::new(date(2016, 1, 31), date(2015, 12, 2))
            .with_code(Field::Status3Prior, "1")
            .with_code(Field::Status3Prior, "nan");
        assert!(row.code(Field::Status3Prior).is_none());
        assert_eq!(row.key(Field::Status3Prior), None);
    }

    #[test]
    fn keys_and_amounts() {
        let row = LoanSnapshot::new(date(2016, 1, 31), date(2015, 12, 2))
            .with_code(Field::Province, "3502")
            .with_amount(Field::Balance, dec!(120.50));
        assert_eq!(row.key(Field::SnapshotDate), Some(Key::Date(date(2016, 1, 31))));
        assert_eq!(row.key(Field::Province), Some(Key::Text("3502".into())));
        assert_eq!(row.key(Field::Balance), None);
        assert_eq!(row.amount(Field::Balance), dec!(120.50));
        assert_eq!(row.amount(Field::Province), Decimal::ZERO);
    }

    #[test]
    fn status_predicates() {
        let row = LoanSnapshot::new(date(2016, 1, 31), date(2016, 1, 2))
            .with_code(Field::Status3, "1")
            .with_code(Field::NewLoan, "1");
        assert!(row.is_delinquent());
        assert!(!row.is_closed());
        assert!(row.is_new_loan());
    }

    #[test]
    fn latest_and_earliest() {
        let rows = vec![
            LoanSnapshot::new(date(2016, 1, 31), date(2015, 12, 2)),
            LoanSnapshot::new(date(2016, 2, 29), date(2015, 11, 5)),
        ];
        assert_eq!(latest_snapshot(&rows), Some(date(2016, 2, 29)));
        assert_eq!(earliest_origin(&rows), Some(date(2015, 11, 5)));
        assert_eq!(latest_snapshot(&[]), None);
    }
}

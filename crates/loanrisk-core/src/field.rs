//! Column identifiers and categorical codes.
//!
//! Every column the reporting pipeline consumes is named by a [`Field`]
//! rather than a string, and every categorical value is carried as a
//! normalized [`Code`]. The database column name is only used at the
//! boundary (loading, dictionary rows, configuration overrides).

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Field
// ============================================================================

/// A column of the loan snapshot table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    // Dates
    SnapshotDate,
    OriginDate,

    // Measures
    Count,
    Disbursed,
    PrincipalBalance,
    Balance,
    ScheduledAmount,
    OverdueAmount,
    OverduePrincipal,
    OverdueDelta,
    NewAmount,

    // Grouping dimensions
    ProductType,
    TermBucket,
    RepaymentMethod,
    ChannelFlag,
    ExceptionFlag,
    RepeatLoan,
    RiskLight,
    Province,
    Stage,
    PrincipalRange,

    // Status codes
    NewLoan,
    Status3,
    Status3Prior,
    Status5,
    Status5Prior,
    AccountStatus,
    AccountStatusPrior,
}

impl Field {
    pub const ALL: [Field; 28] = [
        Field::SnapshotDate,
        Field::OriginDate,
        Field::Count,
        Field::Disbursed,
        Field::PrincipalBalance,
        Field::Balance,
        Field::ScheduledAmount,
        Field::OverdueAmount,
        Field::OverduePrincipal,
        Field::OverdueDelta,
        Field::NewAmount,
        Field::ProductType,
        Field::TermBucket,
        Field::RepaymentMethod,
        Field::ChannelFlag,
        Field::ExceptionFlag,
        Field::RepeatLoan,
        Field::RiskLight,
        Field::Province,
        Field::Stage,
        Field::PrincipalRange,
        Field::NewLoan,
        Field::Status3,
        Field::Status3Prior,
        Field::Status5,
        Field::Status5Prior,
        Field::AccountStatus,
        Field::AccountStatusPrior,
    ];

    /// Database column name
    pub fn column(self) -> &'static str {
        match self {
            Field::SnapshotDate => "data_dt",
            Field::OriginDate => "begin_date",
            Field::Count => "cnt",
            Field::Disbursed => "loan_pr",
            Field::PrincipalBalance => "bal_prin",
            Field::Balance => "bal",
            Field::ScheduledAmount => "sp_amt",
            Field::OverdueAmount => "od_amt",
            Field::OverduePrincipal => "od_principal",
            Field::OverdueDelta => "diff_od_amt",
            Field::NewAmount => "new_amt",
            Field::ProductType => "aipmchttype",
            Field::TermBucket => "loan_period_mon",
            Field::RepaymentMethod => "repay_period",
            Field::ChannelFlag => "white",
            Field::ExceptionFlag => "applysource",
            Field::RepeatLoan => "reloantimes",
            Field::RiskLight => "light",
            Field::Province => "prov_cd",
            Field::Stage => "stage",
            Field::PrincipalRange => "loan_pr_scope",
            Field::NewLoan => "new_loan",
            Field::Status3 => "overdue_status_3",
            Field::Status3Prior => "overdue_status_3_last",
            Field::Status5 => "overdue_status_5",
            Field::Status5Prior => "overdue_status_5_last",
            Field::AccountStatus => "status_this_month",
            Field::AccountStatusPrior => "status_last_month",
        }
    }

    /// English display label used when no override is configured
    pub fn default_label(self) -> &'static str {
        match self {
            Field::SnapshotDate => "Period",
            Field::OriginDate => "Origination",
            Field::Count => "Count",
            Field::Disbursed => "Disbursed",
            Field::PrincipalBalance => "Principal balance",
            Field::Balance => "Balance",
            Field::ScheduledAmount => "Scheduled repayment",
            Field::OverdueAmount => "Amount",
            Field::OverduePrincipal => "Overdue principal",
            Field::OverdueDelta => "Overdue change",
            Field::NewAmount => "New disbursement",
            Field::ProductType => "Product type",
            Field::TermBucket => "Loan term",
            Field::RepaymentMethod => "Repayment method",
            Field::ChannelFlag => "White-list",
            Field::ExceptionFlag => "Exception",
            Field::RepeatLoan => "Repeat loan",
            Field::RiskLight => "Risk light",
            Field::Province => "Province",
            Field::Stage => "Stage",
            Field::PrincipalRange => "Principal range",
            Field::NewLoan => "New loan",
            Field::Status3 => "Delinquency",
            Field::Status3Prior => "Prior delinquency",
            Field::Status5 => "Grade",
            Field::Status5Prior => "Prior grade",
            Field::AccountStatus => "Account status",
            Field::AccountStatusPrior => "Prior account status",
        }
    }

    /// Look a field up by its database column name (case-insensitive)
    pub fn from_column(name: &str) -> Option<Field> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.column().eq_ignore_ascii_case(name))
    }

    /// Whether values of this field are categorical codes
    pub fn is_categorical(self) -> bool {
        !matches!(
            self,
            Field::SnapshotDate
                | Field::OriginDate
                | Field::Count
                | Field::Disbursed
                | Field::PrincipalBalance
                | Field::Balance
                | Field::ScheduledAmount
                | Field::OverdueAmount
                | Field::OverduePrincipal
                | Field::OverdueDelta
                | Field::NewAmount
        )
    }

    /// Whether this field is a calendar date
    pub fn is_date(self) -> bool {
        matches!(self, Field::SnapshotDate | Field::OriginDate)
    }

    /// The field whose dictionary describes this field's codes.
    ///
    /// Prior-period status columns share the code set of their
    /// current-period counterpart.
    pub fn dictionary_field(self) -> Field {
        match self {
            Field::Status3Prior => Field::Status3,
            Field::Status5Prior => Field::Status5,
            Field::AccountStatusPrior => Field::AccountStatus,
            other => other,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// ============================================================================
// Code
// ============================================================================

/// A normalized categorical code.
///
/// Integer codes and integral floats are stored without a fractional part so
/// that `3502`, `3502.0` and `"3502"` compare equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(String);

impl Code {
    /// Wrap an already-normalized code
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Normalize a raw textual code.
    ///
    /// Returns `None` for empty text and for the undefined markers
    /// `nan`, `null` and `none`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || ["nan", "null", "none"]
                .iter()
                .any(|marker| trimmed.eq_ignore_ascii_case(marker))
        {
            return None;
        }
        if let Some(integral) = trimmed.strip_suffix(".0") {
            let digits = integral.strip_prefix('-').unwrap_or(integral);
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return Some(Self(integral.to_string()));
            }
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn from_int(value: i64) -> Self {
        Self(value.to_string())
    }

    /// Normalize a floating-point code, dropping an integral fraction
    pub fn from_float(value: f64) -> Option<Self> {
        if value.is_nan() {
            None
        } else if value.fract() == 0.0 && value.abs() < 1e15 {
            Some(Self((value as i64).to_string()))
        } else {
            Some(Self(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Code {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::borrow::Borrow<str> for Code {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Code values the business rules are written against
pub mod codes {
    /// 3-level status: performing
    pub const CURRENT: &str = "0";
    /// 3-level status: delinquent
    pub const DELINQUENT: &str = "1";
    /// 3-level status: closed (paid off)
    pub const CLOSED: &str = "2";

    /// New-loan flag: originated this period
    pub const NEW_LOAN: &str = "1";

    /// 5-level grade: general
    pub const GRADE_GENERAL: &str = "1";
    /// 5-level grade: in collection
    pub const GRADE_COLLECTION: &str = "2";
    /// 5-level grade: severe
    pub const GRADE_SEVERE: &str = "3";

    /// Account status: active
    pub const ACTIVE: &str = "active";
    /// Account status: terminated
    pub const TERMINATED: &str = "terminate";

    /// Repeat-loan count of a borrower's first loan
    pub const FIRST_LOAN: &str = "1";

    /// Dictionary code marking a map whose codes are already display text
    pub const PASS_THROUGH: &str = "9999";
}

// ============================================================================
// Report dimensions
// ============================================================================

/// A grouping dimension a report is broken out by
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Overall,
    ProductType,
    TermBucket,
    RepaymentMethod,
    ChannelFlag,
    ExceptionFlag,
    RepeatLoan,
    RiskLight,
    Province,
    Stage,
}

impl Dimension {
    /// Report order used when the configuration does not name one
    pub const DEFAULT_ORDER: [Dimension; 10] = [
        Dimension::Overall,
        Dimension::ProductType,
        Dimension::TermBucket,
        Dimension::RepaymentMethod,
        Dimension::ChannelFlag,
        Dimension::ExceptionFlag,
        Dimension::RepeatLoan,
        Dimension::RiskLight,
        Dimension::Province,
        Dimension::Stage,
    ];

    /// The snapshot column this dimension groups by (`None` for overall)
    pub fn field(self) -> Option<Field> {
        match self {
            Dimension::Overall => None,
            Dimension::ProductType => Some(Field::ProductType),
            Dimension::TermBucket => Some(Field::TermBucket),
            Dimension::RepaymentMethod => Some(Field::RepaymentMethod),
            Dimension::ChannelFlag => Some(Field::ChannelFlag),
            Dimension::ExceptionFlag => Some(Field::ExceptionFlag),
            Dimension::RepeatLoan => Some(Field::RepeatLoan),
            Dimension::RiskLight => Some(Field::RiskLight),
            Dimension::Province => Some(Field::Province),
            Dimension::Stage => Some(Field::Stage),
        }
    }

    /// Grouping keys for this dimension followed by `trailing`
    pub fn keys(self, trailing: &[Field]) -> Vec<Field> {
        self.field().into_iter().chain(trailing.iter().copied()).collect()
    }
}

/// Reporting cadence
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    #[default]
    Monthly,
    Weekly,
}

impl ReportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::Monthly => "monthly",
            ReportKind::Weekly => "weekly",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

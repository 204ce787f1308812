//! SQLite-backed snapshot and dictionary loading.
//!
//! Only this module talks to the databases. The snapshot table is read with
//! `SELECT *` and its columns are matched to [`Field`]s by name, so extra
//! columns are ignored and missing measures read as zero. The dictionary
//! table is read positionally: dimension name, raw code, display label.

use chrono::NaiveDate;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use loanrisk_core::{Code, DimensionDict, Field, LoanSnapshot, SnapshotSource};

use crate::config::{is_identifier, RunConfig};
use crate::{SourceError, SourceResult};

/// Dates per query; each date binds two parameters
const DATES_PER_QUERY: usize = 400;

const MATURITY_DAYS: &str = "maturity_days";
const RELOAN: &str = "reloan";

/// Reads loan snapshots and the dimension dictionary from SQLite
pub struct SqliteSource {
    statistics: Connection,
    reference: Connection,
    statistics_table: String,
    dimension_table: String,
}

/// What a result column feeds
#[derive(Clone, Copy, Debug)]
enum Slot {
    Field(Field),
    MaturityDays,
    Reloan,
    Ignored,
}

impl Slot {
    fn for_column(name: &str) -> Self {
        if name.eq_ignore_ascii_case(MATURITY_DAYS) {
            Slot::MaturityDays
        } else if name.eq_ignore_ascii_case(RELOAN) {
            Slot::Reloan
        } else {
            Field::from_column(name).map_or(Slot::Ignored, Slot::Field)
        }
    }
}

impl SqliteSource {
    /// Open both databases read-only
    pub fn open(config: &RunConfig) -> SourceResult<Self> {
        Self::from_connections(
            open_read_only(&config.statistics_db)?,
            open_read_only(&config.reference_db)?,
            &config.statistics_table,
            &config.dimension_table,
        )
    }

    /// Wrap already-open connections (used in tests)
    pub fn from_connections(
        statistics: Connection,
        reference: Connection,
        statistics_table: &str,
        dimension_table: &str,
    ) -> SourceResult<Self> {
        for table in [statistics_table, dimension_table] {
            if !is_identifier(table) {
                return Err(SourceError::InvalidConfig(format!(
                    "'{}' is not a valid table name",
                    table
                )));
            }
        }
        Ok(Self {
            statistics,
            reference,
            statistics_table: statistics_table.to_string(),
            dimension_table: dimension_table.to_string(),
        })
    }

    /// Snapshot rows whose snapshot date is one of `dates`.
    ///
    /// Dates stored as `YYYY-MM-DD` text (optionally followed by a time)
    /// and as `YYYYMMDD` integers both match.
    pub fn load_snapshots(&self, dates: &[NaiveDate]) -> SourceResult<Vec<LoanSnapshot>> {
        let mut snapshots = Vec::new();
        for chunk in dates.chunks(DATES_PER_QUERY) {
            let placeholders = vec!["?"; chunk.len() * 2].join(", ");
            let sql = format!(
                "SELECT * FROM {} WHERE substr(CAST({} AS TEXT), 1, 10) IN ({})",
                self.statistics_table,
                Field::SnapshotDate.column(),
                placeholders
            );
            let params: Vec<String> = chunk
                .iter()
                .flat_map(|d| [d.format("%Y-%m-%d").to_string(), d.format("%Y%m%d").to_string()])
                .collect();

            let mut stmt = self.statistics.prepare(&sql)?;
            let slots: Vec<Slot> = stmt.column_names().iter().map(|n| Slot::for_column(n)).collect();
            for required in [Field::SnapshotDate, Field::OriginDate] {
                if !slots.iter().any(|s| matches!(s, Slot::Field(f) if *f == required)) {
                    return Err(SourceError::InvalidConfig(format!(
                        "table '{}' has no '{}' column",
                        self.statistics_table,
                        required.column()
                    )));
                }
            }

            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(slots.len());
                for index in 0..slots.len() {
                    values.push(row.get_ref(index)?);
                }
                snapshots.push(read_snapshot(&slots, &values)?);
            }
        }
        info!(
            rows = snapshots.len(),
            dates = dates.len(),
            table = %self.statistics_table,
            "Loaded snapshot rows"
        );
        Ok(snapshots)
    }

    /// The code → label dictionary.
    ///
    /// Rows naming an unknown dimension, or with an undefined code or
    /// label, are skipped.
    pub fn load_dimension_dict(&self) -> SourceResult<DimensionDict> {
        let sql = format!("SELECT * FROM {}", self.dimension_table);
        let mut stmt = self.reference.prepare(&sql)?;
        if stmt.column_count() < 3 {
            return Err(SourceError::InvalidConfig(format!(
                "table '{}' needs dimension, code and label columns",
                self.dimension_table
            )));
        }

        let mut dict = DimensionDict::new();
        let mut skipped = 0usize;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name = text_value(row.get_ref(0)?);
            let code = code_value(row.get_ref(1)?);
            let label = text_value(row.get_ref(2)?);
            let (Some(name), Some(code), Some(label)) = (name, code, label) else {
                skipped += 1;
                continue;
            };
            match Field::from_column(&name) {
                Some(field) => dict.insert(field, code, label),
                None => {
                    debug!(dimension = %name, "Skipping dictionary row for unknown dimension");
                    skipped += 1;
                }
            }
        }
        info!(
            dimensions = dict.len(),
            entries = dict.entry_count(),
            skipped,
            "Loaded dimension dictionary"
        );
        Ok(dict)
    }
}

impl SnapshotSource for SqliteSource {
    type Error = SourceError;

    fn snapshots(&self, dates: &[NaiveDate]) -> Result<Vec<LoanSnapshot>, SourceError> {
        self.load_snapshots(dates)
    }

    fn dimension_dict(&self) -> Result<DimensionDict, SourceError> {
        self.load_dimension_dict()
    }
}

fn open_read_only(path: &Path) -> SourceResult<Connection> {
    if !path.exists() {
        return Err(SourceError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("database not found: {}", path.display()),
        )));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

// ============================================================================
// Value conversion
// ============================================================================

fn read_snapshot(slots: &[Slot], values: &[ValueRef<'_>]) -> SourceResult<LoanSnapshot> {
    let date_of = |field: Field| -> SourceResult<NaiveDate> {
        let value = slots
            .iter()
            .zip(values)
            .find(|(s, _)| matches!(s, Slot::Field(f) if *f == field))
            .map(|(_, v)| *v)
            .unwrap_or(ValueRef::Null);
        date_value(value).ok_or_else(|| invalid(field.column(), value))
    };

    let mut snapshot = LoanSnapshot::new(date_of(Field::SnapshotDate)?, date_of(Field::OriginDate)?);
    for (slot, value) in slots.iter().zip(values) {
        match *slot {
            Slot::Field(field) if field.is_date() => {}
            Slot::Field(field) if field.is_categorical() => {
                if field == Field::RepeatLoan {
                    if let Some(times) = int_value(*value) {
                        snapshot.reloan_times = times;
                    }
                }
                snapshot.set_code(field, code_value(*value));
            }
            Slot::Field(field) => {
                if !matches!(value, ValueRef::Null) {
                    let amount = decimal_value(*value).ok_or_else(|| invalid(field.column(), *value))?;
                    snapshot = snapshot.with_amount(field, amount);
                }
            }
            Slot::MaturityDays => {
                if let Some(days) = int_value(*value) {
                    snapshot.maturity_days = days;
                }
            }
            Slot::Reloan => {
                if let Some(reloan) = int_value(*value) {
                    snapshot.reloan = reloan;
                }
            }
            Slot::Ignored => {}
        }
    }
    Ok(snapshot)
}

fn invalid(column: &str, value: ValueRef<'_>) -> SourceError {
    SourceError::InvalidValue {
        column: column.to_string(),
        value: text_value(value).unwrap_or_else(|| "NULL".to_string()),
    }
}

fn text_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).trim().to_string()),
    }
}

/// Normalized categorical code; `None` for NULL and undefined markers
fn code_value(value: ValueRef<'_>) -> Option<Code> {
    match value {
        ValueRef::Integer(i) => Some(Code::from_int(i)),
        ValueRef::Real(f) => Code::from_float(f),
        other => text_value(other).and_then(|s| Code::parse(&s)),
    }
}

fn decimal_value(value: ValueRef<'_>) -> Option<Decimal> {
    match value {
        ValueRef::Integer(i) => Some(Decimal::from(i)),
        ValueRef::Real(f) if f.is_nan() => Some(Decimal::ZERO),
        ValueRef::Real(f) => Decimal::try_from(f).ok().map(|d| d.normalize()),
        ValueRef::Text(_) => {
            let text = text_value(value)?;
            if text.is_empty() || text.eq_ignore_ascii_case("nan") {
                return Some(Decimal::ZERO);
            }
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

fn int_value(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) if f.is_finite() => Some(f as i64),
        ValueRef::Text(_) => {
            let text = text_value(value)?;
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

/// `YYYY-MM-DD[...]`, `YYYY/MM/DD[...]` or `YYYYMMDD`
fn date_value(value: ValueRef<'_>) -> Option<NaiveDate> {
    let text = match value {
        ValueRef::Integer(i) => i.to_string(),
        other => text_value(other)?,
    };
    let head: String = text.chars().take(10).collect();
    NaiveDate::parse_from_str(&head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&head, "%Y/%m/%d"))
        .or_else(|_| NaiveDate::parse_from_str(&text, "%Y%m%d"))
        .ok()
}

//! End-to-end runs of the `loanrisk` binary against a throwaway SQLite
//! database.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn loanrisk_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_loanrisk"))
}

const SCHEMA: &str = "CREATE TABLE risk_statistics_all (
    data_dt TEXT, begin_date TEXT, cnt INTEGER, loan_pr REAL, bal_prin REAL, bal REAL,
    sp_amt REAL, od_amt REAL, od_principal REAL, diff_od_amt REAL, new_amt REAL,
    aipmchttype INTEGER, loan_period_mon TEXT, repay_period TEXT, white TEXT,
    applysource TEXT, reloantimes INTEGER, reloan INTEGER, light TEXT, prov_cd TEXT,
    stage TEXT, loan_pr_scope TEXT, new_loan INTEGER, maturity_days INTEGER,
    overdue_status_3 INTEGER, overdue_status_3_last INTEGER,
    overdue_status_5 INTEGER, overdue_status_5_last INTEGER,
    status_this_month TEXT, status_last_month TEXT
);
CREATE TABLE risk_dimension (name TEXT, code TEXT, label TEXT);";

/// (snapshot, origin, province, stage, status3, prior status3, overdue)
const LOANS: &[(&str, &str, &str, &str, i64, Option<i64>, f64)] = &[
    ("2015-08-31", "2015-08-10", "3501", "A", 0, None, 0.0),
    ("2015-09-30", "2015-08-10", "3501", "A", 1, Some(0), 150.0),
    ("2015-10-31", "2015-08-10", "3501", "A", 1, Some(1), 300.0),
    ("2015-09-30", "2015-09-12", "3502", "B", 0, None, 0.0),
    ("2015-10-31", "2015-09-12", "3502", "B", 2, Some(0), 0.0),
    ("2015-10-31", "2015-10-20", "3501", "B", 0, None, 0.0),
];

fn write_database(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    for (snap, origin, province, stage, status, prior, overdue) in LOANS {
        let new_loan = i64::from(snap[..7] == origin[..7]);
        conn.execute(
            "INSERT INTO risk_statistics_all VALUES (
                ?1, ?2, 1, 1000, 900, 950, 100, ?3, ?3, 50, 0,
                3, '6', 'month', '0', 'app', 1, 1, 'green', ?4,
                ?5, '<10k', ?6, 5, ?7, ?8, 1, 1, 'active', 'active')",
            params![snap, origin, overdue, province, stage, new_loan, status, prior],
        )
        .unwrap();
    }
    for (name, code, label) in [
        ("prov_cd", "3501", "Fuzhou"),
        ("prov_cd", "3502", "Xiamen"),
        ("stage", "A", "Pilot 2015/08/01, first wave"),
        ("stage", "B", "Rollout 2015/09/01, second wave"),
        ("overdue_status_3", "0", "current"),
        ("overdue_status_3", "1", "delinquent"),
        ("overdue_status_3", "2", "closed"),
    ] {
        conn.execute("INSERT INTO risk_dimension VALUES (?1, ?2, ?3)", params![name, code, label])
            .unwrap();
    }
}

/// Database plus config in a temp dir; returns the config path
fn fixture(dir: &Path, extra: &str) -> PathBuf {
    write_database(&dir.join("risk.db"));
    let config = dir.join("run.toml");
    fs::write(
        &config,
        format!(
            r#"
            statistics_db = "risk.db"
            reference_db = "risk.db"
            output_dir = "out"
            {extra}
            "#
        ),
    )
    .unwrap();
    config
}

fn loanrisk(args: &[&str], config: &Path) -> Output {
    Command::new(loanrisk_binary())
        .args(args)
        .arg("--config")
        .arg(config)
        .env_remove("LOANRISK_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute loanrisk")
}

fn workbooks(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".xlsx"))
        .collect();
    names.sort();
    names
}

#[test]
fn monthly_run_writes_one_workbook_per_dimension() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture(dir.path(), "");

    let output = loanrisk(&["run", "--as-of", "2015-10-31"], &config);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let names = workbooks(&dir.path().join("out"));
    assert_eq!(names.len(), 10, "{names:?}");
    assert!(names.iter().all(|n| n.starts_with("risk_report_")));
    assert!(names.iter().any(|n| n.ends_with("_Stage.xlsx")));
    assert!(names.iter().any(|n| n.ends_with("_Province.xlsx")));

    // written paths are echoed on stdout
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 10);
}

#[test]
fn dry_run_prints_instead_of_writing() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture(dir.path(), r#"dimensions = ["overall"]"#);

    let output = loanrisk(&["run", "--as-of", "2015-10-31", "--dry-run"], &config);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("## Overdue"));
    assert!(stdout.contains("## Transitions"));
    assert!(stdout.contains("## Vintage ex Xiamen"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn output_flag_overrides_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture(dir.path(), r#"dimensions = ["overall", "province"]"#);
    let elsewhere = dir.path().join("elsewhere");

    let output = Command::new(loanrisk_binary())
        .args(["run", "--as-of", "2015-10-31", "--output"])
        .arg(&elsewhere)
        .arg("--config")
        .arg(&config)
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(workbooks(&elsewhere).len(), 2);
    assert!(!dir.path().join("out").exists());
}

#[test]
fn weekly_run_without_sunday_rows_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture(dir.path(), "");

    let output = loanrisk(&["run", "--as-of", "2015-10-31", "--kind", "weekly"], &config);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to build reports"));
}

#[test]
fn check_reports_calendar_and_rows_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture(dir.path(), "");

    let output = loanrisk(&["check", "--as-of", "2015-10-31", "--json"], &config);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["kind"], "monthly");
    assert_eq!(summary["snapshot_dates"], 3);
    assert_eq!(summary["first_date"], "2015-08-31");
    assert_eq!(summary["rows"], 6);
    assert_eq!(summary["rows_per_date"]["2015-10-31"], 3);
    assert_eq!(summary["dictionary_entries"], 7);
}

#[test]
fn missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = loanrisk(&["check"], &dir.path().join("absent.toml"));
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load config"));
}

//! loanrisk CLI - Loan Portfolio Risk Reports
//!
//! Loads snapshot rows for the reporting calendar, builds every report and
//! writes one workbook per report.

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use loanrisk_core::{Renderer, Report, ReportKind, SnapshotSource};
use loanrisk_engine::{OverdueThresholds, ReportAssembler, ReportPlan, Translator};
use loanrisk_render::{ExcelRenderer, TextRenderer};
use loanrisk_source::{snapshot_dates, RunConfig, SqliteSource};

#[derive(Parser)]
#[command(name = "loanrisk")]
#[command(author, version, about = "Loan portfolio risk reports", long_about = None)]
struct Cli {
    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Monthly,
    Weekly,
}

impl From<Kind> for ReportKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Monthly => ReportKind::Monthly,
            Kind::Weekly => ReportKind::Weekly,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the reports and write the workbooks
    Run {
        /// Run configuration file
        #[arg(short, long, value_name = "FILE", env = "LOANRISK_CONFIG")]
        config: PathBuf,

        /// Last date the reports cover (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        as_of: Option<NaiveDate>,

        /// Override the configured report kind
        #[arg(short, long, value_enum)]
        kind: Option<Kind>,

        /// Override the configured output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Print the reports instead of writing workbooks
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration and summarize the input data
    Check {
        /// Run configuration file
        #[arg(short, long, value_name = "FILE", env = "LOANRISK_CONFIG")]
        config: PathBuf,

        /// Last date the reports would cover (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        as_of: Option<NaiveDate>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

/// What `check` found
#[derive(Debug, Serialize)]
struct CheckSummary {
    kind: ReportKind,
    as_of: NaiveDate,
    snapshot_dates: usize,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
    rows: usize,
    /// Rows per snapshot date, dates without rows included
    rows_per_date: BTreeMap<String, usize>,
    dictionary_entries: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match cli.command {
        Commands::Run {
            config,
            as_of,
            kind,
            output,
            dry_run,
        } => {
            let mut config = load_config(&config)?;
            if let Some(kind) = kind {
                config.kind = kind.into();
            }
            if let Some(output) = output {
                config.output_dir = output;
            }
            run(&config, as_of.unwrap_or_else(today), dry_run)
        }
        Commands::Check { config, as_of, json } => {
            let config = load_config(&config)?;
            check(&config, as_of.unwrap_or_else(today), json)
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::load(path).with_context(|| format!("Failed to load config: {}", path.display()))
}

fn run(config: &RunConfig, as_of: NaiveDate, dry_run: bool) -> Result<()> {
    let reports = build_reports(config, as_of)?;

    if dry_run {
        let renderer = TextRenderer::new().max_rows(20);
        for report in &reports {
            println!("{}", renderer.render(report)?);
        }
        return Ok(());
    }

    let renderer = ExcelRenderer::new();
    for report in &reports {
        let path = renderer
            .write(report, &config.output_dir)
            .with_context(|| format!("Failed to write {}", report.file_name))?;
        println!("{}", path.display());
    }
    info!(reports = reports.len(), dir = %config.output_dir.display(), "Reports written");
    Ok(())
}

fn build_reports(config: &RunConfig, as_of: NaiveDate) -> Result<Vec<Report>> {
    let dates = snapshot_dates(config.kind, config.campaign_start, as_of);
    if dates.is_empty() {
        bail!(
            "No {} snapshot dates between {} and {}",
            config.kind,
            config.campaign_start,
            as_of
        );
    }

    let source = SqliteSource::open(config).context("Failed to open databases")?;
    let rows = source.snapshots(&dates).context("Failed to load snapshot rows")?;
    let dims = source
        .dimension_dict()
        .context("Failed to load dimension dictionary")?;
    let translator = Translator::new(dims, config.column_labels()?);

    let plan = ReportPlan::new(config.campaign_start, as_of)
        .kind(config.kind)
        .dimensions(config.dimensions.clone())
        .generated_on(today())
        .file_prefix(config.file_prefix.clone())
        .excluded_region(config.excluded_region())
        .product_collapse(config.product_collapse())
        .thresholds(OverdueThresholds {
            grace_days: config.thresholds.grace_days,
            non_performing_days: config.thresholds.non_performing_days,
        });

    ReportAssembler::new(plan, translator)
        .assemble(&rows)
        .context("Failed to build reports")
}

fn check(config: &RunConfig, as_of: NaiveDate, json: bool) -> Result<()> {
    let dates = snapshot_dates(config.kind, config.campaign_start, as_of);
    let source = SqliteSource::open(config).context("Failed to open databases")?;
    let rows = source.snapshots(&dates).context("Failed to load snapshot rows")?;
    let dims = source
        .dimension_dict()
        .context("Failed to load dimension dictionary")?;

    let mut rows_per_date: BTreeMap<String, usize> =
        dates.iter().map(|d| (d.to_string(), 0)).collect();
    for row in &rows {
        *rows_per_date.entry(row.snapshot_date.to_string()).or_default() += 1;
    }

    let summary = CheckSummary {
        kind: config.kind,
        as_of,
        snapshot_dates: dates.len(),
        first_date: dates.first().copied(),
        last_date: dates.last().copied(),
        rows: rows.len(),
        rows_per_date,
        dictionary_entries: dims.entry_count(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Report kind:        {}", summary.kind);
        println!("As of:              {}", summary.as_of);
        match (summary.first_date, summary.last_date) {
            (Some(first), Some(last)) => {
                println!("Snapshot dates:     {} ({} .. {})", summary.snapshot_dates, first, last);
            }
            _ => println!("Snapshot dates:     0"),
        }
        println!("Snapshot rows:      {}", summary.rows);
        for (date, count) in &summary.rows_per_date {
            println!("  {date}: {count}");
        }
        println!("Dictionary entries: {}", summary.dictionary_entries);
    }

    if rows.is_empty() {
        bail!("No snapshot rows found for the reporting calendar");
    }
    Ok(())
}

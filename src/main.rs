use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use athlete_flag_engine::config::{AnalysisArgs, AnalysisConfig};
use athlete_flag_engine::flags::FlagEvaluator;
use athlete_flag_engine::models::{Measurement, WideTable};
use athlete_flag_engine::{audit, cohort, db, export, report, reshape, source};

#[derive(Parser)]
#[command(name = "athlete-flags")]
#[command(about = "Cohort baselines, data-quality audits and attention flags for athlete testing data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import long-form measurements from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Audit missingness, coverage and recency
    Audit {
        #[command(flatten)]
        analysis: AnalysisArgs,
        /// Print the audit as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one athlete's sessions in wide format
    Wide {
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[arg(long)]
        athlete: String,
    },
    /// Compare athletes against their team means
    Derived {
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Evaluate flag rules and export the alert table
    Flags {
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[arg(long, default_value = "flagged_athletes.csv")]
        out: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set (or pass --input to read a CSV)")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Validate options, then fetch the measurement snapshot once for the run.
async fn load(args: &AnalysisArgs) -> anyhow::Result<(AnalysisConfig, Vec<Measurement>)> {
    let config = AnalysisConfig::try_from(args).context("invalid analysis options")?;
    let metrics = config.fetch_metrics();

    let measurements = match &args.input {
        Some(path) => source::load_measurements(path, &metrics)?,
        None => {
            let pool = connect().await?;
            db::fetch_measurements(&pool, &metrics).await?
        }
    };

    info!(rows = measurements.len(), metrics = metrics.len(), "measurements loaded");
    Ok((config, measurements))
}

fn print_wide(table: &WideTable) {
    println!("Athlete: {}", table.athlete_id);
    println!("{}", table.columns.join(" | "));
    for row in &table.rows {
        let cells: Vec<String> = row
            .values
            .iter()
            .map(|v| v.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".to_string()))
            .collect();
        println!("{} | {}", row.timestamp, cells.join(" | "));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            let inserted = db::seed(&pool).await?;
            println!("Seed data inserted ({inserted} measurements).");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} measurements from {}.", csv.display());
        }
        Commands::Audit { analysis, json } => {
            let (config, measurements) = load(&analysis).await?;
            let report = audit::run_audit(&measurements, &config, Utc::now().naive_utc());

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            println!(
                "{} rows, {} athletes, median {:.2} rows per athlete",
                report.summary.total_rows,
                report.summary.total_athletes,
                report.summary.median_rows_per_athlete
            );
            println!("\nMissing or zero values by metric:");
            for row in &report.missingness {
                println!(
                    "- {}: {:.1}% ({} null, {} zero, {} rows)",
                    row.metric, row.missing_pct, row.null_count, row.zero_count, row.total_rows
                );
            }
            println!(
                "\nAthletes with >= {} measurements per cohort:",
                config.min_measurements
            );
            for row in &report.coverage {
                println!(
                    "- {}{}: {}/{} ({:.1}%)",
                    row.team,
                    row.sport.as_deref().map(|s| format!(" / {s}")).unwrap_or_default(),
                    row.athletes_sufficient,
                    row.total_athletes,
                    row.pct_sufficient
                );
            }
            match report.recency_cutoff {
                Some(cutoff) => {
                    println!("\nAthletes not measured since {cutoff}:");
                    for row in report.stale() {
                        println!("- {} ({}) last {}", row.athlete_id, row.team, row.last_measured);
                    }
                }
                None => println!("\nNo measurements found for these metrics."),
            }
            println!(
                "\nAthletes with >= {} measurements on every metric: {}",
                config.min_measurements,
                report.sufficient_athletes().len()
            );
        }
        Commands::Wide { analysis, athlete } => {
            let (config, measurements) = load(&analysis).await?;
            let table = reshape::reshape(&measurements, &athlete, &config.selected_metrics);
            if table.is_empty() {
                println!("No data for athlete {athlete}.");
            }
            print_wide(&table);
        }
        Commands::Derived { analysis, limit } => {
            let (config, measurements) = load(&analysis).await?;
            let rows = audit::audit_rows(&measurements, &config.selected_metrics);
            let rows: Vec<Measurement> = rows.into_iter().cloned().collect();

            let diffs = cohort::percent_differences(&rows);
            let summaries = cohort::athlete_summaries(&diffs);
            if summaries.is_empty() {
                println!("No measurements found.");
                return Ok(());
            }

            println!("Top {limit} (% above team mean):");
            for s in cohort::top_performers(&summaries, limit) {
                println!("- {} ({}, {}): {:+.1}%", s.athlete_id, s.team, s.metric, s.avg_pct_diff);
            }
            println!("\nBottom {limit} (% below team mean):");
            for s in cohort::bottom_performers(&summaries, limit) {
                println!("- {} ({}, {}): {:+.1}%", s.athlete_id, s.team, s.metric, s.avg_pct_diff);
            }
            println!("\nSample z-scores:");
            for z in cohort::z_scores(&rows).iter().take(10) {
                println!(
                    "- {} ({}, {}): {:.2} -> z {:+.2}",
                    z.athlete_id, z.team, z.metric, z.value, z.z_score
                );
            }
        }
        Commands::Flags { analysis, out } => {
            let (config, measurements) = load(&analysis).await?;
            let (alerts, outcomes) = FlagEvaluator::with_wall_clock(&config).evaluate(&measurements)?;

            export::export_alerts(&out, &alerts)?;
            for outcome in &outcomes {
                println!("- {}: {} alerts", outcome.rule, outcome.alerts);
            }
            println!("Wrote {} alerts to {}.", alerts.len(), out.display());
        }
        Commands::Report { analysis, out } => {
            let (config, measurements) = load(&analysis).await?;
            let now = Utc::now().naive_utc();
            let audit = audit::run_audit(&measurements, &config, now);
            let (alerts, outcomes) = FlagEvaluator::from_config(&config, now).evaluate(&measurements)?;

            let scope = analysis
                .input
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the measurement store".to_string());
            let report = report::build_report(&scope, &audit, &alerts, &outcomes);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

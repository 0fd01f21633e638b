use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod client;
mod config;
mod driver;
mod error;
mod extract;
mod models;
mod query;
mod row;
mod sink;
mod window;

use client::{parse_base_url, request_url, MixpanelClient, DEFAULT_API_URL};
use config::Config;
use driver::{FailurePolicy, ReportDriver, RunSummary};
use query::{build_event_query, build_funnel_query};
use sink::{CsvSink, PgSink};

#[derive(Parser)]
#[command(name = "funnel-report")]
#[command(about = "Appends daily Mixpanel funnel and event summaries to report sheets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres destination schema
    InitDb,
    /// Fetch metrics and append one row per sheet
    Run {
        #[arg(long, default_value = "config/sheets.json")]
        config: PathBuf,
        /// Report date (YYYY-MM-DD); defaults to yesterday
        #[arg(long)]
        date: Option<String>,
        #[arg(long, value_enum, default_value = "csv")]
        sink: SinkKind,
        #[arg(long, default_value = "reports")]
        out_dir: PathBuf,
        /// Keep going when a sheet fails and report all failures at the end
        #[arg(long)]
        isolate_sheets: bool,
    },
    /// Print the windows and export API queries a run would issue
    Plan {
        #[arg(long, default_value = "config/sheets.json")]
        config: PathBuf,
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SinkKind {
    Csv,
    Postgres,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("funnel_report=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect_pg().await?;
            sink::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Run {
            config,
            date,
            sink,
            out_dir,
            isolate_sheets,
        } => {
            let mut config = Config::load(&config)?;
            if date.is_some() {
                config.report_date = date;
            }
            if isolate_sheets {
                config.failure_policy = FailurePolicy::IsolateSheets;
            }

            let report_date = window::compute_report_date(config.report_date.as_deref())?;
            let client = MixpanelClient::new(&config.api_url, &config.api_secret, config.timeout)?;
            let run_id = Uuid::new_v4();

            let summary = match sink {
                SinkKind::Csv => {
                    let sink = CsvSink::new(&out_dir);
                    ReportDriver::new(config.sheets, config.failure_policy, client, sink, run_id)
                        .run(report_date)
                        .await?
                }
                SinkKind::Postgres => {
                    let sink = PgSink::new(connect_pg().await?, run_id);
                    ReportDriver::new(config.sheets, config.failure_policy, client, sink, run_id)
                        .run(report_date)
                        .await?
                }
            };

            print_summary(&summary);
            if !summary.failures.is_empty() {
                bail!("{} sheet(s) failed", summary.failures.len());
            }
        }
        Commands::Plan { config, date } => {
            let sheets = config::load_sheets(&config)?;
            let date = date.or_else(|| std::env::var("REPORT_DATE").ok());
            let report_date = window::compute_report_date(date.as_deref())?;
            let windows = window::report_windows(report_date);
            let base_url = parse_base_url(
                &std::env::var("MIXPANEL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            )?;

            println!("Report date {report_date}");
            for window in windows.iter() {
                println!("- {}", window.label());
            }

            for sheet in &sheets {
                println!();
                println!(
                    "{} ({} funnels, {} events)",
                    sheet.name,
                    sheet.funnel_ids.len(),
                    sheet.events.len()
                );
                for funnel in &sheet.funnel_ids {
                    for window in windows.iter() {
                        let request = build_funnel_query(funnel, window)?;
                        println!("  GET {}", request_url(&base_url, &request)?);
                    }
                }
                for event in &sheet.events {
                    let request = build_event_query(event, &windows.day1)?;
                    println!("  GET {}", request_url(&base_url, &request)?);
                }
            }
        }
    }

    Ok(())
}

async fn connect_pg() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set when writing to Postgres")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Run {} for {}: {} sheet(s) appended.",
        summary.run_id,
        summary.report_date,
        summary.appended.len()
    );
    for failure in &summary.failures {
        println!("- {} failed: {}", failure.sheet, failure.error);
    }
}

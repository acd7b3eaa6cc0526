//! Onboarding Metrics: batch ETL for the onboarding funnel and A/B cohorts.
//!
//! `run` loads the CSV datasets, computes per-user metrics and replaces the
//! metrics table and snapshot. `report` reads the table back and renders the
//! dashboard views. `check` verifies the store is reachable.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use onboarding_analytics::{ClickHouseStore, MetricsStore, SnapshotWriter};
use onboarding_core::types::{AbGroup, SegmentKind};
use onboarding_core::AppConfig;
use onboarding_etl::{InputLoader, Pipeline};
use onboarding_reporting::dashboard::export_csv;
use onboarding_reporting::{DashboardFilter, DashboardView, Milestone};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "onboarding-metrics")]
#[command(about = "Onboarding funnel and A/B cohort metrics ETL")]
#[command(version)]
struct Cli {
    /// TOML config file, overlaid by ONBOARDING_METRICS__* variables
    #[arg(long, global = true, env = "ONBOARDING_METRICS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ETL and replace the metrics table
    Run(RunArgs),
    /// Render dashboard views from the metrics table
    Report(ReportArgs),
    /// Check that the metrics table is reachable
    Check,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Seed for cohort assignment (overrides config)
    #[arg(long, env = "ONBOARDING_METRICS__COHORT__SEED")]
    seed: Option<u64>,

    /// Onboarding CSV (overrides config)
    #[arg(long)]
    onboarding: Option<String>,

    /// User dimension CSV (overrides config)
    #[arg(long)]
    users: Option<String>,

    /// Transactions CSV (overrides config)
    #[arg(long)]
    transactions: Option<String>,

    /// Snapshot directory (overrides config)
    #[arg(long)]
    snapshot_dir: Option<String>,

    /// Do not write the CSV snapshot
    #[arg(long, default_value_t = false)]
    no_snapshot: bool,

    /// Compute metrics without writing to ClickHouse
    #[arg(long, default_value_t = false)]
    skip_store: bool,

    /// Print the run report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct ReportArgs {
    #[arg(long)]
    ab_group: Option<AbGroup>,

    /// Segment label or code
    #[arg(long)]
    segment: Option<SegmentKind>,

    /// Only users that reached this milestone (activated, setup, habit, retained)
    #[arg(long)]
    milestone: Option<Milestone>,

    /// Write the filtered rows to this CSV file
    #[arg(long)]
    export: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onboarding_metrics=info,onboarding_etl=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load_from(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    match cli.command {
        Command::Run(args) => run(config, args).await,
        Command::Report(args) => report(config, args).await,
        Command::Check => check(config).await,
    }
}

async fn run(mut config: AppConfig, args: RunArgs) -> anyhow::Result<()> {
    if let Some(seed) = args.seed {
        config.cohort.seed = Some(seed);
    }
    if let Some(path) = args.onboarding {
        config.input.onboarding_path = path;
    }
    if let Some(path) = args.users {
        config.input.users_path = path;
    }
    if let Some(path) = args.transactions {
        config.input.transactions_path = path;
    }
    if let Some(dir) = args.snapshot_dir {
        config.snapshot.dir = dir;
    }
    if args.no_snapshot {
        config.snapshot.enabled = false;
    }
    config.validate()?;

    info!(
        onboarding = %config.input.onboarding_path,
        transactions = %config.input.transactions_path,
        control_fraction = config.cohort.control_fraction,
        seed = ?config.cohort.seed,
        "Configuration loaded"
    );

    let inputs = InputLoader::new(config.input.clone())
        .load()
        .context("failed to load input datasets")?;

    let store = (!args.skip_store).then(|| ClickHouseStore::new(&config.clickhouse));
    let snapshot = config
        .snapshot
        .enabled
        .then(|| SnapshotWriter::new(&config.snapshot.dir));

    let pipeline = Pipeline::from_config(&config);
    let outcome = pipeline
        .run(
            &inputs,
            store.as_ref().map(|s| s as &dyn MetricsStore),
            snapshot.as_ref(),
        )
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else {
        print!("{}", DashboardView::build(&outcome.records, &DashboardFilter::default()).render_text());
    }

    if outcome.report.store.is_failed() || outcome.report.snapshot.is_failed() {
        warn!(run_id = %outcome.report.run_id, "Run completed with write failures");
    }
    Ok(())
}

async fn report(config: AppConfig, args: ReportArgs) -> anyhow::Result<()> {
    config.validate()?;
    let store = ClickHouseStore::new(&config.clickhouse);
    let records = store
        .fetch_all()
        .await
        .with_context(|| format!("failed to read {}", store.table()))?;

    let filter = DashboardFilter {
        ab_group: args.ab_group,
        segment: args.segment,
        milestone: args.milestone,
    };

    if let Some(path) = &args.export {
        let rows = filter.apply(&records);
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        export_csv(&rows, BufWriter::new(file))?;
        info!(path = %path.display(), rows = rows.len(), "Rows exported");
    }

    let view = DashboardView::build(&records, &filter);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", view.render_text());
    }
    Ok(())
}

async fn check(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;
    let store = ClickHouseStore::new(&config.clickhouse);
    let rows = store
        .count()
        .await
        .with_context(|| format!("metrics table {} is not reachable", store.table()))?;
    info!(table = %store.table(), rows, "Metrics table reachable");
    println!("{}: {rows} rows", store.table());
    Ok(())
}

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use k6bridge_cli::commands::{self, CsvOptions, ImportOptions};
use k6bridge_cli::report;
use k6bridge_client::InfluxConfig;
use k6bridge_common::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_DASHBOARD_OUTPUT, DEFAULT_DATABASE, DEFAULT_INFLUX_URL,
    DEFAULT_OUTPUT_PREFIX, DEFAULT_WRITE_TIMEOUT,
};
use k6bridge_common::Result;
use k6bridge_pipeline::{FailurePolicy, TracingProgress};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "k6bridge",
    version,
    about = "Convert k6 JSON output to CSV or InfluxDB line protocol"
)]
struct Cli {
    /// Log level for k6bridge crates when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write CSV files for Grafana's CSV datasource
    Csv(CsvArgs),
    /// Analyse the results and import them into InfluxDB
    Import(ImportArgs),
    /// Print statistics only
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct CsvArgs {
    /// k6 JSON results file (`k6 run --out json=...`)
    json_file: PathBuf,

    /// Output file prefix
    #[arg(long, default_value = DEFAULT_OUTPUT_PREFIX)]
    output_prefix: String,

    /// Create a single combined CSV file
    #[arg(long)]
    single_csv: bool,

    /// Create a Grafana dashboard JSON (per-metric mode only)
    #[arg(long)]
    create_dashboard: bool,

    #[arg(long, default_value = DEFAULT_DASHBOARD_OUTPUT)]
    dashboard_output: PathBuf,
}

#[derive(Args)]
struct ImportArgs {
    /// k6 JSON results file
    json_file: PathBuf,

    #[arg(long, default_value = DEFAULT_INFLUX_URL)]
    influxdb_url: String,

    #[arg(long, default_value = DEFAULT_DATABASE)]
    database: String,

    /// Line-protocol records per write request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Only analyse the file, do not import
    #[arg(long)]
    analyze_only: bool,

    /// Per-request timeout (seconds)
    #[arg(long, default_value_t = DEFAULT_WRITE_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Retries for a failed batch before it is given up
    #[arg(long, default_value_t = 0)]
    max_retries: u32,

    /// Base retry delay (milliseconds), grows linearly per attempt
    #[arg(long, default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Append batches that could not be written to this file instead of dropping them
    #[arg(long)]
    dead_letter: Option<PathBuf>,

    /// JSON file overriding the well-known metric names and scenario tags
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// k6 JSON results file
    json_file: PathBuf,

    /// JSON file overriding the well-known metric names and scenario tags
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result = match cli.command {
        Command::Csv(args) => csv(args).await,
        Command::Import(args) => import(args).await,
        Command::Analyze(args) => analyze(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(commands::exit_code(&e));
    }
}

fn init_tracing(level: &str) {
    let default_filter = ["k6bridge", "k6bridge_cli", "k6bridge_pipeline", "k6bridge_client"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn csv(args: CsvArgs) -> Result<()> {
    println!("K6 JSON to CSV Converter");
    println!("========================");

    let opts = CsvOptions {
        input: args.json_file,
        output_prefix: args.output_prefix,
        single_csv: args.single_csv,
        create_dashboard: args.create_dashboard,
        dashboard_output: args.dashboard_output,
    };
    info!(input = %opts.input.display(), single_csv = opts.single_csv, "converting to csv");

    let outcome = commands::run_csv(&opts, &mut TracingProgress).await?;
    println!();
    print!("{}", report::format_csv_result(&outcome));
    Ok(())
}

async fn import(args: ImportArgs) -> Result<()> {
    println!("K6 JSON to InfluxDB Importer");
    println!("============================");

    let catalog = commands::load_catalog(args.catalog.as_deref())?;
    let opts = ImportOptions {
        input: args.json_file,
        influx: InfluxConfig {
            base_url: args.influxdb_url,
            database: args.database,
            timeout: Duration::from_secs(args.timeout_secs),
        },
        batch_size: args.batch_size,
        analyze_only: args.analyze_only,
        failure_policy: FailurePolicy {
            max_retries: args.max_retries,
            retry_backoff: Duration::from_millis(args.retry_backoff_ms),
            dead_letter: args.dead_letter,
        },
        catalog,
    };
    if !opts.analyze_only {
        info!(url = %opts.influx.base_url, database = %opts.influx.database, "importing");
    }

    let run = commands::run_import(&opts, &mut TracingProgress).await?;

    if let Some(summary) = &run.summary {
        println!();
        print!("{}", report::format_analysis(summary, file_size(&opts.input)));
    }
    if !opts.analyze_only {
        println!();
        print!("{}", report::format_import_summary(&run));
        println!();
        print!("{}", report::format_import_next_steps(&opts.influx));
    }
    Ok(())
}

async fn analyze(args: AnalyzeArgs) -> Result<()> {
    let catalog = commands::load_catalog(args.catalog.as_deref())?;
    let run = commands::run_analyze(&args.json_file, &catalog, &mut TracingProgress).await?;

    if let Some(summary) = &run.summary {
        print!("{}", report::format_analysis(summary, file_size(&args.json_file)));
    }
    Ok(())
}

fn file_size(path: &std::path::Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

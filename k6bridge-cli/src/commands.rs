use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use k6bridge_client::{InfluxClient, InfluxConfig};
use k6bridge_common::{BridgeError, MetricCatalog, Result};
use k6bridge_pipeline::tabular::ExportedFile;
use k6bridge_pipeline::{
    BatchWriter, FailurePolicy, IngestCounters, Pipeline, ProgressObserver, RunOutcome, TabularMode,
};

use crate::dashboard;

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub input: PathBuf,
    pub output_prefix: String,
    pub single_csv: bool,
    /// Ignored with `single_csv`; the dashboard needs one datasource per metric.
    pub create_dashboard: bool,
    pub dashboard_output: PathBuf,
}

#[derive(Debug)]
pub struct CsvOutcome {
    pub ingest: IngestCounters,
    pub files: Vec<ExportedFile>,
    pub dashboard: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub input: PathBuf,
    pub influx: InfluxConfig,
    pub batch_size: usize,
    /// Compute statistics without contacting the sink.
    pub analyze_only: bool,
    pub failure_policy: FailurePolicy,
    pub catalog: MetricCatalog,
}

/// Convert the input to CSV files and optionally a Grafana dashboard.
pub async fn run_csv(opts: &CsvOptions, observer: &mut dyn ProgressObserver) -> Result<CsvOutcome> {
    let reader = open_input(&opts.input)?;
    let mode = if opts.single_csv {
        TabularMode::Combined
    } else {
        TabularMode::PerMetric
    };

    let outcome = Pipeline::new().with_tabular(mode).run(reader, observer).await?;
    let files = match outcome.tabular {
        Some(tabular) => tabular.write_files(&opts.output_prefix)?,
        None => Vec::new(),
    };

    let dashboard = if opts.create_dashboard && !opts.single_csv {
        let metrics: Vec<String> = files.iter().filter_map(|f| f.metric.clone()).collect();
        dashboard::write_dashboard(&opts.dashboard_output, &metrics)?;
        Some(opts.dashboard_output.clone())
    } else {
        None
    };

    Ok(CsvOutcome { ingest: outcome.ingest, files, dashboard })
}

/// Analyse and, unless `analyze_only`, import into InfluxDB in a single pass.
pub async fn run_import(
    opts: &ImportOptions,
    observer: &mut dyn ProgressObserver,
) -> Result<RunOutcome> {
    let reader = open_input(&opts.input)?;
    let mut pipeline = Pipeline::new().with_stats(opts.catalog.clone());

    if !opts.analyze_only {
        let sink = Arc::new(InfluxClient::new(opts.influx.clone())?);
        let writer = BatchWriter::new(sink, opts.batch_size, opts.failure_policy.clone())?;
        pipeline = pipeline.with_writer(writer);
    }

    pipeline.run(reader, observer).await
}

pub async fn run_analyze(
    input: &Path,
    catalog: &MetricCatalog,
    observer: &mut dyn ProgressObserver,
) -> Result<RunOutcome> {
    let reader = open_input(input)?;
    Pipeline::new()
        .with_stats(catalog.clone())
        .run(reader, observer)
        .await
}

pub fn load_catalog(path: Option<&Path>) -> Result<MetricCatalog> {
    match path {
        Some(p) => MetricCatalog::from_json_file(p)
            .map_err(|e| BridgeError::InvalidConfig(format!("{}: {e}", p.display()))),
        None => Ok(MetricCatalog::default()),
    }
}

/// Exit status for a failed command: 2 for bad configuration, 1 for everything else
/// (unreachable sink, unreadable input, unwritable output).
pub fn exit_code(err: &BridgeError) -> i32 {
    match err {
        BridgeError::InvalidConfig(_) => 2,
        _ => 1,
    }
}

fn open_input(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| BridgeError::Io(format!("{}: {e}", path.display())))?;
    Ok(BufReader::new(file))
}

//! CLI entry point for the PC4 market-share dashboard.
//!
//! Loads a PC4 table and PC4 boundaries, applies filters, and reports
//! statistics, writes map layers or exports tables at postcode or
//! municipality level.

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pc4_dashboard::aggregator::utility::mean;
use pc4_dashboard::aggregator::{MunicipalityView, aggregate_to_municipality};
use pc4_dashboard::fetch::{BasicClient, SourceLocation};
use pc4_dashboard::filter::{FilterSelection, cascading_options, market_share_bounds};
use pc4_dashboard::geometry::{DISPLAY_TOLERANCE, DISSOLVE_TOLERANCE, GeometrySettings};
use pc4_dashboard::metrics::{Metric, MetricSource};
use pc4_dashboard::model::{Dataset, Level};
use pc4_dashboard::output::{
    export_municipalities, export_records, export_summary, map_layer, print_json, print_pretty,
    records_file_name, summary_file_name, write_geojson,
};
use pc4_dashboard::session::Session;
use pc4_dashboard::stats::{SummaryStats, rank_by_market_share};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const RANKING_SIZE: usize = 5;

#[derive(Parser)]
#[command(name = "pc4_dashboard")]
#[command(about = "Market share of funeral services per PC4 area", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// PC4 table (CSV, optionally gzipped), path or URL
    #[arg(long, value_name = "FILE_OR_URL")]
    table: String,

    /// PC4 boundaries (GeoJSON, optionally gzipped), path or URL
    #[arg(long, value_name = "FILE_OR_URL")]
    boundaries: String,

    /// Simplification tolerance applied at load time
    #[arg(long, default_value_t = DISPLAY_TOLERANCE)]
    display_tolerance: f64,

    /// Simplification tolerance applied before dissolving municipalities
    #[arg(long, default_value_t = DISSOLVE_TOLERANCE)]
    dissolve_tolerance: f64,
}

#[derive(Args)]
struct ViewArgs {
    #[arg(short, long, value_enum, default_value_t = LevelArg::Postcode)]
    level: LevelArg,

    /// Metric column or display name
    #[arg(short, long, default_value_t = Metric::default())]
    metric: Metric,

    /// JSON file with the filter selection
    #[arg(short, long)]
    filters: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    Postcode,
    Municipality,
}

impl From<LevelArg> for Level {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Postcode => Level::Postcode,
            LevelArg::Municipality => Level::Municipality,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    Records,
    Summary,
    Municipalities,
}

#[derive(Subcommand)]
enum Commands {
    /// Show dataset size, available metrics and filter options
    Options {
        #[command(flatten)]
        source: SourceArgs,

        /// JSON file with the filter selection, narrows the options
        #[arg(short, long)]
        filters: Option<String>,
    },
    /// Log summary statistics and top/bottom rankings
    Summary {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        view: ViewArgs,
    },
    /// Write a GeoJSON map layer for the selected metric
    Map {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        view: ViewArgs,

        /// GeoJSON file to write
        #[arg(short, long, default_value = "map.geojson")]
        output: String,
    },
    /// Export the filtered data as CSV
    Export {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(short, long, value_enum, default_value_t = ExportKind::Records)]
        kind: ExportKind,

        /// JSON file with the filter selection
        #[arg(short, long)]
        filters: Option<String>,

        /// CSV file to write; a name is derived from the data when omitted
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Rows at the requested level, after filtering.
enum View {
    Postcode(Dataset),
    Municipality(MunicipalityView),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/pc4_dashboard.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("pc4_dashboard.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Options { source, filters } => {
            let dataset = load_dataset(&source).await?;
            let selection = load_selection(filters.as_deref())?;
            show_options(&dataset, &selection);
        }
        Commands::Summary { source, view } => {
            let dataset = load_dataset(&source).await?;
            let selection = load_selection(view.filters.as_deref())?;
            let filtered = selection.apply(&dataset);
            let label = selection.area_label();

            match build_view(filtered, view.level.into(), &settings(&source)) {
                View::Postcode(data) => summarize(&label, &data.records, view.metric)?,
                View::Municipality(mv) => {
                    info!(geometry = %mv.quality.notice(), "Municipality level");
                    print_pretty(&mv.quality);
                    print_pretty(&mv.missing_geometry());
                    summarize(&label, &mv.rows, view.metric)?;
                }
            }
        }
        Commands::Map {
            source,
            view,
            output,
        } => {
            let dataset = load_dataset(&source).await?;
            let selection = load_selection(view.filters.as_deref())?;
            let filtered = selection.apply(&dataset);

            match build_view(filtered, view.level.into(), &settings(&source)) {
                View::Postcode(data) => {
                    write_geojson(&output, &map_layer(&data.records, view.metric))?;
                }
                View::Municipality(mv) if mv.rows.is_empty() => {
                    warn!("{}", mv.quality.notice());
                }
                View::Municipality(mv) if mv.has_geometry() => {
                    write_geojson(&output, &map_layer(&mv.rows, view.metric))?;
                }
                View::Municipality(mv) => {
                    let fallback = Path::new(&output).with_extension("csv");
                    let fallback = fallback.to_string_lossy();
                    warn!(path = %fallback, "{}", mv.quality.notice());
                    export_municipalities(&fallback, &mv.rows)?;
                }
            }
        }
        Commands::Export {
            source,
            kind,
            filters,
            output,
        } => {
            let dataset = load_dataset(&source).await?;
            let selection = load_selection(filters.as_deref())?;
            let filtered = selection.apply(&dataset);

            match kind {
                ExportKind::Records => {
                    let path = output.unwrap_or_else(|| records_file_name(filtered.len()));
                    export_records(&path, &filtered)?;
                }
                ExportKind::Summary => {
                    let label = selection.area_label();
                    let path = output.unwrap_or_else(|| summary_file_name(&label));
                    export_summary(&path, &SummaryStats::from_rows(label, &filtered.records))?;
                }
                ExportKind::Municipalities => {
                    let view = aggregate_to_municipality(&filtered, &settings(&source))?;
                    let path = output.unwrap_or_else(|| "gemeenten_export.csv".to_string());
                    export_municipalities(&path, &view.rows)?;
                }
            }
        }
    }

    Ok(())
}

fn settings(source: &SourceArgs) -> GeometrySettings {
    GeometrySettings {
        display_tolerance: source.display_tolerance,
        dissolve_tolerance: source.dissolve_tolerance,
    }
}

/// Loads both sources, halting with guidance when nothing usable came back.
#[tracing::instrument(skip_all, fields(table = %source.table, boundaries = %source.boundaries))]
async fn load_dataset(source: &SourceArgs) -> Result<Dataset> {
    let client = BasicClient::new()?;
    let mut session = Session::new(settings(source));

    let dataset = session
        .load(
            &client,
            &SourceLocation::parse(&source.table),
            &SourceLocation::parse(&source.boundaries),
        )
        .await
        .clone();

    if let Some(err) = session.last_error() {
        bail!("{} {}", err, err.guidance());
    }
    if dataset.is_empty() {
        bail!("No postcode areas left after joining the table and the boundaries.");
    }
    Ok(dataset)
}

fn load_selection(path: Option<&str>) -> Result<FilterSelection> {
    match path {
        Some(path) => FilterSelection::load(path),
        None => Ok(FilterSelection::default()),
    }
}

/// Aggregates when asked to, falling back to postcode level without a
/// municipality column.
fn build_view(filtered: Dataset, level: Level, settings: &GeometrySettings) -> View {
    match level {
        Level::Postcode => View::Postcode(filtered),
        Level::Municipality => match aggregate_to_municipality(&filtered, settings) {
            Ok(view) => View::Municipality(view),
            Err(err) => {
                warn!(error = %err, "Falling back to postcode level");
                View::Postcode(filtered)
            }
        },
    }
}

fn show_options(dataset: &Dataset, selection: &FilterSelection) {
    info!(areas = dataset.len(), "Dataset loaded");

    let metrics: Vec<&str> = Metric::available(dataset)
        .into_iter()
        .map(Metric::display_name)
        .collect();
    info!(metrics = %metrics.join(", "), "Available metrics");

    for (dimension, values) in cascading_options(dataset, selection) {
        info!(
            column = dimension.column(),
            count = values.len(),
            values = %values.join(", "),
            "Filter options"
        );
    }

    if let Some(bounds) = market_share_bounds(&selection.apply(dataset).records) {
        info!(min = bounds.min, max = bounds.max, "Market share range (%)");
    }
}

fn summarize<T: MetricSource>(label: &str, rows: &[T], metric: Metric) -> Result<()> {
    if rows.is_empty() {
        warn!("No data available for statistics");
        return Ok(());
    }

    let stats = SummaryStats::from_rows(label, rows);
    print_json(&stats)?;

    let values: Vec<f64> = rows.iter().map(|r| metric.value(r)).collect();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    info!(metric = metric.display_name(), min, max, mean = mean(&values), "Selected metric");

    let rankings = rank_by_market_share(rows, RANKING_SIZE);
    print_json(&rankings)?;
    Ok(())
}

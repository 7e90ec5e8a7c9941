//! CLI entry point for the hotspot ETL tool.
//!
//! Provides subcommands for ingesting a FIRMS feed (or a saved CSV) into the
//! hotspot aggregate table and for reading the table back.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use hotspot_etl::{
    archive::Archiver,
    config::PipelineConfig,
    feed::{
        DEFAULT_AREA, DEFAULT_SOURCE, DetectionFeed, FIRMS_BASE_URL, FileFeed, FirmsFeed,
        FirmsQuery,
    },
    fetch::BasicClient,
    output::{append_record, print_json, print_pretty, write_aggregates},
    pipeline::runner::run,
    stats::RunReport,
    store::{AggregateStore, DEFAULT_TABLE, SqliteStore, query},
};
use serde::Serialize;
use sqlx::sqlite::SqliteConnectOptions;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/hotspots.db";

#[derive(Parser)]
#[command(name = "hotspot_etl")]
#[command(about = "Aggregate satellite fire detections into a hotspot grid", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Database URL (defaults to $DATABASE_URL, then sqlite://data/hotspots.db)
    #[arg(long)]
    database_url: Option<String>,

    /// Table holding the aggregates
    #[arg(short, long, default_value = DEFAULT_TABLE)]
    table: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch detections, aggregate them and upsert the result
    Ingest {
        #[command(flatten)]
        store: StoreArgs,

        /// Read detections from a saved CSV instead of the FIRMS API
        #[arg(short, long, value_name = "CSV")]
        file: Option<PathBuf>,

        /// FIRMS dataset
        #[arg(long, default_value = DEFAULT_SOURCE)]
        source: String,

        /// `world` or `west,south,east,north`
        #[arg(long, default_value = DEFAULT_AREA)]
        area: String,

        /// Number of days to request (1-10)
        #[arg(long, default_value_t = 1)]
        days: u8,

        /// First day of the requested window (YYYY-MM-DD); default is the most recent days
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Pipeline config JSON (resolution, bucket width, confidence table, timeouts)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also write this run's aggregates to a CSV file
        #[arg(long)]
        export: Option<PathBuf>,

        /// Append the run report to this CSV file
        #[arg(long)]
        report: Option<String>,

        /// Keep a snapshot of the fetched feed under this directory
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// Optional: S3 bucket to upload feed snapshots to (requires --archive-dir)
        #[arg(long, requires = "archive_dir")]
        s3_bucket: Option<String>,

        /// Gzip-compress feed snapshots
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Create the aggregate table if it does not exist
    InitDb {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Print aggregates from a recent window, newest first
    Recent {
        #[command(flatten)]
        store: StoreArgs,

        /// Window length in days, ending at --as-of
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(1..))]
        days: i64,

        #[arg(long)]
        limit: Option<usize>,

        /// End of the window (RFC 3339); defaults to the latest stored bucket
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
    /// Print aggregates at or above a confidence threshold
    Confident {
        #[command(flatten)]
        store: StoreArgs,

        /// Minimum mean confidence ordinal
        #[arg(long, default_value_t = 2.0)]
        min: f64,

        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(1..))]
        days: i64,

        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
    /// Print summary statistics
    Stats {
        #[command(flatten)]
        store: StoreArgs,

        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/hotspot_etl.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("hotspot_etl.log"));

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
        Commands::Ingest {
            store,
            file,
            source,
            area,
            days,
            date,
            config,
            export,
            report,
            archive_dir,
            s3_bucket,
            gzip,
        } => {
            let config = match config {
                Some(path) => PipelineConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => PipelineConfig::default(),
            };

            let feed: Box<dyn DetectionFeed> = match file {
                Some(path) => Box::new(FileFeed::new(path)),
                None => {
                    let map_key = std::env::var("FIRMS_MAP_KEY")
                        .context("FIRMS_MAP_KEY must be set to fetch from FIRMS")?;
                    let query = FirmsQuery {
                        base_url: std::env::var("FIRMS_BASE_URL")
                            .unwrap_or_else(|_| FIRMS_BASE_URL.to_string()),
                        source,
                        area,
                        day_range: days,
                        date,
                        ..FirmsQuery::new(map_key)
                    };
                    let client = BasicClient::new(config.fetch_timeout, config.connect_timeout)?;
                    Box::new(FirmsFeed::new(client, query)?)
                }
            };

            let archiver = match archive_dir {
                Some(dir) => {
                    let archiver = Archiver::new(dir, gzip);
                    Some(match s3_bucket {
                        Some(bucket) => {
                            info!(bucket = %bucket, gzip, "S3 snapshot upload enabled");
                            let aws = aws_config::load_from_env().await;
                            archiver.with_s3(aws_sdk_s3::Client::new(&aws), bucket)
                        }
                        None => archiver,
                    })
                }
                None => None,
            };

            let table = store.table.clone();
            let store = open_store(&store).await?;

            match run(feed.as_ref(), &store, &config, archiver.as_ref()).await {
                Ok(prepared) => {
                    let run_report = prepared.report.with_run_info(feed.name(), &table);
                    print_pretty(&run_report);
                    print_json(&run_report)?;
                    if let Some(path) = export {
                        write_aggregates(&path, &prepared.aggregates)?;
                    }
                    if let Some(path) = report {
                        append_record(&path, &run_report)?;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Run failed");
                    if let Some(path) = report {
                        let failed = RunReport::from_error(error_type(&e), &e.to_string())
                            .with_run_info(feed.name(), &table);
                        append_record(&path, &failed)?;
                    }
                    return Err(e.into());
                }
            }
        }
        Commands::InitDb { store } => {
            open_store(&store).await?;
            info!(table = %store.table, "Table ready");
        }
        Commands::Recent {
            store,
            days,
            limit,
            as_of,
        } => {
            let store = open_store(&store).await?;
            let rows = match resolve_as_of(&store, as_of).await? {
                Some(as_of) => query::recent(&store, as_of, days, limit).await?,
                None => Vec::new(),
            };
            print_out(&rows)?;
        }
        Commands::Confident {
            store,
            min,
            days,
            as_of,
        } => {
            let store = open_store(&store).await?;
            let rows = match resolve_as_of(&store, as_of).await? {
                Some(as_of) => query::confident(&store, min, as_of, days).await?,
                None => Vec::new(),
            };
            print_out(&rows)?;
        }
        Commands::Stats { store, as_of } => {
            let store = open_store(&store).await?;
            let as_of = resolve_as_of(&store, as_of).await?.unwrap_or_else(Utc::now);
            print_out(&query::summary(&store, as_of).await?)?;
        }
    }

    Ok(())
}

/// Connects to the store, creating the database directory and table when missing.
async fn open_store(args: &StoreArgs) -> Result<SqliteStore> {
    let url = args
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

    let options = SqliteConnectOptions::from_str(&url)?;
    if let Some(parent) = options.get_filename().parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = SqliteStore::connect(&url, &args.table).await?;
    store.ensure_schema().await?;
    Ok(store)
}

/// Uses the explicit `--as-of` when given, otherwise the newest stored bucket.
async fn resolve_as_of(
    store: &SqliteStore,
    as_of: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>> {
    match as_of {
        Some(t) => Ok(Some(t)),
        None => Ok(query::latest_bucket(store).await?),
    }
}

fn print_out(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn error_type(e: &hotspot_etl::error::PipelineError) -> &'static str {
    use hotspot_etl::error::PipelineError::*;
    match e {
        Fetch(_) => "fetch_error",
        Parse(_) | Schema(_) => "parse_error",
        Store(_) | StoreTimeout(_) => "store_error",
        Config(_) => "config_error",
        Archive(_) => "archive_error",
        Io(_) => "io_error",
    }
}

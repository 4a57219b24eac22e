//! CLI entry point for the GTFS-Ride builder.
//!
//! Imports a vendor APC export against an agency's GTFS schedule and writes
//! the resulting GTFS-Ride files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gtfs_ride::config::Config;
use gtfs_ride::formats::{ApcFormat, detect_format};
use gtfs_ride::import::{ImportContext, import_file};
use gtfs_ride::issues::IssueLog;
use gtfs_ride::output::{
    RunReport, print_json, write_board_alight, write_issues, write_ride_feed_info, write_summary,
};
use gtfs_ride::schedule::MemorySchedule;
use gtfs_ride::store::{BoardAlightStore, MemoryStore, RowFilter, SortField};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_ride")]
#[command(about = "Build GTFS-Ride ridership data from APC exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an APC file and write GTFS-Ride output
    Import {
        /// Path to the JSON config file
        #[arg(short, long, default_value = "./config.json")]
        config: PathBuf,

        /// APC CSV file, overrides apc_path
        #[arg(long)]
        apc_path: Option<PathBuf>,

        /// Directory of GTFS text files, overrides gtfs_path
        #[arg(long)]
        gtfs_path: Option<PathBuf>,

        /// Directory to write GTFS-Ride files to, overrides output_path
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Skip detection and read the file as this format
        #[arg(short, long, value_enum)]
        format: Option<ApcFormat>,

        /// Never merge duplicate rows
        #[arg(long, default_value_t = false)]
        no_merge: bool,

        /// Gzip the GTFS-Ride files
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Print the APC format detected from a CSV header
    Detect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_ride.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_ride.log"));

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
        Commands::Import {
            config,
            apc_path,
            gtfs_path,
            output_dir,
            format,
            no_merge,
            gzip,
        } => {
            let mut config = Config::load(&config)?;
            if apc_path.is_some() {
                config.apc_path = apc_path;
            }
            if gtfs_path.is_some() {
                config.gtfs_path = gtfs_path;
            }
            if output_dir.is_some() {
                config.output_path = output_dir;
            }
            if format.is_some() {
                config.apc_format = format;
            }
            if no_merge {
                config.merge_duplicates = Some(false);
            }
            config.gzip |= gzip;

            run_import(&config).await?;
        }
        Commands::Detect { file } => {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_path(&file)
                .with_context(|| format!("Unable to open {}", file.display()))?;
            let headers: Vec<String> = reader
                .headers()?
                .iter()
                .map(|field| field.trim_start_matches('\u{feff}').to_string())
                .collect();

            match detect_format(&headers) {
                Ok(format) => println!("{format}"),
                Err(err) => {
                    error!("{err}");
                    return Err(err.into());
                }
            }
        }
    }

    Ok(())
}

#[tracing::instrument(skip(config), fields(agency = %config.agency_key))]
async fn run_import(config: &Config) -> Result<()> {
    config.validate()?;
    let (Some(apc_path), Some(gtfs_path)) = (config.apc_path(), config.gtfs_path()) else {
        return Err(gtfs_ride::config::ConfigError::MissingApcPath.into());
    };
    let output_path = config.output_path();

    let schedule = MemorySchedule::load_dir(&gtfs_path)
        .with_context(|| format!("Unable to load GTFS from {}", gtfs_path.display()))?;
    let store = MemoryStore::new();
    let issues = IssueLog::new();
    let ctx = ImportContext {
        schedule: &schedule,
        store: &store,
        issues: &issues,
    };

    let result = import_file(&apc_path, ctx, &config.import_options()).await;

    // Issues found before a fatal error are still worth keeping.
    let recorded = issues.snapshot();
    write_issues(&output_path, &recorded)?;
    let summary = result?;

    let rows = store
        .query(
            &RowFilter::all(),
            &[SortField::ServiceDate, SortField::TripId, SortField::StopSequence],
        )
        .await?;
    let board_alight = write_board_alight(&output_path, &rows, config.gzip)?;
    info!(path = %board_alight.display(), rows = rows.len(), "Wrote board_alight");

    if let Some(feed_info) = &summary.ride_feed_info {
        write_ride_feed_info(&output_path, feed_info, config.gzip)?;
    }

    let report = RunReport::new(&config.agency_key, summary, &recorded);
    write_summary(&output_path, &report)?;
    print_json(&report)?;

    info!(output = %output_path.display(), "GTFS-Ride data created");
    Ok(())
}

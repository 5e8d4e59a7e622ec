//! Command-line trigger for heatmap cleanup.
//!
//! Suitable for cron/job runners (`once`) or as a long-running service
//! (`watch`). Logging is controlled with `RUST_LOG`.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use serde_json::Value;

use heatmap_reconciler::{
    reconcile, summarize, CleanupScheduler, DetectionStore, HeatmapConfig, ProcessingStats,
    SqliteDetectionStore,
};

#[derive(Parser)]
#[command(name = "heatmap-cleanup", version, about = "Retire cleaned garbage detections")]
struct Cli {
    /// Path to the SQLite detections database
    #[arg(long)]
    db: PathBuf,

    /// Optional JSON configuration (thresholds, interval, batch size)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single cleanup pass and print its statistics
    Once,
    /// Run cleanup on an interval until interrupted
    Watch {
        /// Override the configured interval
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Count active, cleaned and invalid detections
    Census,
    /// Print the current heatmap without deleting anything
    Heatmap,
    /// Load a JSON array of raw detection documents
    Import { file: PathBuf },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeatmapReport {
    summary: heatmap_reconciler::HeatmapSummary,
    processing: ProcessingStats,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => HeatmapConfig::from_json_file(path)?,
        None => HeatmapConfig::default(),
    };

    let db_path = cli.db.to_string_lossy().into_owned();
    let store = Arc::new(SqliteDetectionStore::new(&db_path)?);
    let scheduler = CleanupScheduler::new(Arc::clone(&store), config);

    match cli.command {
        Command::Once => {
            let stats = scheduler.run_once().await?;
            print_json(&stats)?;
        }
        Command::Watch { interval_secs } => {
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.cleanup.interval());
            let handle = scheduler.start(interval);

            tokio::signal::ctrl_c().await?;
            info!("Interrupted, shutting down cleanup service");
            scheduler.stop(&handle);
            handle.join().await;

            print_json(&scheduler.totals())?;
        }
        Command::Census => {
            print_json(&scheduler.census().await?)?;
        }
        Command::Heatmap => {
            let records = store.list_detections().await?;
            let result = reconcile(&records, &config.proximity);
            print_json(&HeatmapReport {
                summary: summarize(&result),
                processing: ProcessingStats::from_result(&result),
            })?;
        }
        Command::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let documents: Vec<Value> = serde_json::from_str(&json)?;
            let mut imported = 0;
            for document in &documents {
                store.insert_document(document)?;
                imported += 1;
            }
            info!("Imported {} detections from {}", imported, file.display());
        }
    }

    Ok(())
}

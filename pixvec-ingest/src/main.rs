//! pixvec-ingest - dataset embedding and image upload
//!
//! `embed` vectorizes every dataset row through the vision service and writes
//! the merged dataset; `upload` pushes the image files to a blob container.
//! Per-item failures are logged and counted, the process still exits 0.
//! Startup errors and store write errors exit non-zero.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pixvec_common::config::{ConfigFileResolver, LoggingConfig};
use pixvec_ingest::config::{BlobSettings, VisionSettings};
use pixvec_ingest::services::{BlobContainerClient, VectorizeMode, VisionCaller, VisionClient};
use pixvec_ingest::workflow::{EmbeddingPipeline, UploadPipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pixvec-ingest")]
#[command(about = "Embed an image dataset and upload its images")]
#[command(version)]
struct Cli {
    /// Config file (overrides PIXVEC_CONFIG and the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Vectorize every dataset row and write the merged dataset
    Embed {
        #[arg(short, long, value_enum, default_value_t = Mode::LocalFile)]
        mode: Mode,
    },
    /// Upload the images of the merged dataset to the blob container
    Upload,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    LocalFile,
    ImageUrl,
    Text,
}

impl From<Mode> for VectorizeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::LocalFile => VectorizeMode::LocalFile,
            Mode::ImageUrl => VectorizeMode::ImageUrl,
            Mode::Text => VectorizeMode::Text,
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Source is logged after tracing init
    let (config, config_source) = ConfigFileResolver::new(cli.config.clone())
        .load_with_source()
        .context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    info!(
        "Starting pixvec-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("PIXVEC_GIT_HASH"),
        env!("PIXVEC_BUILD_TIMESTAMP"),
        env!("PIXVEC_BUILD_PROFILE")
    );
    config_source.log();

    match cli.command {
        Command::Embed { mode } => {
            let mode = VectorizeMode::from(mode);
            let pipeline = EmbeddingPipeline::from_config(&config, mode)?;
            let client = Arc::new(VisionClient::new(VisionSettings::resolve(&config)?)?);
            let caller = VisionCaller::new(client, mode);

            let report = pipeline.run(&caller).await?;
            info!(
                run_id = %report.summary.run_id,
                skipped = report.summary.skipped,
                joined_rows = report.reconcile.joined_rows,
                "Embedding finished: {}/{} items succeeded",
                report.summary.succeeded,
                report.summary.processed
            );
        }
        Command::Upload => {
            let pipeline = UploadPipeline::from_config(&config)?;
            let client = BlobContainerClient::new(BlobSettings::resolve(&config)?)?;

            let summary = pipeline.run(&client).await?;
            info!(
                run_id = %summary.run_id,
                container = client.container(),
                "Upload finished: {}/{} images uploaded",
                summary.succeeded,
                summary.processed
            );
        }
    }

    Ok(())
}

//! Scene generation CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use scenegen_models::{BatchManifest, ImageProvider, SceneResult, VideoProvider};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scenegen_worker::commands::{self, GenerateOptions};
use scenegen_worker::config::{AppConfig, DEFAULT_CONFIG_FILE};
use scenegen_worker::{ProgressCallback, WorkerError};

#[derive(Debug, Parser)]
#[command(
    name = "scenegen",
    version,
    about = "Generate scene images and videos from a batch manifest"
)]
struct Cli {
    /// INI configuration file
    #[arg(long, global = true, env = "SCENEGEN_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level for scenegen crates (overrides RUST_LOG)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a batch manifest
    Generate(GenerateArgs),
    /// Resume outstanding video jobs of a previous run
    Query(QueryArgs),
    /// Rebuild interactive_data.json from generation_report.json
    RegenerateInteractive {
        #[arg(long)]
        output_dir: PathBuf,
    },
    /// Print the JSON schema of the batch manifest
    ManifestSchema,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    manifest: PathBuf,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Only run these time slots and merge into the existing report
    #[arg(long, value_delimiter = ',')]
    time_slots: Vec<String>,

    #[arg(long)]
    image_model: Option<ImageProvider>,

    #[arg(long)]
    video_model: Option<VideoProvider>,

    #[arg(long)]
    max_workers: Option<usize>,
}

#[derive(Debug, Args)]
struct QueryArgs {
    #[arg(long)]
    output_dir: PathBuf,

    /// Give up on jobs still running after this many seconds
    #[arg(long, default_value_t = 3600)]
    max_poll_seconds: u64,
}

fn init_tracing(log_level: Option<&str>) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = match log_level {
        Some(level) => EnvFilter::new(format!("scenegen={}", level)),
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scenegen=info"))
        }
    };

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn progress_logger() -> ProgressCallback {
    Arc::new(|result: &SceneResult, finished: usize, total: usize| {
        let outcome = match &result.failure {
            Some(reason) => reason.to_string(),
            None if result.has_video() => "complete".to_string(),
            None => "image only".to_string(),
        };
        info!(
            scene = %result.identity.scene_name(),
            finished = finished,
            total = total,
            "Scene finished: {}",
            outcome
        );
    })
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Generate(args) => {
            let config = AppConfig::load(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?;
            let options = GenerateOptions {
                manifest: args.manifest,
                output_dir: args.output_dir,
                time_slots: args.time_slots,
                image_model: args.image_model,
                video_model: args.video_model,
                max_workers: args.max_workers,
            };

            let report = commands::generate(&config, &options, Some(progress_logger())).await?;
            info!(
                output_dir = %report.output_dir.display(),
                scenes = report.scene_count(),
                images = report.summary().total.images,
                videos = report.summary().total.videos,
                "Generation complete"
            );
        }
        Command::Query(args) => {
            let config = AppConfig::load(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?;
            let summary = commands::query(
                &config,
                &args.output_dir,
                Duration::from_secs(args.max_poll_seconds),
            )
            .await?;
            if summary.pending > 0 {
                warn!(
                    pending = summary.pending,
                    "Some video jobs are still running; query again later"
                );
            }
        }
        Command::RegenerateInteractive { output_dir } => {
            let index = commands::regenerate_interactive(&output_dir).await?;
            info!(events = index.events.len(), "Interactive index written");
        }
        Command::ManifestSchema => {
            let schema = schemars::schema_for!(BatchManifest);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider().install_default().ok();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    if let Err(e) = run(cli).await {
        if let Some(WorkerError::NothingToDo(reason)) = e.downcast_ref::<WorkerError>() {
            warn!("Nothing to do: {}", reason);
            return;
        }
        error!("{:#}", e);
        std::process::exit(1);
    }
}

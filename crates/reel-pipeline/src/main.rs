//! Pipeline worker binary.
//!
//! Reads the shot list produced by the upstream scripting stage, runs the
//! generation + assembly pipeline into a run directory, and writes the
//! machine-readable summary there.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_gen::HttpGenClient;
use reel_models::{default_renditions, RunId, RunPhase, ShotSpec};
use reel_pipeline::{Pipeline, PipelineConfig};
use reel_store::ClipStore;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("reel_pipeline=info".parse().unwrap())
        .add_directive("reel_gen=info".parse().unwrap())
        .add_directive("reel_media=info".parse().unwrap())
        .add_directive("reel_store=info".parse().unwrap());

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
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting reel-worker");

    let config = PipelineConfig::from_env();
    info!("Pipeline config: {:?}", config);

    let shots_file = match std::env::var("SHOTS_FILE") {
        Ok(path) => PathBuf::from(path),
        Err(_) => {
            error!("SHOTS_FILE is required (path to the shot list JSON)");
            std::process::exit(2);
        }
    };
    let shots: Vec<ShotSpec> = match load_shots(&shots_file).await {
        Ok(shots) => shots,
        Err(e) => {
            error!("Failed to load shot list {}: {}", shots_file.display(), e);
            std::process::exit(2);
        }
    };
    info!("Loaded {} shots from {}", shots.len(), shots_file.display());

    let run_id = std::env::var("RUN_ID")
        .map(RunId::from_string)
        .unwrap_or_default();
    let runs_root = std::env::var("RUN_DIR").unwrap_or_else(|_| "runs".to_string());
    let run_dir = PathBuf::from(runs_root).join(run_id.as_str());

    let store = match ClipStore::open(&run_dir).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open run directory {}: {}", run_dir.display(), e);
            std::process::exit(1);
        }
    };

    let generator = match HttpGenClient::from_env() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create generation client: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = Arc::new(Pipeline::new(run_id.clone(), store, generator, config));

    // Ctrl-C requests cooperative cancellation; in-flight generations are
    // abandoned, state stays resumable.
    let cancel_pipeline = Arc::clone(&pipeline);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling run");
            cancel_pipeline.cancel();
        }
    });

    match pipeline.run(shots, &default_renditions()).await {
        Ok(summary) => {
            info!(
                "Run {} finished: {} ({} completed, {} failed, summary at {})",
                run_id,
                summary.phase,
                summary.shots_completed,
                summary.shots_failed,
                run_dir.join("summary.json").display()
            );
            if summary.phase != RunPhase::Completed {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Pipeline run failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn load_shots(path: &PathBuf) -> Result<Vec<ShotSpec>, Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(path).await?;
    let mut shots: Vec<ShotSpec> = serde_json::from_slice(&bytes)?;
    shots.sort_by_key(|s| s.id);
    Ok(shots)
}

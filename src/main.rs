use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use playlist_gnn::config::Config;
use playlist_gnn::graph::{ArtifactStore, GraphBuilder, NullPolicy};
use playlist_gnn::routes::{create_router, AppState};
use playlist_gnn::services::RecommendationEngine;
use playlist_gnn::training::Trainer;

#[derive(Parser, Debug)]
#[command(name = "playlist-gnn")]
#[command(about = "Build the playlist graph, train the recommender, and serve it")]
struct Cli {
    #[command(subcommand)]
    stage: Stage,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Join raw playlists with track features and persist the graph artifacts
    Process,
    /// Train on the persisted graph and save the model weights
    Train,
    /// Process, then train
    All,
    /// Load the trained artifacts and start the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let store = ArtifactStore::new(&config.artifacts_dir);

    match cli.stage {
        Stage::Process => process(&config, &store)?,
        Stage::Train => train(&config, &store)?,
        Stage::All => {
            process(&config, &store)?;
            train(&config, &store)?;
        }
        Stage::Serve => serve(&config).await?,
    }
    Ok(())
}

fn process(config: &Config, store: &ArtifactStore) -> anyhow::Result<()> {
    tracing::info!(
        data_dir = %config.data_dir,
        features = %config.features_path,
        "Processing raw data"
    );
    GraphBuilder::new(NullPolicy::DropRow)
        .process(
            Path::new(&config.data_dir),
            Path::new(&config.features_path),
            store,
        )
        .context("graph processing failed")?;
    Ok(())
}

fn train(config: &Config, store: &ArtifactStore) -> anyhow::Result<()> {
    let report = Trainer::new(config.training())
        .run(store)
        .context("training failed")?;
    if let Some(last) = report.final_epoch() {
        tracing::info!(
            epoch = last.epoch,
            loss = last.loss,
            val_auc = ?last.val_auc,
            test_auc = ?last.test_auc,
            "Final metrics"
        );
    }
    Ok(())
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let state = AppState::new(config.fetch_size);

    let dir = config.artifacts_dir.clone();
    match tokio::task::spawn_blocking(move || RecommendationEngine::initialize(dir)).await? {
        Ok(engine) => state.install(Arc::new(engine)).await,
        Err(e) => {
            tracing::error!(
                error = %e,
                "Could not load recommender; serving 503 until artifacts are fixed"
            );
        }
    }

    let app = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

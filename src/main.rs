mod config;

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use propline_api::{app, AppState};
use propline_db::{DatabaseConnection, PgStore};
use propline_ml::FsArtifactStore;
use propline_models::CategoryKey;
use propline_services::{
    Metrics, ModelRegistry, PredictionBackfillJob, PredictorService, StreakAggregationJob,
    TrainingJob, TrainingOutcome,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "propline", version, about = "Win/loss predictions for player prop bets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve predictions over HTTP
    Serve,
    /// Rebuild streak profiles from recent resolved props
    Aggregate,
    /// Train and persist per-category models
    Train {
        /// Train only this category (any accepted label); all categories otherwise
        #[arg(long)]
        category: Option<String>,
    },
    /// Score unpredicted labeled props with the stored models and report accuracy
    Score,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "propline=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::new()?;
    info!(artifacts = %config.artifacts.directory, "Configuration loaded");

    match cli.command {
        Command::Serve => serve(&config).await,
        Command::Aggregate => aggregate(&config).await,
        Command::Train { category } => train(&config, category.as_deref()).await,
        Command::Score => score(&config).await,
    }
}

async fn connect(config: &AppConfig) -> Result<Arc<PgStore>> {
    let db =
        DatabaseConnection::new(&config.database.url, config.database.max_connections).await?;
    db.run_migrations().await?;
    Ok(Arc::new(PgStore::new(db.pool().clone(), config.normalizer()?)))
}

async fn serve(config: &AppConfig) -> Result<()> {
    let store = connect(config).await?;
    let metrics = Metrics::new()?;

    let artifacts = Arc::new(FsArtifactStore::new(&config.artifacts.directory));
    let registry = Arc::new(ModelRegistry::new(artifacts).with_metrics(metrics.clone()));
    let predictor = PredictorService::new(Arc::new(config.normalizer()?), registry)
        .with_profiles(store)
        .with_metrics(metrics.clone());

    let router = app(AppState::new(Arc::new(predictor), metrics));
    let listener = tokio::net::TcpListener::bind(config.server_addr()).await?;
    info!(addr = %config.server_addr(), "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn aggregate(config: &AppConfig) -> Result<()> {
    let store = connect(config).await?;
    let job = StreakAggregationJob::new(store.clone(), store)
        .with_options(config.aggregation_options())
        .with_lookback_days(config.aggregation.lookback_days);

    let report = job.run().await?;
    info!(
        since = %report.since,
        records = report.records,
        profiles = report.profiles,
        "Aggregation complete"
    );
    Ok(())
}

async fn train(config: &AppConfig, category: Option<&str>) -> Result<()> {
    let categories = match category {
        Some(label) => vec![config.normalizer()?.resolve(label)?],
        None => CategoryKey::ALL.to_vec(),
    };

    let store = connect(config).await?;
    let artifacts = Arc::new(FsArtifactStore::new(&config.artifacts.directory));
    let job = TrainingJob::new(store.clone(), store, artifacts, config.ensemble_params())
        .with_aggregation(config.aggregation_options())
        .with_lookback_days(config.aggregation.lookback_days);

    let report = job.retrain_all(&categories).await;
    for (category, outcome) in &report.results {
        match outcome {
            TrainingOutcome::Trained(summary) => info!(
                %category,
                sampled = summary.sample_size(),
                accuracy = summary.metrics.accuracy,
                brier = summary.metrics.brier_score,
                "Trained"
            ),
            TrainingOutcome::Failed(e) => {
                warn!(%category, kind = e.kind(), error = %e, "Not trained")
            }
        }
    }

    if report.trained() == 0 {
        bail!("no category trained ({} failed)", report.failed());
    }
    Ok(())
}

async fn score(config: &AppConfig) -> Result<()> {
    let store = connect(config).await?;
    let artifacts = Arc::new(FsArtifactStore::new(&config.artifacts.directory));
    let registry = Arc::new(ModelRegistry::new(artifacts));
    let job = PredictionBackfillJob::new(store.clone(), registry, store)
        .with_aggregation(config.aggregation_options())
        .with_lookback_days(config.aggregation.lookback_days)
        .with_batch_size(config.scoring.batch_size);

    let report = job.run().await?;
    info!(
        categories = report.categories,
        fetched = report.fetched,
        scored = report.scored,
        "Scoring complete"
    );

    for bucket in job.recent_accuracy(config.scoring.accuracy_days).await? {
        info!(
            category = %bucket.category,
            predictions = bucket.predictions,
            accuracy = bucket.accuracy(),
            days = config.scoring.accuracy_days,
            "Realized accuracy"
        );
    }
    Ok(())
}

// Batch training across categories

use std::sync::Arc;

use propline_db::{OutcomeSource, TrainingSource};
use propline_ml::{ArtifactStore, EnsembleParams, ModelTrainer, TrainingSummary};
use propline_models::{CategoryKey, PropError, Result};
use tracing::{error, info};

use crate::aggregator::{AggregationOptions, HistoryBackfill};
use crate::metrics::Metrics;

#[derive(Debug)]
pub enum TrainingOutcome {
    Trained(TrainingSummary),
    Failed(PropError),
}

impl TrainingOutcome {
    pub fn is_trained(&self) -> bool {
        matches!(self, Self::Trained(_))
    }
}

#[derive(Debug, Default)]
pub struct RetrainReport {
    pub results: Vec<(CategoryKey, TrainingOutcome)>,
}

impl RetrainReport {
    pub fn trained(&self) -> usize {
        self.results.iter().filter(|(_, outcome)| outcome.is_trained()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.trained()
    }

    pub fn outcome(&self, category: CategoryKey) -> Option<&TrainingOutcome> {
        self.results.iter().find(|(c, _)| *c == category).map(|(_, outcome)| outcome)
    }
}

pub struct TrainingJob {
    source: Arc<dyn TrainingSource>,
    history: HistoryBackfill,
    artifacts: Arc<dyn ArtifactStore>,
    params: EnsembleParams,
    metrics: Option<Metrics>,
}

impl TrainingJob {
    /// Missing streak columns of labeled rows are rebuilt from `history`, the
    /// resolved outcomes the aggregation job reads.
    pub fn new(
        source: Arc<dyn TrainingSource>,
        history: Arc<dyn OutcomeSource>,
        artifacts: Arc<dyn ArtifactStore>,
        params: EnsembleParams,
    ) -> Self {
        Self {
            source,
            history: HistoryBackfill::new(history),
            artifacts,
            params,
            metrics: None,
        }
    }

    /// Must match the aggregation job's options.
    pub fn with_aggregation(mut self, options: AggregationOptions) -> Self {
        self.history = self.history.with_options(options);
        self
    }

    /// Must match the aggregation job's lookback.
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.history = self.history.with_lookback_days(days);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fetch, fit and persist one category. The stored artifact is replaced only
    /// when every step succeeds.
    pub async fn train(&self, category: CategoryKey) -> Result<TrainingSummary> {
        let result = self.fit_and_persist(category).await;
        if let Some(metrics) = &self.metrics {
            let label = match &result {
                Ok(_) => "trained",
                Err(e) => e.kind(),
            };
            metrics.inc_training_run(category.as_str(), label);
        }
        result
    }

    /// Trains every category independently. A failure is recorded and the loop
    /// moves on.
    pub async fn retrain_all(&self, categories: &[CategoryKey]) -> RetrainReport {
        let mut report = RetrainReport::default();
        for &category in categories {
            let outcome = match self.train(category).await {
                Ok(summary) => TrainingOutcome::Trained(summary),
                Err(e) => {
                    error!(%category, error = %e, kind = e.kind(), "Training failed");
                    TrainingOutcome::Failed(e)
                }
            };
            report.results.push((category, outcome));
        }

        info!(trained = report.trained(), failed = report.failed(), "Retrain finished");
        report
    }

    async fn fit_and_persist(&self, category: CategoryKey) -> Result<TrainingSummary> {
        let mut rows = self.source.fetch_labeled(category).await?;
        let backfilled = self.history.fill(&mut rows).await?;
        info!(%category, rows = rows.len(), backfilled, "Fetched training data");

        let trainer = ModelTrainer::new(self.params);
        let artifact = tokio::task::spawn_blocking(move || trainer.train(category, &rows))
            .await
            .map_err(|e| PropError::TrainingFailed {
                category,
                reason: e.to_string(),
            })??;

        self.artifacts.save(&artifact).await?;
        Ok(artifact.summary().clone())
    }
}

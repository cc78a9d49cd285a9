// After-the-fact scoring of labeled props and realized accuracy

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use propline_db::{OutcomeSource, PredictionLedger};
use propline_ml::{build_features, FeatureInput, ModelArtifact, WinClassifier};
use propline_models::{CategoryKey, PropError, Result, ScoredPrediction};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::{AggregationOptions, HistoryBackfill};
use crate::metrics::Metrics;
use crate::registry::ModelRegistry;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoringReport {
    /// Categories with a usable model.
    pub categories: usize,
    pub fetched: usize,
    pub scored: usize,
    pub backfilled: usize,
}

/// Realized accuracy of one category, optionally within one week. Pushes
/// are not counted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyBucket {
    pub category: CategoryKey,
    /// Monday of the week, when bucketed by week.
    pub week_start: Option<NaiveDate>,
    pub predictions: usize,
    pub correct: usize,
}

impl AccuracyBucket {
    pub fn accuracy(&self) -> f64 {
        if self.predictions == 0 {
            0.0
        } else {
            self.correct as f64 / self.predictions as f64
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn bucket(
    scores: &[ScoredPrediction],
    week_of: impl Fn(&ScoredPrediction) -> Option<NaiveDate>,
) -> Vec<AccuracyBucket> {
    let mut buckets: BTreeMap<(CategoryKey, Option<NaiveDate>), (usize, usize)> = BTreeMap::new();
    for score in scores {
        let Some(correct) = score.was_correct else {
            continue;
        };
        let entry = buckets.entry((score.category, week_of(score))).or_default();
        entry.0 += 1;
        entry.1 += usize::from(correct);
    }

    buckets
        .into_iter()
        .map(|((category, week_start), (predictions, correct))| AccuracyBucket {
            category,
            week_start,
            predictions,
            correct,
        })
        .collect()
}

pub fn accuracy_by_category(scores: &[ScoredPrediction]) -> Vec<AccuracyBucket> {
    bucket(scores, |_| None)
}

/// Ordered by category, then week.
pub fn accuracy_by_week(scores: &[ScoredPrediction]) -> Vec<AccuracyBucket> {
    bucket(scores, |score| Some(week_start(score.game_date)))
}

/// Scores labeled rows that have never been predicted with the current model
/// of their category, and writes the prediction, its confidence and whether
/// it was right back onto the row.
pub struct PredictionBackfillJob {
    ledger: Arc<dyn PredictionLedger>,
    registry: Arc<ModelRegistry>,
    history: HistoryBackfill,
    categories: Vec<CategoryKey>,
    batch_size: usize,
    metrics: Option<Metrics>,
}

impl PredictionBackfillJob {
    pub fn new(
        ledger: Arc<dyn PredictionLedger>,
        registry: Arc<ModelRegistry>,
        history: Arc<dyn OutcomeSource>,
    ) -> Self {
        Self {
            ledger,
            registry,
            history: HistoryBackfill::new(history),
            categories: CategoryKey::ALL.to_vec(),
            batch_size: DEFAULT_BATCH_SIZE,
            metrics: None,
        }
    }

    pub fn with_aggregation(mut self, options: AggregationOptions) -> Self {
        self.history = self.history.with_options(options);
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.history = self.history.with_lookback_days(days);
        self
    }

    pub fn with_categories(mut self, categories: Vec<CategoryKey>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Scores one batch. Categories without a usable model are left alone so
    /// their rows wait for the next trained artifact.
    pub async fn run(&self) -> Result<ScoringReport> {
        let models = self.usable_models().await;
        if models.is_empty() {
            warn!("No trained models, nothing to score");
            return Ok(ScoringReport::default());
        }

        let categories: Vec<CategoryKey> = models.keys().copied().collect();
        let mut rows = self.ledger.fetch_unscored(&categories, self.batch_size).await?;
        if rows.is_empty() {
            info!(categories = categories.len(), "No unscored rows");
            return Ok(ScoringReport {
                categories: categories.len(),
                ..ScoringReport::default()
            });
        }
        let backfilled = self.history.fill(&mut rows).await?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(model) = models.get(&row.record.category) else {
                continue;
            };
            let input = FeatureInput::from_training_row(row, model.opponent_encoder());
            let win_probability = model.win_probability(&build_features(&input));
            scores.push(ScoredPrediction::new(&row.record, win_probability));
        }

        let scored = self.ledger.record_scores(&scores).await?;
        if let Some(metrics) = &self.metrics {
            for score in &scores {
                let result = match score.was_correct {
                    Some(true) => "correct",
                    Some(false) => "incorrect",
                    None => "push",
                };
                metrics.inc_scored_prediction(score.category.as_str(), result);
            }
        }

        info!(fetched = rows.len(), scored, backfilled, "Scored labeled props");
        Ok(ScoringReport {
            categories: categories.len(),
            fetched: rows.len(),
            scored,
            backfilled,
        })
    }

    /// Realized accuracy per category over rows dated `since` or later.
    pub async fn accuracy_since(&self, since: NaiveDate) -> Result<Vec<AccuracyBucket>> {
        let scores = self.ledger.fetch_scored_since(since).await?;
        Ok(accuracy_by_category(&scores))
    }

    pub async fn weekly_accuracy_since(&self, since: NaiveDate) -> Result<Vec<AccuracyBucket>> {
        let scores = self.ledger.fetch_scored_since(since).await?;
        Ok(accuracy_by_week(&scores))
    }

    pub async fn recent_accuracy(&self, days: u32) -> Result<Vec<AccuracyBucket>> {
        let since = Utc::now().date_naive() - Duration::days(i64::from(days));
        self.accuracy_since(since).await
    }

    async fn usable_models(&self) -> BTreeMap<CategoryKey, Arc<ModelArtifact>> {
        let mut models = BTreeMap::new();
        for &category in &self.categories {
            match self.registry.resolve(category).await {
                Ok(model) => {
                    models.insert(category, model);
                }
                Err(PropError::ModelNotFound { .. }) => {
                    debug!(%category, "No model, skipping category");
                }
                Err(e) => {
                    warn!(%category, kind = e.kind(), error = %e, "Skipping category");
                }
            }
        }
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use propline_db::MemoryStore;
    use propline_ml::{ArtifactStore, EnsembleParams, MemoryArtifactStore, ModelTrainer};
    use propline_models::{Outcome, OutcomeRecord, PredictedOutcome, TrainingRow};
    use uuid::Uuid;

    mock! {
        pub Ledger {}

        #[async_trait]
        impl PredictionLedger for Ledger {
            async fn fetch_unscored(
                &self,
                categories: &[CategoryKey],
                limit: usize,
            ) -> Result<Vec<TrainingRow>>;
            async fn record_scores(&self, scores: &[ScoredPrediction]) -> Result<usize>;
            async fn fetch_scored_since(&self, since: NaiveDate) -> Result<Vec<ScoredPrediction>>;
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    /// Hot players win, cold players lose.
    fn labeled(category: CategoryKey) -> Vec<TrainingRow> {
        (0..40)
            .map(|i| {
                let win = i % 2 == 0;
                let outcome = if win { Outcome::Win } else { Outcome::Loss };
                let player = format!("p{i}");
                let record = OutcomeRecord::new(player, category, 0.5, outcome, day(1));
                let stats = if win { (0.9, 4) } else { (0.1, 0) };
                TrainingRow::new(record).with_stats(stats.0, stats.1, stats.1)
            })
            .collect()
    }

    async fn registry_with(categories: &[CategoryKey]) -> Arc<ModelRegistry> {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let params = EnsembleParams {
            n_trees: 5,
            max_depth: 3,
            ..EnsembleParams::default()
        };
        for &category in categories {
            let artifact = ModelTrainer::new(params)
                .train(category, &labeled(category))
                .unwrap();
            artifacts.save(&artifact).await.unwrap();
        }
        Arc::new(ModelRegistry::new(artifacts))
    }

    fn scored(
        category: CategoryKey,
        date: NaiveDate,
        was_correct: Option<bool>,
    ) -> ScoredPrediction {
        ScoredPrediction {
            record_id: Uuid::new_v4(),
            category,
            game_date: date,
            outcome: Outcome::Win,
            predicted_outcome: PredictedOutcome::Win,
            confidence_score: 0.6,
            was_correct,
        }
    }

    fn pending(player: &str, outcome: Outcome, date: NaiveDate) -> TrainingRow {
        TrainingRow::new(OutcomeRecord::new(player, CategoryKey::Hits, 0.5, outcome, date))
    }

    #[tokio::test]
    async fn test_backfill_scores_and_marks_correctness() {
        let hot = pending("hot", Outcome::Loss, day(9)).with_stats(0.9, 4, 4);
        let cold = pending("cold", Outcome::Loss, day(9)).with_stats(0.1, 0, 0);
        let rows = vec![hot.clone(), cold.clone()];
        let store = Arc::new(MemoryStore::new().with_training_rows(rows));
        let metrics = Metrics::new().unwrap();
        let job = PredictionBackfillJob::new(
            store.clone(),
            registry_with(&[CategoryKey::Hits]).await,
            store.clone(),
        )
        .with_metrics(metrics.clone());

        let report = job.run().await.unwrap();
        assert_eq!(report.categories, 1);
        assert_eq!(report.fetched, 2);
        assert_eq!(report.scored, 2);
        assert_eq!(report.backfilled, 0);

        let hot = store.score_for(hot.record.id).unwrap();
        assert_eq!(hot.predicted_outcome, PredictedOutcome::Win);
        assert_eq!(hot.was_correct, Some(false));
        assert!(hot.confidence_score >= 0.5);
        let cold = store.score_for(cold.record.id).unwrap();
        assert_eq!(cold.predicted_outcome, PredictedOutcome::Loss);
        assert_eq!(cold.was_correct, Some(true));

        // Already scored rows are not scored again.
        assert_eq!(job.run().await.unwrap().fetched, 0);

        let accuracy = job.accuracy_since(day(1)).await.unwrap();
        assert_eq!(accuracy.len(), 1);
        assert_eq!(accuracy[0].predictions, 2);
        assert_eq!(accuracy[0].accuracy(), 0.5);
        let rendered = metrics.render();
        assert!(rendered
            .contains(r#"propline_scored_predictions_total{category="hits",result="correct"} 1"#));
    }

    #[tokio::test]
    async fn test_rows_without_a_model_stay_unscored() {
        let walks = labeled(CategoryKey::Walks);
        let store = Arc::new(MemoryStore::new().with_training_rows(walks.clone()));
        let job = PredictionBackfillJob::new(
            store.clone(),
            registry_with(&[CategoryKey::Hits]).await,
            store.clone(),
        );

        let report = job.run().await.unwrap();
        assert_eq!(report.categories, 1);
        assert_eq!(report.scored, 0);
        assert!(store.score_for(walks[0].record.id).is_none());
    }

    #[tokio::test]
    async fn test_missing_streaks_come_from_history() {
        let history: Vec<OutcomeRecord> = (5..=9)
            .map(|d| OutcomeRecord::new("hot", CategoryKey::Hits, 0.5, Outcome::Win, day(d)))
            .collect();
        let row = pending("hot", Outcome::Win, day(10));
        let store = Arc::new(
            MemoryStore::new()
                .with_outcomes(history)
                .with_training_rows(vec![row.clone()]),
        );
        let job = PredictionBackfillJob::new(
            store.clone(),
            registry_with(&[CategoryKey::Hits]).await,
            store.clone(),
        );

        let report = job.run().await.unwrap();
        assert_eq!(report.backfilled, 1);
        let score = store.score_for(row.record.id).unwrap();
        assert_eq!(score.predicted_outcome, PredictedOutcome::Win);
        assert_eq!(score.was_correct, Some(true));
    }

    #[tokio::test]
    async fn test_batch_size_bounds_the_fetch() {
        let mut ledger = MockLedger::new();
        ledger
            .expect_fetch_unscored()
            .withf(|categories, limit| {
                categories.to_vec() == vec![CategoryKey::Hits] && *limit == 25
            })
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        ledger.expect_record_scores().never();

        let job = PredictionBackfillJob::new(
            Arc::new(ledger),
            registry_with(&[CategoryKey::Hits]).await,
            Arc::new(MemoryStore::new()),
        )
        .with_batch_size(25);

        assert_eq!(job.run().await.unwrap().fetched, 0);
    }

    #[tokio::test]
    async fn test_ledger_outage_fails_the_run() {
        let mut ledger = MockLedger::new();
        ledger
            .expect_fetch_unscored()
            .returning(|_, _| Err(PropError::upstream("connection reset")));

        let job = PredictionBackfillJob::new(
            Arc::new(ledger),
            registry_with(&[CategoryKey::Hits]).await,
            Arc::new(MemoryStore::new()),
        );

        let err = job.run().await.unwrap_err();
        assert_eq!(err.kind(), "upstream_unavailable");
    }

    #[test]
    fn test_accuracy_excludes_pushes() {
        let scores = vec![
            scored(CategoryKey::Hits, day(1), Some(true)),
            scored(CategoryKey::Hits, day(2), Some(false)),
            scored(CategoryKey::Hits, day(3), None),
            scored(CategoryKey::Hits, day(4), Some(true)),
            scored(CategoryKey::Walks, day(4), Some(false)),
        ];

        let buckets = accuracy_by_category(&scores);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].category, CategoryKey::Hits);
        assert_eq!(buckets[0].predictions, 3);
        assert_eq!(buckets[0].correct, 2);
        assert_eq!(buckets[1].accuracy(), 0.0);
        assert!(buckets.iter().all(|b| b.week_start.is_none()));
    }

    #[test]
    fn test_weekly_buckets_start_on_monday() {
        // 2025-07-06 is a Sunday, 2025-07-07 a Monday.
        let scores = vec![
            scored(CategoryKey::Hits, day(6), Some(true)),
            scored(CategoryKey::Hits, day(7), Some(false)),
            scored(CategoryKey::Hits, day(13), Some(true)),
        ];

        let weeks = accuracy_by_week(&scores);
        let starts: Vec<Option<NaiveDate>> = weeks.iter().map(|w| w.week_start).collect();
        let june_30 = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        assert_eq!(starts, vec![Some(june_30), Some(day(7))]);
        assert_eq!(weeks[1].predictions, 2);
        assert_eq!(weeks[1].accuracy(), 0.5);
    }
}

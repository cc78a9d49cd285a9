// Per-category model training with class balancing

use ndarray::Array1;
use propline_models::{CategoryKey, FeatureVector, Outcome, PropError, Result, TrainingRow};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifacts::ModelArtifact;
use crate::evaluation::{evaluate, TrainingMetrics};
use crate::features::{build_features, FeatureInput, OpponentEncoder};
use crate::models::{feature_matrix, BaggedTreeClassifier, EnsembleParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub category: CategoryKey,
    pub available_wins: usize,
    pub available_losses: usize,
    /// Rows drawn from each class; the fitted sample holds twice this many.
    pub sampled_per_class: usize,
    pub metrics: TrainingMetrics,
}

impl TrainingSummary {
    pub fn sample_size(&self) -> usize {
        self.sampled_per_class * 2
    }
}

/// Equal-sized random draw from the win and loss subsets, shuffled together.
pub fn balanced_sample<'a>(
    category: CategoryKey,
    wins: &[&'a TrainingRow],
    losses: &[&'a TrainingRow],
    rng: &mut StdRng,
) -> Result<Vec<&'a TrainingRow>> {
    if wins.is_empty() || losses.is_empty() {
        return Err(PropError::InsufficientVariation {
            category,
            wins: wins.len(),
            losses: losses.len(),
        });
    }

    let per_class = wins.len().min(losses.len());
    let mut sample: Vec<&TrainingRow> = wins.choose_multiple(rng, per_class).copied().collect();
    sample.extend(losses.choose_multiple(rng, per_class).copied());
    sample.shuffle(rng);
    Ok(sample)
}

pub struct ModelTrainer {
    params: EnsembleParams,
}

impl ModelTrainer {
    pub fn new(params: EnsembleParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &EnsembleParams {
        &self.params
    }

    /// Fits one classifier from every resolved row of `category`. Persisting the
    /// result is the caller's job.
    pub fn train(&self, category: CategoryKey, rows: &[TrainingRow]) -> Result<ModelArtifact> {
        let (in_category, foreign): (Vec<&TrainingRow>, Vec<&TrainingRow>) =
            rows.iter().partition(|row| row.record.category == category);
        if !foreign.is_empty() {
            warn!(%category, skipped = foreign.len(), "Ignoring rows from other categories");
        }
        if in_category.is_empty() {
            return Err(PropError::NoData { category });
        }

        let labeled: Vec<&TrainingRow> = in_category
            .into_iter()
            .filter(|row| row.record.outcome.label().is_some())
            .collect();
        let (wins, losses): (Vec<&TrainingRow>, Vec<&TrainingRow>) =
            labeled.iter().copied().partition(|r| r.record.outcome == Outcome::Win);

        // Opponent rates come from the whole labeled history, before balancing.
        let encoder = OpponentEncoder::fit(labeled.iter().copied());

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let sample = balanced_sample(category, &wins, &losses, &mut rng)?;
        let sampled_per_class = sample.len() / 2;

        let vectors: Vec<FeatureVector> = sample
            .iter()
            .map(|row| build_features(&FeatureInput::from_training_row(row, &encoder)))
            .collect();
        let labels: Array1<usize> =
            sample.iter().filter_map(|row| row.record.outcome.label()).collect();
        let records = feature_matrix(&vectors);

        let classifier =
            BaggedTreeClassifier::fit(&records, &labels, self.params).map_err(|e| {
                PropError::TrainingFailed {
                    category,
                    reason: e.to_string(),
                }
            })?;

        let metrics = evaluate(&classifier, &records, &labels);
        info!(
            %category,
            wins = wins.len(),
            losses = losses.len(),
            sampled = sample.len(),
            accuracy = metrics.accuracy,
            "Trained model"
        );
        for importance in &metrics.feature_importances {
            debug!(
                %category,
                feature = %importance.feature,
                importance = importance.importance,
                "Feature importance"
            );
        }

        let summary = TrainingSummary {
            category,
            available_wins: wins.len(),
            available_losses: losses.len(),
            sampled_per_class,
            metrics,
        };

        Ok(ModelArtifact::new(classifier, encoder, summary))
    }
}

// In-sample diagnostics. Reported for observability only; never used to
// accept or reject a model.

use ndarray::{Array1, Array2};
use propline_models::{PredictedOutcome, FEATURE_NAMES};
use serde::{Deserialize, Serialize};

use crate::models::BaggedTreeClassifier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub accuracy: f64,
    pub brier_score: f64,
    pub feature_importances: Vec<FeatureImportance>,
}

pub fn accuracy(probabilities: &Array1<f64>, labels: &Array1<usize>) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = probabilities
        .iter()
        .zip(labels.iter())
        .filter(|(p, label)| {
            let predicted =
                usize::from(PredictedOutcome::from_probability(**p) == PredictedOutcome::Win);
            predicted == **label
        })
        .count();
    correct as f64 / labels.len() as f64
}

pub fn brier_score(probabilities: &Array1<f64>, labels: &Array1<usize>) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = probabilities
        .iter()
        .zip(labels.iter())
        .map(|(p, label)| (p - *label as f64).powi(2))
        .sum();
    total / labels.len() as f64
}

pub fn evaluate(
    model: &BaggedTreeClassifier,
    records: &Array2<f64>,
    labels: &Array1<usize>,
) -> TrainingMetrics {
    let probabilities = model.predict_proba(records);
    let feature_importances = FEATURE_NAMES
        .iter()
        .zip(model.feature_importances())
        .map(|(name, importance)| FeatureImportance {
            feature: (*name).to_string(),
            importance,
        })
        .collect();

    TrainingMetrics {
        accuracy: accuracy(&probabilities, labels),
        brier_score: brier_score(&probabilities, labels),
        feature_importances,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy_uses_inclusive_threshold() {
        let probabilities = array![0.5, 0.49, 0.9, 0.1];
        let labels = array![1, 0, 0, 0];
        assert_eq!(accuracy(&probabilities, &labels), 0.75);
    }

    #[test]
    fn test_brier_score() {
        let probabilities = array![1.0, 0.0, 0.5];
        let labels = array![1, 1, 0];
        assert!((brier_score(&probabilities, &labels) - (1.0 + 0.25) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_inputs() {
        let empty_p = Array1::<f64>::zeros(0);
        let empty_l = Array1::<usize>::zeros(0);
        assert_eq!(accuracy(&empty_p, &empty_l), 0.0);
        assert_eq!(brier_score(&empty_p, &empty_l), 0.0);
    }
}

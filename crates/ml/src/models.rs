// Machine learning models

use std::fmt;

use linfa::prelude::*;
use linfa_trees::DecisionTree;
use ndarray::{arr2, Array1, Array2, Axis};
use propline_models::FeatureVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub trait WinClassifier: Send + Sync {
    fn model_name(&self) -> &str;

    /// Probability of the win class, in `[0, 1]`.
    fn win_probability(&self, features: &FeatureVector) -> f64;
}

#[derive(Error, Debug)]
pub enum FitError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("invalid ensemble parameters: {0}")]
    InvalidParams(String),

    #[error("tree fit failed: {0}")]
    Tree(String),
}

/// Ensemble size and depth bound. Shared by every category; comes from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_weight_split: f32,
    pub seed: u64,
}

impl Default for EnsembleParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 6,
            min_weight_split: 2.0,
            seed: 42,
        }
    }
}

/// Bootstrap-aggregated decision trees. The win probability is the share of
/// trees voting for label 1.
#[derive(Serialize, Deserialize)]
pub struct BaggedTreeClassifier {
    params: EnsembleParams,
    trees: Vec<DecisionTree<f64, usize>>,
}

impl fmt::Debug for BaggedTreeClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaggedTreeClassifier")
            .field("params", &self.params)
            .field("trees", &self.trees.len())
            .finish()
    }
}

impl BaggedTreeClassifier {
    pub const NAME: &'static str = "BaggedTrees";

    /// `records` rows follow `FEATURE_NAMES` order; `targets` hold 0/1 labels.
    pub fn fit(
        records: &Array2<f64>,
        targets: &Array1<usize>,
        params: EnsembleParams,
    ) -> Result<Self, FitError> {
        if params.n_trees == 0 || params.max_depth == 0 {
            return Err(FitError::InvalidParams(format!(
                "n_trees={} max_depth={}",
                params.n_trees, params.max_depth
            )));
        }
        let n = records.nrows();
        if n == 0 || targets.len() != n {
            return Err(FitError::EmptyTrainingSet);
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees);
        for _ in 0..params.n_trees {
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let dataset = Dataset::new(
                records.select(Axis(0), &sample),
                targets.select(Axis(0), &sample),
            );

            let tree = DecisionTree::params()
                .max_depth(Some(params.max_depth))
                .min_weight_split(params.min_weight_split)
                .fit(&dataset)
                .map_err(|e| FitError::Tree(e.to_string()))?;
            trees.push(tree);
        }

        Ok(Self { params, trees })
    }

    pub fn params(&self) -> &EnsembleParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Win probability for every row of `records`.
    pub fn predict_proba(&self, records: &Array2<f64>) -> Array1<f64> {
        let mut votes = Array1::<f64>::zeros(records.nrows());
        for tree in &self.trees {
            let labels: Array1<usize> = tree.predict(records);
            for (vote, label) in votes.iter_mut().zip(labels.iter()) {
                if *label == 1 {
                    *vote += 1.0;
                }
            }
        }
        votes / self.trees.len() as f64
    }

    /// Mean impurity-based importance per feature column.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals: Vec<f64> = Vec::new();
        for tree in &self.trees {
            let importances = tree.feature_importance();
            if totals.is_empty() {
                totals = vec![0.0; importances.len()];
            }
            // A tree that never split reports NaN.
            for (total, value) in totals.iter_mut().zip(importances) {
                if value.is_finite() {
                    *total += value;
                }
            }
        }
        let n = self.trees.len() as f64;
        totals.into_iter().map(|t| t / n).collect()
    }
}

impl WinClassifier for BaggedTreeClassifier {
    fn model_name(&self) -> &str {
        Self::NAME
    }

    fn win_probability(&self, features: &FeatureVector) -> f64 {
        let row = arr2(&[features.to_array()]);
        self.predict_proba(&row)[0]
    }
}

/// Stacks feature vectors into the matrix layout the trees are fit on.
pub fn feature_matrix(vectors: &[FeatureVector]) -> Array2<f64> {
    let mut matrix = Array2::<f64>::zeros((vectors.len(), FeatureVector::LEN));
    for (mut row, vector) in matrix.rows_mut().into_iter().zip(vectors) {
        for (cell, value) in row.iter_mut().zip(vector.to_array()) {
            *cell = value;
        }
    }
    matrix
}

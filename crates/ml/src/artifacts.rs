// Trained model artifacts and where they live

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use propline_models::{CategoryKey, FeatureVector, PropError, Result, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::features::OpponentEncoder;
use crate::models::{BaggedTreeClassifier, WinClassifier};
use crate::training::TrainingSummary;

/// One trained classifier for one category. Immutable once built; a retrain
/// produces a new artifact that replaces the old one wholesale.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    category: CategoryKey,
    model_name: String,
    feature_names: Vec<String>,
    trained_at: DateTime<Utc>,
    summary: TrainingSummary,
    opponent_encoder: OpponentEncoder,
    classifier: BaggedTreeClassifier,
}

impl ModelArtifact {
    pub fn new(
        classifier: BaggedTreeClassifier,
        opponent_encoder: OpponentEncoder,
        summary: TrainingSummary,
    ) -> Self {
        Self {
            category: summary.category,
            model_name: BaggedTreeClassifier::NAME.to_string(),
            feature_names: FEATURE_NAMES.iter().map(|name| (*name).to_string()).collect(),
            trained_at: Utc::now(),
            summary,
            opponent_encoder,
            classifier,
        }
    }

    pub fn category(&self) -> CategoryKey {
        self.category
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn summary(&self) -> &TrainingSummary {
        &self.summary
    }

    /// Dataset-wide opponent win rates seen at training time.
    pub fn opponent_encoder(&self) -> &OpponentEncoder {
        &self.opponent_encoder
    }

    pub fn classifier(&self) -> &BaggedTreeClassifier {
        &self.classifier
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| PropError::persist(self.category, e))
    }

    /// Rejects artifacts written for another category or another column layout.
    pub fn decode(category: CategoryKey, bytes: &[u8]) -> Result<Self> {
        let artifact: Self =
            bincode::deserialize(bytes).map_err(|e| PropError::persist(category, e))?;

        if artifact.category != category {
            return Err(PropError::persist(
                category,
                format!("artifact belongs to {}", artifact.category),
            ));
        }
        if artifact.feature_names != FEATURE_NAMES {
            return Err(PropError::persist(
                category,
                format!(
                    "feature layout {:?} does not match {:?}",
                    artifact.feature_names, FEATURE_NAMES
                ),
            ));
        }
        Ok(artifact)
    }
}

impl WinClassifier for ModelArtifact {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn win_probability(&self, features: &FeatureVector) -> f64 {
        self.classifier.win_probability(features)
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Replaces the stored artifact for the artifact's category. On failure the
    /// previous artifact is left untouched.
    async fn save(&self, artifact: &ModelArtifact) -> Result<()>;

    /// Fails with `ModelNotFound` when nothing was ever saved for `category`.
    async fn load(&self, category: CategoryKey) -> Result<ModelArtifact>;

    async fn exists(&self, category: CategoryKey) -> Result<bool>;
}

/// One `{key}_model.bin` file per category under a directory.
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, category: CategoryKey) -> PathBuf {
        self.dir.join(format!("{}_model.bin", category.as_str()))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        let category = artifact.category();
        let bytes = artifact.encode()?;
        let path = self.path_for(category);
        let staging = self
            .dir
            .join(format!("{}_model.bin.tmp-{}", category.as_str(), Uuid::new_v4()));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PropError::persist(category, e))?;
        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|e| PropError::persist(category, e))?;

        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                warn!(
                    path = %staging.display(),
                    error = %cleanup,
                    "Failed to remove staged artifact"
                );
            }
            return Err(PropError::persist(category, e));
        }

        info!(%category, path = %path.display(), bytes = bytes.len(), "Saved model artifact");
        Ok(())
    }

    async fn load(&self, category: CategoryKey) -> Result<ModelArtifact> {
        let path = self.path_for(category);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PropError::ModelNotFound { category })
            }
            Err(e) => return Err(PropError::persist(category, e)),
        };
        debug!(%category, path = %path.display(), "Read model artifact");
        ModelArtifact::decode(category, &bytes)
    }

    async fn exists(&self, category: CategoryKey) -> Result<bool> {
        tokio::fs::try_exists(self.path_for(category))
            .await
            .map_err(|e| PropError::persist(category, e))
    }
}

/// Keeps encoded artifacts in memory. Goes through the same codec as the
/// filesystem store.
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: DashMap<CategoryKey, Vec<u8>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        let bytes = artifact.encode()?;
        self.artifacts.insert(artifact.category(), bytes);
        Ok(())
    }

    async fn load(&self, category: CategoryKey) -> Result<ModelArtifact> {
        let bytes = self
            .artifacts
            .get(&category)
            .map(|entry| entry.value().clone())
            .ok_or(PropError::ModelNotFound { category })?;
        ModelArtifact::decode(category, &bytes)
    }

    async fn exists(&self, category: CategoryKey) -> Result<bool> {
        Ok(self.artifacts.contains_key(&category))
    }
}

// Per-category model cache

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use propline_ml::{ArtifactStore, ModelArtifact};
use propline_models::{CategoryKey, Result};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::metrics::Metrics;

type Slot = Arc<OnceCell<Arc<ModelArtifact>>>;

/// Lazily loads one artifact per category and keeps it for the life of the
/// process. Concurrent first requests for a category share a single load.
/// A failed load is not cached.
pub struct ModelRegistry {
    store: Arc<dyn ArtifactStore>,
    slots: DashMap<CategoryKey, Slot>,
    loads: AtomicU64,
    loads_by_category: DashMap<CategoryKey, u64>,
    metrics: Option<Metrics>,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            slots: DashMap::new(),
            loads: AtomicU64::new(0),
            loads_by_category: DashMap::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn resolve(&self, category: CategoryKey) -> Result<Arc<ModelArtifact>> {
        let slot = self.slots.entry(category).or_default().clone();
        let artifact = slot.get_or_try_init(|| self.load(category)).await?;
        Ok(Arc::clone(artifact))
    }

    /// Drops the cached artifact. The next `resolve` loads from the store.
    pub fn invalidate(&self, category: CategoryKey) -> bool {
        let removed = self.slots.remove(&category).is_some();
        if removed {
            info!(%category, "Invalidated cached model");
        }
        removed
    }

    pub async fn reload(&self, category: CategoryKey) -> Result<Arc<ModelArtifact>> {
        self.invalidate(category);
        self.resolve(category).await
    }

    pub fn cached_categories(&self) -> Vec<CategoryKey> {
        let mut categories: Vec<CategoryKey> = self
            .slots
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| *entry.key())
            .collect();
        categories.sort();
        categories
    }

    pub fn cached(&self) -> Vec<Arc<ModelArtifact>> {
        let mut artifacts: Vec<Arc<ModelArtifact>> = self
            .slots
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect();
        artifacts.sort_by_key(|artifact| artifact.category());
        artifacts
    }

    /// Store loads attempted so far, successful or not.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn load_count_for(&self, category: CategoryKey) -> u64 {
        self.loads_by_category.get(&category).map_or(0, |count| *count)
    }

    async fn load(&self, category: CategoryKey) -> Result<Arc<ModelArtifact>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        *self.loads_by_category.entry(category).or_insert(0) += 1;

        let started = Instant::now();
        let artifact = match self.store.load(category).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(%category, error = %e, kind = e.kind(), "Model load failed");
                return Err(e);
            }
        };

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.observe_model_load(category.as_str(), elapsed.as_secs_f64());
        }
        info!(
            %category,
            trained_at = %artifact.trained_at(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Loaded model"
        );
        Ok(Arc::new(artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use propline_ml::{EnsembleParams, MemoryArtifactStore, ModelTrainer};
    use propline_models::{Outcome, OutcomeRecord, PropError, TrainingRow};
    use std::time::Duration;

    fn small_artifact(category: CategoryKey) -> ModelArtifact {
        let date = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let rows: Vec<TrainingRow> = (0..20)
            .map(|i| {
                let outcome = if i % 2 == 0 { Outcome::Win } else { Outcome::Loss };
                let record = OutcomeRecord::new(format!("p{i}"), category, 0.5, outcome, date);
                if outcome == Outcome::Win {
                    TrainingRow::new(record).with_stats(0.857, 3, 3)
                } else {
                    TrainingRow::new(record).with_stats(0.143, 0, 0)
                }
            })
            .collect();
        let params = EnsembleParams {
            n_trees: 5,
            max_depth: 3,
            ..EnsembleParams::default()
        };
        ModelTrainer::new(params).train(category, &rows).unwrap()
    }

    /// Wraps a store and stalls every load so racing callers overlap.
    struct SlowStore {
        inner: MemoryArtifactStore,
        delay: Duration,
    }

    #[async_trait]
    impl ArtifactStore for SlowStore {
        async fn save(&self, artifact: &ModelArtifact) -> Result<()> {
            self.inner.save(artifact).await
        }

        async fn load(&self, category: CategoryKey) -> Result<ModelArtifact> {
            tokio::time::sleep(self.delay).await;
            self.inner.load(category).await
        }

        async fn exists(&self, category: CategoryKey) -> Result<bool> {
            self.inner.exists(category).await
        }
    }

    async fn registry_with(categories: &[CategoryKey], delay: Duration) -> Arc<ModelRegistry> {
        let inner = MemoryArtifactStore::new();
        for category in categories {
            inner.save(&small_artifact(*category)).await.unwrap();
        }
        Arc::new(ModelRegistry::new(Arc::new(SlowStore { inner, delay })))
    }

    #[tokio::test]
    async fn test_resolve_caches() {
        let registry = registry_with(&[CategoryKey::Hits], Duration::ZERO).await;

        let first = registry.resolve(CategoryKey::Hits).await.unwrap();
        let second = registry.resolve(CategoryKey::Hits).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.load_count(), 1);
        assert_eq!(registry.cached_categories(), vec![CategoryKey::Hits]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_first_requests_load_once() {
        let registry = registry_with(&[CategoryKey::HomeRuns], Duration::from_millis(50)).await;

        let a = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.resolve(CategoryKey::HomeRuns).await }
        });
        let b = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.resolve(CategoryKey::HomeRuns).await }
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.load_count_for(CategoryKey::HomeRuns), 1);
        assert_eq!(registry.load_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_model_is_not_cached() {
        let registry = registry_with(&[], Duration::ZERO).await;

        let err = registry.resolve(CategoryKey::Triples).await.unwrap_err();
        assert!(matches!(err, PropError::ModelNotFound { category: CategoryKey::Triples }));
        assert!(registry.cached_categories().is_empty());

        registry.resolve(CategoryKey::Triples).await.unwrap_err();
        assert_eq!(registry.load_count_for(CategoryKey::Triples), 2);
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_artifact() {
        let inner = MemoryArtifactStore::new();
        inner.save(&small_artifact(CategoryKey::Walks)).await.unwrap();
        let store = Arc::new(inner);
        let registry = ModelRegistry::new(store.clone());

        let before = registry.resolve(CategoryKey::Walks).await.unwrap();
        store.save(&small_artifact(CategoryKey::Walks)).await.unwrap();

        // Cache does not notice the retrain on its own.
        let cached = registry.resolve(CategoryKey::Walks).await.unwrap();
        assert!(Arc::ptr_eq(&before, &cached));

        let after = registry.reload(CategoryKey::Walks).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(registry.load_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_unknown_category() {
        let registry = registry_with(&[], Duration::ZERO).await;
        assert!(!registry.invalidate(CategoryKey::Singles));
    }
}

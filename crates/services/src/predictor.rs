// Prediction service

use std::borrow::Cow;
use std::sync::Arc;

use propline_db::ProfileStore;
use propline_ml::{build_features, FeatureInput, WinClassifier};
use propline_models::{
    round_probability, CategoryKey, CategoryNormalizer, PredictRequest, PredictedOutcome,
    PredictionResponse, ProfileKey, Result,
};
use tracing::{debug, warn};

use crate::metrics::Metrics;
use crate::registry::ModelRegistry;

pub struct PredictorService {
    normalizer: Arc<CategoryNormalizer>,
    registry: Arc<ModelRegistry>,
    profiles: Option<Arc<dyn ProfileStore>>,
    metrics: Option<Metrics>,
}

impl PredictorService {
    pub fn new(normalizer: Arc<CategoryNormalizer>, registry: Arc<ModelRegistry>) -> Self {
        Self {
            normalizer,
            registry,
            profiles: None,
            metrics: None,
        }
    }

    /// Lets requests that carry a `player_id` omit their streak statistics.
    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub async fn predict(&self, request: &PredictRequest) -> Result<PredictionResponse> {
        let result = self.run(request).await;

        match &result {
            Ok(response) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_prediction(
                        response.prop_type.as_str(),
                        response.predicted_outcome.as_str(),
                    );
                }
            }
            Err(e) => {
                warn!(
                    prop_type = %request.prop_type,
                    error = %e,
                    kind = e.kind(),
                    "Prediction failed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.inc_prediction_failure(e.kind());
                }
            }
        }
        result
    }

    async fn run(&self, request: &PredictRequest) -> Result<PredictionResponse> {
        let category = self.normalizer.resolve(&request.prop_type)?;
        request.validate()?;

        let model = self.registry.resolve(category).await?;
        let request = self.fill_from_profile(category, request).await?;

        let features = build_features(&FeatureInput::from_request(&request));
        let win_probability = model.win_probability(&features);
        let raw = PredictedOutcome::from_probability(win_probability);
        let predicted_outcome = request.over_under.apply(raw);

        debug!(
            %category,
            model = model.model_name(),
            win_probability,
            raw = raw.as_str(),
            predicted = predicted_outcome.as_str(),
            "Scored prop"
        );

        Ok(PredictionResponse {
            prop_type: category,
            predicted_outcome,
            confidence_score: round_probability(win_probability),
        })
    }

    async fn fill_from_profile<'a>(
        &self,
        category: CategoryKey,
        request: &'a PredictRequest,
    ) -> Result<Cow<'a, PredictRequest>> {
        let (Some(store), Some(player_id)) = (&self.profiles, request.player_id.as_deref()) else {
            return Ok(Cow::Borrowed(request));
        };
        let complete = request.rolling_result_avg_7.is_some()
            && request.hit_streak.is_some()
            && request.win_streak.is_some();
        if complete {
            return Ok(Cow::Borrowed(request));
        }

        let Some(profile) = store.get_profile(&ProfileKey::new(player_id, category)).await? else {
            debug!(%category, player_id, "No streak profile on file");
            return Ok(Cow::Borrowed(request));
        };

        let mut filled = request.clone();
        filled.rolling_result_avg_7.get_or_insert(profile.rolling_result_avg_7);
        filled.hit_streak.get_or_insert(profile.hit_streak);
        filled.win_streak.get_or_insert(profile.win_streak);
        Ok(Cow::Owned(filled))
    }
}

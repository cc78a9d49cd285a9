use std::collections::HashMap;
use std::env;

use config::{Config, ConfigError, Environment, File};
use propline_ml::EnsembleParams;
use propline_models::{normalize_label, CategoryKey, CategoryNormalizer};
use propline_services::AggregationOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub training: TrainingConfig,
    pub aggregation: AggregationConfig,
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub categories: CategoriesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_weight_split: f32,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub window: usize,
    pub lookback_days: u32,
    pub derive_streak_type: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub batch_size: usize,
    /// Window of the realized accuracy report.
    pub accuracy_days: u32,
}

/// Extra human labels mapped to canonical keys, e.g. `ks = "strikeouts_pitching"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoriesConfig {
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Start with default values
            .set_default("database.url", "postgresql://localhost:5432/propline_dev")?
            .set_default("database.max_connections", 10)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("artifacts.directory", "models")?
            .set_default("training.n_trees", 100)?
            .set_default("training.max_depth", 6)?
            .set_default("training.min_weight_split", 2.0)?
            .set_default("training.seed", 42)?
            .set_default("aggregation.window", 7)?
            .set_default("aggregation.lookback_days", 30)?
            .set_default("aggregation.derive_streak_type", false)?
            .set_default("scoring.batch_size", 500)?
            .set_default("scoring.accuracy_days", 28)?
            // Add in settings from configuration file
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // PROPLINE__SERVER__PORT=9000 and friends
            .add_source(
                Environment::with_prefix("PROPLINE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn ensemble_params(&self) -> EnsembleParams {
        EnsembleParams {
            n_trees: self.training.n_trees,
            max_depth: self.training.max_depth,
            min_weight_split: self.training.min_weight_split,
            seed: self.training.seed,
        }
    }

    pub fn aggregation_options(&self) -> AggregationOptions {
        AggregationOptions {
            window: self.aggregation.window,
            derive_streak_type: self.aggregation.derive_streak_type,
        }
    }

    /// Built-in aliases plus the configured ones. An alias pointing at an
    /// unknown key is a configuration error.
    pub fn normalizer(&self) -> Result<CategoryNormalizer, ConfigError> {
        let mut normalizer = CategoryNormalizer::new();
        for (label, target) in &self.categories.aliases {
            let key = CategoryKey::from_key(&normalize_label(target)).ok_or_else(|| {
                ConfigError::Message(format!(
                    "category alias {label:?} points at unknown key {target:?}"
                ))
            })?;
            normalizer = normalizer.with_alias(label, key);
        }
        Ok(normalizer)
    }
}

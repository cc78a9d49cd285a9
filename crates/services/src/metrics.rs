//! Prometheus metrics for prediction and training.
//!
//! All metrics use the `propline_` prefix.

use std::sync::Arc;

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Successful predictions by category and predicted outcome
    pub predictions_total: CounterVec,
    /// Failed predictions by error kind
    pub prediction_failures_total: CounterVec,
    /// Artifact loads by category
    pub model_loads_total: CounterVec,
    /// Training runs by category and result
    pub training_runs_total: CounterVec,
    /// Artifact load latency in seconds
    pub model_load_seconds: HistogramVec,
    /// Labeled props scored after the fact by category and result
    pub scored_predictions_total: CounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let predictions_total = CounterVec::new(
            Opts::new("propline_predictions_total", "Predictions served by category and outcome"),
            &["category", "outcome"],
        )?;
        registry.register(Box::new(predictions_total.clone()))?;

        let prediction_failures_total = CounterVec::new(
            Opts::new("propline_prediction_failures_total", "Failed predictions by error kind"),
            &["kind"],
        )?;
        registry.register(Box::new(prediction_failures_total.clone()))?;

        let model_loads_total = CounterVec::new(
            Opts::new("propline_model_loads_total", "Model artifact loads by category"),
            &["category"],
        )?;
        registry.register(Box::new(model_loads_total.clone()))?;

        let training_runs_total = CounterVec::new(
            Opts::new("propline_training_runs_total", "Training runs by category and result"),
            &["category", "result"],
        )?;
        registry.register(Box::new(training_runs_total.clone()))?;

        let model_load_seconds = HistogramVec::new(
            HistogramOpts::new(
                "propline_model_load_seconds",
                "Model artifact load latency in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["category"],
        )?;
        registry.register(Box::new(model_load_seconds.clone()))?;

        let scored_predictions_total = CounterVec::new(
            Opts::new(
                "propline_scored_predictions_total",
                "Labeled props scored after the fact by category and result",
            ),
            &["category", "result"],
        )?;
        registry.register(Box::new(scored_predictions_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            predictions_total,
            prediction_failures_total,
            model_loads_total,
            training_runs_total,
            model_load_seconds,
            scored_predictions_total,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }

    pub fn inc_prediction(&self, category: &str, outcome: &str) {
        self.predictions_total.with_label_values(&[category, outcome]).inc();
    }

    pub fn inc_prediction_failure(&self, kind: &str) {
        self.prediction_failures_total.with_label_values(&[kind]).inc();
    }

    pub fn observe_model_load(&self, category: &str, seconds: f64) {
        self.model_loads_total.with_label_values(&[category]).inc();
        self.model_load_seconds.with_label_values(&[category]).observe(seconds);
    }

    pub fn inc_training_run(&self, category: &str, result: &str) {
        self.training_runs_total.with_label_values(&[category, result]).inc();
    }

    pub fn inc_scored_prediction(&self, category: &str, result: &str) {
        self.scored_predictions_total.with_label_values(&[category, result]).inc();
    }
}

pub mod aggregator;
pub mod registry;
pub mod predictor;
pub mod retrain;
pub mod scoring;
pub mod metrics;

pub use aggregator::*;
pub use registry::*;
pub use predictor::*;
pub use retrain::*;
pub use scoring::*;
pub use metrics::*;

use serde::Serialize;
use thiserror::Error;

use crate::category::CategoryKey;

#[derive(Error, Debug)]
pub enum PropError {
    #[error("Unsupported prop category: {raw:?}")]
    UnsupportedCategory { raw: String },

    #[error("Invalid request field `{field}`: {reason}")]
    InvalidRequest { field: String, reason: String },

    #[error("No trained model for category: {category}")]
    ModelNotFound { category: CategoryKey },

    #[error("No training data for category: {category}")]
    NoData { category: CategoryKey },

    #[error("Not enough outcome variation for {category}: {wins} wins, {losses} losses")]
    InsufficientVariation {
        category: CategoryKey,
        wins: usize,
        losses: usize,
    },

    #[error("Model fit failed for {category}: {reason}")]
    TrainingFailed { category: CategoryKey, reason: String },

    #[error("Artifact persistence failed for {category}: {reason}")]
    PersistFailure { category: CategoryKey, reason: String },

    #[error("Upstream store unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// Who is at fault for a failure, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    Client,
    Server,
}

impl PropError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn persist(category: CategoryKey, reason: impl ToString) -> Self {
        Self::PersistFailure {
            category,
            reason: reason.to_string(),
        }
    }

    pub fn upstream(reason: impl ToString) -> Self {
        Self::UpstreamUnavailable(reason.to_string())
    }

    /// Stable machine-readable tag for the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedCategory { .. } => "unsupported_category",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::NoData { .. } => "no_data",
            Self::InsufficientVariation { .. } => "insufficient_variation",
            Self::TrainingFailed { .. } => "training_failed",
            Self::PersistFailure { .. } => "persist_failure",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnsupportedCategory { .. } | Self::InvalidRequest { .. } => ErrorClass::Client,
            _ => ErrorClass::Server,
        }
    }

    /// Whether the caller may retry the same call later and expect a different result.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable(_) | Self::ModelNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PropError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_and_server_classes_are_distinct() {
        let unsupported = PropError::UnsupportedCategory {
            raw: "Banana Props".to_string(),
        };
        let missing = PropError::ModelNotFound {
            category: CategoryKey::HomeRuns,
        };

        assert_eq!(unsupported.class(), ErrorClass::Client);
        assert_eq!(PropError::invalid("is_home", "must be 0 or 1").class(), ErrorClass::Client);
        assert_eq!(missing.class(), ErrorClass::Server);
        assert_eq!(PropError::upstream("connection refused").class(), ErrorClass::Server);
    }

    #[test]
    fn test_kind_tags() {
        let err = PropError::InsufficientVariation {
            category: CategoryKey::Hits,
            wins: 10,
            losses: 0,
        };
        assert_eq!(err.kind(), "insufficient_variation");
        assert_eq!(
            err.to_string(),
            "Not enough outcome variation for hits: 10 wins, 0 losses"
        );
        assert!(PropError::upstream("timeout").is_retryable());
        assert!(!err.is_retryable());
    }
}

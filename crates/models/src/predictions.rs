use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::category::CategoryKey;
use crate::error::{PropError, Result};
use crate::records::{Outcome, OutcomeRecord};

/// Column order every classifier is trained with. Never reorder.
pub const FEATURE_NAMES: [&str; 5] = [
    "line_diff",
    "hit_streak",
    "win_streak",
    "is_home",
    "opponent_encoded",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub line_diff: f64,
    pub hit_streak: f64,
    pub win_streak: f64,
    pub is_home: f64,
    pub opponent_encoded: f64,
}

impl FeatureVector {
    pub const LEN: usize = FEATURE_NAMES.len();

    /// Values in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; 5] {
        [
            self.line_diff,
            self.hit_streak,
            self.win_streak,
            self.is_home,
            self.opponent_encoded,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverUnder {
    Over,
    Under,
}

impl OverUnder {
    /// Betting the over flips the meaning of the classifier's win label.
    pub fn apply(self, raw: PredictedOutcome) -> PredictedOutcome {
        match self {
            Self::Over => raw.inverted(),
            Self::Under => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictedOutcome {
    Win,
    Loss,
}

impl PredictedOutcome {
    pub const THRESHOLD: f64 = 0.5;

    pub fn from_probability(win_probability: f64) -> Self {
        if win_probability >= Self::THRESHOLD {
            Self::Win
        } else {
            Self::Loss
        }
    }

    pub fn inverted(self) -> Self {
        match self {
            Self::Win => Self::Loss,
            Self::Loss => Self::Win,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "win" => Some(Self::Win),
            "loss" => Some(Self::Loss),
            _ => None,
        }
    }

    /// Whether the prediction matched the resolution. A push matches nothing.
    pub fn correctness(self, outcome: Outcome) -> Option<bool> {
        match outcome {
            Outcome::Win => Some(self == Self::Win),
            Outcome::Loss => Some(self == Self::Loss),
            Outcome::Push => None,
        }
    }
}

/// A labeled prop scored after the fact by the model of its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrediction {
    pub record_id: Uuid,
    pub category: CategoryKey,
    pub game_date: NaiveDate,
    pub outcome: Outcome,
    pub predicted_outcome: PredictedOutcome,
    pub confidence_score: f64,
    pub was_correct: Option<bool>,
}

impl ScoredPrediction {
    pub fn new(record: &OutcomeRecord, win_probability: f64) -> Self {
        let predicted_outcome = PredictedOutcome::from_probability(win_probability);
        Self {
            record_id: record.id,
            category: record.category,
            game_date: record.game_date,
            outcome: record.outcome,
            predicted_outcome,
            confidence_score: round_probability(win_probability),
            was_correct: predicted_outcome.correctness(record.outcome),
        }
    }
}

/// Prediction payload. Optional numerics default to zero in the feature builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub prop_type: String,
    #[serde(default)]
    pub prop_value: Option<f64>,
    #[serde(default)]
    pub rolling_result_avg_7: Option<f64>,
    #[serde(default)]
    pub hit_streak: Option<u32>,
    #[serde(default)]
    pub win_streak: Option<u32>,
    #[serde(default)]
    pub is_home: Option<u8>,
    #[serde(default)]
    pub opponent_avg_win_rate: Option<f64>,
    pub over_under: OverUnder,
    /// Lets the service fill missing streak statistics from the profile store.
    #[serde(default)]
    pub player_id: Option<String>,
}

impl PredictRequest {
    pub fn new(prop_type: impl Into<String>, prop_value: f64, over_under: OverUnder) -> Self {
        Self {
            prop_type: prop_type.into(),
            prop_value: Some(prop_value),
            rolling_result_avg_7: None,
            hit_streak: None,
            win_streak: None,
            is_home: None,
            opponent_avg_win_rate: None,
            over_under,
            player_id: None,
        }
    }

    pub fn with_streaks(
        mut self,
        rolling_result_avg_7: f64,
        hit_streak: u32,
        win_streak: u32,
    ) -> Self {
        self.rolling_result_avg_7 = Some(rolling_result_avg_7);
        self.hit_streak = Some(hit_streak);
        self.win_streak = Some(win_streak);
        self
    }

    pub fn with_home(mut self, is_home: bool) -> Self {
        self.is_home = Some(u8::from(is_home));
        self
    }

    pub fn with_opponent_win_rate(mut self, rate: f64) -> Self {
        self.opponent_avg_win_rate = Some(rate);
        self
    }

    pub fn with_player(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    pub fn home_flag(&self) -> Option<bool> {
        self.is_home.map(|flag| flag == 1)
    }

    /// Boundary checks that serde alone cannot express.
    pub fn validate(&self) -> Result<()> {
        let numeric = [
            ("prop_value", self.prop_value),
            ("rolling_result_avg_7", self.rolling_result_avg_7),
            ("opponent_avg_win_rate", self.opponent_avg_win_rate),
        ];
        for (field, value) in numeric {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(PropError::invalid(field, "must be a finite number"));
            }
        }

        if let Some(flag) = self.is_home {
            if flag > 1 {
                let reason = format!("must be 0 or 1, got {flag}");
                return Err(PropError::invalid("is_home", reason));
            }
        }

        if self.player_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(PropError::invalid("player_id", "must not be blank"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prop_type: CategoryKey,
    pub predicted_outcome: PredictedOutcome,
    /// Raw classifier win probability, rounded to 4 places. Not adjusted for the
    /// over/under side.
    pub confidence_score: f64,
}

pub fn round_probability(p: f64) -> f64 {
    (p.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}
